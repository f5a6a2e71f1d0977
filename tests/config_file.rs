use std::fs;
use std::time::Duration;

use anyhow::Result;
use posthog_dispatch::config::{PartialSettings, Settings, DEFAULT_URL};

#[test]
fn config_file_is_read_and_validated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[posthog]\nurl = \"https://eu.posthog.com/\"\napi_key = \"phc_file\"\ntimeout = \"5s\"\n",
    )?;

    let settings = PartialSettings::from_file(&path)?.finish()?;
    assert_eq!(
        settings,
        Settings {
            url: "https://eu.posthog.com/".to_string(),
            api_key: "phc_file".to_string(),
            timeout: Duration::from_secs(5),
        }
    );
    Ok(())
}

#[test]
fn empty_file_falls_back_to_defaults_except_key() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    fs::write(&path, "")?;

    let mut partial = PartialSettings::from_file(&path)?;
    assert_eq!(partial, PartialSettings::default());
    partial.apply_env(|name| (name == "POSTHOG_API_KEY").then(|| "phc_env".to_string()));
    let settings = partial.finish()?;
    assert_eq!(settings.url, DEFAULT_URL);
    assert_eq!(settings.api_key, "phc_env");
    Ok(())
}

#[test]
fn broken_or_missing_files_are_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[posthog\nurl = ")?;
    let err = PartialSettings::from_file(&broken).unwrap_err();
    assert!(err.to_string().contains("Invalid config file"));

    let missing = dir.path().join("missing.toml");
    let err = Settings::load(Some(missing.as_path())).unwrap_err();
    assert!(err.to_string().contains("Unable to read config file"));
    Ok(())
}
