use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_URL: &str = "https://app.posthog.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_URL: &str = "POSTHOG_URL";
pub const ENV_API_KEY: &str = "POSTHOG_API_KEY";
pub const ENV_TIMEOUT: &str = "POSTHOG_TIMEOUT";

/// Connection settings for the ingestion API.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    posthog: PartialSettings,
}

/// Unvalidated settings as read from a file and/or the environment.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".posthog").join("config.toml"))
}

impl Settings {
    /// Reads `explicit` (which must exist) or the default config file when
    /// present, then applies `POSTHOG_*` environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut partial = match explicit {
            Some(path) => PartialSettings::from_file(path)?,
            None => match default_config_path().filter(|path| path.is_file()) {
                Some(path) => PartialSettings::from_file(&path)?,
                None => PartialSettings::default(),
            },
        };
        partial.apply_env(|name| env::var(name).ok());
        partial.finish()
    }
}

impl PartialSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses the `[posthog]` table; `${VAR}` placeholders are expanded from
    /// the process environment.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(text)?;
        let lookup = |name: &str| env::var(name).ok();
        let expand = |value: Option<String>| value.map(|v| expand_placeholders(&v, lookup));
        let section = config.posthog;
        Ok(Self {
            url: expand(section.url),
            api_key: expand(section.api_key),
            timeout: expand(section.timeout),
        })
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty(ENV_URL) {
            self.url = Some(url);
        }
        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(api_key);
        }
        if let Some(timeout) = non_empty(ENV_TIMEOUT) {
            self.timeout = Some(timeout);
        }
    }

    pub fn finish(self) -> Result<Settings> {
        let url = self.url.unwrap_or_else(|| DEFAULT_URL.to_string());
        let parsed = Url::parse(&url).with_context(|| format!("Invalid PostHog url `{url}`"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("PostHog url `{url}` must use http or https"));
        }
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("PostHog api key is not configured (set {ENV_API_KEY} or posthog.api_key)")
            })?;
        let timeout = match self.timeout {
            Some(text) => humantime::parse_duration(text.trim())
                .with_context(|| format!("Invalid timeout `{text}`"))?,
            None => DEFAULT_TIMEOUT,
        };
        Ok(Settings {
            url,
            api_key,
            timeout,
        })
    }
}

fn expand_placeholders(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut token = String::new();
            for next in chars.by_ref() {
                if next == '}' {
                    break;
                }
                token.push(next);
            }
            if !token.is_empty() {
                if let Some(replacement) = lookup(&token) {
                    result.push_str(&replacement);
                }
            }
            continue;
        }
        result.push(ch);
    }
    result
}
