use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result};
use clap::{ArgAction, Parser};
use serde_json::{json, Value};

use posthog_dispatch::config::Settings;
use posthog_dispatch::dispatch::{preview, resolve_target, DispatchOptions, Dispatcher};
use posthog_dispatch::logging::{log, LogLevel};
use posthog_dispatch::params::JsonParameters;
use posthog_dispatch::{Context, HttpApiClient};

const ENV_LOG_LEVEL: &str = "POSTHOG_LOG_LEVEL";

#[derive(Parser, Debug)]
#[command(name = "posthog-dispatch")]
#[command(about = "Build PostHog payloads from a parameter document and submit them")]
struct CliOptions {
    /// Parameter document `{ parameters, items }` (JSON or YAML, '-' for stdin)
    #[arg(long = "input", short = 'i')]
    input: String,

    /// Override the document's `resource` parameter
    #[arg(long = "resource", short = 'r')]
    resource: Option<String>,

    /// Override the document's `operation` parameter
    #[arg(long = "operation", short = 'o')]
    operation: Option<String>,

    /// TOML config file with a [posthog] table (defaults to ~/.posthog/config.toml)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Print the request bodies instead of sending them
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Report failing alias/identity/track items in the output and keep going
    #[arg(long = "continue-on-fail", action = ArgAction::SetTrue)]
    continue_on_fail: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();

    let params = load_parameters(&opts.input)?;

    let mut ctx = Context::new();
    if let Ok(level) = env::var(ENV_LOG_LEVEL) {
        ctx.set_min_level(level.parse()?);
    }
    let token = ctx.cancellation_token();
    ctrlc::set_handler(move || {
        token.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    let target = resolve_target(
        &params,
        opts.resource.as_deref(),
        opts.operation.as_deref(),
    )?;

    let output = if opts.dry_run {
        let requests = preview(&mut ctx, &params, target)?;
        serde_json::to_value(requests)?
    } else {
        let settings = Settings::load(opts.config.as_deref())?;
        log(
            &ctx,
            LogLevel::Debug,
            "loaded settings",
            Some(json!({ "url": settings.url, "timeout": settings.timeout.as_secs() })),
        );
        let options = DispatchOptions {
            continue_on_fail: opts.continue_on_fail,
        };
        let dispatcher = Dispatcher::with_options(HttpApiClient::new(&settings), options);
        Value::Array(dispatcher.run_target(&mut ctx, &params, target)?)
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_parameters(source: &str) -> Result<JsonParameters> {
    let (text, origin) = if source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read parameter document from stdin")?;
        (buffer, "stdin".to_string())
    } else {
        let data = fs::read_to_string(source)
            .with_context(|| format!("Unable to read {source}"))?;
        (data, source.to_string())
    };

    let value: Value = if is_yaml(Path::new(source)) {
        serde_yaml::from_str(&text).with_context(|| format!("Invalid YAML in {origin}"))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {origin}"))?
    };
    JsonParameters::from_value(value)
}

fn is_yaml(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    ext == "yaml" || ext == "yml"
}
