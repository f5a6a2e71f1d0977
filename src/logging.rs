use std::fmt;
use std::io::{stderr, stdout, Write};
use std::str::FromStr;

use anyhow::{anyhow, Result};
use humantime::format_rfc3339;
use serde_json::{Map, Value};

use crate::context::Context;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(anyhow!("unsupported log level: {other}")),
        }
    }
}

fn current_timestamp() -> String {
    let now = std::time::SystemTime::now();
    format_rfc3339(now).to_string()
}

/// Keeps only scalar tag values; nested structures do not belong in tags.
pub fn stable_tags(value: Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(obj) = value {
        for (key, val) in obj {
            match val {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    out.insert(key, val);
                }
                _ => {}
            }
        }
    }
    out
}

fn scope_tags(ctx: &Context) -> Map<String, Value> {
    let mut merged = Map::new();
    for map in ctx.log_tag_stack() {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn write_fallback(entry: &Map<String, Value>) {
    if let Ok(serialized) = serde_json::to_string(entry) {
        let level = entry
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info");
        if matches!(level, "error" | "fatal") {
            let _ = writeln!(stderr(), "{}", serialized);
        } else {
            let _ = writeln!(stdout(), "{}", serialized);
        }
    }
}

/// Emits one structured entry `{ level, message, data?, tags?, timestamp }`.
/// Entries below the context's minimum level are dropped. Returns the entry
/// that was written, if any.
pub fn log(
    ctx: &Context,
    level: LogLevel,
    message: &str,
    data: Option<Value>,
) -> Option<Map<String, Value>> {
    if level < ctx.min_level() {
        return None;
    }

    let mut entry = Map::new();
    entry.insert("level".to_string(), Value::String(level.to_string()));
    entry.insert("message".to_string(), Value::String(message.to_string()));

    if let Some(data) = data {
        let data = match data {
            Value::Object(_) => data,
            other => {
                let mut wrapper = Map::new();
                wrapper.insert("value".to_string(), other);
                Value::Object(wrapper)
            }
        };
        entry.insert("data".to_string(), data);
    }

    let tags = scope_tags(ctx);
    if !tags.is_empty() {
        entry.insert("tags".to_string(), Value::Object(tags));
    }

    entry.insert("timestamp".to_string(), Value::String(current_timestamp()));

    match ctx.log_sink() {
        Some(sink) => sink(&entry),
        None => write_fallback(&entry),
    }
    Some(entry)
}

/// Runs `body` with `tags` pushed onto the context's log scope.
pub fn with_log_tags<T>(
    ctx: &mut Context,
    tags: Value,
    body: impl FnOnce(&mut Context) -> T,
) -> T {
    let tags = stable_tags(tags);
    let pushed = !tags.is_empty();
    if pushed {
        ctx.push_log_tags(tags);
    }
    let result = body(ctx);
    if pushed {
        ctx.pop_log_tags();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn capturing_context() -> (Context, Arc<Mutex<Vec<Map<String, Value>>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let clone = captured.clone();
        let mut ctx = Context::new();
        ctx.set_min_level(LogLevel::Trace);
        ctx.set_log_sink(Some(Arc::new(move |entry: &Map<String, Value>| {
            clone.lock().unwrap().push(entry.clone());
        })));
        (ctx, captured)
    }

    #[test]
    fn entries_carry_scope_tags_and_timestamp() {
        let (mut ctx, captured) = capturing_context();
        with_log_tags(
            &mut ctx,
            json!({ "resource": "event", "nested": { "dropped": true } }),
            |ctx| log(ctx, LogLevel::Info, "batch ready", Some(json!({ "size": 2 }))),
        );
        log(&ctx, LogLevel::Debug, "after scope", None);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0]["tags"], json!({ "resource": "event" }));
        assert_eq!(captured[0]["data"], json!({ "size": 2 }));
        assert!(captured[0]["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(captured[1].get("tags").is_none());
    }

    #[test]
    fn entries_below_threshold_are_dropped() {
        let (mut ctx, captured) = capturing_context();
        ctx.set_min_level(LogLevel::Warn);
        assert!(log(&ctx, LogLevel::Info, "quiet", None).is_none());
        assert!(log(&ctx, LogLevel::Error, "loud", Some(json!("boom"))).is_some());
        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0]["data"], json!({ "value": "boom" }));
    }

    #[test]
    fn level_names_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
