use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use serde_json::{Map, Value};

use crate::error::CancelledError;
use crate::logging::LogLevel;

/// Receives every log entry that passes the level filter instead of stdout/stderr.
pub type LogSink = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Invocation-scoped state: cancellation flag, log scope tags and log routing.
/// One context is created per dispatch and dropped afterwards.
pub struct Context {
    log_tag_stack: Vec<Map<String, Value>>,
    log_sink: Option<LogSink>,
    min_level: LogLevel,
    cancellation: Arc<AtomicBool>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_cancellation(Arc::new(AtomicBool::new(false)))
    }

    pub fn with_cancellation(token: Arc<AtomicBool>) -> Self {
        Self {
            log_tag_stack: Vec::new(),
            log_sink: None,
            min_level: LogLevel::Info,
            cancellation: token,
        }
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::SeqCst)
    }

    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CancelledError.into())
        } else {
            Ok(())
        }
    }

    pub fn push_log_tags(&mut self, tags: Map<String, Value>) {
        if tags.is_empty() {
            return;
        }
        self.log_tag_stack.push(tags);
    }

    pub fn pop_log_tags(&mut self) {
        self.log_tag_stack.pop();
    }

    pub fn log_tag_stack(&self) -> &[Map<String, Value>] {
        &self.log_tag_stack
    }

    pub fn set_log_sink(&mut self, sink: Option<LogSink>) -> Option<LogSink> {
        std::mem::replace(&mut self.log_sink, sink)
    }

    pub fn log_sink(&self) -> Option<&LogSink> {
        self.log_sink.as_ref()
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cancellation_is_shared_through_token() {
        let ctx = Context::new();
        let token = ctx.cancellation_token();
        assert!(ctx.ensure_not_cancelled().is_ok());
        token.store(true, Ordering::SeqCst);
        let err = ctx.ensure_not_cancelled().unwrap_err();
        assert!(err.is::<CancelledError>());
    }

    #[test]
    fn empty_tag_maps_are_not_pushed() {
        let mut ctx = Context::new();
        ctx.push_log_tags(Map::new());
        assert!(ctx.log_tag_stack().is_empty());
        let mut tags = Map::new();
        tags.insert("resource".into(), json!("event"));
        ctx.push_log_tags(tags);
        assert_eq!(ctx.log_tag_stack().len(), 1);
        ctx.pop_log_tags();
        assert!(ctx.log_tag_stack().is_empty());
    }
}
