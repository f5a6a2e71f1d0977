use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::DispatchError;

/// The one call the dispatcher makes against the ingestion API.
/// Authentication, retries and status interpretation live behind it.
pub trait ApiRequest {
    fn submit(&self, method: &str, path: &str, body: Value) -> Result<Value>;
}

impl<F> ApiRequest for F
where
    F: Fn(&str, &str, Value) -> Result<Value>,
{
    fn submit(&self, method: &str, path: &str, body: Value) -> Result<Value> {
        (self)(method, path, body)
    }
}

/// Blocking ureq client for a PostHog instance. Adds the project `api_key`
/// to every request body. No retries.
pub struct HttpApiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpApiClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_timeout(&settings.url, &settings.api_key, settings.timeout)
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl ApiRequest for HttpApiClient {
    fn submit(&self, method: &str, path: &str, body: Value) -> Result<Value> {
        let url = self.endpoint(path);
        let body = with_api_key(body, &self.api_key);
        match self.agent.request(method, &url).send_json(body) {
            Ok(response) => read_response(response),
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                let message = if text.trim().is_empty() {
                    format!("{method} {url} returned no body")
                } else {
                    text
                };
                Err(DispatchError::Transport {
                    status: Some(code),
                    message,
                }
                .into())
            }
            Err(ureq::Error::Transport(transport)) => Err(DispatchError::Transport {
                status: None,
                message: transport.to_string(),
            }
            .into()),
        }
    }
}

fn with_api_key(body: Value, api_key: &str) -> Value {
    match body {
        Value::Object(mut map) => {
            map.insert("api_key".to_string(), Value::String(api_key.to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

fn read_response(response: ureq::Response) -> Result<Value> {
    let text = response
        .into_string()
        .map_err(|err| DispatchError::Transport {
            status: None,
            message: format!("failed to read response body: {err}"),
        })?;
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "body": text })))
}
