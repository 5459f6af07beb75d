//! The boundary to the process that actually performs editor operations.

use async_trait::async_trait;
use editor_bridge_core::codes;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No connection could be made; nothing reached the bridge.
    #[error("{0}")]
    Unavailable(String),
    /// The request may have reached the bridge but no usable reply came back.
    #[error("{0}")]
    Transport(String),
}

#[async_trait]
pub trait AutomationBackend: Send + Sync {
    /// Send one request and wait for its reply. Implementations must not retry.
    async fn send_automation_request(&self, tool: &str, payload: Value)
    -> Result<Value, BackendError>;
}

/// Talks to an automation bridge over HTTP: `POST {base_url}/v1/automation/{tool}`.
pub struct HttpAutomationBackend {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpAutomationBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn endpoint(&self, tool: &str) -> String {
        format!("{}/v1/automation/{tool}", self.base_url)
    }
}

#[async_trait]
impl AutomationBackend for HttpAutomationBackend {
    async fn send_automation_request(
        &self,
        tool: &str,
        payload: Value,
    ) -> Result<Value, BackendError> {
        let mut request = self.http.post(self.endpoint(tool)).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                BackendError::Unavailable(format!(
                    "failed to reach automation bridge at {}: {e}",
                    self.base_url
                ))
            } else {
                BackendError::Transport(format!("automation request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            BackendError::Transport(format!("failed to read automation bridge reply: {e}"))
        })?;
        Ok(normalize_http_reply(status, parse_response_body(&bytes)))
    }
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

/// A non-2xx reply that does not speak the `success` convention becomes a
/// backend failure. Anything carrying its own `success` flag passes untouched.
fn normalize_http_reply(status: u16, body: Value) -> Value {
    let has_success_flag = body.get("success").is_some_and(Value::is_boolean);
    if (200..300).contains(&status) || has_success_flag {
        return body;
    }
    let detail = match &body {
        Value::Null => String::new(),
        Value::String(text) => format!(": {text}"),
        other => format!(": {other}"),
    };
    json!({
        "success": false,
        "error": format!("Automation bridge returned HTTP {status}{detail}"),
        "errorCode": codes::AUTOMATION_HTTP_ERROR,
    })
}
