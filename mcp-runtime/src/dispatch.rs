use std::sync::Arc;
use std::time::Duration;

use editor_bridge_core::ToolError;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::{AutomationBackend, BackendError};

/// The single chokepoint between validated requests and the automation bridge.
/// One attempt per call, bounded by a timeout. No retries, no queueing.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Option<Arc<dyn AutomationBackend>>,
    default_timeout_ms: u64,
}

impl Dispatcher {
    pub fn new(backend: Option<Arc<dyn AutomationBackend>>, default_timeout_ms: u64) -> Self {
        Self {
            backend,
            default_timeout_ms,
        }
    }

    pub fn default_timeout_ms(&self) -> u64 {
        self.default_timeout_ms
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn dispatch(
        &self,
        tool: &str,
        action: &str,
        payload: Value,
        timeout_ms: u64,
    ) -> Result<Value, ToolError> {
        let request_id = Uuid::now_v7();
        let Some(backend) = &self.backend else {
            tracing::warn!(%request_id, tool, action, "automation bridge not connected");
            return Err(ToolError::BackendUnavailable {
                tool: tool.to_string(),
                action: action.to_string(),
                detail: None,
            });
        };

        tracing::info!(%request_id, tool, action, timeout_ms, "dispatching automation request");
        let call = backend.send_automation_request(tool, payload);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(Ok(reply)) => {
                tracing::debug!(%request_id, tool, action, "automation request completed");
                Ok(reply)
            }
            Ok(Err(BackendError::Unavailable(detail))) => {
                tracing::warn!(%request_id, tool, action, %detail, "automation bridge unavailable");
                Err(ToolError::BackendUnavailable {
                    tool: tool.to_string(),
                    action: action.to_string(),
                    detail: Some(detail),
                })
            }
            Ok(Err(BackendError::Transport(message))) => {
                tracing::warn!(%request_id, tool, action, %message, "automation transport failure");
                Err(ToolError::Unexpected { message })
            }
            Err(_) => {
                tracing::warn!(%request_id, tool, action, timeout_ms, "automation request timed out");
                Err(ToolError::BackendTimeout {
                    tool: tool.to_string(),
                    action: action.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}
