use std::sync::Arc;

use editor_bridge_core::args::render_template;
use editor_bridge_core::request::requested_action;
use editor_bridge_core::{Catalog, Envelope, PreparedAction, ToolError, prepare};
use serde_json::{Map, Value};

use crate::dispatch::Dispatcher;

/// Reply keys that describe the outcome rather than the result.
const OUTCOME_KEYS: [&str; 4] = ["success", "message", "error", "errorCode"];

/// Runs one invocation end to end and always produces exactly one envelope.
#[derive(Clone)]
pub struct ActionHandler {
    catalog: Arc<Catalog>,
    dispatcher: Dispatcher,
}

impl ActionHandler {
    pub fn new(catalog: Arc<Catalog>, dispatcher: Dispatcher) -> Self {
        Self {
            catalog,
            dispatcher,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn bridge_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub async fn handle(&self, tool: &str, args: &Map<String, Value>) -> Envelope {
        let prepared = match prepare(&self.catalog, tool, args) {
            Ok(prepared) => prepared,
            Err(err) => {
                log_failure(tool, &err);
                return Envelope::from_tool_error(
                    self.catalog.tool(tool),
                    requested_action(args),
                    &err,
                );
            }
        };

        let timeout_ms = prepared.timeout_ms(self.dispatcher.default_timeout_ms());
        let reply = self
            .dispatcher
            .dispatch(
                &prepared.tool.backend_tool,
                &prepared.action.name,
                prepared.payload(),
                timeout_ms,
            )
            .await;
        match reply.and_then(|reply| shape_reply(&prepared, reply)) {
            Ok(envelope) => envelope,
            Err(err) => {
                log_failure(tool, &err);
                Envelope::from_tool_error(Some(prepared.tool), Some(&prepared.action.name), &err)
            }
        }
    }
}

fn log_failure(tool: &str, err: &ToolError) {
    if err.is_local_validation() {
        tracing::debug!(tool, code = err.code(), error = %err, "rejected before dispatch");
    } else {
        tracing::warn!(tool, code = err.code(), error = %err, "automation action failed");
    }
}

fn shape_reply(prepared: &PreparedAction<'_>, reply: Value) -> Result<Envelope, ToolError> {
    let Value::Object(reply) = reply else {
        return Err(ToolError::Unexpected {
            message: format!(
                "automation bridge returned a non-object reply for {}",
                prepared.action.name
            ),
        });
    };

    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        let message = non_empty_str(&reply, "error")
            .map(str::to_string)
            .or_else(|| prepared.action.failure_message.clone())
            .unwrap_or_else(|| format!("{} failed", prepared.action.name));
        let code = non_empty_str(&reply, "errorCode").map(str::to_string);
        return Err(ToolError::Backend { message, code });
    }

    let message = non_empty_str(&reply, "message")
        .map(str::to_string)
        .or_else(|| {
            prepared
                .action
                .success_message
                .as_deref()
                .map(|template| render_template(template, &prepared.params))
        })
        .unwrap_or_else(|| format!("{} completed", prepared.action.name));
    let data = reply
        .into_iter()
        .filter(|(key, value)| !value.is_null() && !OUTCOME_KEYS.contains(&key.as_str()))
        .collect();
    Ok(Envelope::success(message, data))
}

fn non_empty_str<'a>(reply: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}
