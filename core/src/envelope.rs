//! The uniform response shape every invocation ends in.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::catalog::ToolDescriptor;
use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success {
        message: String,
        data: Map<String, Value>,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

impl Serialize for Envelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Envelope::Success {
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>, code: Option<String>) -> Self {
        Envelope::Error {
            message: message.into(),
            code,
        }
    }

    /// Shape a failure for the caller.
    ///
    /// Field-level problems are prefixed with `tool/action` so the caller can
    /// tell which invocation they belong to. Unexpected failures take the
    /// family's label and code.
    pub fn from_tool_error(
        tool: Option<&ToolDescriptor>,
        action: Option<&str>,
        err: &ToolError,
    ) -> Self {
        if let ToolError::Unexpected { message } = err {
            return match tool {
                Some(tool) => Envelope::error(
                    format!("{}: {message}", tool.error_label),
                    Some(tool.error_code.clone()),
                ),
                None => Envelope::error(message.clone(), None),
            };
        }
        let message = match (err.field(), tool, action) {
            (Some(_), Some(tool), Some(action)) => format!("{}/{action}: {err}", tool.name),
            _ => err.to_string(),
        };
        Envelope::error(message, err.code().map(str::to_string))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Envelope::Success { message, .. } | Envelope::Error { message, .. } => message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Error { code, .. } => code.as_deref(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        match self {
            Envelope::Success { message, data } => {
                out.insert("success".to_string(), Value::Bool(true));
                out.insert("message".to_string(), json!(message));
                if !data.is_empty() {
                    out.insert("data".to_string(), Value::Object(data.clone()));
                }
            }
            Envelope::Error { message, code } => {
                out.insert("success".to_string(), Value::Bool(false));
                out.insert("message".to_string(), json!(message));
                if let Some(code) = code {
                    out.insert("errorCode".to_string(), json!(code));
                }
            }
        }
        Value::Object(out)
    }
}
