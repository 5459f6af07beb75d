use thiserror::Error;

use crate::paths::PathError;

/// Every failure a tool invocation can end in. Each variant maps to a stable
/// machine code so callers can branch without parsing messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {tool}")]
    UnknownTool { tool: String },

    #[error("Unknown {tool} action: {action}{}", suggestion_suffix(.suggestion))]
    UnknownAction {
        tool: String,
        action: String,
        suggestion: Option<String>,
    },

    #[error(
        "{tool}/{action}: Invalid parameters: {}. Valid params: {}",
        .keys.join(", "),
        .allowed.join(", ")
    )]
    ExtraParameters {
        tool: String,
        action: String,
        keys: Vec<String>,
        allowed: Vec<String>,
    },

    #[error("{key} {problem}")]
    MissingRequiredPath { key: String, problem: &'static str },

    #[error("Invalid {key}: {source}")]
    InvalidPath { key: String, source: PathError },

    #[error("Missing required field '{key}'")]
    MissingRequiredField { key: String },

    #[error("'{key}' must be a {expected}")]
    InvalidFieldType { key: String, expected: &'static str },

    #[error("Automation bridge not available for {tool} action: {action}{}", detail_suffix(.detail))]
    BackendUnavailable {
        tool: String,
        action: String,
        detail: Option<String>,
    },

    #[error("{tool}/{action}: automation request timed out after {timeout_ms} ms")]
    BackendTimeout {
        tool: String,
        action: String,
        timeout_ms: u64,
    },

    /// The backend answered with `success: false`; message and code are its own.
    #[error("{message}")]
    Backend {
        message: String,
        code: Option<String>,
    },

    /// Anything the pipeline did not anticipate. Surfaced under the tool family's code.
    #[error("{message}")]
    Unexpected { message: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl ToolError {
    /// Machine-readable code. `None` only for backend errors that carried no code,
    /// and for unexpected failures, whose code comes from the tool family.
    pub fn code(&self) -> Option<&str> {
        match self {
            ToolError::UnknownTool { .. } => Some(codes::UNKNOWN_TOOL),
            ToolError::UnknownAction { .. } => Some(codes::UNKNOWN_ACTION),
            ToolError::ExtraParameters { .. } => Some(codes::EXTRA_PARAMETERS),
            ToolError::MissingRequiredPath { .. } => Some(codes::MISSING_REQUIRED_PATH),
            ToolError::InvalidPath { .. } => Some(codes::INVALID_PATH),
            ToolError::MissingRequiredField { .. } => Some(codes::MISSING_REQUIRED_FIELD),
            ToolError::InvalidFieldType { .. } => Some(codes::INVALID_FIELD_TYPE),
            ToolError::BackendUnavailable { .. } => Some(codes::AUTOMATION_BRIDGE_UNAVAILABLE),
            ToolError::BackendTimeout { .. } => Some(codes::AUTOMATION_TIMEOUT),
            ToolError::Backend { code, .. } => code.as_deref(),
            ToolError::Unexpected { .. } => None,
        }
    }

    /// True for failures detected before anything was sent to the backend.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownTool { .. }
                | ToolError::UnknownAction { .. }
                | ToolError::ExtraParameters { .. }
                | ToolError::MissingRequiredPath { .. }
                | ToolError::InvalidPath { .. }
                | ToolError::MissingRequiredField { .. }
                | ToolError::InvalidFieldType { .. }
        )
    }

    /// Field the error refers to, when there is exactly one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ToolError::MissingRequiredPath { key, .. }
            | ToolError::InvalidPath { key, .. }
            | ToolError::MissingRequiredField { key }
            | ToolError::InvalidFieldType { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Error codes used across the bridge
pub mod codes {
    pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";
    pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
    pub const EXTRA_PARAMETERS: &str = "EXTRA_PARAMETERS";
    pub const MISSING_REQUIRED_PATH: &str = "MISSING_REQUIRED_PATH";
    pub const INVALID_PATH: &str = "INVALID_PATH";
    pub const MISSING_REQUIRED_FIELD: &str = "MISSING_REQUIRED_FIELD";
    pub const INVALID_FIELD_TYPE: &str = "INVALID_FIELD_TYPE";
    pub const AUTOMATION_BRIDGE_UNAVAILABLE: &str = "AUTOMATION_BRIDGE_UNAVAILABLE";
    pub const AUTOMATION_TIMEOUT: &str = "AUTOMATION_TIMEOUT";
    pub const AUTOMATION_HTTP_ERROR: &str = "AUTOMATION_HTTP_ERROR";
}
