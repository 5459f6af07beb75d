//! Checks that run on the raw argument bag before normalization.

use serde_json::{Map, Value};

use crate::catalog::{ActionDescriptor, ToolDescriptor};
use crate::error::ToolError;
use crate::paths::sanitize_path;

/// Reject any key the action does not declare.
pub fn check_allowed(
    tool: &ToolDescriptor,
    action: &ActionDescriptor,
    raw: &Map<String, Value>,
) -> Result<(), ToolError> {
    let allowed = tool.allowed_keys(action);
    let extra: Vec<String> = raw
        .keys()
        .filter(|key| !allowed.iter().any(|a| a == *key))
        .cloned()
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    Err(ToolError::ExtraParameters {
        tool: tool.name.clone(),
        action: action.name.clone(),
        keys: extra,
        allowed,
    })
}

/// Every declared required path must be present, a string, and non-empty.
pub fn check_required_paths(
    action: &ActionDescriptor,
    raw: &Map<String, Value>,
) -> Result<(), ToolError> {
    for key in &action.required_paths {
        let value = action
            .field(key)
            .into_iter()
            .flat_map(|spec| spec.candidate_keys())
            .find_map(|candidate| raw.get(candidate).filter(|v| !v.is_null()));
        let problem = match value {
            None => Some("is required and must be provided"),
            Some(Value::String(s)) if s.trim().is_empty() => Some("must be a non-empty string"),
            Some(Value::String(_)) => None,
            Some(_) => Some("must be a string"),
        };
        if let Some(problem) = problem {
            return Err(ToolError::MissingRequiredPath {
                key: key.clone(),
                problem,
            });
        }
    }
    Ok(())
}

/// Sanitize every string supplied for a path field, under its canonical key or
/// any alias. Blank strings are dropped so defaults can apply; non-string
/// values are left for kind conformance to deal with.
pub fn sanitize_path_fields(
    action: &ActionDescriptor,
    raw: &Map<String, Value>,
) -> Result<Map<String, Value>, ToolError> {
    let mut out = raw.clone();
    for spec in action.fields.iter().filter(|spec| spec.path) {
        for candidate in spec.candidate_keys() {
            let Some(Value::String(value)) = raw.get(candidate) else {
                continue;
            };
            if value.trim().is_empty() {
                out.remove(candidate);
                continue;
            }
            let clean = sanitize_path(value).map_err(|source| ToolError::InvalidPath {
                key: spec.key.clone(),
                source,
            })?;
            out.insert(candidate.to_string(), Value::String(clean));
        }
    }
    Ok(out)
}
