use serde_json::{Map, Value};

use crate::args::{conform, normalize};
use crate::catalog::{ACTION_KEY, ActionDescriptor, Catalog, TIMEOUT_OVERRIDE_KEY, ToolDescriptor};
use crate::error::ToolError;
use crate::validation::{check_allowed, check_required_paths, sanitize_path_fields};

/// A validated invocation, ready to be dispatched exactly once.
#[derive(Debug, Clone)]
pub struct PreparedAction<'a> {
    pub tool: &'a ToolDescriptor,
    pub action: &'a ActionDescriptor,
    /// Canonical parameter map: declared keys only, aliases resolved, defaults filled.
    pub params: Map<String, Value>,
    pub timeout_override_ms: Option<u64>,
}

impl PreparedAction<'_> {
    /// Request body for the automation backend.
    pub fn payload(&self) -> Value {
        let mut payload = Map::with_capacity(self.params.len() + 1);
        payload.insert(
            self.tool.backend_action_key.clone(),
            Value::String(self.action.name.clone()),
        );
        for (key, value) in &self.params {
            payload.insert(key.clone(), value.clone());
        }
        Value::Object(payload)
    }

    /// Caller override first, then the action's own budget.
    pub fn timeout_ms(&self, default_ms: u64) -> u64 {
        self.timeout_override_ms
            .or(self.action.timeout_ms)
            .unwrap_or(default_ms)
    }
}

/// Run every synchronous step of an invocation, in order: action lookup,
/// allow-list, required paths, path sanitation, normalization, kind
/// conformance. The first failure wins and nothing after it runs.
pub fn prepare<'a>(
    catalog: &'a Catalog,
    tool_name: &str,
    args: &Map<String, Value>,
) -> Result<PreparedAction<'a>, ToolError> {
    let tool = catalog.tool(tool_name).ok_or_else(|| ToolError::UnknownTool {
        tool: tool_name.to_string(),
    })?;
    let action = resolve_action(tool, args)?;

    if tool.enforce_allow_list {
        check_allowed(tool, action, args)?;
    }
    check_required_paths(action, args)?;
    let sanitized = sanitize_path_fields(action, args)?;
    let params = normalize(&sanitized, &action.fields)?;
    let params = conform(params, &action.fields)?;

    let timeout_override_ms = if tool.accepts_timeout_override {
        timeout_override(args)
    } else {
        None
    };

    Ok(PreparedAction {
        tool,
        action,
        params,
        timeout_override_ms,
    })
}

/// The action name a caller asked for, if it is a non-empty string.
pub fn requested_action(args: &Map<String, Value>) -> Option<&str> {
    args.get(ACTION_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn resolve_action<'a>(
    tool: &'a ToolDescriptor,
    args: &Map<String, Value>,
) -> Result<&'a ActionDescriptor, ToolError> {
    match args.get(ACTION_KEY) {
        None | Some(Value::Null) => {
            return Err(ToolError::MissingRequiredField {
                key: ACTION_KEY.to_string(),
            });
        }
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err(ToolError::InvalidFieldType {
                key: ACTION_KEY.to_string(),
                expected: "string",
            });
        }
    }
    let name = requested_action(args).ok_or_else(|| ToolError::MissingRequiredField {
        key: ACTION_KEY.to_string(),
    })?;
    tool.action(name).ok_or_else(|| ToolError::UnknownAction {
        tool: tool.name.clone(),
        action: name.to_string(),
        suggestion: tool.closest_action(name).map(str::to_string),
    })
}

/// Positive finite numbers only, rounded to whole milliseconds.
fn timeout_override(args: &Map<String, Value>) -> Option<u64> {
    args.get(TIMEOUT_OVERRIDE_KEY)
        .and_then(Value::as_f64)
        .filter(|ms| ms.is_finite() && *ms >= 1.0)
        .map(|ms| ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_input_action_builds_canonical_payload() {
        let catalog = Catalog::builtin().unwrap();
        let prepared = prepare(
            &catalog,
            "manage_input",
            &obj(json!({"action": "create_input_action", "name": "Jump", "path": "/Game/Input"})),
        )
        .unwrap();
        assert_eq!(
            Value::Object(prepared.params.clone()),
            json!({"name": "Jump", "path": "/Game/Input"})
        );
        assert_eq!(
            prepared.payload(),
            json!({"action": "create_input_action", "name": "Jump", "path": "/Game/Input"})
        );
        assert_eq!(prepared.timeout_ms(120_000), 120_000);
    }

    #[test]
    fn add_mapping_without_action_path_fails_before_normalization() {
        let catalog = Catalog::builtin().unwrap();
        let err = prepare(
            &catalog,
            "manage_input",
            &obj(json!({"action": "add_mapping", "contextPath": "/Game/Input/IMC_Default"})),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(codes::MISSING_REQUIRED_PATH));
        assert!(err.to_string().starts_with("actionPath is required"));
    }

    #[test]
    fn extra_key_is_rejected_for_allow_listed_family_only() {
        let catalog = Catalog::builtin().unwrap();
        let err = prepare(
            &catalog,
            "manage_input",
            &obj(json!({"action": "create_input_action", "name": "Jump", "path": "/Game/Input", "foo": 1})),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::ExtraParameters { ref keys, .. } if keys == &["foo"]));

        let prepared = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({"action": "get_animation_info", "assetPath": "/Game/Anims/Walk", "foo": 1})),
        )
        .unwrap();
        assert!(!prepared.params.contains_key("foo"));
    }

    #[test]
    fn unknown_action_carries_suggestion() {
        let catalog = Catalog::builtin().unwrap();
        let err = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({"action": "create_montag", "name": "Attack"})),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(codes::UNKNOWN_ACTION));
        assert!(matches!(
            err,
            ToolError::UnknownAction { ref suggestion, .. } if suggestion.as_deref() == Some("create_montage")
        ));
    }

    #[test]
    fn missing_or_non_string_selector_is_rejected() {
        let catalog = Catalog::builtin().unwrap();
        let missing = prepare(&catalog, "manage_input", &obj(json!({"name": "Jump"}))).unwrap_err();
        assert_eq!(missing.code(), Some(codes::MISSING_REQUIRED_FIELD));
        let blank = prepare(&catalog, "manage_input", &obj(json!({"action": " "}))).unwrap_err();
        assert_eq!(blank.code(), Some(codes::MISSING_REQUIRED_FIELD));
        let numeric = prepare(&catalog, "manage_input", &obj(json!({"action": 4}))).unwrap_err();
        assert_eq!(numeric.code(), Some(codes::INVALID_FIELD_TYPE));
        let tool = prepare(&catalog, "manage_weather", &obj(json!({"action": "x"}))).unwrap_err();
        assert_eq!(tool.code(), Some(codes::UNKNOWN_TOOL));
    }

    #[test]
    fn animation_alias_and_defaults_resolve_to_same_payload() {
        let catalog = Catalog::builtin().unwrap();
        let via_alias = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({
                "action": "create_animation_sequence",
                "name": "Run",
                "directory": "/Game/Anims",
                "skeletonPath": "/Game/Characters/SK_Hero",
            })),
        )
        .unwrap();
        let via_key = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({
                "action": "create_animation_sequence",
                "name": "Run",
                "path": "/Game/Anims",
                "skeletonPath": "/Game/Characters/SK_Hero",
            })),
        )
        .unwrap();
        assert_eq!(via_alias.params, via_key.params);
        assert_eq!(
            via_alias.payload(),
            json!({
                "subAction": "create_animation_sequence",
                "name": "Run",
                "path": "/Game/Anims",
                "skeletonPath": "/Game/Characters/SK_Hero",
                "numFrames": 30,
                "frameRate": 30,
                "save": true,
            })
        );
    }

    #[test]
    fn blank_optional_path_falls_back_to_default() {
        let catalog = Catalog::builtin().unwrap();
        let prepared = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({
                "action": "create_aim_offset",
                "name": "AO_Rifle",
                "path": "",
                "skeletonPath": "/Game/Characters/SK_Hero",
            })),
        )
        .unwrap();
        assert_eq!(prepared.params["path"], "/Game/Animations");
    }

    #[test]
    fn missing_required_animation_field_is_reported() {
        let catalog = Catalog::builtin().unwrap();
        let err = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({"action": "add_bone_track", "assetPath": "/Game/Anims/Walk"})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ToolError::MissingRequiredField {
                key: "boneName".to_string()
            }
        );
    }

    #[test]
    fn timeout_override_is_extracted_but_never_forwarded() {
        let catalog = Catalog::builtin().unwrap();
        let prepared = prepare(
            &catalog,
            "manage_input",
            &obj(json!({"action": "get_input_info", "assetPath": "/Game/IA_Jump", "timeoutMs": 2500.4})),
        )
        .unwrap();
        assert_eq!(prepared.timeout_override_ms, Some(2500));
        assert_eq!(prepared.timeout_ms(120_000), 2500);
        assert!(prepared.payload().get("timeoutMs").is_none());

        let ignored = prepare(
            &catalog,
            "manage_input",
            &obj(json!({"action": "get_input_info", "assetPath": "/Game/IA_Jump", "timeoutMs": -1})),
        )
        .unwrap();
        assert_eq!(ignored.timeout_override_ms, None);
    }

    #[test]
    fn action_timeout_applies_when_caller_gives_none() {
        let catalog = Catalog::builtin().unwrap();
        let prepared = prepare(
            &catalog,
            "manage_animation_authoring",
            &obj(json!({
                "action": "create_montage",
                "name": "Attack",
                "skeletonPath": "/Game/Characters/SK_Hero",
            })),
        )
        .unwrap();
        assert_eq!(prepared.timeout_ms(30_000), 120_000);
    }
}
