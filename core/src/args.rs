//! Argument normalization and typed extraction.
//!
//! `normalize` decides presence: canonical key, then aliases in order, then the
//! declared default. `conform` and the `extract_*` helpers decide kind: a value
//! of the wrong kind is never coerced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }

    /// Whether `params[key]` holds a value of this kind, as the typed
    /// extractors read it.
    pub fn extracts(self, params: &Map<String, Value>, key: &str) -> bool {
        match self {
            FieldKind::String => extract_optional_string(params, key).is_some(),
            FieldKind::Number => extract_optional_number(params, key).is_some(),
            FieldKind::Boolean => extract_optional_boolean(params, key).is_some(),
            FieldKind::Array => extract_optional_array(params, key).is_some(),
            FieldKind::Object => extract_optional_object(params, key).is_some(),
            FieldKind::Any => params.get(key).is_some_and(|v| !v.is_null()),
        }
    }
}

/// One accepted input field of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub key: String,
    /// Checked in order, after the canonical key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Substituted when a value is present but of the wrong kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
    #[serde(default)]
    pub kind: FieldKind,
    /// The value is an asset or filesystem path and gets sanitized.
    #[serde(default)]
    pub path: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl FieldSpec {
    pub fn optional(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            aliases: Vec::new(),
            required: false,
            default: None,
            fallback: None,
            kind: FieldKind::Any,
            path: false,
            description: None,
            enum_values: Vec::new(),
        }
    }

    pub fn required(key: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::optional(key)
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback = Some(value);
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn path(mut self) -> Self {
        self.path = true;
        self.kind = FieldKind::String;
        self
    }

    /// Canonical key followed by aliases, in lookup order.
    pub fn candidate_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Resolve raw caller input into the canonical parameter map.
///
/// Only declared fields end up in the result; optional fields without a value
/// or default are left out entirely.
pub fn normalize(raw: &Map<String, Value>, specs: &[FieldSpec]) -> Result<Map<String, Value>, ToolError> {
    let mut out = Map::with_capacity(specs.len());
    for spec in specs {
        let found = spec
            .candidate_keys()
            .find_map(|key| raw.get(key).filter(|v| !v.is_null()));
        let value = match (found, &spec.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) if spec.required => {
                return Err(ToolError::MissingRequiredField {
                    key: spec.key.clone(),
                });
            }
            (None, None) => continue,
        };
        out.insert(spec.key.clone(), value);
    }
    Ok(out)
}

/// Apply kind rules to a normalized map.
///
/// A required field of the wrong kind fails unless it declares a fallback.
/// Any other wrong-kind value is treated as absent: its fallback, then its
/// default, is used if declared, otherwise the entry is dropped.
pub fn conform(mut params: Map<String, Value>, specs: &[FieldSpec]) -> Result<Map<String, Value>, ToolError> {
    for spec in specs {
        if !params.contains_key(&spec.key) || spec.kind.extracts(&params, &spec.key) {
            continue;
        }
        if spec.required && spec.fallback.is_none() {
            if spec.kind == FieldKind::String {
                extract_string(&params, &spec.key)?;
            }
            return Err(ToolError::InvalidFieldType {
                key: spec.key.clone(),
                expected: spec.kind.as_str(),
            });
        }
        match spec.fallback.as_ref().or(spec.default.as_ref()) {
            Some(replacement) => {
                params.insert(spec.key.clone(), replacement.clone());
            }
            None => {
                params.remove(&spec.key);
            }
        }
    }
    Ok(params)
}

pub fn extract_string(params: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(ToolError::MissingRequiredField {
            key: key.to_string(),
        }),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(ToolError::InvalidFieldType {
            key: key.to_string(),
            expected: FieldKind::String.as_str(),
        }),
    }
}

pub fn extract_optional_string<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn extract_optional_number(params: &Map<String, Value>, key: &str) -> Option<f64> {
    params
        .get(key)
        .filter(|v| v.is_number())
        .and_then(Value::as_f64)
}

pub fn extract_optional_boolean(params: &Map<String, Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

pub fn extract_optional_array<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    params.get(key).and_then(Value::as_array)
}

pub fn extract_optional_object<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Option<&'a Map<String, Value>> {
    params.get(key).and_then(Value::as_object)
}

/// Fill `{key}` placeholders from the canonical map. Unknown placeholders are
/// left as written.
pub fn render_template(template: &str, params: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match placeholder_text(params, key) {
            Some(text) => out.push_str(&text),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn placeholder_text(params: &Map<String, Value>, key: &str) -> Option<String> {
    if let Some(text) = extract_optional_string(params, key) {
        return Some(text.to_string());
    }
    if let Some(flag) = extract_optional_boolean(params, key) {
        return Some(flag.to_string());
    }
    params
        .get(key)
        .filter(|v| v.is_number())
        .map(Value::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn sequence_specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("name").kind(FieldKind::String),
            FieldSpec::optional("path")
                .alias("directory")
                .with_default(json!("/Game/Animations"))
                .path(),
            FieldSpec::optional("numFrames")
                .with_default(json!(30))
                .kind(FieldKind::Number),
            FieldSpec::optional("notifyName").kind(FieldKind::String),
        ]
    }

    #[test]
    fn normalize_prefers_canonical_key_over_alias() {
        let params = normalize(
            &obj(json!({"name": "Run", "path": "/Game/A", "directory": "/Game/B"})),
            &sequence_specs(),
        )
        .unwrap();
        assert_eq!(params["path"], "/Game/A");
    }

    #[test]
    fn normalize_alias_yields_same_map_as_canonical_key() {
        let via_alias = normalize(
            &obj(json!({"name": "Run", "directory": "/Game/Anims"})),
            &sequence_specs(),
        )
        .unwrap();
        let via_key = normalize(
            &obj(json!({"name": "Run", "path": "/Game/Anims"})),
            &sequence_specs(),
        )
        .unwrap();
        assert_eq!(via_alias, via_key);
        assert!(!via_alias.contains_key("directory"));
    }

    #[test]
    fn normalize_skips_null_values_and_tries_next_candidate() {
        let params = normalize(
            &obj(json!({"name": "Run", "path": null, "directory": "/Game/Anims"})),
            &sequence_specs(),
        )
        .unwrap();
        assert_eq!(params["path"], "/Game/Anims");
    }

    #[test]
    fn normalize_fills_defaults_and_omits_absent_optionals() {
        let params = normalize(&obj(json!({"name": "Run"})), &sequence_specs()).unwrap();
        assert_eq!(params["path"], "/Game/Animations");
        assert_eq!(params["numFrames"], 30);
        assert!(!params.contains_key("notifyName"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn normalize_fails_on_missing_required_field() {
        let err = normalize(&obj(json!({"path": "/Game"})), &sequence_specs()).unwrap_err();
        assert_eq!(
            err,
            ToolError::MissingRequiredField {
                key: "name".to_string()
            }
        );
        assert_eq!(err.to_string(), "Missing required field 'name'");
    }

    #[test]
    fn normalize_drops_undeclared_keys() {
        let params = normalize(
            &obj(json!({"name": "Run", "unexpected": true})),
            &sequence_specs(),
        )
        .unwrap();
        assert!(!params.contains_key("unexpected"));
    }

    #[test]
    fn conform_rejects_required_string_of_wrong_kind() {
        let params = normalize(&obj(json!({"name": 42})), &sequence_specs()).unwrap();
        let err = conform(params, &sequence_specs()).unwrap_err();
        assert_eq!(
            err,
            ToolError::InvalidFieldType {
                key: "name".to_string(),
                expected: "string"
            }
        );
    }

    #[test]
    fn conform_rejects_required_number_without_fallback() {
        let specs = vec![FieldSpec::required("count").kind(FieldKind::Number)];
        let params = normalize(&obj(json!({"count": "3"})), &specs).unwrap();
        let err = conform(params, &specs).unwrap_err();
        assert_eq!(
            err,
            ToolError::InvalidFieldType {
                key: "count".to_string(),
                expected: "number"
            }
        );
        assert_eq!(err.to_string(), "'count' must be a number");
    }

    #[test]
    fn conform_keeps_values_of_the_declared_kind() {
        let specs = vec![
            FieldSpec::required("count").kind(FieldKind::Number),
            FieldSpec::optional("tags").kind(FieldKind::Array),
            FieldSpec::optional("extra"),
        ];
        let raw = obj(json!({"count": 3, "tags": ["a"], "extra": {"k": 1}}));
        let params = conform(normalize(&raw, &specs).unwrap(), &specs).unwrap();
        assert_eq!(params, raw);
    }

    #[test]
    fn conform_treats_wrong_kind_optional_as_absent() {
        let specs = vec![
            FieldSpec::optional("numFrames")
                .with_default(json!(30))
                .kind(FieldKind::Number),
            FieldSpec::optional("notifyName").kind(FieldKind::String),
            FieldSpec::required("frame")
                .with_fallback(json!(0))
                .kind(FieldKind::Number),
        ];
        let params = normalize(
            &obj(json!({"numFrames": "45", "notifyName": 7, "frame": "ten"})),
            &specs,
        )
        .unwrap();
        let params = conform(params, &specs).unwrap();
        assert_eq!(params["numFrames"], 30);
        assert_eq!(params["frame"], 0);
        assert!(!params.contains_key("notifyName"));
    }

    #[test]
    fn extractors_never_coerce_between_kinds() {
        let params = obj(json!({"count": "3", "flag": "true", "items": {}, "obj": []}));
        assert_eq!(extract_optional_number(&params, "count"), None);
        assert_eq!(extract_optional_boolean(&params, "flag"), None);
        assert!(extract_optional_array(&params, "items").is_none());
        assert!(extract_optional_object(&params, "obj").is_none());
        assert_eq!(extract_optional_string(&params, "count"), Some("3"));
        assert!(matches!(
            extract_string(&params, "flag"),
            Ok(ref v) if v == "true"
        ));
        assert!(matches!(
            extract_string(&params, "items"),
            Err(ToolError::InvalidFieldType { .. })
        ));
        assert!(matches!(
            extract_string(&params, "missing"),
            Err(ToolError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn render_template_fills_known_placeholders() {
        let params = obj(json!({"name": "Jump", "frame": 12, "from": "Idle"}));
        assert_eq!(
            render_template("Bone key '{name}' set at frame {frame}", &params),
            "Bone key 'Jump' set at frame 12"
        );
        assert_eq!(
            render_template("Linked '{from}' to '{to}'", &params),
            "Linked 'Idle' to '{to}'"
        );
        assert_eq!(render_template("no braces", &params), "no braces");
        assert_eq!(render_template("dangling {name", &params), "dangling {name");
    }
}
