//! Data-driven tool catalog.
//!
//! Every tool family and its actions are plain records loaded from one JSON
//! document. The normalization, validation and dispatch code never branches on
//! a particular action name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::args::{FieldKind, FieldSpec};

/// Argument key that selects the action within a tool.
pub const ACTION_KEY: &str = "action";
/// Per-call dispatch timeout override, in milliseconds.
pub const TIMEOUT_OVERRIDE_KEY: &str = "timeoutMs";

const BUILTIN_CATALOG: &str = include_str!("../catalog/tools.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tool '{tool}' is declared more than once")]
    DuplicateTool { tool: String },
    #[error("tool '{tool}' declares no actions")]
    EmptyTool { tool: String },
    #[error("tool '{tool}' declares action '{action}' more than once")]
    DuplicateAction { tool: String, action: String },
    #[error("{tool}/{action}: field '{key}' is declared more than once")]
    DuplicateField {
        tool: String,
        action: String,
        key: String,
    },
    #[error("{tool}/{action}: alias '{alias}' collides with another key or alias")]
    AliasCollision {
        tool: String,
        action: String,
        alias: String,
    },
    #[error("{tool}/{action}: required field '{key}' must not declare a default")]
    RequiredWithDefault {
        tool: String,
        action: String,
        key: String,
    },
    #[error("{tool}/{action}: required path '{key}' is not a declared path field")]
    UnknownRequiredPath {
        tool: String,
        action: String,
        key: String,
    },
    #[error("{tool}/{action}: '{key}' is a reserved argument key")]
    ReservedKey {
        tool: String,
        action: String,
        key: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Tool name the automation backend knows this family by.
    pub backend_tool: String,
    /// Payload key that carries the action name to the backend.
    #[serde(default = "default_backend_action_key")]
    pub backend_action_key: String,
    /// Code attached to failures nothing else accounts for.
    pub error_code: String,
    pub error_label: String,
    #[serde(default)]
    pub enforce_allow_list: bool,
    #[serde(default)]
    pub accepts_timeout_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    pub actions: Vec<ActionDescriptor>,
}

fn default_backend_action_key() -> String {
    ACTION_KEY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Path fields that must be present and non-empty before anything else runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_paths: Vec<String>,
    /// Dispatch timeout for this action when the caller gives none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut tool_names = HashSet::new();
        for tool in &self.tools {
            if !tool_names.insert(tool.name.as_str()) {
                return Err(CatalogError::DuplicateTool {
                    tool: tool.name.clone(),
                });
            }
            if tool.actions.is_empty() {
                return Err(CatalogError::EmptyTool {
                    tool: tool.name.clone(),
                });
            }
            let mut action_names = HashSet::new();
            for action in &tool.actions {
                if !action_names.insert(action.name.as_str()) {
                    return Err(CatalogError::DuplicateAction {
                        tool: tool.name.clone(),
                        action: action.name.clone(),
                    });
                }
                validate_action(&tool.name, action)?;
            }
        }
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

fn validate_action(tool: &str, action: &ActionDescriptor) -> Result<(), CatalogError> {
    let context = |key: &str| (tool.to_string(), action.name.clone(), key.to_string());

    let mut canonical = HashSet::new();
    for field in &action.fields {
        if field.key == ACTION_KEY || field.key == TIMEOUT_OVERRIDE_KEY {
            let (tool, action, key) = context(&field.key);
            return Err(CatalogError::ReservedKey { tool, action, key });
        }
        if !canonical.insert(field.key.as_str()) {
            let (tool, action, key) = context(&field.key);
            return Err(CatalogError::DuplicateField { tool, action, key });
        }
        if field.required && field.default.is_some() {
            let (tool, action, key) = context(&field.key);
            return Err(CatalogError::RequiredWithDefault { tool, action, key });
        }
    }

    let mut aliases = HashSet::new();
    for alias in action.fields.iter().flat_map(|f| f.aliases.iter()) {
        let reserved = alias == ACTION_KEY || alias == TIMEOUT_OVERRIDE_KEY;
        if reserved || canonical.contains(alias.as_str()) || !aliases.insert(alias.as_str()) {
            let (tool, action, alias) = context(alias);
            return Err(CatalogError::AliasCollision {
                tool,
                action,
                alias,
            });
        }
    }

    for key in &action.required_paths {
        if !action.fields.iter().any(|f| &f.key == key && f.path) {
            let (tool, action, key) = context(key);
            return Err(CatalogError::UnknownRequiredPath { tool, action, key });
        }
    }
    Ok(())
}

impl ToolDescriptor {
    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|action| action.name.as_str())
    }

    /// Closest declared action name, if one is near enough to be a typo.
    pub fn closest_action(&self, requested: &str) -> Option<&str> {
        let limit = (requested.chars().count() / 3).max(2);
        self.action_names()
            .map(|name| (name, strsim::levenshtein(requested, name)))
            .filter(|(_, distance)| *distance <= limit)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name)
    }

    /// Every key an action accepts: the selector, each field key and alias, and
    /// the timeout override where the family supports it.
    pub fn allowed_keys(&self, action: &ActionDescriptor) -> Vec<String> {
        let mut keys = vec![ACTION_KEY.to_string()];
        for field in &action.fields {
            keys.extend(field.candidate_keys().map(str::to_string));
        }
        if self.accepts_timeout_override {
            keys.push(TIMEOUT_OVERRIDE_KEY.to_string());
        }
        keys
    }

    /// JSON Schema for the whole tool: an `action` enum plus the union of all
    /// action fields.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            ACTION_KEY.to_string(),
            json!({
                "type": "string",
                "enum": self.action_names().collect::<Vec<_>>(),
                "description": "Action to perform",
            }),
        );
        for field in self.actions.iter().flat_map(|a| a.fields.iter()) {
            insert_field_properties(&mut properties, field);
        }
        if self.accepts_timeout_override {
            properties.insert(TIMEOUT_OVERRIDE_KEY.to_string(), timeout_override_schema());
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": [ACTION_KEY],
        })
    }
}

impl ActionDescriptor {
    /// JSON Schema for this action alone.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            ACTION_KEY.to_string(),
            json!({ "type": "string", "const": self.name }),
        );
        for field in &self.fields {
            insert_field_properties(&mut properties, field);
        }
        let mut required = vec![ACTION_KEY.to_string()];
        required.extend(
            self.fields
                .iter()
                .filter(|f| f.required && f.aliases.is_empty())
                .map(|f| f.key.clone()),
        );
        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if let (Some(description), Some(obj)) = (&self.description, schema.as_object_mut()) {
            obj.insert("description".to_string(), json!(description));
        }
        schema
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

fn insert_field_properties(properties: &mut Map<String, Value>, field: &FieldSpec) {
    properties
        .entry(field.key.clone())
        .or_insert_with(|| field_schema(field, field.description.clone()));
    for alias in &field.aliases {
        properties
            .entry(alias.clone())
            .or_insert_with(|| field_schema(field, Some(format!("Alias for '{}'.", field.key))));
    }
}

fn field_schema(field: &FieldSpec, description: Option<String>) -> Value {
    let mut schema = Map::new();
    if field.kind != FieldKind::Any {
        schema.insert("type".to_string(), json!(field.kind.as_str()));
    }
    if let Some(description) = description {
        schema.insert("description".to_string(), json!(description));
    }
    if !field.enum_values.is_empty() {
        schema.insert("enum".to_string(), json!(field.enum_values));
    }
    if let Some(default) = &field.default {
        schema.insert("default".to_string(), default.clone());
    }
    Value::Object(schema)
}

fn timeout_override_schema() -> Value {
    json!({
        "type": "number",
        "description": "Override the automation request timeout for this call (milliseconds).",
    })
}
