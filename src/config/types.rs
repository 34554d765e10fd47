//! Raw entity-descriptor types matching the JSON config schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Declarative attribute type. Closed set; unknown strings fail at load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Email,
    Url,
    Json,
}

impl AttributeType {
    /// SQLite storage type for DDL generation.
    pub fn sqlite_type(self) -> &'static str {
        match self {
            AttributeType::Integer | AttributeType::Boolean => "INTEGER",
            AttributeType::Number => "REAL",
            _ => "TEXT",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    #[serde(rename = "type")]
    pub type_: Option<AttributeType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// Max character length for string/text.
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default, rename = "enum")]
    pub enum_: Option<Vec<Value>>,
    /// Regex a string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub indexed: bool,
}

impl AttributeSpec {
    pub fn attr_type(&self) -> AttributeType {
        self.type_.unwrap_or(AttributeType::String)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSpec {
    #[serde(rename = "type")]
    pub type_: RelationKind,
    /// Target entity name (not table name).
    pub target: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Pivot table for manyToMany.
    #[serde(default)]
    pub through: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSpec {
    /// Always "custom" in current configs; kept for forward compatibility.
    #[serde(default)]
    pub action: Option<String>,
    /// Declared parameters, validated like attributes.
    #[serde(default)]
    pub parameters: HashMap<String, AttributeSpec>,
    #[serde(default)]
    pub validation: Option<ValidationBlock>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationBlock {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Unique,
    Exists,
    Custom,
}

/// Declarative cross-record rule, run against the live database after
/// structural validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    #[serde(rename = "type")]
    pub type_: RuleKind,
    #[serde(default)]
    pub field: Option<String>,
    /// Target entity for `exists`; defaults to the entity named by the field
    /// (e.g. `organizationId` -> organization).
    #[serde(default)]
    pub target: Option<String>,
    /// Registry name for `custom`.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Role lists per operation. An absent list means any authenticated user.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsConfig {
    #[serde(default)]
    pub create: Option<Vec<String>>,
    #[serde(default)]
    pub read: Option<Vec<String>>,
    #[serde(default)]
    pub update: Option<Vec<String>>,
    #[serde(default)]
    pub delete: Option<Vec<String>>,
    #[serde(default)]
    pub methods: Option<Vec<String>>,
}

/// Rendering hints for the SPA. Only `searchFields` affects the backend
/// (list search); the rest is passed through untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    #[serde(default)]
    pub search_fields: Option<Vec<String>>,
    #[serde(default)]
    pub list_fields: Option<Vec<String>>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeSpec>,
    #[serde(default)]
    pub relationships: HashMap<String, RelationSpec>,
    #[serde(default)]
    pub methods: HashMap<String, MethodSpec>,
    #[serde(default)]
    pub validation: Option<ValidationBlock>,
    #[serde(default)]
    pub permissions: Option<PermissionsConfig>,
    #[serde(default)]
    pub ui: Option<UiConfig>,
}

impl EntityConfig {
    /// Table (and route path) name: deterministically `lowercase(name) + "s"`.
    pub fn table_name(&self) -> String {
        table_name_for(&self.name)
    }
}

pub fn table_name_for(entity_name: &str) -> String {
    let mut t = entity_name.to_lowercase();
    t.push('s');
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_entity() {
        let cfg: EntityConfig = serde_json::from_str(
            r#"{
                "name": "order",
                "attributes": {
                    "status": {"type": "string", "enum": ["pending", "shipped"], "default": "pending"},
                    "total": {"type": "number", "required": true, "min": 0}
                },
                "relationships": {
                    "organization": {"type": "manyToOne", "target": "organization", "foreignKey": "organizationId"}
                },
                "methods": {
                    "ship": {"action": "custom", "parameters": {"carrier": {"type": "string"}}}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.table_name(), "orders");
        assert_eq!(cfg.attributes["total"].attr_type(), AttributeType::Number);
        assert!(cfg.attributes["total"].required);
        assert_eq!(cfg.relationships["organization"].type_, RelationKind::ManyToOne);
        assert!(cfg.methods["ship"].parameters.contains_key("carrier"));
    }

    #[test]
    fn unknown_attribute_type_is_rejected() {
        let res: Result<EntityConfig, _> = serde_json::from_str(
            r#"{"name": "x", "attributes": {"a": {"type": "blob"}}}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn table_name_is_lowercased_plural() {
        assert_eq!(table_name_for("Organization"), "organizations");
        assert_eq!(table_name_for("order"), "orders");
    }
}
