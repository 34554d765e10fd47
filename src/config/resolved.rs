//! Resolved entity model: configs validated and flattened for runtime use.

use crate::config::types::{
    table_name_for, AttributeSpec, AttributeType, EntityConfig, MethodSpec, PermissionsConfig,
    RelationKind, RuleSpec,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Columns managed by the service layer, never by the caller.
pub const AUTO_COLUMNS: [&str; 3] = ["id", "createdAt", "updatedAt"];

pub fn is_auto_column(name: &str) -> bool {
    AUTO_COLUMNS.contains(&name)
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: AttributeType,
    pub required: bool,
    pub unique: bool,
    pub has_default: bool,
    pub indexed: bool,
}

/// A relationship with its foreign keys resolved to concrete column names.
#[derive(Clone, Debug)]
pub struct ResolvedRelation {
    pub name: String,
    pub kind: RelationKind,
    pub target_entity: String,
    pub target_table: String,
    /// For manyToOne/oneToOne: FK column on this entity. For oneToMany: FK
    /// column on the target. For manyToMany: this entity's key column in the
    /// pivot table.
    pub foreign_key: String,
    /// Pivot table (manyToMany only); `pivot_target_key` is the target's key
    /// column in it.
    pub through: Option<String>,
    pub pivot_target_key: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Method,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub display_name: String,
    pub table_name: String,
    /// Route path segment; equal to the table name.
    pub path_segment: String,
    /// Caller-declared attributes, keyed by name (drives validation).
    pub attributes: HashMap<String, AttributeSpec>,
    /// Full column list for SQL: id, declared attributes, implicit FK
    /// columns, createdAt/updatedAt.
    pub columns: Vec<ColumnInfo>,
    pub search_fields: Vec<String>,
    pub relations: Vec<ResolvedRelation>,
    pub methods: HashMap<String, MethodSpec>,
    pub rules: Vec<RuleSpec>,
    pub permissions: PermissionsConfig,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Role check for one operation. An absent role list admits any
    /// authenticated user; `admin` always passes.
    pub fn role_allowed(&self, op: Operation, role: &str) -> bool {
        if role == "admin" {
            return true;
        }
        let list = match op {
            Operation::Create => &self.permissions.create,
            Operation::Read => &self.permissions.read,
            Operation::Update => &self.permissions.update,
            Operation::Delete => &self.permissions.delete,
            Operation::Method => &self.permissions.methods,
        };
        match list {
            Some(roles) => roles.iter().any(|r| r == role),
            None => true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<Arc<ResolvedEntity>>,
    by_path: HashMap<String, Arc<ResolvedEntity>>,
    by_name: HashMap<String, Arc<ResolvedEntity>>,
}

impl ResolvedModel {
    pub fn new(entities: Vec<ResolvedEntity>) -> Self {
        let entities: Vec<Arc<ResolvedEntity>> = entities.into_iter().map(Arc::new).collect();
        let by_path = entities
            .iter()
            .map(|e| (e.path_segment.clone(), Arc::clone(e)))
            .collect();
        let by_name = entities
            .iter()
            .map(|e| (e.name.clone(), Arc::clone(e)))
            .collect();
        ResolvedModel {
            entities,
            by_path,
            by_name,
        }
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&Arc<ResolvedEntity>> {
        self.by_path.get(path)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Arc<ResolvedEntity>> {
        self.by_name.get(name)
    }
}

/// Flatten one validated config into its runtime form.
pub fn resolve_entity(config: &EntityConfig) -> ResolvedEntity {
    let table_name = config.table_name();

    let mut columns = vec![ColumnInfo {
        name: "id".into(),
        ty: AttributeType::Integer,
        required: false,
        unique: true,
        has_default: true,
        indexed: false,
    }];
    // Deterministic column order: declared attributes sorted by name.
    let mut attr_names: Vec<&String> = config.attributes.keys().collect();
    attr_names.sort();
    for name in &attr_names {
        let spec = &config.attributes[*name];
        columns.push(ColumnInfo {
            name: (*name).clone(),
            ty: spec.attr_type(),
            required: spec.required,
            unique: spec.unique,
            has_default: spec.default.is_some(),
            indexed: spec.indexed,
        });
    }

    let mut relations = Vec::new();
    let mut rel_names: Vec<&String> = config.relationships.keys().collect();
    rel_names.sort();
    for name in rel_names {
        let spec = &config.relationships[name];
        let target_table = table_name_for(&spec.target);
        let (foreign_key, pivot_target_key) = match spec.type_ {
            RelationKind::ManyToOne | RelationKind::OneToOne => (
                spec.foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}Id", spec.target)),
                String::new(),
            ),
            RelationKind::OneToMany => (
                spec.foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}Id", config.name)),
                String::new(),
            ),
            RelationKind::ManyToMany => (
                spec.foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}Id", config.name)),
                format!("{}Id", spec.target),
            ),
        };
        // Owning-side FKs live on this table; add the column when the config
        // does not declare it explicitly.
        if matches!(spec.type_, RelationKind::ManyToOne | RelationKind::OneToOne)
            && !columns.iter().any(|c| c.name == foreign_key)
        {
            columns.push(ColumnInfo {
                name: foreign_key.clone(),
                ty: AttributeType::Integer,
                required: false,
                unique: false,
                has_default: false,
                indexed: true,
            });
        }
        relations.push(ResolvedRelation {
            name: name.clone(),
            kind: spec.type_,
            target_entity: spec.target.clone(),
            target_table,
            foreign_key,
            through: spec.through.clone(),
            pivot_target_key,
        });
    }

    for name in ["createdAt", "updatedAt"] {
        if !columns.iter().any(|c| c.name == name) {
            columns.push(ColumnInfo {
                name: name.into(),
                ty: AttributeType::Datetime,
                required: true,
                unique: false,
                has_default: false,
                indexed: false,
            });
        }
    }

    let search_fields = match config.ui.as_ref().and_then(|u| u.search_fields.clone()) {
        Some(fields) => fields
            .into_iter()
            .filter(|f| columns.iter().any(|c| c.name == *f))
            .collect(),
        None => {
            let mut fields: Vec<String> = config
                .attributes
                .iter()
                .filter(|(_, s)| {
                    matches!(
                        s.attr_type(),
                        AttributeType::String | AttributeType::Text | AttributeType::Email
                    )
                })
                .map(|(n, _)| n.clone())
                .collect();
            fields.sort();
            fields
        }
    };

    ResolvedEntity {
        display_name: config
            .display_name
            .clone()
            .unwrap_or_else(|| config.name.clone()),
        path_segment: table_name.clone(),
        table_name,
        name: config.name.clone(),
        attributes: config.attributes.clone(),
        columns,
        search_fields,
        relations,
        methods: config.methods.clone(),
        rules: config
            .validation
            .as_ref()
            .map(|v| v.rules.clone())
            .unwrap_or_default(),
        permissions: config.permissions.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_config() -> EntityConfig {
        serde_json::from_str(
            r#"{
                "name": "order",
                "attributes": {
                    "number": {"type": "string", "required": true, "unique": true},
                    "total": {"type": "number"}
                },
                "relationships": {
                    "organization": {"type": "manyToOne", "target": "organization"},
                    "items": {"type": "oneToMany", "target": "item"}
                },
                "permissions": {"delete": ["admin"]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn injects_fk_and_timestamp_columns() {
        let entity = resolve_entity(&order_config());
        assert!(entity.has_column("organizationId"));
        assert!(entity.has_column("createdAt"));
        assert!(entity.has_column("updatedAt"));
        assert_eq!(entity.table_name, "orders");
    }

    #[test]
    fn fk_defaults_follow_relation_direction() {
        let entity = resolve_entity(&order_config());
        let org = entity.relations.iter().find(|r| r.name == "organization").unwrap();
        assert_eq!(org.foreign_key, "organizationId");
        let items = entity.relations.iter().find(|r| r.name == "items").unwrap();
        assert_eq!(items.foreign_key, "orderId");
        assert_eq!(items.target_table, "items");
    }

    #[test]
    fn permissions_admit_admin_everywhere() {
        let entity = resolve_entity(&order_config());
        assert!(entity.role_allowed(Operation::Delete, "admin"));
        assert!(!entity.role_allowed(Operation::Delete, "user"));
        assert!(entity.role_allowed(Operation::Create, "user"));
    }

    #[test]
    fn search_fields_default_to_text_like_attributes() {
        let entity = resolve_entity(&order_config());
        assert_eq!(entity.search_fields, vec!["number".to_string()]);
    }
}
