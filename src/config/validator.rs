//! Config validation: referential integrity and descriptor consistency.

use crate::config::types::{EntityConfig, RelationKind, RuleKind};
use crate::config::resolved::is_auto_column;
use crate::error::ConfigError;
use crate::service::validation::is_known_custom_rule;
use std::collections::HashSet;

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(entity: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        entity: entity.to_string(),
        message: message.into(),
    }
}

pub fn validate(configs: &[EntityConfig]) -> Result<(), ConfigError> {
    let entity_names: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();

    let mut path_segments = HashSet::new();
    for config in configs {
        if !is_identifier(&config.name) {
            return Err(invalid(&config.name, "entity name must be an identifier"));
        }
        if !path_segments.insert(config.table_name()) {
            return Err(ConfigError::DuplicatePathSegment(config.table_name()));
        }

        for (name, spec) in &config.attributes {
            if !is_identifier(name) {
                return Err(invalid(&config.name, format!("attribute name '{}' is not an identifier", name)));
            }
            if is_auto_column(name) {
                return Err(invalid(
                    &config.name,
                    format!("attribute '{}' is managed by the service layer", name),
                ));
            }
            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                if min > max {
                    return Err(invalid(&config.name, format!("attribute '{}': min > max", name)));
                }
            }
            if spec.length == Some(0) {
                return Err(invalid(&config.name, format!("attribute '{}': length must be positive", name)));
            }
            if let (Some(default), Some(allowed)) = (&spec.default, &spec.enum_) {
                if !allowed.contains(default) {
                    return Err(invalid(
                        &config.name,
                        format!("attribute '{}': default not in enum", name),
                    ));
                }
            }
            if let Some(pattern) = &spec.pattern {
                if regex::Regex::new(pattern).is_err() {
                    return Err(invalid(
                        &config.name,
                        format!("attribute '{}': invalid pattern", name),
                    ));
                }
            }
        }

        for (name, rel) in &config.relationships {
            if !entity_names.contains(rel.target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "relationship target",
                    id: format!("{}.{} -> {}", config.name, name, rel.target),
                });
            }
            match rel.type_ {
                RelationKind::ManyToMany => {
                    if rel.through.is_none() {
                        return Err(invalid(
                            &config.name,
                            format!("relationship '{}': manyToMany requires 'through'", name),
                        ));
                    }
                }
                _ => {
                    if rel.through.is_some() {
                        return Err(invalid(
                            &config.name,
                            format!("relationship '{}': 'through' is only valid for manyToMany", name),
                        ));
                    }
                }
            }
            if let Some(fk) = &rel.foreign_key {
                if !is_identifier(fk) {
                    return Err(invalid(&config.name, format!("relationship '{}': bad foreignKey", name)));
                }
            }
        }

        let method_rule_blocks = config
            .methods
            .values()
            .filter_map(|m| m.validation.as_ref());
        let rules = config
            .validation
            .iter()
            .chain(method_rule_blocks)
            .flat_map(|block| block.rules.iter());
        for rule in rules {
            match rule.type_ {
                RuleKind::Unique | RuleKind::Exists => {
                    let field = rule.field.as_deref().unwrap_or_default();
                    if !is_identifier(field) {
                        return Err(invalid(&config.name, "unique/exists rule requires a valid 'field'"));
                    }
                    if let Some(target) = &rule.target {
                        if !entity_names.contains(target.as_str()) {
                            return Err(ConfigError::MissingReference {
                                kind: "rule target",
                                id: format!("{} -> {}", config.name, target),
                            });
                        }
                    }
                }
                RuleKind::Custom => {
                    let function = rule.function.as_deref().unwrap_or_default();
                    if !is_known_custom_rule(function) {
                        return Err(invalid(
                            &config.name,
                            format!("unknown custom rule function '{}'", function),
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> EntityConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn rejects_unknown_relationship_target() {
        let configs = vec![parse(
            r#"{"name": "order", "relationships": {"org": {"type": "manyToOne", "target": "organization"}}}"#,
        )];
        assert!(matches!(
            validate(&configs),
            Err(ConfigError::MissingReference { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_path_segments() {
        let configs = vec![parse(r#"{"name": "Order"}"#), parse(r#"{"name": "order"}"#)];
        assert!(matches!(
            validate(&configs),
            Err(ConfigError::DuplicatePathSegment(_))
        ));
    }

    #[test]
    fn rejects_reserved_attribute_names() {
        let configs = vec![parse(
            r#"{"name": "order", "attributes": {"createdAt": {"type": "datetime"}}}"#,
        )];
        assert!(validate(&configs).is_err());
    }

    #[test]
    fn rejects_many_to_many_without_through() {
        let configs = vec![
            parse(r#"{"name": "project", "relationships": {"members": {"type": "manyToMany", "target": "member"}}}"#),
            parse(r#"{"name": "member"}"#),
        ];
        assert!(validate(&configs).is_err());
    }

    #[test]
    fn rejects_unknown_custom_rule() {
        let configs = vec![parse(
            r#"{"name": "order", "validation": {"rules": [{"type": "custom", "function": "noSuchFn"}]}}"#,
        )];
        assert!(validate(&configs).is_err());
    }

    #[test]
    fn accepts_consistent_model() {
        let configs = vec![
            parse(
                r#"{"name": "order",
                    "attributes": {"number": {"type": "string", "unique": true}},
                    "relationships": {"organization": {"type": "manyToOne", "target": "organization"}},
                    "validation": {"rules": [
                        {"type": "unique", "field": "number"},
                        {"type": "custom", "function": "validateOrderTotal"}
                    ]}}"#,
            ),
            parse(r#"{"name": "organization"}"#),
        ];
        assert!(validate(&configs).is_ok());
    }
}
