//! Request validation from entity descriptors: structural field checks plus
//! declarative cross-record rules against the live database.

use crate::config::{
    table_name_for, AttributeSpec, AttributeType, MethodSpec, ResolvedEntity, RuleKind, RuleSpec,
};
use crate::error::{AppError, FieldError};
use crate::sql::BindValue;
use regex::Regex;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    /// Partial-update semantics: required-ness is not enforced, and unique
    /// checks exclude the record's own id.
    Update { id: i64 },
}

pub struct ValidationService<'a> {
    pool: &'a SqlitePool,
    entity: &'a ResolvedEntity,
}

impl<'a> ValidationService<'a> {
    pub fn new(pool: &'a SqlitePool, entity: &'a ResolvedEntity) -> Self {
        ValidationService { pool, entity }
    }

    /// Validate a create/update body. All failures are collected; the result
    /// is Ok only when the error list would be empty.
    pub async fn validate(
        &self,
        body: &HashMap<String, Value>,
        mode: ValidationMode,
    ) -> Result<(), AppError> {
        let mut errors = Vec::new();

        let mut attr_names: Vec<&String> = self.entity.attributes.keys().collect();
        attr_names.sort();
        for name in attr_names {
            let spec = &self.entity.attributes[name];
            let value = match body.get(name) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if spec.required && mode == ValidationMode::Create && spec.default.is_none() {
                        errors.push(FieldError::new(
                            name.as_str(),
                            format!("{} is required", name),
                            None,
                        ));
                    }
                    continue;
                }
            };
            check_field(name, value, spec, &mut errors);
        }

        let exclude_id = match mode {
            ValidationMode::Create => None,
            ValidationMode::Update { id } => Some(id),
        };

        // Attribute-level `unique` flags are enforced like explicit unique
        // rules; a rule on the same field takes precedence (custom message).
        let ruled_unique: std::collections::HashSet<&str> = self
            .entity
            .rules
            .iter()
            .filter(|r| r.type_ == RuleKind::Unique)
            .filter_map(|r| r.field.as_deref())
            .collect();
        let mut flagged: Vec<&String> = self
            .entity
            .attributes
            .iter()
            .filter(|(name, spec)| spec.unique && !ruled_unique.contains(name.as_str()))
            .map(|(name, _)| name)
            .collect();
        flagged.sort();
        for name in flagged {
            self.check_unique(name, body, exclude_id, None, &mut errors)
                .await?;
        }
        self.apply_rules(&self.entity.rules, body, exclude_id, &mut errors)
            .await?;

        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            Err(AppError::Validation(errors))
        }
    }

    /// Validate a custom method's declared parameters (and its rules, if
    /// any), reusing the attribute field checks.
    pub async fn validate_method_params(
        &self,
        method: &MethodSpec,
        body: &HashMap<String, Value>,
    ) -> Result<(), AppError> {
        let mut errors = Vec::new();
        let mut names: Vec<&String> = method.parameters.keys().collect();
        names.sort();
        for name in names {
            let spec = &method.parameters[name];
            let value = match body.get(name) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if spec.required {
                        errors.push(FieldError::new(
                            name.as_str(),
                            format!("{} is required", name),
                            None,
                        ));
                    }
                    continue;
                }
            };
            check_field(name, value, spec, &mut errors);
        }
        if let Some(block) = &method.validation {
            self.apply_rules(&block.rules, body, None, &mut errors).await?;
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    async fn apply_rules(
        &self,
        rules: &[RuleSpec],
        body: &HashMap<String, Value>,
        exclude_id: Option<i64>,
        errors: &mut Vec<FieldError>,
    ) -> Result<(), AppError> {
        for rule in rules {
            match rule.type_ {
                RuleKind::Unique => {
                    let Some(field) = rule.field.as_deref() else { continue };
                    self.check_unique(field, body, exclude_id, rule.message.as_deref(), errors)
                        .await?;
                }
                RuleKind::Exists => {
                    let Some(field) = rule.field.as_deref() else { continue };
                    self.check_exists(field, rule, body, errors).await?;
                }
                RuleKind::Custom => {
                    let name = rule.function.as_deref().unwrap_or_default();
                    if let Some(err) = run_custom_rule(name, body) {
                        errors.push(err);
                    }
                }
            }
        }
        Ok(())
    }

    async fn check_unique(
        &self,
        field: &str,
        body: &HashMap<String, Value>,
        exclude_id: Option<i64>,
        message: Option<&str>,
        errors: &mut Vec<FieldError>,
    ) -> Result<(), AppError> {
        let Some(value) = body.get(field) else { return Ok(()) };
        if value.is_null() {
            return Ok(());
        }
        let sql = match exclude_id {
            Some(_) => format!(
                r#"SELECT COUNT(*) FROM "{}" WHERE "{}" = ? AND "id" != ?"#,
                self.entity.table_name, field
            ),
            None => format!(
                r#"SELECT COUNT(*) FROM "{}" WHERE "{}" = ?"#,
                self.entity.table_name, field
            ),
        };
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(BindValue::from_json(value));
        if let Some(id) = exclude_id {
            query = query.bind(id);
        }
        let count = query.fetch_one(self.pool).await?;
        if count > 0 {
            let msg = message
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} must be unique", field));
            errors.push(FieldError::new(field, msg, Some(value.clone())));
        }
        Ok(())
    }

    async fn check_exists(
        &self,
        field: &str,
        rule: &RuleSpec,
        body: &HashMap<String, Value>,
        errors: &mut Vec<FieldError>,
    ) -> Result<(), AppError> {
        let Some(value) = body.get(field) else { return Ok(()) };
        if value.is_null() {
            return Ok(());
        }
        let table = match &rule.target {
            Some(target) => table_name_for(target),
            // organizationId -> organizations
            None => table_name_for(field.strip_suffix("Id").unwrap_or(field)),
        };
        let sql = format!(r#"SELECT COUNT(*) FROM "{}" WHERE "id" = ?"#, table);
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(BindValue::from_json(value))
            .fetch_one(self.pool)
            .await?;
        if count == 0 {
            let msg = rule
                .message
                .clone()
                .unwrap_or_else(|| format!("{} references a missing record", field));
            errors.push(FieldError::new(field, msg, Some(value.clone())));
        }
        Ok(())
    }
}

/// Structural checks for one field value against its spec.
fn check_field(name: &str, value: &Value, spec: &AttributeSpec, errors: &mut Vec<FieldError>) {
    let fail = |errors: &mut Vec<FieldError>, message: String| {
        errors.push(FieldError::new(name, message, Some(value.clone())));
    };

    match spec.attr_type() {
        AttributeType::String | AttributeType::Text => {
            let Some(s) = value.as_str() else {
                return fail(errors, format!("{} must be a string", name));
            };
            if let Some(max) = spec.length {
                if s.chars().count() > max as usize {
                    fail(errors, format!("{} must be at most {} characters", name, max));
                }
            }
            if let Some(pattern) = &spec.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => {
                        fail(errors, format!("{} does not match required pattern", name));
                    }
                    _ => {}
                }
            }
        }
        AttributeType::Email => {
            let Some(s) = value.as_str() else {
                return fail(errors, format!("{} must be a string", name));
            };
            if !email_regex().is_match(s) {
                fail(errors, format!("{} must be a valid email", name));
            }
        }
        AttributeType::Url => {
            let Some(s) = value.as_str() else {
                return fail(errors, format!("{} must be a string", name));
            };
            if !(s.starts_with("http://") || s.starts_with("https://")) {
                fail(errors, format!("{} must be a valid URL", name));
            }
        }
        AttributeType::Integer => {
            if value.as_i64().is_none() {
                return fail(errors, format!("{} must be an integer", name));
            }
        }
        AttributeType::Number => {
            if !value.is_number() {
                return fail(errors, format!("{} must be a number", name));
            }
        }
        AttributeType::Boolean => {
            if !value.is_boolean() {
                return fail(errors, format!("{} must be a boolean", name));
            }
        }
        AttributeType::Date => {
            let ok = value
                .as_str()
                .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
            if !ok {
                return fail(errors, format!("{} must be a date (YYYY-MM-DD)", name));
            }
        }
        AttributeType::Datetime => {
            let ok = value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok());
            if !ok {
                return fail(errors, format!("{} must be an ISO 8601 datetime", name));
            }
        }
        AttributeType::Json => {
            let ok = match value {
                Value::Object(_) | Value::Array(_) => true,
                Value::String(s) => serde_json::from_str::<Value>(s).is_ok(),
                _ => false,
            };
            if !ok {
                return fail(errors, format!("{} must be a JSON object or array", name));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = spec.min {
            if n < min {
                fail(errors, format!("{} must be at least {}", name, min));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                fail(errors, format!("{} must be at most {}", name, max));
            }
        }
    }

    if let Some(allowed) = &spec.enum_ {
        if !allowed.contains(value) {
            fail(errors, format!("{} must be one of the allowed values", name));
        }
    }
}

/// Registry of named server-side rules referenced by
/// `validation.rules[].function`. Names are checked at config load.
pub fn is_known_custom_rule(name: &str) -> bool {
    matches!(name, "validateOrderTotal")
}

fn run_custom_rule(name: &str, body: &HashMap<String, Value>) -> Option<FieldError> {
    match name {
        "validateOrderTotal" => validate_order_total(body),
        _ => {
            // Unreachable for configs that passed load-time validation.
            tracing::warn!(function = name, "skipping unknown custom rule");
            None
        }
    }
}

/// total must equal subtotal + tax + shipping within a 0.01 tolerance.
fn validate_order_total(body: &HashMap<String, Value>) -> Option<FieldError> {
    let total = body.get("total").and_then(Value::as_f64)?;
    let part = |key: &str| body.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    let expected = part("subtotal") + part("tax") + part("shipping");
    if (total - expected).abs() > 0.01 {
        return Some(FieldError::new(
            "total",
            format!("total must equal subtotal + tax + shipping (expected {})", expected),
            body.get("total").cloned(),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn order_total_within_tolerance_passes() {
        let b = body(&[
            ("subtotal", json!(100.0)),
            ("tax", json!(10.0)),
            ("shipping", json!(5.0)),
            ("total", json!(115.0)),
        ]);
        assert!(validate_order_total(&b).is_none());
    }

    #[test]
    fn order_total_mismatch_reports_expected_value() {
        let b = body(&[
            ("subtotal", json!(100.0)),
            ("tax", json!(10.0)),
            ("shipping", json!(5.0)),
            ("total", json!(100.0)),
        ]);
        let err = validate_order_total(&b).unwrap();
        assert_eq!(err.field, "total");
        assert!(err.message.contains("115"));
    }

    #[test]
    fn field_checks_cover_declared_types() {
        let mut errors = Vec::new();
        let spec: AttributeSpec = serde_json::from_str(r#"{"type": "email"}"#).unwrap();
        check_field("email", &json!("not-an-email"), &spec, &mut errors);
        check_field("email", &json!("a@b.co"), &spec, &mut errors);
        assert_eq!(errors.len(), 1);

        let spec: AttributeSpec =
            serde_json::from_str(r#"{"type": "integer", "min": 1, "max": 10}"#).unwrap();
        check_field("qty", &json!(0), &spec, &mut errors);
        assert_eq!(errors.len(), 2);
        check_field("qty", &json!(3), &spec, &mut errors);
        assert_eq!(errors.len(), 2);

        let spec: AttributeSpec = serde_json::from_str(r#"{"type": "datetime"}"#).unwrap();
        check_field("at", &json!("2026-08-07T10:00:00Z"), &spec, &mut errors);
        assert_eq!(errors.len(), 2);
        check_field("at", &json!("yesterday"), &spec, &mut errors);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn enum_and_length_violations_are_both_collected() {
        let spec: AttributeSpec = serde_json::from_str(
            r#"{"type": "string", "length": 3, "enum": ["ok"]}"#,
        )
        .unwrap();
        let mut errors = Vec::new();
        check_field("status", &json!("too long"), &spec, &mut errors);
        assert_eq!(errors.len(), 2);
    }
}
