//! Entity CRUD handlers: list, read, create, update, delete, method actions.
//! Paths are parameterized; handlers resolve the entity from the segment.

use crate::auth::CurrentUser;
use crate::config::{AttributeType, Operation, ResolvedEntity};
use crate::error::AppError;
use crate::response::success_one;
use crate::service::{EntityService, ListQuery};
use crate::sql::{Filter, SortOrder};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest("invalid id".into()))
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Coerce a query-string value to the filtered column's type so SQLite
/// comparisons see the stored representation.
fn coerce_query_value(entity: &ResolvedEntity, col: &str, s: &str) -> Value {
    match entity.column(col).map(|c| c.ty) {
        Some(AttributeType::Integer) => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(s.to_string())),
        Some(AttributeType::Number) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(s.to_string())),
        Some(AttributeType::Boolean) => {
            if s.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if s.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                Value::String(s.to_string())
            }
        }
        _ => Value::String(s.to_string()),
    }
}

/// Build a ListQuery from raw query pairs. Repeated attribute keys become IN
/// filters; unknown keys are silently ignored.
pub(crate) fn parse_list_query(entity: &ResolvedEntity, pairs: Vec<(String, String)>) -> ListQuery {
    let mut query = ListQuery::default();
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();

    for (key, value) in pairs {
        match key.as_str() {
            "page" => {
                if let Ok(n) = value.parse() {
                    query.page = n;
                }
            }
            "limit" => {
                if let Ok(n) = value.parse() {
                    query.limit = n;
                }
            }
            "sort" => query.sort = value,
            "order" => query.order = SortOrder::from_query(&value),
            "search" => {
                if !value.is_empty() {
                    query.search = Some(value);
                }
            }
            _ => {
                if entity.has_column(&key) {
                    match grouped.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, values)) => values.push(value),
                        None => grouped.push((key, vec![value])),
                    }
                }
            }
        }
    }

    for (col, values) in grouped {
        let filter = if values.len() == 1 {
            Filter::Eq(col.clone(), coerce_query_value(entity, &col, &values[0]))
        } else {
            let coerced = values
                .iter()
                .map(|v| coerce_query_value(entity, &col, v))
                .collect();
            Filter::In(col, coerced)
        };
        query.filters.push(filter);
    }
    query
}

fn resolve_entity<'a>(
    state: &'a AppState,
    path_segment: &str,
) -> Result<&'a ResolvedEntity, AppError> {
    state
        .model
        .entity_by_path(path_segment)
        .map(|e| e.as_ref())
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))
}

fn check_permission(entity: &ResolvedEntity, op: Operation, role: &str) -> Result<(), AppError> {
    if entity.role_allowed(op, role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' may not perform this operation on {}",
            role, entity.name
        )))
    }
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Read, &user.role)?;
    let query = parse_list_query(entity, pairs);
    let page = EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .get_all(&query)
        .await?;
    Ok((StatusCode::OK, Json(page)))
}

pub async fn read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Read, &user.role)?;
    let id = parse_id(&id_str)?;
    let record = EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .get_by_id(id)
        .await?;
    Ok((StatusCode::OK, Json(success_one(record))))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Create, &user.role)?;
    let body = body_to_map(body)?;
    let record = EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .with_origin(user.id)
        .create(body)
        .await?;
    Ok((StatusCode::CREATED, Json(success_one(record))))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Update, &user.role)?;
    let id = parse_id(&id_str)?;
    let body = body_to_map(body)?;
    let record = EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .with_origin(user.id)
        .update(id, body)
        .await?;
    Ok((StatusCode::OK, Json(success_one(record))))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Delete, &user.role)?;
    let id = parse_id(&id_str)?;
    EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .with_origin(user.id)
        .delete(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute_method(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((path_segment, id_str, method_name)): Path<(String, String, String)>,
    body: Option<Json<Value>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let entity = resolve_entity(&state, &path_segment)?;
    check_permission(entity, Operation::Method, &user.role)?;
    let id = parse_id(&id_str)?;
    let body = match body {
        Some(Json(value)) => body_to_map(value)?,
        None => HashMap::new(),
    };
    let record = EntityService::new(&state.pool, &state.model, entity, &state.hub)
        .with_origin(user.id)
        .execute_method(&method_name, id, body)
        .await?;
    Ok((StatusCode::OK, Json(success_one(record))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_entity as resolve_config, EntityConfig};
    use serde_json::json;

    fn entity() -> ResolvedEntity {
        let config: EntityConfig = serde_json::from_str(
            r#"{
                "name": "order",
                "attributes": {
                    "status": {"type": "string"},
                    "total": {"type": "number"},
                    "priority": {"type": "integer"},
                    "rush": {"type": "boolean"}
                }
            }"#,
        )
        .unwrap();
        resolve_config(&config)
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn repeated_keys_become_in_filters() {
        let e = entity();
        let q = parse_list_query(
            &e,
            pairs(&[("status", "pending"), ("status", "active"), ("page", "2")]),
        );
        assert_eq!(q.page, 2);
        assert_eq!(q.filters.len(), 1);
        assert!(matches!(&q.filters[0], Filter::In(col, vals) if col == "status" && vals.len() == 2));
    }

    #[test]
    fn unknown_keys_are_silently_ignored() {
        let e = entity();
        let q = parse_list_query(&e, pairs(&[("nope", "1"), ("status", "pending")]));
        assert_eq!(q.filters.len(), 1);
        assert!(matches!(&q.filters[0], Filter::Eq(col, _) if col == "status"));
    }

    #[test]
    fn values_are_coerced_to_column_types() {
        let e = entity();
        let q = parse_list_query(&e, pairs(&[("priority", "3"), ("rush", "true"), ("total", "9.5")]));
        let by_col = |name: &str| {
            q.filters
                .iter()
                .find_map(|f| match f {
                    Filter::Eq(col, v) if col == name => Some(v.clone()),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(by_col("priority"), json!(3));
        assert_eq!(by_col("rush"), json!(true));
        assert_eq!(by_col("total"), json!(9.5));
    }

    #[test]
    fn sort_and_order_are_extracted() {
        let e = entity();
        let q = parse_list_query(&e, pairs(&[("sort", "total"), ("order", "asc"), ("search", "acme")]));
        assert_eq!(q.sort, "total");
        assert_eq!(q.order, SortOrder::Asc);
        assert_eq!(q.search.as_deref(), Some("acme"));
    }
}
