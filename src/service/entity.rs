//! Generic CRUD execution against SQLite, bound to one resolved entity.

use crate::config::{
    AttributeType, ColumnInfo, RelationKind, ResolvedEntity, ResolvedModel, ResolvedRelation,
};
use crate::error::AppError;
use crate::response::{ListPage, Pagination};
use crate::service::transition::Transition;
use crate::service::validation::{ValidationMode, ValidationService};
use crate::sql::{self, BindValue, Filter, QueryBuf, SortOrder};
use crate::ws::Hub;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Parsed list parameters. Filters are pre-coerced to the column types.
#[derive(Clone, Debug)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: String,
    pub order: SortOrder,
    pub search: Option<String>,
    pub filters: Vec<Filter>,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            limit: 20,
            sort: "createdAt".into(),
            order: SortOrder::Desc,
            search: None,
            filters: Vec::new(),
        }
    }
}

const MAX_LIMIT: u32 = 100;

pub struct EntityService<'a> {
    pool: &'a SqlitePool,
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    hub: &'a Hub,
    /// Acting user, excluded from update/delete/method echo events.
    origin: Option<i64>,
}

impl<'a> EntityService<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        model: &'a ResolvedModel,
        entity: &'a ResolvedEntity,
        hub: &'a Hub,
    ) -> Self {
        EntityService {
            pool,
            model,
            entity,
            hub,
            origin: None,
        }
    }

    pub fn with_origin(mut self, user_id: i64) -> Self {
        self.origin = Some(user_id);
        self
    }

    /// Paged list with filters, search, and relationship hydration.
    pub async fn get_all(&self, query: &ListQuery) -> Result<ListPage, AppError> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_LIMIT);
        let offset = (page - 1).saturating_mul(limit);

        let count_q = sql::count_list(self.entity, &query.filters, query.search.as_deref());
        let total = self.fetch_count(&count_q).await?;

        let list_q = sql::select_list(
            self.entity,
            &query.filters,
            query.search.as_deref(),
            &query.sort,
            query.order,
            limit,
            offset,
        );
        let rows = self.fetch_rows(&list_q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = row_to_record(self.entity, row);
            self.load_relationships(&mut record).await;
            results.push(record);
        }

        Ok(ListPage::new(results, Pagination::new(page, limit, total as u64)))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Value, AppError> {
        let mut record = self.fetch_record(id).await?;
        self.load_relationships(&mut record).await;
        Ok(record)
    }

    pub async fn create(&self, body: HashMap<String, Value>) -> Result<Value, AppError> {
        let mut body = strip_auto_fields(body);
        ValidationService::new(self.pool, self.entity)
            .validate(&body, ValidationMode::Create)
            .await?;

        for (name, spec) in &self.entity.attributes {
            if let Some(default) = &spec.default {
                body.entry(name.clone()).or_insert_with(|| default.clone());
            }
        }
        let now = timestamp();
        body.insert("createdAt".into(), Value::String(now.clone()));
        body.insert("updatedAt".into(), Value::String(now));

        let q = sql::insert(self.entity, &body);
        let row = self.fetch_one_row(&q).await?;
        let mut record = row_to_record(self.entity, &row);
        self.load_relationships(&mut record).await;
        self.hub.emit_entity_created(&self.entity.name, &record);
        Ok(record)
    }

    pub async fn update(&self, id: i64, body: HashMap<String, Value>) -> Result<Value, AppError> {
        self.fetch_record(id).await?;
        let mut body = strip_auto_fields(body);
        ValidationService::new(self.pool, self.entity)
            .validate(&body, ValidationMode::Update { id })
            .await?;

        body.insert("updatedAt".into(), Value::String(timestamp()));
        let q = sql::update(self.entity, id, &body);
        let row = self.fetch_one_row(&q).await?;
        let mut record = row_to_record(self.entity, &row);
        self.load_relationships(&mut record).await;
        self.hub
            .emit_entity_updated(&self.entity.name, id, &record, self.origin);
        Ok(record)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.fetch_record(id).await?;
        let q = sql::delete(self.entity);
        sqlx::query(&q.sql).bind(id).execute(self.pool).await?;
        self.hub
            .emit_entity_deleted(&self.entity.name, id, self.origin);
        Ok(())
    }

    /// Run a configured custom method as a state transition on one record.
    pub async fn execute_method(
        &self,
        method_name: &str,
        id: i64,
        body: HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let method = self.entity.methods.get(method_name).ok_or_else(|| {
            AppError::NotFound(format!("method {} on {}", method_name, self.entity.name))
        })?;

        ValidationService::new(self.pool, self.entity)
            .validate_method_params(method, &body)
            .await?;
        self.fetch_record(id).await?;

        let transition = Transition::from_name(method_name)
            .ok_or_else(|| AppError::UnsupportedMethod(method_name.to_string()))?;

        // Only declared parameters flow into the record.
        let params: HashMap<String, Value> = body
            .into_iter()
            .filter(|(k, _)| method.parameters.contains_key(k))
            .collect();
        let now = timestamp();
        let mut updates = transition.apply(&params, &now);
        updates.insert("updatedAt".into(), Value::String(now));

        let q = sql::update(self.entity, id, &updates);
        let row = self.fetch_one_row(&q).await?;
        let mut record = row_to_record(self.entity, &row);
        self.load_relationships(&mut record).await;
        self.hub
            .emit_method_executed(&self.entity.name, id, method_name, &record, self.origin);
        Ok(record)
    }

    /// Populate each configured relation with one extra query. Failures are
    /// non-fatal: the relation is set to null and a warning logged.
    async fn load_relationships(&self, record: &mut Value) {
        let Some(map) = record.as_object_mut() else { return };
        let id = map.get("id").and_then(Value::as_i64);
        for relation in &self.entity.relations {
            let loaded = self.load_relation(relation, map, id).await;
            let value = match loaded {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        entity = %self.entity.name,
                        relation = %relation.name,
                        error = %e,
                        "relationship hydration failed"
                    );
                    Value::Null
                }
            };
            map.insert(relation.name.clone(), value);
        }
    }

    async fn load_relation(
        &self,
        relation: &ResolvedRelation,
        record: &Map<String, Value>,
        record_id: Option<i64>,
    ) -> Result<Value, AppError> {
        let target = self
            .model
            .entity_by_name(&relation.target_entity)
            .ok_or_else(|| AppError::NotFound(relation.target_entity.clone()))?;

        match relation.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne => {
                let fk = record.get(&relation.foreign_key);
                let Some(fk) = fk.filter(|v| !v.is_null()) else {
                    return Ok(Value::Null);
                };
                let q = sql::select_by_id(target);
                let row = sqlx::query(&q.sql)
                    .bind(BindValue::from_json(fk))
                    .fetch_optional(self.pool)
                    .await?;
                Ok(row
                    .map(|r| row_to_record(target, &r))
                    .unwrap_or(Value::Null))
            }
            RelationKind::OneToMany => {
                let Some(id) = record_id else { return Ok(Value::Array(Vec::new())) };
                let q = sql::select_where_eq(target, &relation.foreign_key);
                let rows = sqlx::query(&q.sql).bind(id).fetch_all(self.pool).await?;
                Ok(Value::Array(
                    rows.iter().map(|r| row_to_record(target, r)).collect(),
                ))
            }
            RelationKind::ManyToMany => {
                let Some(id) = record_id else { return Ok(Value::Array(Vec::new())) };
                let pivot = relation.through.as_deref().unwrap_or_default();
                let q = sql::select_via_pivot(
                    target,
                    pivot,
                    &relation.foreign_key,
                    &relation.pivot_target_key,
                );
                let rows = sqlx::query(&q.sql).bind(id).fetch_all(self.pool).await?;
                Ok(Value::Array(
                    rows.iter().map(|r| row_to_record(target, r)).collect(),
                ))
            }
        }
    }

    async fn fetch_record(&self, id: i64) -> Result<Value, AppError> {
        let q = sql::select_by_id(self.entity);
        tracing::debug!(sql = %q.sql, id, "query");
        let row = sqlx::query(&q.sql).bind(id).fetch_optional(self.pool).await?;
        let row = row.ok_or_else(|| {
            AppError::NotFound(format!("{} {}", self.entity.name, id))
        })?;
        Ok(row_to_record(self.entity, &row))
    }

    async fn fetch_rows(&self, q: &QueryBuf) -> Result<Vec<SqliteRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_all(self.pool).await?)
    }

    async fn fetch_one_row(&self, q: &QueryBuf) -> Result<SqliteRow, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_one(self.pool).await?)
    }

    async fn fetch_count(&self, q: &QueryBuf) -> Result<i64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_one(self.pool).await?)
    }
}

/// Server-stamped timestamps; RFC 3339 with microseconds so successive
/// updates compare strictly.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn strip_auto_fields(mut body: HashMap<String, Value>) -> HashMap<String, Value> {
    body.remove("id");
    body.remove("createdAt");
    body.remove("updatedAt");
    body
}

/// Decode a row into a JSON record using the entity's column types.
pub fn row_to_record(entity: &ResolvedEntity, row: &SqliteRow) -> Value {
    let mut map = Map::new();
    for col in &entity.columns {
        map.insert(col.name.clone(), cell_to_value(row, col));
    }
    Value::Object(map)
}

fn cell_to_value(row: &SqliteRow, col: &ColumnInfo) -> Value {
    let name = col.name.as_str();
    match col.ty {
        AttributeType::Integer => {
            if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
                return Value::Number(n.into());
            }
        }
        AttributeType::Boolean => {
            if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
                return Value::Bool(n != 0);
            }
        }
        AttributeType::Number => {
            if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
                if let Some(n) = serde_json::Number::from_f64(n) {
                    return Value::Number(n);
                }
            }
        }
        AttributeType::Json => {
            if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
                return serde_json::from_str(&s).unwrap_or(Value::String(s));
            }
        }
        _ => {
            if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
                return Value::String(s);
            }
        }
    }
    // Storage class did not match the declared type; fall back permissively.
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    Value::Null
}
