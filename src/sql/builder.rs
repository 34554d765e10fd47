//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::config::ResolvedEntity;
use serde_json::Value;
use std::collections::HashMap;

/// Quote an identifier for SQLite (identifiers only ever come from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_query(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One list filter. `In` is produced by repeated query keys.
#[derive(Clone, Debug)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    fn column(&self) -> &str {
        match self {
            Filter::Eq(col, _) | Filter::In(col, _) => col,
        }
    }
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) {
        self.params.push(v);
    }
}

fn column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape LIKE wildcards in a user-supplied search term; pairs with
/// `ESCAPE '\'` in the generated SQL.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// WHERE clause from filters plus an optional OR-search across the entity's
/// search fields. Filters on unknown columns are dropped by the caller; this
/// re-checks as a second line of defense.
fn where_clause(
    entity: &ResolvedEntity,
    filters: &[Filter],
    search: Option<&str>,
    q: &mut QueryBuf,
) -> String {
    let mut parts = Vec::new();
    for filter in filters {
        if !entity.has_column(filter.column()) {
            continue;
        }
        match filter {
            Filter::Eq(col, val) => {
                q.push_param(val.clone());
                parts.push(format!("{} = ?", quoted(col)));
            }
            Filter::In(col, vals) if !vals.is_empty() => {
                let placeholders = vec!["?"; vals.len()].join(", ");
                for v in vals {
                    q.push_param(v.clone());
                }
                parts.push(format!("{} IN ({})", quoted(col), placeholders));
            }
            Filter::In(..) => {}
        }
    }
    if let Some(term) = search {
        let mut like_parts = Vec::new();
        for field in &entity.search_fields {
            q.push_param(Value::String(format!("%{}%", escape_like(term))));
            like_parts.push(format!("{} LIKE ? ESCAPE '\\'", quoted(field)));
        }
        if !like_parts.is_empty() {
            parts.push(format!("({})", like_parts.join(" OR ")));
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Paged SELECT with filters, search, and a whitelisted sort column.
pub fn select_list(
    entity: &ResolvedEntity,
    filters: &[Filter],
    search: Option<&str>,
    sort: &str,
    order: SortOrder,
    limit: u32,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(entity, filters, search, &mut q);
    let sort_col = if entity.has_column(sort) { sort } else { "id" };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} {}, {} ASC LIMIT {} OFFSET {}",
        column_list(entity),
        quoted(&entity.table_name),
        where_sql,
        quoted(sort_col),
        order.as_sql(),
        quoted("id"),
        limit,
        offset
    );
    q
}

/// COUNT(*) over the same filters/search as `select_list`.
pub fn count_list(entity: &ResolvedEntity, filters: &[Filter], search: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(entity, filters, search, &mut q);
    q.sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quoted(&entity.table_name),
        where_sql
    );
    q
}

/// SELECT by primary key. Caller binds id as the sole param.
pub fn select_by_id(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        column_list(entity),
        quoted(&entity.table_name),
        quoted("id")
    );
    q
}

/// SELECT rows where one column equals a value. Used for relationship
/// hydration (FK lookups). Caller binds the key as the sole param.
pub fn select_where_eq(entity: &ResolvedEntity, column: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY {} ASC",
        column_list(entity),
        quoted(&entity.table_name),
        quoted(column),
        quoted("id")
    );
    q
}

/// SELECT target rows through a manyToMany pivot table. Caller binds the
/// owning record's id as the sole param.
pub fn select_via_pivot(
    target: &ResolvedEntity,
    pivot_table: &str,
    our_key: &str,
    target_key: &str,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = target
        .columns
        .iter()
        .map(|c| format!("t.{}", quoted(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    q.sql = format!(
        "SELECT {} FROM {} t JOIN {} p ON p.{} = t.{} WHERE p.{} = ? ORDER BY t.{} ASC",
        cols,
        quoted(&target.table_name),
        quoted(pivot_table),
        quoted(target_key),
        quoted("id"),
        quoted(our_key),
        quoted("id")
    );
    q
}

/// INSERT from body. Only known columns are written; `id` comes from the
/// autoincrement, absent columns fall back to their DDL defaults.
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        if c.name == "id" {
            continue;
        }
        let Some(val) = body.get(&c.name) else { continue };
        q.push_param(val.clone());
        cols.push(quoted(&c.name));
        placeholders.push("?");
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&entity.table_name),
        cols.join(", "),
        placeholders.join(", "),
        column_list(entity)
    );
    q
}

/// UPDATE by id: SET only known columns present in body; `id` and
/// `createdAt` are never settable. Appends the id param last.
pub fn update(entity: &ResolvedEntity, id: i64, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.name == "id" || c.name == "createdAt" {
            continue;
        }
        let Some(val) = body.get(&c.name) else { continue };
        q.push_param(val.clone());
        sets.push(format!("{} = ?", quoted(&c.name)));
    }
    q.push_param(Value::Number(id.into()));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ? RETURNING {}",
        quoted(&entity.table_name),
        sets.join(", "),
        quoted("id"),
        column_list(entity)
    );
    q
}

/// DELETE by id. Caller binds id as the sole param.
pub fn delete(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quoted(&entity.table_name),
        quoted("id")
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_entity, EntityConfig};
    use serde_json::json;

    fn entity() -> ResolvedEntity {
        let config: EntityConfig = serde_json::from_str(
            r#"{
                "name": "order",
                "attributes": {
                    "number": {"type": "string"},
                    "status": {"type": "string"},
                    "notes": {"type": "text"}
                },
                "ui": {"searchFields": ["number", "notes"]}
            }"#,
        )
        .unwrap();
        resolve_entity(&config)
    }

    #[test]
    fn list_combines_filters_and_search() {
        let e = entity();
        let filters = vec![
            Filter::Eq("status".into(), json!("pending")),
            Filter::In("number".into(), vec![json!("a"), json!("b")]),
        ];
        let q = select_list(&e, &filters, Some("acme"), "createdAt", SortOrder::Desc, 20, 0);
        assert!(q.sql.contains(r#""status" = ?"#));
        assert!(q.sql.contains(r#""number" IN (?, ?)"#));
        assert!(q.sql.contains(r#""number" LIKE ? ESCAPE '\' OR "notes" LIKE ? ESCAPE '\'"#));
        assert!(q.sql.contains(r#"ORDER BY "createdAt" DESC"#));
        assert_eq!(q.params.len(), 5);
        assert_eq!(q.params[3], json!("%acme%"));
    }

    #[test]
    fn unknown_filter_columns_are_dropped() {
        let e = entity();
        let filters = vec![Filter::Eq("no_such_column".into(), json!(1))];
        let q = select_list(&e, &filters, None, "id", SortOrder::Asc, 10, 0);
        assert!(!q.sql.contains("no_such_column"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn unknown_sort_falls_back_to_id() {
        let e = entity();
        let q = select_list(&e, &[], None, "evil; DROP TABLE", SortOrder::Asc, 10, 0);
        assert!(q.sql.contains(r#"ORDER BY "id" ASC"#));
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let e = entity();
        let q = select_list(&e, &[], Some("100%"), "id", SortOrder::Asc, 10, 0);
        assert_eq!(q.params[0], json!("%100\\%%"));
    }

    #[test]
    fn update_never_sets_id_or_created_at() {
        let e = entity();
        let mut body = HashMap::new();
        body.insert("id".to_string(), json!(99));
        body.insert("createdAt".to_string(), json!("2020-01-01T00:00:00Z"));
        body.insert("status".to_string(), json!("active"));
        body.insert("updatedAt".to_string(), json!("2026-01-01T00:00:00Z"));
        let q = update(&e, 7, &body);
        assert!(!q.sql.contains(r#""createdAt" = ?"#));
        assert!(q.sql.starts_with("UPDATE \"orders\" SET"));
        // status + updatedAt + trailing id param
        assert_eq!(q.params.len(), 3);
        assert_eq!(q.params[2], json!(7));
    }

    #[test]
    fn insert_skips_unknown_and_absent_columns() {
        let e = entity();
        let mut body = HashMap::new();
        body.insert("status".to_string(), json!("pending"));
        body.insert("bogus".to_string(), json!("x"));
        let q = insert(&e, &body);
        assert!(q.sql.contains(r#"("status")"#));
        assert!(!q.sql.contains("bogus"));
        assert_eq!(q.params.len(), 1);
    }
}
