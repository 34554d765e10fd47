//! Pool creation and idempotent schema bootstrap from the resolved model.

use crate::config::{RelationKind, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(AppError::Db)?
        .create_if_missing(true)
        .foreign_keys(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?)
}

/// In-memory database on a single connection (more than one would each see
/// a different empty database). Used by tests.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(AppError::Db)?
        .foreign_keys(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn default_literal(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        other => Some(format!("'{}'", other.to_string().replace('\'', "''"))),
    }
}

fn create_table_sql(entity: &ResolvedEntity) -> String {
    let mut defs = Vec::with_capacity(entity.columns.len());
    for col in &entity.columns {
        if col.name == "id" {
            defs.push(r#""id" INTEGER PRIMARY KEY AUTOINCREMENT"#.to_string());
            continue;
        }
        let mut def = format!("{} {}", quoted(&col.name), col.ty.sqlite_type());
        if col.name == "createdAt" || col.name == "updatedAt" {
            def.push_str(" NOT NULL");
        }
        if col.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(lit) = entity
            .attributes
            .get(&col.name)
            .and_then(|spec| spec.default.as_ref())
            .and_then(default_literal)
        {
            def.push_str(&format!(" DEFAULT {}", lit));
        }
        defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&entity.table_name),
        defs.join(",\n  ")
    )
}

/// One table per entity, secondary indexes for `indexed` attributes, pivot
/// tables for manyToMany relations. Additive only.
pub async fn ensure_tables(pool: &SqlitePool, model: &ResolvedModel) -> Result<(), AppError> {
    for entity in &model.entities {
        let ddl = create_table_sql(entity);
        tracing::debug!(table = %entity.table_name, "ensure table");
        sqlx::query(&ddl).execute(pool).await?;

        for col in &entity.columns {
            if !col.indexed || col.name == "id" {
                continue;
            }
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quoted(&format!("idx_{}_{}", entity.table_name, col.name)),
                quoted(&entity.table_name),
                quoted(&col.name)
            );
            sqlx::query(&sql).execute(pool).await?;
        }

        for relation in &entity.relations {
            if relation.kind != RelationKind::ManyToMany {
                continue;
            }
            let Some(pivot) = relation.through.as_deref() else { continue };
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  \
                   \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
                   {} INTEGER NOT NULL,\n  \
                   {} INTEGER NOT NULL,\n  \
                   UNIQUE ({}, {})\n)",
                quoted(pivot),
                quoted(&relation.foreign_key),
                quoted(&relation.pivot_target_key),
                quoted(&relation.foreign_key),
                quoted(&relation.pivot_target_key)
            );
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

/// The users table is owned by the auth subsystem, not by entity configs.
pub async fn ensure_users_table(pool: &SqlitePool) -> Result<(), AppError> {
    let ddl = r#"
        CREATE TABLE IF NOT EXISTS "users" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "username" TEXT NOT NULL UNIQUE,
            "email" TEXT NOT NULL UNIQUE,
            "password" TEXT NOT NULL,
            "role" TEXT NOT NULL DEFAULT 'user',
            "status" TEXT NOT NULL DEFAULT 'active',
            "firstName" TEXT,
            "lastName" TEXT,
            "lastLogin" TEXT,
            "passwordChangedAt" TEXT,
            "createdAt" TEXT NOT NULL,
            "updatedAt" TEXT NOT NULL
        )
    "#;
    sqlx::query(ddl).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, EntityConfig};

    fn model() -> ResolvedModel {
        let configs: Vec<EntityConfig> = vec![
            serde_json::from_str(
                r#"{
                    "name": "order",
                    "attributes": {
                        "number": {"type": "string", "unique": true},
                        "status": {"type": "string", "default": "pending", "indexed": true},
                        "total": {"type": "number"}
                    }
                }"#,
            )
            .unwrap(),
        ];
        resolve(configs).unwrap()
    }

    #[test]
    fn ddl_reflects_attribute_flags() {
        let model = model();
        let entity = model.entity_by_path("orders").unwrap();
        let ddl = create_table_sql(entity);
        assert!(ddl.contains(r#""id" INTEGER PRIMARY KEY AUTOINCREMENT"#));
        assert!(ddl.contains(r#""number" TEXT UNIQUE"#));
        assert!(ddl.contains(r#""status" TEXT DEFAULT 'pending'"#));
        assert!(ddl.contains(r#""total" REAL"#));
        assert!(ddl.contains(r#""createdAt" TEXT NOT NULL"#));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        let model = model();
        ensure_tables(&pool, &model).await.unwrap();
        ensure_tables(&pool, &model).await.unwrap();
        ensure_users_table(&pool).await.unwrap();
        ensure_users_table(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
