//! Convert serde_json::Value to values that sqlx can bind against SQLite.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo};
use sqlx::{Database, Sqlite};
use std::borrow::Cow;

/// A value bindable to a SQLite query, converted from serde_json::Value.
/// JSON arrays/objects are stored as serialized text.
#[derive(Clone, Debug)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

impl BindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else {
                    BindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => BindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Text(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Sqlite> for BindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            BindValue::Null => {
                buf.push(SqliteArgumentValue::Null);
                IsNull::Yes
            }
            BindValue::Bool(b) => {
                buf.push(SqliteArgumentValue::Int64(i64::from(*b)));
                IsNull::No
            }
            BindValue::I64(n) => {
                buf.push(SqliteArgumentValue::Int64(*n));
                IsNull::No
            }
            BindValue::F64(n) => {
                buf.push(SqliteArgumentValue::Double(*n));
                IsNull::No
            }
            BindValue::Text(s) => {
                buf.push(SqliteArgumentValue::Text(Cow::Owned(s.clone())));
                IsNull::No
            }
        })
    }
}

impl sqlx::Type<Sqlite> for BindValue {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(_ty: &SqliteTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_map_to_native_binds() {
        assert!(matches!(BindValue::from_json(&json!(null)), BindValue::Null));
        assert!(matches!(BindValue::from_json(&json!(true)), BindValue::Bool(true)));
        assert!(matches!(BindValue::from_json(&json!(7)), BindValue::I64(7)));
        assert!(matches!(BindValue::from_json(&json!(1.5)), BindValue::F64(_)));
    }

    #[test]
    fn json_composites_serialize_to_text() {
        match BindValue::from_json(&json!({"a": [1, 2]})) {
            BindValue::Text(s) => assert_eq!(s, r#"{"a":[1,2]}"#),
            other => panic!("expected text, got {:?}", other),
        }
    }
}
