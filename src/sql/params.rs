//! Convert serde_json::Value into text parameters; the builder casts each placeholder.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value bound to a PostgreSQL query as TEXT (or NULL).
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Text(b.to_string()),
            Value::Number(n) => PgBindValue::Text(n.to_string()),
            Value::String(s) => PgBindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Text(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_and_documents_become_text() {
        assert_eq!(PgBindValue::from_json(&json!(null)), PgBindValue::Null);
        assert_eq!(PgBindValue::from_json(&json!(true)), PgBindValue::Text("true".into()));
        assert_eq!(PgBindValue::from_json(&json!(12.5)), PgBindValue::Text("12.5".into()));
        assert_eq!(PgBindValue::from_json(&json!({"a": 1})), PgBindValue::Text("{\"a\":1}".into()));
    }
}
