//! Values bound to statement placeholders.

use crate::value::CellValue;
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A bound parameter. Column values travel as text and are cast to the column's SQL type
/// in the statement, so one representation serves every column type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindValue {
    Null,
    Text(String),
    BigInt(i64),
}

impl BindValue {
    /// Request payload value to bind value. Arrays and objects are bound as their JSON text.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Text(b.to_string()),
            Value::Number(n) => BindValue::Text(n.to_string()),
            Value::String(s) => BindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Text(v.to_string()),
        }
    }
}

impl From<&CellValue> for BindValue {
    fn from(v: &CellValue) -> Self {
        match v.to_sql_text() {
            Some(s) => BindValue::Text(s),
            None => BindValue::Null,
        }
    }
}

/// Prepare `sql` with every parameter bound in order.
pub fn bind_all<'q>(sql: &'q str, params: &'q [BindValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = match p {
            BindValue::Null => query.bind(Option::<String>::None),
            BindValue::Text(s) => query.bind(s.as_str()),
            BindValue::BigInt(n) => query.bind(*n),
        };
    }
    query
}
