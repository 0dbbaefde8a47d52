//! Canonical cell values and ordered rows built from PostgreSQL result rows.

use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::postgres::{PgRow, PgValueFormat, PgValueRef};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// One column value after normalization.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
    /// Timestamp or date in its canonical text form.
    Timestamp(String),
}

impl CellValue {
    /// Payload value as a cell. Non-integer numbers, arrays and objects become their JSON text.
    pub fn from_json(v: &serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Integer(i),
                None => CellValue::Text(n.to_string()),
            },
            Value::String(s) => CellValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => CellValue::Text(v.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form used when the value is bound back into a statement. `None` for null.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Boolean(b) => Some(b.to_string()),
            CellValue::Integer(n) => Some(n.to_string()),
            CellValue::Text(s) | CellValue::Timestamp(s) => Some(s.clone()),
        }
    }
}

/// Ordered mapping of column name to value, serialized as a JSON object in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Replace the value of an existing column. Returns false when the column is not in the row.
    pub fn set(&mut self, column: &str, value: CellValue) -> bool {
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some((_, v)) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Row {
            cells: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Materialize a result row, normalizing every cell.
pub fn row_from_pg(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), normalize(row, col.ordinal())))
        .collect()
}

/// Convert one raw cell into a [`CellValue`]. Total: unsupported types and decode
/// failures become empty text with a warning.
pub fn normalize(row: &PgRow, index: usize) -> CellValue {
    let column = &row.columns()[index];
    let name = column.name();
    let type_name = column.type_info().name();

    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(column = %name, pg_type = %type_name, error = %e, "unreadable cell");
            return CellValue::Text(String::new());
        }
    };
    if raw.is_null() {
        return CellValue::Null;
    }
    if let Some(label) = infinity_label(type_name, &raw) {
        return CellValue::Timestamp(label.to_string());
    }

    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).map(CellValue::Boolean),
        "INT2" => row.try_get::<i16, _>(index).map(|n| CellValue::Integer(n.into())),
        "INT4" => row.try_get::<i32, _>(index).map(|n| CellValue::Integer(n.into())),
        "INT8" => row.try_get::<i64, _>(index).map(CellValue::Integer),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "citext" => row.try_get::<String, _>(index).map(CellValue::Text),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|b| CellValue::Text(String::from_utf8_lossy(&b).into_owned())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|d| CellValue::Timestamp(d.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|d| CellValue::Timestamp(format_naive_timestamp(&d))),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|d| CellValue::Timestamp(d.format("%Y-%m-%d").to_string())),
        other => {
            tracing::warn!(column = %name, pg_type = %other, "unexpected column type, using empty text");
            return CellValue::Text(String::new());
        }
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!(column = %name, pg_type = %type_name, error = %e, "cell decode failed, using empty text");
        CellValue::Text(String::new())
    })
}

/// `infinity` / `-infinity` for the binary sentinels PostgreSQL uses in timestamp and date
/// columns; chrono cannot represent them.
fn infinity_label(type_name: &str, raw: &PgValueRef<'_>) -> Option<&'static str> {
    if raw.format() != PgValueFormat::Binary {
        return None;
    }
    infinity_from_bytes(type_name, raw.as_bytes().ok()?)
}

fn infinity_from_bytes(type_name: &str, bytes: &[u8]) -> Option<&'static str> {
    let (is_max, is_min) = match type_name {
        "TIMESTAMPTZ" | "TIMESTAMP" => {
            let n = i64::from_be_bytes(bytes.try_into().ok()?);
            (n == i64::MAX, n == i64::MIN)
        }
        "DATE" => {
            let n = i32::from_be_bytes(bytes.try_into().ok()?);
            (n == i32::MAX, n == i32::MIN)
        }
        _ => return None,
    };
    match (is_max, is_min) {
        (true, _) => Some("infinity"),
        (_, true) => Some("-infinity"),
        _ => None,
    }
}

fn format_naive_timestamp(d: &chrono::NaiveDateTime) -> String {
    d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}
