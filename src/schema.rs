//! Table shape discovery from the PostgreSQL catalog, with a TTL cache.

use crate::error::AppError;
use sqlx::{PgConnection, Row as _};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Primary key column every entity is expected to carry.
pub const ID_COLUMN: &str = "id";

/// How a column's values are read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Integer,
    Text,
    Timestamp,
    /// Selected as text; written back through a cast to its SQL type.
    Other,
}

impl ColumnKind {
    /// Classify by `pg_type.typname`.
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "bool" => ColumnKind::Boolean,
            "int2" | "int4" | "int8" => ColumnKind::Integer,
            "text" | "varchar" | "bpchar" | "name" | "citext" => ColumnKind::Text,
            "timestamp" | "timestamptz" | "date" => ColumnKind::Timestamp,
            _ => ColumnKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Formatted SQL type (e.g. `integer`, `character varying`), used for value casts.
    pub sql_type: String,
    pub kind: ColumnKind,
    pub has_default: bool,
    pub nullable: bool,
    /// Computed by the database (`GENERATED ALWAYS`); never written.
    pub generated: bool,
}

impl ColumnInfo {
    pub fn is_writable(&self) -> bool {
        self.name != ID_COLUMN && !self.generated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// In table attribute order.
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The `id` column; its absence breaks get/update/delete by id.
    pub fn id_column(&self) -> Result<&ColumnInfo, AppError> {
        self.column(ID_COLUMN).ok_or_else(|| {
            AppError::Validation(format!("entity '{}' has no '{}' column", self.name, ID_COLUMN))
        })
    }

    /// Every column except `id` and generated columns.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_writable())
    }
}

const COLUMNS_SQL: &str = r#"
    SELECT a.attname::text AS name,
           format_type(a.atttypid, NULL) AS sql_type,
           t.typname::text AS type_name,
           a.atthasdef AS has_default,
           NOT a.attnotnull AS nullable,
           (a.attgenerated <> '' OR a.attidentity = 'a') AS generated
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    WHERE a.attrelid = to_regclass(quote_ident($1))
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// Read the column set of `entity` from the catalog. `None` when no such relation is visible.
pub async fn introspect(conn: &mut PgConnection, entity: &str) -> Result<Option<TableSchema>, AppError> {
    tracing::debug!(entity = %entity, "introspecting columns");
    let rows = sqlx::query(COLUMNS_SQL).bind(entity).fetch_all(&mut *conn).await?;
    if rows.is_empty() {
        return Ok(None);
    }
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let type_name: String = row.try_get("type_name")?;
        columns.push(ColumnInfo {
            name: row.try_get("name")?,
            sql_type: row.try_get("sql_type")?,
            kind: ColumnKind::from_type_name(&type_name),
            has_default: row.try_get("has_default")?,
            nullable: row.try_get("nullable")?,
            generated: row.try_get("generated")?,
        });
    }
    Ok(Some(TableSchema {
        name: entity.to_string(),
        columns,
    }))
}

struct CachedSchema {
    schema: Arc<TableSchema>,
    loaded_at: Instant,
}

/// Entity name to introspected schema. Entries expire after `ttl`; unknown entities are not cached.
#[derive(Clone)]
pub struct SchemaCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedSchema>>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        SchemaCache {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached schema if present and fresh.
    pub fn lookup(&self, entity: &str) -> Option<Arc<TableSchema>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(entity)
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.schema))
    }

    pub fn store(&self, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            schema.name.clone(),
            CachedSchema {
                schema: Arc::clone(&schema),
                loaded_at: Instant::now(),
            },
        );
        schema
    }

    pub fn invalidate(&self, entity: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(entity).is_some() {
            tracing::debug!(entity = %entity, "schema cache entry invalidated");
        }
    }

    /// Schema for `entity`, introspecting on miss or expiry. Unknown entity is a validation error.
    pub async fn get(&self, conn: &mut PgConnection, entity: &str) -> Result<Arc<TableSchema>, AppError> {
        if let Some(schema) = self.lookup(entity) {
            return Ok(schema);
        }
        match introspect(conn, entity).await? {
            Some(schema) => Ok(self.store(schema)),
            None => Err(AppError::Validation(format!("unknown entity '{}'", entity))),
        }
    }
}
