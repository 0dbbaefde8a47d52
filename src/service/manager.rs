//! Generic entity operations against PostgreSQL: list, get, create, read-merge-write update, delete.

use crate::config::Settings;
use crate::error::AppError;
use crate::schema::{ColumnKind, SchemaCache, TableSchema, ID_COLUMN};
use crate::service::reader;
use crate::sql::{self, BindValue, Filters, Page, Sort, SortDirection};
use crate::value::{CellValue, Row};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_OFFSET: i64 = 0;

/// Query parameters reserved for paging and sorting; everything else is a filter.
pub const PER_PAGE_PARAM: &str = "_perPage";
pub const PAGE_PARAM: &str = "_page";
pub const SORT_FIELD_PARAM: &str = "_sortField";
pub const SORT_DIR_PARAM: &str = "_sortDir";

/// SQLSTATEs meaning the cached table shape is stale.
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";

/// Raw list inputs as they arrive from the request. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub filters: Filters,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort_column: Option<String>,
    pub sort_direction: Option<String>,
}

impl ListParams {
    /// Split query parameters into the reserved controls and the filter set.
    pub fn from_query(mut params: HashMap<String, String>) -> Self {
        let mut take = |key: &str| params.remove(key).filter(|v| !v.is_empty());
        let limit = take(PER_PAGE_PARAM);
        let offset = take(PAGE_PARAM);
        let sort_column = take(SORT_FIELD_PARAM);
        let sort_direction = take(SORT_DIR_PARAM);
        ListParams {
            filters: params,
            limit,
            offset,
            sort_column,
            sort_direction,
        }
    }

    /// Limit and offset as non-negative integers; limit is clamped to `max_limit`.
    pub fn page(&self, max_limit: i64) -> Result<Page, AppError> {
        let limit = parse_non_negative("limit", self.limit.as_deref(), DEFAULT_LIMIT)?;
        let offset = parse_non_negative("offset", self.offset.as_deref(), DEFAULT_OFFSET)?;
        Ok(Page {
            limit: limit.min(max_limit),
            offset,
        })
    }

    pub fn sort(&self) -> Result<Sort, AppError> {
        let direction = match self.sort_direction.as_deref() {
            Some(d) => SortDirection::parse(d)?,
            None => SortDirection::Asc,
        };
        Ok(Sort {
            column: self.sort_column.clone().unwrap_or_else(|| ID_COLUMN.to_string()),
            direction,
        })
    }
}

fn parse_non_negative(name: &str, raw: Option<&str>, default: i64) -> Result<i64, AppError> {
    let Some(raw) = raw else { return Ok(default) };
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(AppError::Validation(format!(
            "{} must be a non-negative integer, got '{}'",
            name, raw
        ))),
    }
}

/// Values for a new row: every writable column, from the payload when present.
/// Absent text columns become empty text; absent typed columns use their default, else NULL.
fn new_row_values(schema: &TableSchema, payload: &Map<String, Value>) -> Vec<(String, BindValue)> {
    schema
        .writable_columns()
        .filter_map(|c| {
            let v = match payload.get(&c.name) {
                Some(v) => BindValue::from_json(v),
                None if c.kind == ColumnKind::Text => BindValue::Text(String::new()),
                None if c.has_default => return None,
                None => BindValue::Null,
            };
            Some((c.name.clone(), v))
        })
        .collect()
}

/// Overlay payload keys onto the current row. Keys that are not columns, and `id`, are ignored.
fn merge_payload(mut current: Row, payload: &Map<String, Value>) -> Row {
    for (key, v) in payload {
        if key == ID_COLUMN {
            continue;
        }
        if !current.set(key, CellValue::from_json(v)) {
            tracing::debug!(column = %key, "ignoring payload key that is not a column");
        }
    }
    current
}

fn row_binds(row: &Row) -> Vec<(String, BindValue)> {
    row.iter()
        .map(|(c, v)| (c.to_string(), BindValue::from(v)))
        .collect()
}

/// Operations the HTTP layer needs from the entity store.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// One page of rows plus the count of all rows matching the filters.
    async fn list(&self, entity: &str, params: &ListParams) -> Result<(Vec<Row>, i64), AppError>;

    async fn get(&self, entity: &str, id: &str) -> Result<Row, AppError>;

    /// Insert a row and return its generated id.
    async fn create(&self, entity: &str, payload: &Map<String, Value>) -> Result<i64, AppError>;

    /// Read-merge-write. Returns rows affected and the merged row.
    async fn update(
        &self,
        entity: &str,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<(u64, Row), AppError>;

    /// Rows affected; 0 means nothing matched.
    async fn delete(&self, entity: &str, id: &str) -> Result<u64, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// [`EntityRepository`] over a PostgreSQL pool. Holds no row state between calls.
#[derive(Clone)]
pub struct EntityManager {
    pool: PgPool,
    schemas: SchemaCache,
    max_page_size: i64,
}

impl EntityManager {
    pub fn new(pool: PgPool, schema_ttl: Duration, max_page_size: i64) -> Self {
        EntityManager {
            pool,
            schemas: SchemaCache::new(schema_ttl),
            max_page_size,
        }
    }

    pub fn from_settings(pool: PgPool, settings: &Settings) -> Self {
        Self::new(pool, settings.schema_cache_ttl, settings.max_page_size)
    }

    /// Columns of `entity` in table order.
    pub async fn columns(&self, entity: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let schema = self.schemas.get(&mut conn, entity).await?;
        Ok(schema.columns.iter().map(|c| c.name.clone()).collect())
    }

    async fn schema(&self, conn: &mut PgConnection, entity: &str) -> Result<Arc<TableSchema>, AppError> {
        self.schemas.get(conn, entity).await
    }

    /// Drop the cached schema when the database reports the table or a column missing.
    fn observe<T>(&self, entity: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            if matches!(e.sqlstate().as_deref(), Some(UNDEFINED_TABLE | UNDEFINED_COLUMN)) {
                self.schemas.invalidate(entity);
            }
        }
        result
    }

    async fn list_inner(&self, entity: &str, params: &ListParams) -> Result<(Vec<Row>, i64), AppError> {
        let page = params.page(self.max_page_size)?;
        let sort = params.sort()?;
        let mut conn = self.pool.acquire().await?;
        let schema = self.schema(&mut conn, entity).await?;
        let select = sql::select(&schema, &params.filters, &sort, page)?;
        let count = sql::count(&schema, &params.filters)?;
        let rows = reader::fetch_all(&mut conn, &select).await?;
        let total = reader::fetch_scalar(&mut conn, &count).await?;
        Ok((rows, total))
    }

    async fn get_inner(&self, entity: &str, id: &str) -> Result<Row, AppError> {
        let mut conn = self.pool.acquire().await?;
        let schema = self.schema(&mut conn, entity).await?;
        reader::fetch_one(&mut conn, &schema, id, false).await
    }

    async fn create_inner(&self, entity: &str, payload: &Map<String, Value>) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        let schema = self.schema(&mut conn, entity).await?;
        let values = new_row_values(&schema, payload);
        let q = sql::insert(&schema, &values)?;
        let id = reader::fetch_scalar(&mut conn, &q).await?;
        tracing::info!(entity = %entity, id, "entity created");
        Ok(id)
    }

    /// Locking read, merge and write in one transaction so concurrent updates of one id serialize.
    async fn update_inner(
        &self,
        entity: &str,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<(u64, Row), AppError> {
        let mut tx = self.pool.begin().await?;
        let schema = self.schema(&mut tx, entity).await?;
        let current = reader::fetch_one(&mut tx, &schema, id, true).await?;
        let merged = merge_payload(current, payload);
        let q = sql::update(&schema, id, &row_binds(&merged))?;
        let written = reader::fetch_all(&mut tx, &q).await?;
        tx.commit().await?;
        let affected = written.len() as u64;
        tracing::info!(entity = %entity, id = %id, affected, "entity updated");
        Ok((affected, written.into_iter().next().unwrap_or(merged)))
    }

    async fn delete_inner(&self, entity: &str, id: &str) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        let schema = self.schema(&mut conn, entity).await?;
        let q = sql::delete(&schema, id)?;
        let affected = reader::execute(&mut conn, &q).await?;
        tracing::info!(entity = %entity, id = %id, affected, "entity deleted");
        Ok(affected)
    }
}

#[async_trait]
impl EntityRepository for EntityManager {
    async fn list(&self, entity: &str, params: &ListParams) -> Result<(Vec<Row>, i64), AppError> {
        self.observe(entity, self.list_inner(entity, params).await)
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Row, AppError> {
        self.observe(entity, self.get_inner(entity, id).await)
    }

    async fn create(&self, entity: &str, payload: &Map<String, Value>) -> Result<i64, AppError> {
        self.observe(entity, self.create_inner(entity, payload).await)
    }

    async fn update(
        &self,
        entity: &str,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<(u64, Row), AppError> {
        self.observe(entity, self.update_inner(entity, id, payload).await)
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<u64, AppError> {
        self.observe(entity, self.delete_inner(entity, id).await)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
