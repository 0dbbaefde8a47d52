//! Statement execution and row materialization.

use crate::error::AppError;
use crate::schema::TableSchema;
use crate::sql::{bind_all, select_by_id, QueryBuf};
use crate::value::{row_from_pg, Row};
use sqlx::{PgConnection, Row as _};

/// Run a query and normalize every returned row.
pub async fn fetch_all(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
    tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
    let rows = bind_all(&q.sql, &q.params).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_from_pg).collect())
}

/// Fetch the row with the given id. Zero rows is `NotFound`, more than one is `DataIntegrity`.
pub async fn fetch_one(
    conn: &mut PgConnection,
    schema: &TableSchema,
    id: &str,
    lock: bool,
) -> Result<Row, AppError> {
    let q = select_by_id(schema, id, lock)?;
    let rows = fetch_all(conn, &q).await?;
    exactly_one(rows, &schema.name, id)
}

fn exactly_one(mut rows: Vec<Row>, entity: &str, id: &str) -> Result<Row, AppError> {
    match rows.len() {
        0 => Err(AppError::NotFound(format!("{} {}", entity, id))),
        1 => Ok(rows.remove(0)),
        n => Err(AppError::DataIntegrity(format!(
            "id lookup {} {} returned {} rows",
            entity, id, n
        ))),
    }
}

/// Run a query returning one bigint scalar (COUNT, INSERT ... RETURNING id).
pub async fn fetch_scalar(conn: &mut PgConnection, q: &QueryBuf) -> Result<i64, AppError> {
    tracing::debug!(sql = %q.sql, params = q.params.len(), "scalar");
    let row = bind_all(&q.sql, &q.params).fetch_one(&mut *conn).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

/// Run a statement and report rows affected.
pub async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
    tracing::debug!(sql = %q.sql, params = q.params.len(), "execute");
    let result = bind_all(&q.sql, &q.params).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
