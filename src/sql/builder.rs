//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE for an introspected table.

use crate::error::AppError;
use crate::schema::{ColumnInfo, ColumnKind, TableSchema};
use crate::sql::params::BindValue;
use std::collections::HashMap;

/// Column name to wildcard pattern. `*` matches any substring.
pub type Filters = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Case-insensitive `asc` / `desc`.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(AppError::Validation(format!("invalid sort direction '{}'", s)))
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: BindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a column value and return its placeholder cast to the column type.
    fn push_typed(&mut self, column: &ColumnInfo, v: BindValue) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, column.sql_type)
    }
}

/// Translate a filter value into a LIKE pattern: LIKE metacharacters are escaped, `*` becomes `%`.
pub fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(ch);
            }
            '*' => out.push('%'),
            c => out.push(c),
        }
    }
    out
}

fn column<'a>(schema: &'a TableSchema, name: &str) -> Result<&'a ColumnInfo, AppError> {
    schema
        .column(name)
        .ok_or_else(|| AppError::Validation(format!("unknown column '{}' for entity '{}'", name, schema.name)))
}

/// SELECT list: columns as-is, except types the normalizer does not read natively, which come back as text.
fn select_column_list(schema: &TableSchema) -> String {
    schema
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.kind == ColumnKind::Other {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE clause ANDing one LIKE per filter. Keys are emitted in sorted order.
fn where_clause(q: &mut QueryBuf, schema: &TableSchema, filters: &Filters) -> Result<String, AppError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut keys: Vec<&String> = filters.keys().collect();
    keys.sort();
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        let col = column(schema, key)?;
        let n = q.push_param(BindValue::Text(like_pattern(&filters[key])));
        parts.push(format!("{}::text LIKE ${}", quoted(&col.name), n));
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

/// Whether `id` fits the width of an integer column (`smallint`, `integer`, `bigint`).
fn fits_integer_column(column: &ColumnInfo, id: i64) -> bool {
    match column.sql_type.as_str() {
        "smallint" => i16::try_from(id).is_ok(),
        "integer" => i32::try_from(id).is_ok(),
        _ => true,
    }
}

/// `"id" = $n::<id type>`; for an integer id the value must parse as one.
/// An id wider than the column can match no row, so the predicate is `FALSE`.
fn id_predicate(q: &mut QueryBuf, schema: &TableSchema, id: &str) -> Result<String, AppError> {
    let id_col = schema.id_column()?;
    if id_col.kind == ColumnKind::Integer {
        let n = id
            .parse::<i64>()
            .map_err(|_| AppError::Validation(format!("invalid id '{}'", id)))?;
        if !fits_integer_column(id_col, n) {
            return Ok("FALSE".to_string());
        }
    }
    let ph = q.push_typed(id_col, BindValue::Text(id.to_string()));
    Ok(format!("{} = {}", quoted(&id_col.name), ph))
}

/// SELECT with optional filters, ORDER BY sort, LIMIT/OFFSET.
pub fn select(schema: &TableSchema, filters: &Filters, sort: &Sort, page: Page) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, schema, filters)?;
    let sort_col = column(schema, &sort.column)?;
    let limit = q.push_param(BindValue::BigInt(page.limit));
    let offset = q.push_param(BindValue::BigInt(page.offset));
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} {} LIMIT ${} OFFSET ${}",
        select_column_list(schema),
        quoted(&schema.name),
        where_sql,
        quoted(&sort_col.name),
        sort.direction.as_sql(),
        limit,
        offset
    );
    Ok(q)
}

/// Row count for the same filters as [`select`], without ordering or paging.
pub fn count(schema: &TableSchema, filters: &Filters) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, schema, filters)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(&schema.name), where_sql);
    Ok(q)
}

/// SELECT by id. `lock` adds FOR UPDATE for read-merge-write.
pub fn select_by_id(schema: &TableSchema, id: &str, lock: bool) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let pred = id_predicate(&mut q, schema, id)?;
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}{}",
        select_column_list(schema),
        quoted(&schema.name),
        pred,
        if lock { " FOR UPDATE" } else { "" }
    );
    Ok(q)
}

/// INSERT of the given columns, returning the generated id. `id` and generated columns are never written.
pub fn insert(schema: &TableSchema, values: &[(String, BindValue)]) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let id_col = schema.id_column()?;
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (name, v) in values {
        let c = column(schema, name)?;
        if !c.is_writable() {
            continue;
        }
        placeholders.push(q.push_typed(c, v.clone()));
        cols.push(quoted(&c.name));
    }
    let table = quoted(&schema.name);
    let returning = format!("{}::bigint", quoted(&id_col.name));
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    Ok(q)
}

/// UPDATE by id: SET every writable column of the given (merged) row, returning the stored row.
pub fn update(schema: &TableSchema, id: &str, row: &[(String, BindValue)]) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(row.len());
    for (name, v) in row {
        let c = column(schema, name)?;
        if !c.is_writable() {
            continue;
        }
        let rhs = q.push_typed(c, v.clone());
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    let table = quoted(&schema.name);
    let pred = id_predicate(&mut q, schema, id)?;
    let returning = select_column_list(schema);
    q.sql = if sets.is_empty() {
        // Nothing writable: return the stored row, one per match like RETURNING.
        format!("SELECT {} FROM {} WHERE {}", returning, table, pred)
    } else {
        format!("UPDATE {} SET {} WHERE {} RETURNING {}", table, sets.join(", "), pred, returning)
    };
    Ok(q)
}

/// DELETE by id.
pub fn delete(schema: &TableSchema, id: &str) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let pred = id_predicate(&mut q, schema, id)?;
    q.sql = format!("DELETE FROM {} WHERE {}", quoted(&schema.name), pred);
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::{column as col, user_schema};

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn sort_by_id() -> Sort {
        Sort {
            column: "id".into(),
            direction: SortDirection::Asc,
        }
    }

    #[test]
    fn select_without_filters_orders_and_pages() {
        let q = select(&user_schema(), &Filters::new(), &sort_by_id(), Page { limit: 10, offset: 20 }).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "id", "name", "email", "active", "created_at", "score"::text AS "score" FROM "user" ORDER BY "id" ASC LIMIT $1 OFFSET $2"#
        );
        assert_eq!(q.params, vec![BindValue::BigInt(10), BindValue::BigInt(20)]);
    }

    #[test]
    fn filters_are_like_predicates_in_key_order() {
        let f = filters(&[("name", "j*"), ("email", "*@example.com")]);
        let sort = Sort {
            column: "name".into(),
            direction: SortDirection::Desc,
        };
        let q = select(&user_schema(), &f, &sort, Page { limit: 2, offset: 0 }).unwrap();
        assert!(q
            .sql
            .contains(r#" WHERE "email"::text LIKE $1 AND "name"::text LIKE $2 ORDER BY "name" DESC LIMIT $3 OFFSET $4"#));
        assert_eq!(q.params[0], BindValue::Text("%@example.com".into()));
        assert_eq!(q.params[1], BindValue::Text("j%".into()));
    }

    #[test]
    fn count_shares_the_where_clause() {
        let f = filters(&[("active", "true")]);
        let q = count(&user_schema(), &f).unwrap();
        assert_eq!(q.sql, r#"SELECT COUNT(*) FROM "user" WHERE "active"::text LIKE $1"#);
        assert_eq!(q.params, vec![BindValue::Text("true".into())]);
    }

    #[test]
    fn unknown_filter_or_sort_column_is_rejected() {
        let f = filters(&[("nope", "x")]);
        assert!(matches!(count(&user_schema(), &f), Err(AppError::Validation(_))));
        let sort = Sort {
            column: "id; DROP TABLE user".into(),
            direction: SortDirection::Asc,
        };
        let r = select(&user_schema(), &Filters::new(), &sort, Page { limit: 1, offset: 0 });
        assert!(matches!(r, Err(AppError::Validation(_))));
    }

    #[test]
    fn like_pattern_only_treats_star_as_wildcard() {
        assert_eq!(like_pattern("j*"), "j%");
        assert_eq!(like_pattern("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(like_pattern("' OR 1=1 --"), "' OR 1=1 --");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted("user"), "\"user\"");
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
        let schema = TableSchema {
            name: "a\"b".into(),
            columns: vec![col("id", "bigint", "int8")],
        };
        let q = delete(&schema, "3").unwrap();
        assert_eq!(q.sql, r#"DELETE FROM "a""b" WHERE "id" = $1::bigint"#);
    }

    #[test]
    fn select_by_id_can_lock() {
        let q = select_by_id(&user_schema(), "1", true).unwrap();
        assert!(q.sql.ends_with(r#" FROM "user" WHERE "id" = $1::integer FOR UPDATE"#));
        assert_eq!(q.params, vec![BindValue::Text("1".into())]);
        let q = select_by_id(&user_schema(), "1", false).unwrap();
        assert!(!q.sql.contains("FOR UPDATE"));
    }

    #[test]
    fn non_numeric_integer_id_is_rejected() {
        assert!(matches!(select_by_id(&user_schema(), "abc", false), Err(AppError::Validation(_))));
        assert!(matches!(delete(&user_schema(), "1 OR 1=1"), Err(AppError::Validation(_))));
    }

    #[test]
    fn id_wider_than_the_column_matches_nothing() {
        let q = select_by_id(&user_schema(), "99999999999", true).unwrap();
        assert!(q.sql.ends_with(r#" FROM "user" WHERE FALSE FOR UPDATE"#));
        assert!(q.params.is_empty());
        let q = delete(&user_schema(), "-2147483649").unwrap();
        assert_eq!(q.sql, r#"DELETE FROM "user" WHERE FALSE"#);

        let small = TableSchema {
            name: "tag".into(),
            columns: vec![col("id", "smallint", "int2")],
        };
        assert!(delete(&small, "40000").unwrap().sql.ends_with("WHERE FALSE"));
        let big = TableSchema {
            name: "event".into(),
            columns: vec![col("id", "bigint", "int8")],
        };
        assert!(delete(&big, "99999999999").unwrap().sql.ends_with(r#""id" = $1::bigint"#));
    }

    #[test]
    fn insert_casts_values_and_skips_id() {
        let values = vec![
            ("id".to_string(), BindValue::Text("99".into())),
            ("name".to_string(), BindValue::Text("T".into())),
            ("active".to_string(), BindValue::Null),
        ];
        let q = insert(&user_schema(), &values).unwrap();
        assert_eq!(
            q.sql,
            r#"INSERT INTO "user" ("name", "active") VALUES ($1::character varying, $2::boolean) RETURNING "id"::bigint"#
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn insert_without_columns_uses_defaults() {
        let q = insert(&user_schema(), &[]).unwrap();
        assert_eq!(q.sql, r#"INSERT INTO "user" DEFAULT VALUES RETURNING "id"::bigint"#);
    }

    #[test]
    fn update_sets_full_row_and_binds_id_last() {
        let row = vec![
            ("id".to_string(), BindValue::Text("1".into())),
            ("name".to_string(), BindValue::Text("jane".into())),
            ("email".to_string(), BindValue::Text("a@b.com".into())),
        ];
        let q = update(&user_schema(), "1", &row).unwrap();
        assert!(q.sql.starts_with(
            r#"UPDATE "user" SET "name" = $1::character varying, "email" = $2::text WHERE "id" = $3::integer RETURNING "id""#
        ));
        assert_eq!(q.params[2], BindValue::Text("1".into()));
    }

    #[test]
    fn generated_columns_are_never_written() {
        let mut schema = user_schema();
        let mut slug = col("slug", "text", "text");
        slug.generated = true;
        schema.columns.push(slug);
        let row = vec![
            ("id".to_string(), BindValue::Text("1".into())),
            ("name".to_string(), BindValue::Text("jane".into())),
            ("slug".to_string(), BindValue::Text("jane".into())),
        ];
        let q = update(&schema, "1", &row).unwrap();
        assert!(q.sql.starts_with(r#"UPDATE "user" SET "name" = $1::character varying WHERE "id" = $2::integer"#));
        assert!(q.sql.ends_with(r#""slug""#));
        let q = update(&schema, "1", &row[..1]).unwrap();
        assert!(q.sql.starts_with(r#"SELECT "id", "name""#));
        assert!(q.sql.ends_with(r#"FROM "user" WHERE "id" = $1::integer"#));
        let q = insert(&schema, &row[1..]).unwrap();
        assert!(q.sql.starts_with(r#"INSERT INTO "user" ("name") VALUES"#));
    }
}
