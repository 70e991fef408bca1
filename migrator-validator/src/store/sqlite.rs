//! SQLite store accessor
//!
//! Reads one table through a `sqlx::SqlitePool`. All connections opened
//! here are read-only. Table and column names are validated identifiers and
//! are always quoted in generated SQL; values are always bound.

use super::{StoreAccessor, StoreResult};
use crate::entity::Entity;
use async_trait::async_trait;
use migrator_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, QueryBuilder, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Default modification-time column used by the watermark filter
pub const DEFAULT_WATERMARK_COLUMN: &str = "utime";

/// Columns left out of `TableRow` comparisons unless configured otherwise
pub const DEFAULT_IGNORED_COLUMNS: &[&str] = &["utime", "ctime"];

/// Most ids bound into one `IN (...)` list (SQLite's default
/// `SQLITE_MAX_VARIABLE_NUMBER`); larger id sets are queried in chunks
pub const MAX_ID_SET_BINDS: usize = 32_766;

/// Connect to a database file in read-only mode
///
/// The file must already exist; the validator never creates a store.
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::Config(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Entity decodable from a SQLite row
pub trait SqliteRecord: Entity + Sized {
    /// Decode one row; `ignored` names columns excluded from comparison
    fn from_sqlite_row(row: &SqliteRow, ignored: &[String]) -> std::result::Result<Self, sqlx::Error>;
}

/// One SQLite column value, by storage class
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Generic row of any table with an integer `id` primary key
///
/// Every non-ignored column takes part in equality.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub id: i64,
    pub columns: BTreeMap<String, ColumnValue>,
}

impl Entity for TableRow {
    fn id(&self) -> i64 {
        self.id
    }

    fn equals(&self, other: &Self) -> bool {
        self.id == other.id && self.columns == other.columns
    }
}

impl SqliteRecord for TableRow {
    fn from_sqlite_row(row: &SqliteRow, ignored: &[String]) -> std::result::Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        let mut columns = BTreeMap::new();

        for column in row.columns() {
            let name = column.name();
            if name == "id" || ignored.iter().any(|c| c == name) {
                continue;
            }

            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;
            let value = if raw.is_null() {
                ColumnValue::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => ColumnValue::Integer(row.try_get_unchecked(index)?),
                    "REAL" => ColumnValue::Real(row.try_get_unchecked(index)?),
                    "BLOB" => ColumnValue::Blob(row.try_get_unchecked(index)?),
                    _ => ColumnValue::Text(row.try_get_unchecked(index)?),
                }
            };
            columns.insert(name.to_string(), value);
        }

        Ok(TableRow { id, columns })
    }
}

/// Read-only accessor over one SQLite table
pub struct SqliteStore<T> {
    pool: SqlitePool,
    table: String,
    watermark_column: String,
    ignored_columns: Arc<[String]>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table.clone(),
            watermark_column: self.watermark_column.clone(),
            ignored_columns: Arc::clone(&self.ignored_columns),
            _entity: PhantomData,
        }
    }
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*` only
fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid {} name: {:?}", kind, name)))
    }
}

impl<T: SqliteRecord> SqliteStore<T> {
    pub fn new(pool: SqlitePool, table: &str) -> Result<Self> {
        validate_identifier("table", table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            watermark_column: DEFAULT_WATERMARK_COLUMN.to_string(),
            ignored_columns: DEFAULT_IGNORED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            _entity: PhantomData,
        })
    }

    /// Column compared against the watermark
    pub fn with_watermark_column(mut self, column: &str) -> Result<Self> {
        validate_identifier("column", column)?;
        self.watermark_column = column.to_string();
        Ok(self)
    }

    /// Replace the set of columns excluded from comparison
    pub fn with_ignored_columns(mut self, columns: Vec<String>) -> Self {
        self.ignored_columns = columns.into();
        self
    }

    fn select_ordered(&self, watermark: Option<i64>) -> String {
        match watermark {
            Some(_) => format!(
                "SELECT * FROM \"{}\" WHERE \"{}\" >= ? ORDER BY id LIMIT ? OFFSET ?",
                self.table, self.watermark_column
            ),
            None => format!(
                "SELECT * FROM \"{}\" ORDER BY id LIMIT ? OFFSET ?",
                self.table
            ),
        }
    }

    fn decode(&self, row: &SqliteRow) -> StoreResult<T> {
        Ok(T::from_sqlite_row(row, &self.ignored_columns)?)
    }

    async fn fetch_ordered(
        &self,
        offset: u64,
        limit: usize,
        watermark: Option<i64>,
    ) -> StoreResult<Vec<SqliteRow>> {
        let sql = self.select_ordered(watermark);
        let mut query = sqlx::query(&sql);
        if let Some(watermark) = watermark {
            query = query.bind(watermark);
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl<T: SqliteRecord> StoreAccessor<T> for SqliteStore<T> {
    async fn find_at_offset(&self, offset: u64, watermark: Option<i64>) -> StoreResult<Option<T>> {
        let rows = self.fetch_ordered(offset, 1, watermark).await?;
        rows.first().map(|row| self.decode(row)).transpose()
    }

    async fn find_page(
        &self,
        offset: u64,
        limit: usize,
        watermark: Option<i64>,
    ) -> StoreResult<Vec<T>> {
        let rows = self.fetch_ordered(offset, limit, watermark).await?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<T>> {
        let sql = format!("SELECT * FROM \"{}\" WHERE id = ?", self.table);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(|row| self.decode(row)).transpose()
    }

    async fn find_ids(&self, offset: u64, limit: usize) -> StoreResult<Vec<i64>> {
        let sql = format!("SELECT id FROM \"{}\" ORDER BY id LIMIT ? OFFSET ?", self.table);
        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<T>> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_ID_SET_BINDS) {
            let mut builder = id_set_query("*", &self.table, chunk);
            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                found.push(self.decode(row)?);
            }
        }
        Ok(found)
    }

    async fn find_existing_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_ID_SET_BINDS) {
            let mut builder = id_set_query("id", &self.table, chunk);
            let ids = builder
                .build_query_scalar::<i64>()
                .fetch_all(&self.pool)
                .await?;
            found.extend(ids);
        }
        Ok(found)
    }
}

/// `SELECT <projection> FROM "<table>" WHERE id IN (?, ?, ...)`
fn id_set_query<'a>(projection: &str, table: &str, ids: &'a [i64]) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM \"{}\" WHERE id IN (",
        projection, table
    ));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    builder
}
