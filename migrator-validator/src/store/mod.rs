//! Store accessors: read-only, paginated access to one data store
//!
//! The validator never writes through an accessor. Each store (base and
//! target) gets its own accessor; both must agree on the entity type.

use crate::entity::Entity;
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{connect_readonly, ColumnValue, SqliteRecord, SqliteStore, TableRow};

/// Result type for store reads
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure of one store read
///
/// Exhaustion is not an error: single-record reads return `Ok(None)` and
/// page reads return an empty or short page.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The read did not finish within its deadline
    #[error("store read timed out")]
    Timeout,

    /// The run was cancelled while the read was in flight
    #[error("store read cancelled")]
    Cancelled,

    /// Database driver error
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Any other transport or backend failure
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Timeout or cancellation: a benign stop rather than a failed read
    pub fn is_interrupt(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Cancelled)
    }
}

impl From<sqlx::Error> for StoreError {
    /// Driver errors meaning "deadline exceeded" become `Timeout`
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            other => StoreError::Database(other),
        }
    }
}

/// Read capability against one store
///
/// Offsets index the store's rows ordered by id. The optional watermark is
/// a modification-time lower bound (epoch milliseconds); `None` scans
/// every row.
#[async_trait]
pub trait StoreAccessor<T: Entity>: Send + Sync {
    /// One record at `offset`, ordered by id
    async fn find_at_offset(&self, offset: u64, watermark: Option<i64>) -> StoreResult<Option<T>>;

    /// Up to `limit` records starting at `offset`, ordered by id
    async fn find_page(
        &self,
        offset: u64,
        limit: usize,
        watermark: Option<i64>,
    ) -> StoreResult<Vec<T>>;

    /// One record by id
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<T>>;

    /// Up to `limit` ids starting at `offset` (id projection only)
    async fn find_ids(&self, offset: u64, limit: usize) -> StoreResult<Vec<i64>>;

    /// Every record whose id is in `ids`; missing ids are simply absent
    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<T>>;

    /// The subset of `ids` present in this store
    ///
    /// Accessors able to project ids only should override this.
    async fn find_existing_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let found = self.find_by_ids(ids).await?;
        Ok(found.iter().map(Entity::id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_classification() {
        assert!(StoreError::Timeout.is_interrupt());
        assert!(StoreError::Cancelled.is_interrupt());
        assert!(!StoreError::Backend("connection reset".into()).is_interrupt());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_interrupt());
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Timeout
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Database(_)
        ));
    }
}
