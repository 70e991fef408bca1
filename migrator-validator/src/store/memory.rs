//! In-memory store accessor
//!
//! Keeps records in an id-ordered map behind a tokio `RwLock`, so tests and
//! dry runs can mutate it while a validation pass is reading it.

use super::{StoreAccessor, StoreResult};
use crate::entity::Entity;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredRow<T> {
    entity: T,
    /// Modification time, epoch milliseconds
    modified_at: i64,
}

/// Id-ordered in-memory store
#[derive(Debug)]
pub struct MemoryStore<T> {
    rows: RwLock<BTreeMap<i64, StoredRow<T>>>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a store from records, all stamped with `modified_at`
    pub fn with_rows(rows: impl IntoIterator<Item = T>, modified_at: i64) -> Self {
        let rows = rows
            .into_iter()
            .map(|entity| (entity.id(), StoredRow { entity, modified_at }))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Insert or replace a record
    pub async fn upsert(&self, entity: T, modified_at: i64) {
        self.rows
            .write()
            .await
            .insert(entity.id(), StoredRow { entity, modified_at });
    }

    /// Remove a record, returning it if it existed
    pub async fn remove(&self, id: i64) -> Option<T> {
        self.rows.write().await.remove(&id).map(|row| row.entity)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn passes(row: &StoredRow<impl Entity>, watermark: Option<i64>) -> bool {
    watermark.map_or(true, |w| row.modified_at >= w)
}

#[async_trait]
impl<T: Entity> StoreAccessor<T> for MemoryStore<T> {
    async fn find_at_offset(&self, offset: u64, watermark: Option<i64>) -> StoreResult<Option<T>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| passes(row, watermark))
            .nth(offset as usize)
            .map(|row| row.entity.clone()))
    }

    async fn find_page(
        &self,
        offset: u64,
        limit: usize,
        watermark: Option<i64>,
    ) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| passes(row, watermark))
            .skip(offset as usize)
            .take(limit)
            .map(|row| row.entity.clone())
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<T>> {
        Ok(self.rows.read().await.get(&id).map(|row| row.entity.clone()))
    }

    async fn find_ids(&self, offset: u64, limit: usize) -> StoreResult<Vec<i64>> {
        let rows = self.rows.read().await;
        Ok(rows.keys().skip(offset as usize).take(limit).copied().collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .map(|row| row.entity.clone())
            .collect())
    }

    async fn find_existing_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let rows = self.rows.read().await;
        Ok(ids.iter().copied().filter(|id| rows.contains_key(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(i64);

    impl Entity for Item {
        fn id(&self) -> i64 {
            self.0
        }

        fn equals(&self, other: &Self) -> bool {
            self == other
        }
    }

    #[tokio::test]
    async fn test_offsets_follow_id_order() {
        let store = MemoryStore::with_rows(vec![Item(30), Item(10), Item(20)], 0);

        assert_eq!(store.find_at_offset(0, None).await.unwrap(), Some(Item(10)));
        assert_eq!(store.find_at_offset(2, None).await.unwrap(), Some(Item(30)));
        assert_eq!(store.find_at_offset(3, None).await.unwrap(), None);
        assert_eq!(store.find_ids(1, 10).await.unwrap(), vec![20, 30]);
    }

    #[tokio::test]
    async fn test_watermark_filters_old_rows() {
        let store = MemoryStore::new();
        store.upsert(Item(1), 100).await;
        store.upsert(Item(2), 500).await;
        store.upsert(Item(3), 900).await;

        let page = store.find_page(0, 10, Some(500)).await.unwrap();
        assert_eq!(page, vec![Item(2), Item(3)]);
        assert_eq!(store.find_at_offset(0, Some(501)).await.unwrap(), Some(Item(3)));
    }

    #[tokio::test]
    async fn test_id_set_lookup_skips_missing() {
        let store = MemoryStore::with_rows(vec![Item(1), Item(3)], 0);

        assert_eq!(store.find_by_ids(&[1, 2, 3]).await.unwrap(), vec![Item(1), Item(3)]);
        assert_eq!(store.find_existing_ids(&[3, 4]).await.unwrap(), vec![3]);
        assert_eq!(store.remove(1).await, Some(Item(1)));
        assert_eq!(store.len().await, 1);
    }
}
