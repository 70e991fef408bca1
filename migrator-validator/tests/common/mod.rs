//! Shared fixtures for validator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use migrator_common::events::{InconsistentKind, InconsistentReport};
use migrator_validator::{Entity, MemoryStore, ReportSink, SinkError, StoreAccessor, StoreError, StoreResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test entity; `utime` is volatile and ignored by `equals`
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub utime: i64,
}

impl Article {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            utime: 0,
        }
    }
}

impl Entity for Article {
    fn id(&self) -> i64 {
        self.id
    }

    fn equals(&self, other: &Self) -> bool {
        self.id == other.id && self.title == other.title
    }
}

pub fn articles(ids: &[i64]) -> Vec<Article> {
    ids.iter().map(|&id| Article::new(id, &format!("article {}", id))).collect()
}

/// Sink remembering every report it accepted
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<InconsistentReport>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<InconsistentReport> {
        self.reports.lock().unwrap().clone()
    }

    /// (id, kind) pairs, duplicates collapsed
    pub fn pairs(&self) -> BTreeSet<(i64, InconsistentKind)> {
        self.reports().iter().map(|r| (r.id, r.kind)).collect()
    }

    pub fn count(&self, id: i64, kind: InconsistentKind) -> usize {
        self.reports()
            .iter()
            .filter(|r| r.id == id && r.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.reports.lock().unwrap().clear();
    }
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Wraps a `MemoryStore`, counting reads and injecting failures
pub struct InstrumentedStore<T> {
    inner: Arc<MemoryStore<T>>,
    pub offset_reads: AtomicU64,
    pub not_found_reads: AtomicU64,
    pub id_set_reads: AtomicU64,
    failing_offsets: Mutex<HashSet<u64>>,
    failing_ids: Mutex<HashSet<i64>>,
    fail_id_sets: AtomicBool,
    lookup_delay: Mutex<Option<Duration>>,
    offset_delays: Mutex<HashMap<u64, Duration>>,
    id_page_delay: Mutex<Option<Duration>>,
}

impl<T: Entity> InstrumentedStore<T> {
    pub fn new(inner: Arc<MemoryStore<T>>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            offset_reads: AtomicU64::new(0),
            not_found_reads: AtomicU64::new(0),
            id_set_reads: AtomicU64::new(0),
            failing_offsets: Mutex::new(HashSet::new()),
            failing_ids: Mutex::new(HashSet::new()),
            fail_id_sets: AtomicBool::new(false),
            lookup_delay: Mutex::new(None),
            offset_delays: Mutex::new(HashMap::new()),
            id_page_delay: Mutex::new(None),
        })
    }

    /// `find_at_offset` fails at this offset
    pub fn fail_offset(&self, offset: u64) {
        self.failing_offsets.lock().unwrap().insert(offset);
    }

    /// `find_by_id` fails for this id
    pub fn fail_id(&self, id: i64) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    /// Every id-set lookup fails
    pub fn fail_id_sets(&self) {
        self.fail_id_sets.store(true, Ordering::SeqCst);
    }

    /// `find_by_id` sleeps this long before answering
    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    /// `find_at_offset` and `find_page` sleep this long before reading at this offset
    pub fn delay_offset(&self, offset: u64, delay: Duration) {
        self.offset_delays.lock().unwrap().insert(offset, delay);
    }

    /// `find_ids` sleeps this long before answering
    pub fn delay_id_pages(&self, delay: Duration) {
        *self.id_page_delay.lock().unwrap() = Some(delay);
    }

    fn injected() -> StoreError {
        StoreError::Backend("injected failure".to_string())
    }
}

#[async_trait]
impl<T: Entity> StoreAccessor<T> for InstrumentedStore<T> {
    async fn find_at_offset(&self, offset: u64, watermark: Option<i64>) -> StoreResult<Option<T>> {
        self.offset_reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.offset_delays.lock().unwrap().get(&offset).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_offsets.lock().unwrap().contains(&offset) {
            return Err(Self::injected());
        }
        let found = self.inner.find_at_offset(offset, watermark).await?;
        if found.is_none() {
            self.not_found_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn find_page(&self, offset: u64, limit: usize, watermark: Option<i64>) -> StoreResult<Vec<T>> {
        let delay = self.offset_delays.lock().unwrap().get(&offset).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_page(offset, limit, watermark).await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<T>> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_ids.lock().unwrap().contains(&id) {
            return Err(Self::injected());
        }
        self.inner.find_by_id(id).await
    }

    async fn find_ids(&self, offset: u64, limit: usize) -> StoreResult<Vec<i64>> {
        let delay = *self.id_page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_ids(offset, limit).await
    }

    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<T>> {
        self.id_set_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_id_sets.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.find_by_ids(ids).await
    }

    async fn find_existing_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        self.id_set_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_id_sets.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.find_existing_ids(ids).await
    }
}
