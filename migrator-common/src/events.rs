//! Inconsistency report types and the report bus
//!
//! Reports are produced by the validator whenever the two stores disagree
//! about one record. They are fire-and-forget: the bus never buffers for
//! late subscribers and nothing here persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of drift detected for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistentKind {
    /// Present in both stores, contents differ
    NotEqual,
    /// Present in base, absent from target
    TargetMissing,
    /// Present in target, absent from base
    BaseMissing,
}

impl InconsistentKind {
    /// Stable string form, matching the serialized representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistentKind::NotEqual => "not_equal",
            InconsistentKind::TargetMissing => "target_missing",
            InconsistentKind::BaseMissing => "base_missing",
        }
    }
}

impl std::fmt::Display for InconsistentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected inconsistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InconsistentReport {
    /// Free-form label naming the migration direction, e.g. `store-a->store-b`
    pub direction: String,
    /// Entity id the report is about
    pub id: i64,
    pub kind: InconsistentKind,
    /// Validation run that produced the report
    pub run_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

impl InconsistentReport {
    /// Build a report stamped with the current time
    pub fn new(direction: impl Into<String>, id: i64, kind: InconsistentKind, run_id: Uuid) -> Self {
        Self {
            direction: direction.into(),
            id,
            kind,
            run_id,
            detected_at: Utc::now(),
        }
    }
}

/// Broadcast bus carrying inconsistency reports to any number of subscribers
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block validators)
/// - Multiple concurrent publishers and subscribers
/// - Lagged subscribers lose the oldest reports
///
/// # Examples
///
/// ```
/// use migrator_common::events::{InconsistentKind, InconsistentReport, ReportBus};
///
/// let bus = ReportBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit(InconsistentReport::new("a->b", 7, InconsistentKind::TargetMissing, uuid::Uuid::new_v4()))
///     .ok();
///
/// let report = rx.try_recv().unwrap();
/// assert_eq!(report.id, 7);
/// ```
#[derive(Clone)]
pub struct ReportBus {
    tx: broadcast::Sender<InconsistentReport>,
    capacity: usize,
}

impl ReportBus {
    /// Creates a new bus buffering up to `capacity` reports per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future reports
    pub fn subscribe(&self) -> broadcast::Receiver<InconsistentReport> {
        self.tx.subscribe()
    }

    /// Emit a report to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        report: InconsistentReport,
    ) -> Result<usize, broadcast::error::SendError<InconsistentReport>> {
        self.tx.send(report)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
