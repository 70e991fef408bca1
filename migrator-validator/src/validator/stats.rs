//! Per-run scan statistics

use migrator_common::events::InconsistentKind;
use std::time::Duration;
use uuid::Uuid;

/// Counters kept by one scanner during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows (forward) or ids (reverse) read from the scanner's primary store
    pub visited: u64,
    pub not_equal: u64,
    pub target_missing: u64,
    pub base_missing: u64,
    /// Failed reads logged and skipped under `ErrorPolicy::Skip`
    pub skipped_errors: u64,
    /// Reports the sink rejected
    pub failed_publications: u64,
}

impl ScanStats {
    pub(crate) fn record_report(&mut self, kind: InconsistentKind, delivered: bool) {
        match kind {
            InconsistentKind::NotEqual => self.not_equal += 1,
            InconsistentKind::TargetMissing => self.target_missing += 1,
            InconsistentKind::BaseMissing => self.base_missing += 1,
        }
        if !delivered {
            self.failed_publications += 1;
        }
    }

    /// Reports emitted, delivered or not
    pub fn reports(&self) -> u64 {
        self.not_equal + self.target_missing + self.base_missing
    }
}

/// Outcome of one successful `validate` call
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
    pub run_id: Uuid,
    pub forward: ScanStats,
    pub reverse: ScanStats,
    pub elapsed: Duration,
}

impl ValidationSummary {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            forward: ScanStats::default(),
            reverse: ScanStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn total_reports(&self) -> u64 {
        self.forward.reports() + self.reverse.reports()
    }
}
