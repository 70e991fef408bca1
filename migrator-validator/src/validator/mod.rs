//! Dual-source validation: forward and reverse scanners plus orchestration
//!
//! `Validator::validate` runs two tasks concurrently:
//! - forward (base → target): reports `TargetMissing` and `NotEqual`
//! - reverse (target → base): reports `BaseMissing`
//!
//! The two tasks read independent, possibly mutually inconsistent snapshots
//! of stores that the migration keeps writing to. Detection is eventual
//! across repeated passes, not transactional.
//!
//! Offset pagination is not monotonic under concurrent inserts: a row
//! inserted below an offset already visited is not revisited in the same
//! run. It is picked up by the next run.

mod config;
mod forward;
mod reverse;
mod stats;

pub use config::{ErrorPolicy, ForwardStrategy, ValidatorConfig, DEFAULT_BATCH_SIZE, DEFAULT_READ_TIMEOUT};
pub use stats::{ScanStats, ValidationSummary};

use crate::entity::Entity;
use crate::notifier::{Notifier, ReportSink};
use crate::store::{StoreAccessor, StoreError, StoreResult};
use migrator_common::events::InconsistentKind;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Which scanner an error or statistic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// base → target
    Forward,
    /// target → base
    Reverse,
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanDirection::Forward => f.write_str("base => target"),
            ScanDirection::Reverse => f.write_str("target => base"),
        }
    }
}

/// Failure of a whole validation run
///
/// Under `ErrorPolicy::Skip` scanners never return `Store`; a successful
/// run says nothing about whether drift was found.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("{scanner} scan failed: {source}")]
    Store {
        scanner: ScanDirection,
        #[source]
        source: StoreError,
    },

    #[error("scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid validator configuration: {0}")]
    Config(String),
}

/// Everything one scanner needs for one run
pub(crate) struct ScanContext<T: Entity> {
    pub(crate) base: Arc<dyn StoreAccessor<T>>,
    pub(crate) target: Arc<dyn StoreAccessor<T>>,
    pub(crate) config: Arc<ValidatorConfig>,
    pub(crate) notifier: Notifier,
    pub(crate) cancel: CancellationToken,
}

impl<T: Entity> ScanContext<T> {
    /// Run one store read under the read timeout and the run's cancellation
    pub(crate) async fn bounded<R>(&self, read: impl Future<Output = StoreResult<R>>) -> StoreResult<R> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = tokio::time::timeout(self.config.read_timeout, read) => {
                result.unwrap_or(Err(StoreError::Timeout))
            }
        }
    }

    /// Sleep one poll interval; `false` if the run was cancelled meanwhile
    pub(crate) async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.poll_interval) => true,
        }
    }

    pub(crate) async fn report(&self, id: i64, kind: InconsistentKind, stats: &mut ScanStats) {
        let delivered = self.notifier.notify(id, kind).await;
        stats.record_report(kind, delivered);
    }

    /// Apply the error policy to a failed read
    pub(crate) fn skip_or_abort(
        &self,
        scanner: ScanDirection,
        operation: &str,
        err: StoreError,
        stats: &mut ScanStats,
    ) -> Result<(), ValidateError> {
        match self.config.error_policy {
            ErrorPolicy::Skip => {
                error!(
                    direction = %self.config.direction,
                    scanner = %scanner,
                    operation,
                    error = %err,
                    "Store read failed, skipping"
                );
                stats.skipped_errors += 1;
                Ok(())
            }
            ErrorPolicy::Abort => Err(ValidateError::Store {
                scanner,
                source: err,
            }),
        }
    }
}

/// Consistency validator for one (entity type, base store, target store) triple
///
/// Stateless across calls: every `validate` starts at offset zero.
pub struct Validator<T: Entity> {
    base: Arc<dyn StoreAccessor<T>>,
    target: Arc<dyn StoreAccessor<T>>,
    sink: Arc<dyn ReportSink>,
    config: Arc<ValidatorConfig>,
}

impl<T: Entity> Clone for Validator<T> {
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            target: Arc::clone(&self.target),
            sink: Arc::clone(&self.sink),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Entity> Validator<T> {
    pub fn new(
        base: Arc<dyn StoreAccessor<T>>,
        target: Arc<dyn StoreAccessor<T>>,
        sink: Arc<dyn ReportSink>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            base,
            target,
            sink,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run the forward and reverse scanners concurrently and join them
    ///
    /// Cancelling `cancel` stops both scanners cleanly; the call then
    /// returns `Ok` with whatever was covered. Returns the first error
    /// either scanner raised; the sibling is cancelled when that happens.
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<ValidationSummary, ValidateError> {
        self.config.check()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("validate", %run_id, direction = %self.config.direction);
        self.run(run_id, cancel.child_token()).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, run_token: CancellationToken) -> Result<ValidationSummary, ValidateError> {
        let started = Instant::now();
        info!(
            batch_size = self.config.batch_size,
            watermark = ?self.config.watermark,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            strategy = %self.config.forward_strategy,
            error_policy = %self.config.error_policy,
            "Starting validation"
        );

        let ctx = Arc::new(ScanContext {
            base: Arc::clone(&self.base),
            target: Arc::clone(&self.target),
            config: Arc::clone(&self.config),
            notifier: Notifier::new(self.config.direction.clone(), run_id, Arc::clone(&self.sink)),
            cancel: run_token.clone(),
        });

        let mut tasks = JoinSet::new();
        let forward_ctx = Arc::clone(&ctx);
        tasks.spawn(
            async move { (ScanDirection::Forward, forward::scan(&forward_ctx).await) }
                .in_current_span(),
        );
        let reverse_ctx = Arc::clone(&ctx);
        tasks.spawn(
            async move { (ScanDirection::Reverse, reverse::scan(&reverse_ctx).await) }
                .in_current_span(),
        );

        let mut summary = ValidationSummary::new(run_id);
        let mut first_error: Option<ValidateError> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((ScanDirection::Forward, Ok(stats))) => {
                    summary.forward = stats;
                    continue;
                }
                Ok((ScanDirection::Reverse, Ok(stats))) => {
                    summary.reverse = stats;
                    continue;
                }
                Ok((_, Err(e))) => e,
                Err(join_error) => ValidateError::Task(join_error),
            };

            error!(error = %outcome, "Validation scanner failed");
            if first_error.is_none() {
                run_token.cancel();
                first_error = Some(outcome);
            }
        }

        summary.elapsed = started.elapsed();
        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    forward_visited = summary.forward.visited,
                    reverse_visited = summary.reverse.visited,
                    reports = summary.total_reports(),
                    skipped_errors = summary.forward.skipped_errors + summary.reverse.skipped_errors,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Validation finished"
                );
                Ok(summary)
            }
        }
    }
}
