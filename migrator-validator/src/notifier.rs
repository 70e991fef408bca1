//! Best-effort emission of inconsistency reports
//!
//! A failed publication is logged and dropped. There is no retry and no
//! buffering: drift missed by one pass is caught by a later pass.

use async_trait::async_trait;
use migrator_common::events::{InconsistentKind, InconsistentReport, ReportBus};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Failure to hand one report to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no subscriber is listening for reports")]
    NoSubscribers,

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for inconsistency reports
///
/// A single sink may be shared by many validators at once.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError>;
}

/// Publishes reports onto a `ReportBus`
#[derive(Clone)]
pub struct BusSink {
    bus: ReportBus,
}

impl BusSink {
    pub fn new(bus: ReportBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ReportSink for BusSink {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError> {
        self.bus
            .emit(report.clone())
            .map(|_| ())
            .map_err(|_| SinkError::NoSubscribers)
    }
}

/// Writes every report as a structured warning
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError> {
        warn!(
            direction = %report.direction,
            id = report.id,
            kind = %report.kind,
            run_id = %report.run_id,
            "Inconsistent record"
        );
        Ok(())
    }
}

/// Appends each report as one JSON line to a writer
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer, e.g. to inspect what was written
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for JsonLinesSink<W> {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Publishes to every inner sink; fails if any of them fails
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ReportSink for FanoutSink {
    async fn publish(&self, report: &InconsistentReport) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(report).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Emits reports for one validation run
#[derive(Clone)]
pub struct Notifier {
    direction: String,
    run_id: Uuid,
    sink: Arc<dyn ReportSink>,
}

impl Notifier {
    pub fn new(direction: impl Into<String>, run_id: Uuid, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            direction: direction.into(),
            run_id,
            sink,
        }
    }

    /// Publish one report, returning whether the sink accepted it
    pub async fn notify(&self, id: i64, kind: InconsistentKind) -> bool {
        let report = InconsistentReport::new(self.direction.clone(), id, kind, self.run_id);
        match self.sink.publish(&report).await {
            Ok(()) => {
                debug!(direction = %self.direction, id, kind = %kind, "Reported inconsistency");
                true
            }
            Err(e) => {
                error!(
                    direction = %self.direction,
                    id,
                    kind = %kind,
                    error = %e,
                    "Failed to publish inconsistency report"
                );
                false
            }
        }
    }
}
