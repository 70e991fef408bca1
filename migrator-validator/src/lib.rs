//! migrator-validator library - dual-source consistency validation
//!
//! Scans a base store and a target store that a live migration writes to
//! concurrently, and reports records that differ or exist on one side
//! only. The validator never writes to either store and never repairs
//! drift; reports go to a `ReportSink` for a downstream pipeline.

pub mod entity;
pub mod notifier;
pub mod store;
pub mod validator;

pub use entity::Entity;
pub use notifier::{BusSink, FanoutSink, JsonLinesSink, LogSink, Notifier, ReportSink, SinkError};
pub use store::{MemoryStore, SqliteStore, StoreAccessor, StoreError, StoreResult, TableRow};
pub use validator::{
    ErrorPolicy, ForwardStrategy, ScanDirection, ScanStats, ValidateError, ValidationSummary,
    Validator, ValidatorConfig,
};
