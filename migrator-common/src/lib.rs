//! # Migrator Common Library
//!
//! Shared code for the migration tooling:
//! - Error type and result alias
//! - Configuration loading (TOML file + environment + defaults)
//! - Inconsistency report types and the `ReportBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{InconsistentKind, InconsistentReport, ReportBus};
