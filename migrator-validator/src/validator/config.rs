//! Validation run configuration

use super::ValidateError;
use migrator_common::config::ValidatorSection;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How the forward scanner walks the base store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardStrategy {
    /// One base row per read, one target lookup per row
    #[default]
    RowByRow,
    /// One page of base rows per read, one id-set lookup per page
    Batched,
}

impl FromStr for ForwardStrategy {
    type Err = ValidateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "row" | "row-by-row" => Ok(ForwardStrategy::RowByRow),
            "batch" | "batched" => Ok(ForwardStrategy::Batched),
            other => Err(ValidateError::Config(format!(
                "unknown forward strategy {:?} (expected row or batch)",
                other
            ))),
        }
    }
}

impl fmt::Display for ForwardStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardStrategy::RowByRow => f.write_str("row"),
            ForwardStrategy::Batched => f.write_str("batch"),
        }
    }
}

/// What a scanner does when a store read fails
///
/// Timeouts, cancellation and end of data are never failures under either
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log, skip the row or page, keep scanning
    #[default]
    Skip,
    /// Fail the run on the first store error
    Abort,
}

impl FromStr for ErrorPolicy {
    type Err = ValidateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ErrorPolicy::Skip),
            "abort" => Ok(ErrorPolicy::Abort),
            other => Err(ValidateError::Config(format!(
                "unknown error policy {:?} (expected skip or abort)",
                other
            ))),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Skip => f.write_str("skip"),
            ErrorPolicy::Abort => f.write_str("abort"),
        }
    }
}

/// Settings shared by every `validate` call of one validator
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Page size for page-oriented reads
    pub batch_size: usize,
    /// Modification-time lower bound, epoch milliseconds; `None` = full scan
    pub watermark: Option<i64>,
    /// Zero ends the forward scan when data runs out; otherwise it tails
    pub poll_interval: Duration,
    /// Label carried by every report
    pub direction: String,
    /// Deadline for every individual store read
    pub read_timeout: Duration,
    pub forward_strategy: ForwardStrategy,
    pub error_policy: ErrorPolicy,
}

impl ValidatorConfig {
    /// Full one-shot scan with default batch size and timeout
    pub fn new(direction: impl Into<String>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            watermark: None,
            poll_interval: Duration::ZERO,
            direction: direction.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            forward_strategy: ForwardStrategy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn watermark(mut self, watermark: i64) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn forward_strategy(mut self, strategy: ForwardStrategy) -> Self {
        self.forward_strategy = strategy;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Whether the forward scanner re-polls instead of finishing
    pub fn is_tailing(&self) -> bool {
        !self.poll_interval.is_zero()
    }

    /// Apply a `[validator]` TOML section on top of the defaults
    pub fn from_section(section: &ValidatorSection) -> Result<Self, ValidateError> {
        let mut config = Self::new(section.direction.clone().unwrap_or_default());
        if let Some(batch_size) = section.batch_size {
            config.batch_size = batch_size;
        }
        config.watermark = section.watermark;
        if let Some(ms) = section.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = section.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(strategy) = &section.strategy {
            config.forward_strategy = strategy.parse()?;
        }
        if let Some(policy) = &section.error_policy {
            config.error_policy = policy.parse()?;
        }
        Ok(config)
    }

    /// Reject settings no scan can run with
    pub fn check(&self) -> Result<(), ValidateError> {
        if self.batch_size == 0 {
            return Err(ValidateError::Config("batch size must be at least 1".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(ValidateError::Config("read timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::new("a->b");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.watermark, None);
        assert!(!config.is_tailing());
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.forward_strategy, ForwardStrategy::RowByRow);
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_from_section_overrides() {
        let section = ValidatorSection {
            batch_size: Some(20),
            watermark: Some(1_000),
            poll_interval_ms: Some(250),
            direction: Some("old->new".into()),
            strategy: Some("batch".into()),
            error_policy: Some("ABORT".into()),
            ..Default::default()
        };
        let config = ValidatorConfig::from_section(&section).unwrap();

        assert_eq!(config.batch_size, 20);
        assert_eq!(config.watermark, Some(1_000));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.is_tailing());
        assert_eq!(config.direction, "old->new");
        assert_eq!(config.forward_strategy, ForwardStrategy::Batched);
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!("sideways".parse::<ForwardStrategy>().is_err());
        assert!("retry".parse::<ErrorPolicy>().is_err());
        assert_eq!("row".parse::<ForwardStrategy>().unwrap().to_string(), "row");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ValidatorConfig::new("a->b").batch_size(0);
        assert!(matches!(config.check(), Err(ValidateError::Config(_))));
    }
}
