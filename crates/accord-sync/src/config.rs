//! Run configuration and per-run options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use accord_connector::filter::DataFilter;
use accord_connector::resilience::{BackoffStrategy, RetryPolicy};
use accord_transform::types::TransformationPipeline;

use crate::error::{EngineResult, SyncError};
use crate::types::ResolutionStrategy;

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_resolution() -> ResolutionStrategy {
    ResolutionStrategy::Manual
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Delay growth for per-record retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Same delay on every attempt.
    Fixed,
    /// Delay multiplied per attempt, capped at `max_delay_ms`.
    Exponential {
        /// Growth factor per attempt.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        /// Upper bound for a single delay.
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

impl Default for RetryBackoff {
    fn default() -> Self {
        RetryBackoff::Exponential {
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Tuning knobs for a synchronization run.
///
/// Every field has a serde default, so `serde_json::from_str("{}")`
/// yields the same configuration as [`SyncConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records per fetch page and per reconciliation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent record applies within a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Retry attempts for transient per-record failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial delay between retries.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay growth across retries.
    #[serde(default)]
    pub backoff: RetryBackoff,
    /// Run-level timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Strategy applied when a conflict is detected.
    #[serde(default = "default_resolution")]
    pub default_resolution: ResolutionStrategy,
    /// Fetch-call budget. `None` disables rate limiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
    /// Clock-skew tolerance for conflict detection. Zero keeps strict
    /// timestamp comparison.
    #[serde(default)]
    pub conflict_skew_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: RetryBackoff::default(),
            timeout_ms: default_timeout_ms(),
            default_resolution: default_resolution(),
            rate_limit_per_minute: None,
            conflict_skew_ms: 0,
        }
    }
}

impl SyncConfig {
    /// Check that this configuration is usable.
    pub fn validate(&self) -> EngineResult<()> {
        if self.batch_size < 1 || self.batch_size > 10_000 {
            return Err(SyncError::invalid_config(
                "batch_size must be between 1 and 10000",
            ));
        }
        if self.concurrency < 1 || self.concurrency > 100 {
            return Err(SyncError::invalid_config(
                "concurrency must be between 1 and 100",
            ));
        }
        if self.timeout_ms < 1000 {
            return Err(SyncError::invalid_config(
                "timeout_ms must be at least 1000",
            ));
        }
        if self.rate_limit_per_minute == Some(0) {
            return Err(SyncError::invalid_config(
                "rate_limit_per_minute must be at least 1",
            ));
        }
        if let RetryBackoff::Exponential { multiplier, .. } = self.backoff {
            if multiplier < 1.0 {
                return Err(SyncError::invalid_config(
                    "backoff multiplier must be at least 1.0",
                ));
            }
        }
        Ok(())
    }

    /// Run-level timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Clock-skew tolerance as a `chrono` duration.
    #[must_use]
    pub fn conflict_skew(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.conflict_skew_ms).unwrap_or(i64::MAX))
    }

    /// Retry policy for per-record connector and store calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            RetryBackoff::Fixed => BackoffStrategy::Fixed,
            RetryBackoff::Exponential {
                multiplier,
                max_delay_ms,
            } => BackoffStrategy::Exponential {
                multiplier,
                max_delay: Duration::from_millis(max_delay_ms),
            },
        };
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            backoff,
            jitter: true,
        }
    }
}

/// Everything a single run needs beyond the engine's fixed collaborators.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Logical record type this run reconciles.
    pub data_type: String,
    /// Tuning knobs.
    pub config: SyncConfig,
    /// Predicates passed to the connector on every fetch.
    pub filters: Vec<DataFilter>,
    /// Pipeline applied to remote fields before comparison and writes.
    pub pipeline: Option<TransformationPipeline>,
    /// Per-run override of `config.default_resolution`.
    pub resolution: Option<ResolutionStrategy>,
}

impl SyncOptions {
    /// Options for one record type with default configuration.
    #[must_use]
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            config: SyncConfig::default(),
            filters: Vec::new(),
            pipeline: None,
            resolution: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a fetch filter.
    #[must_use]
    pub fn with_filter(mut self, filter: DataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Attach a transformation pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: TransformationPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Override the conflict resolution strategy for this run.
    #[must_use]
    pub fn with_resolution(mut self, resolution: ResolutionStrategy) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// The strategy in effect for this run.
    #[must_use]
    pub fn effective_resolution(&self) -> ResolutionStrategy {
        self.resolution.unwrap_or(self.config.default_resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_matches_default() {
        let parsed: SyncConfig = serde_json::from_str("{}").unwrap();
        let default = SyncConfig::default();
        assert_eq!(parsed.batch_size, default.batch_size);
        assert_eq!(parsed.concurrency, default.concurrency);
        assert_eq!(parsed.timeout_ms, default.timeout_ms);
        assert_eq!(parsed.default_resolution, ResolutionStrategy::Manual);
        assert_eq!(parsed.backoff, default.backoff);
        assert_eq!(parsed.conflict_skew_ms, 0);
        assert!(parsed.rate_limit_per_minute.is_none());
    }

    #[test]
    fn test_default_backoff_is_exponential() {
        assert_eq!(
            RetryBackoff::default(),
            RetryBackoff::Exponential {
                multiplier: 2.0,
                max_delay_ms: 10_000,
            }
        );
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        config.batch_size = 100;
        config.concurrency = 0;
        assert!(config.validate().is_err());

        config.concurrency = 4;
        config.rate_limit_per_minute = Some(0);
        assert!(config.validate().is_err());

        config.rate_limit_per_minute = Some(600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_tagged_serde() {
        let json = r#"{"backoff": {"kind": "fixed"}}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.backoff, RetryBackoff::Fixed);

        let json = r#"{"backoff": {"kind": "exponential", "multiplier": 3.0}}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.backoff,
            RetryBackoff::Exponential {
                multiplier: 3.0,
                max_delay_ms: 10_000
            }
        );
    }

    #[test]
    fn test_retry_policy_mapping() {
        let config = SyncConfig {
            max_retries: 5,
            retry_delay_ms: 250,
            backoff: RetryBackoff::Fixed,
            ..SyncConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.backoff, BackoffStrategy::Fixed);
        assert!(policy.jitter);
    }

    #[test]
    fn test_effective_resolution() {
        let options = SyncOptions::new("user");
        assert_eq!(options.effective_resolution(), ResolutionStrategy::Manual);

        let options = options.with_resolution(ResolutionStrategy::Merge);
        assert_eq!(options.effective_resolution(), ResolutionStrategy::Merge);
    }
}
