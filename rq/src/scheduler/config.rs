//! Queue admission options

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::SchedulerError;

/// Longest accepted rate-limit window (the range of a signed 32-bit millisecond timer)
pub const MAX_INTERVAL_MS: u64 = i32::MAX as u64;

/// Admission options, fixed when the scheduler is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Admit tasks as soon as they are enqueued; `false` starts paused
    #[serde(rename = "auto-start")]
    pub auto_start: bool,

    /// Max tasks running at once
    pub concurrency: usize,

    /// Rate limit window in milliseconds, 0 disables rate limiting
    #[serde(rename = "interval")]
    pub interval_ms: u64,

    /// Max task starts per window
    #[serde(rename = "interval-cap")]
    pub interval_cap: usize,

    /// Tasks still running at a window rollover count against the new window
    #[serde(rename = "carryover-concurrency-count")]
    pub carryover_concurrency_count: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            concurrency: 1,
            interval_ms: 0,
            interval_cap: 1,
            carryover_concurrency_count: true,
        }
    }
}

impl QueueOptions {
    /// Check the options and apply the documented coercions
    ///
    /// A concurrency of 0 is raised to 1. A zero interval cap or an interval
    /// beyond [`MAX_INTERVAL_MS`] is rejected.
    pub fn validated(mut self) -> Result<Self, SchedulerError> {
        debug!(?self, "QueueOptions::validated: called");
        if self.concurrency < 1 {
            warn!(concurrency = self.concurrency, "concurrency below 1, using 1");
            self.concurrency = 1;
        }

        if self.interval_cap < 1 {
            return Err(SchedulerError::InvalidOptions(format!(
                "interval-cap must be at least 1, got {}",
                self.interval_cap
            )));
        }

        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(SchedulerError::InvalidOptions(format!(
                "interval must be at most {}ms, got {}ms",
                MAX_INTERVAL_MS, self.interval_ms
            )));
        }

        Ok(self)
    }

    /// The rate limit window, or `None` when rate limiting is off
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = QueueOptions::default();
        assert_eq!(options.concurrency, 1);
        assert!(options.auto_start);
        assert_eq!(options.interval_ms, 0);
        assert_eq!(options.interval_cap, 1);
        assert!(options.carryover_concurrency_count);
        assert_eq!(options.interval(), None);
    }

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let options: QueueOptions = serde_yaml::from_str("{}").unwrap();
        assert_eq!(options, QueueOptions::default());
    }

    #[test]
    fn test_zero_concurrency_is_coerced() {
        let options = QueueOptions {
            concurrency: 0,
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(options.concurrency, 1);
    }

    #[test]
    fn test_zero_interval_cap_is_rejected() {
        let result = QueueOptions {
            interval_ms: 1000,
            interval_cap: 0,
            ..Default::default()
        }
        .validated();
        assert!(matches!(result, Err(SchedulerError::InvalidOptions(msg)) if msg.contains("interval-cap")));
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let result = QueueOptions {
            interval_ms: MAX_INTERVAL_MS + 1,
            ..Default::default()
        }
        .validated();
        assert!(matches!(result, Err(SchedulerError::InvalidOptions(_))));
    }

    #[test]
    fn test_interval_duration() {
        let options = QueueOptions {
            interval_ms: 250,
            ..Default::default()
        };
        assert_eq!(options.interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_kebab_case_keys() {
        let yaml = "auto-start: false\nconcurrency: 4\ninterval: 1000\ninterval-cap: 10\ncarryover-concurrency-count: false\n";
        let options: QueueOptions = serde_yaml::from_str(yaml).unwrap();
        assert!(!options.auto_start);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.interval_ms, 1000);
        assert_eq!(options.interval_cap, 10);
        assert!(!options.carryover_concurrency_count);
    }

    #[test]
    fn test_negative_or_non_numeric_interval_fails_to_parse() {
        assert!(serde_yaml::from_str::<QueueOptions>("interval: -5").is_err());
        assert!(serde_yaml::from_str::<QueueOptions>("interval: soon").is_err());
    }
}
