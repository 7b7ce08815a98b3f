//! Dispatch and Health Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the dispatch loop and the acquisition threads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dispatch period in milliseconds (default: 100)
    pub period_ms: u64,
    /// Part of the period left to the runtime after draining
    pub budget_margin_ms: u64,
    /// Frames per channel queue
    pub queue_capacity: usize,
    /// Receive buffer handed to the adapter
    pub read_buffer_size: usize,
    /// Bound on each adapter read so readers notice deactivation
    pub read_timeout_ms: u64,
    /// Consecutive backlog periods before a warning
    pub backlog_warn_periods: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            budget_margin_ms: 20,
            queue_capacity: frame_queue::DEFAULT_CAPACITY,
            read_buffer_size: vda_link::RECEIVE_BUFFER_SIZE,
            read_timeout_ms: 100,
            backlog_warn_periods: 10,
        }
    }
}

impl DispatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }

    /// Wall clock allowed for one drain pass
    pub fn budget(&self) -> Duration {
        let period = self.period();
        period
            .checked_sub(Duration::from_millis(self.budget_margin_ms))
            .filter(|budget| !budget.is_zero())
            .unwrap_or(period / 2)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Configuration for the connection check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Check period in milliseconds (default: 1000)
    pub period_ms: u64,
    /// Request clock and date from J1587 controllers each check
    pub j1587_time_requests: bool,
    /// Request Time/Date from J1939 controllers each check
    pub j1939_time_requests: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            j1587_time_requests: true,
            j1939_time_requests: true,
        }
    }
}

impl HealthConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_leaves_margin() {
        let config = DispatchConfig::default();
        assert_eq!(config.budget(), Duration::from_millis(80));
    }

    #[test]
    fn test_budget_with_oversized_margin() {
        let config = DispatchConfig {
            period_ms: 10,
            budget_margin_ms: 20,
            ..DispatchConfig::default()
        };
        assert_eq!(config.budget(), Duration::from_millis(5));
    }
}
