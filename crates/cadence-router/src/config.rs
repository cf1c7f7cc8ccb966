//! Hub configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, RouterError};
use crate::writer::RetryPolicy;

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Server name, used in logs
    pub name: String,
    /// Longest a hand-off may stay pending before it is forced
    pub handoff_timeout_ms: u64,
    /// Bound on waiting for an identity's profile writes
    pub flush_timeout_ms: u64,
    /// Retention of detached sessions
    pub guest_session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Retries for a failed profile write
    pub persist_retries: u32,
    /// First retry delay; doubles per retry
    pub persist_backoff_ms: u64,
    /// 0 means unlimited
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "Cadence Hub".to_string(),
            handoff_timeout_ms: 10_000,
            flush_timeout_ms: 5_000,
            guest_session_ttl_secs: 86_400,
            sweep_interval_secs: 60,
            persist_retries: 3,
            persist_backoff_ms: 100,
            max_connections: 0,
        }
    }
}

impl HubConfig {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn guest_session_ttl(&self) -> Duration {
        Duration::from_secs(self.guest_session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.persist_retries,
            Duration::from_millis(self.persist_backoff_ms),
        )
    }

    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Reject settings the hub cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.handoff_timeout_ms == 0 {
            return Err(RouterError::Config("handoff_timeout_ms must be positive".into()));
        }
        if self.flush_timeout_ms == 0 {
            return Err(RouterError::Config("flush_timeout_ms must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RouterError::Config("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
