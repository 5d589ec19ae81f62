//! Reconciler settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    /// Wallets processed in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long to wait for a payment hash lock
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Lifetime of cached payment flows
    #[serde(default = "default_flow_state_ttl_secs")]
    pub flow_state_ttl_secs: u64,
}

fn default_workers() -> usize {
    5
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_flow_state_ttl_secs() -> u64 {
    86_400
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lock_timeout_secs: default_lock_timeout_secs(),
            flow_state_ttl_secs: default_flow_state_ttl_secs(),
        }
    }
}

impl ReconcilerSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn flow_state_ttl(&self) -> Duration {
        Duration::from_secs(self.flow_state_ttl_secs)
    }
}
