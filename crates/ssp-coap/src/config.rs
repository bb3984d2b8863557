//! Settings of the push-style endpoint family

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoapConfig {
    pub fetch_timeout_secs: u64,
    /// Deadline for an observe subscription to be confirmed.
    pub subscribe_timeout_secs: u64,
    /// Slack on top of a notification's max-age before the endpoint counts as silent.
    pub grace_secs: u64,
}

impl Default for CoapConfig {
    fn default() -> Self {
        CoapConfig {
            fetch_timeout_secs: 5,
            subscribe_timeout_secs: 10,
            grace_secs: 10,
        }
    }
}

impl CoapConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}
