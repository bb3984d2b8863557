//! Settings of the virtual sensor family

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::definition::VirtualSensorDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualSensorsConfig {
    pub enabled: bool,
    /// Seconds between two evaluations of a sensor's query.
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Sensors created at startup.
    #[serde(rename = "sensor")]
    pub sensors: Vec<VirtualSensorDefinition>,
}

impl Default for VirtualSensorsConfig {
    fn default() -> Self {
        VirtualSensorsConfig {
            enabled: true,
            interval_secs: 60,
            fetch_timeout_secs: 5,
            sensors: Vec::new(),
        }
    }
}

impl VirtualSensorsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
