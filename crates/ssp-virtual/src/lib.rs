//! SSP Virtual: sensors computed from queries over the cache

pub mod config;
pub mod definition;
pub mod accessor;
pub mod observer;
pub mod family;

#[cfg(test)]
pub mod tests;

pub use config::VirtualSensorsConfig;
pub use definition::{SSN, VirtualSensorDefinition};
pub use accessor::VirtualSensorAccessor;
pub use observer::VirtualSensorObserver;
pub use family::{CreationOutcome, FAMILY, VirtualSensorsFamily};
