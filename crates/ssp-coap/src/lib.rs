//! SSP CoAP: push-capable constrained endpoints as a provider family

pub mod config;
pub mod transport;
pub mod accessor;
pub mod observer;
pub mod link_format;
pub mod family;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use config::CoapConfig;
pub use transport::{CoapError, CoapRequest, CoapResponse, CoapTransport, ContentFormat, ResponseCode};
pub use accessor::{CoapAccessor, CoapEndpoint};
pub use observer::CoapObserver;
pub use link_format::Link;
pub use family::{Announcement, CoapFamily, FAMILY, RegistrationStatus, ResourceOutcome};
