//! Transport contract for constrained push-capable endpoints
//!
//! Message encoding and retransmission live behind [`CoapTransport`]; the
//! family only deals in requests, responses and notification streams.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use ssp_core::{AccessFailure, Format, ResourceIdentity, SspError};
use tokio::sync::mpsc;

/// Port assumed when an identity carries none.
pub const DEFAULT_PORT: u16 = 5683;

/// Validity of a response that carries no max-age option.
pub const DEFAULT_MAX_AGE: u32 = 60;

/// Response code as `class.detail`, e.g. `2.05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode {
    pub class: u8,
    pub detail: u8,
}

impl ResponseCode {
    pub const CONTENT: ResponseCode = ResponseCode::new(2, 5);
    pub const NOT_FOUND: ResponseCode = ResponseCode::new(4, 4);
    pub const NOT_ACCEPTABLE: ResponseCode = ResponseCode::new(4, 6);
    pub const INTERNAL_SERVER_ERROR: ResponseCode = ResponseCode::new(5, 0);
    pub const SERVICE_UNAVAILABLE: ResponseCode = ResponseCode::new(5, 3);

    pub const fn new(class: u8, detail: u8) -> Self {
        ResponseCode { class, detail }
    }

    pub fn is_success(&self) -> bool {
        self.class == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class, self.detail)
    }
}

/// Payload formats exchanged with endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    LinkFormat,
    NTriples,
    Json,
}

impl ContentFormat {
    /// Graph formats, in order of preference.
    pub const GRAPHS: [ContentFormat; 2] = [ContentFormat::NTriples, ContentFormat::Json];

    pub fn graph_format(&self) -> Option<Format> {
        match self {
            ContentFormat::NTriples => Some(Format::NTriples),
            ContentFormat::Json => Some(Format::Json),
            ContentFormat::LinkFormat => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapRequest {
    pub addr: SocketAddr,
    pub path: String,
    pub accept: Vec<ContentFormat>,
    /// `Some(0)` registers as an observer.
    pub observe: Option<u32>,
}

impl CoapRequest {
    pub fn get(addr: SocketAddr, path: impl Into<String>, accept: &[ContentFormat]) -> Self {
        CoapRequest {
            addr,
            path: path.into(),
            accept: accept.to_vec(),
            observe: None,
        }
    }

    pub fn observe(addr: SocketAddr, path: impl Into<String>, accept: &[ContentFormat]) -> Self {
        CoapRequest {
            observe: Some(0),
            ..CoapRequest::get(addr, path, accept)
        }
    }
}

/// A response or an observe notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    pub code: ResponseCode,
    pub format: Option<ContentFormat>,
    /// Max-age option in seconds.
    pub max_age: u32,
    pub payload: Vec<u8>,
}

impl CoapResponse {
    pub fn content(format: ContentFormat, payload: impl Into<Vec<u8>>) -> Self {
        CoapResponse {
            code: ResponseCode::CONTENT,
            format: Some(format),
            max_age: DEFAULT_MAX_AGE,
            payload: payload.into(),
        }
    }

    pub fn error(code: ResponseCode, message: &str) -> Self {
        CoapResponse {
            code,
            format: None,
            max_age: 0,
            payload: message.as_bytes().to_vec(),
        }
    }

    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Failures below the message layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoapError {
    #[error("endpoint {0} is unreachable: {1}")]
    Unreachable(SocketAddr, String),

    #[error("transmission to {0} timed out")]
    TransmissionTimeout(SocketAddr),

    #[error("invalid link format: {0}")]
    LinkFormat(String),
}

impl CoapError {
    /// Surface a transport failure as an access failure on `identity`.
    pub fn into_access(self, identity: &ResourceIdentity) -> SspError {
        match self {
            CoapError::LinkFormat(reason) => SspError::access(identity, AccessFailure::Malformed(reason)),
            other => SspError::access(identity, AccessFailure::Unreachable(other.to_string())),
        }
    }
}

/// What the family needs from a message layer.
#[async_trait]
pub trait CoapTransport: Send + Sync + 'static {
    /// Send one confirmable request and wait for its response.
    async fn request(&self, request: CoapRequest) -> Result<CoapResponse, CoapError>;

    /// Register as an observer. The first item is the current state; the
    /// stream ends when the endpoint cancels the observation.
    async fn subscribe(&self, request: CoapRequest) -> Result<mpsc::Receiver<CoapResponse>, CoapError>;
}
