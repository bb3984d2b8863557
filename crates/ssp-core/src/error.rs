//! Error taxonomy shared by the cache, the registries and every provider family

use std::time::Duration;

use crate::model::ResourceIdentity;

/// Why a fetch against a data origin failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessFailure {
    /// The origin could not be reached at all (I/O, transport).
    Unreachable(String),
    /// The origin answered, but with an error status.
    Rejected { code: String, message: String },
    /// The origin answered with content that could not be turned into a graph.
    Malformed(String),
}

impl std::fmt::Display for AccessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessFailure::Unreachable(reason) => write!(f, "origin unreachable: {}", reason),
            AccessFailure::Rejected { code, message } => {
                write!(f, "origin rejected request ({}): {}", code, message)
            }
            AccessFailure::Malformed(reason) => write!(f, "malformed content: {}", reason),
        }
    }
}

/// Errors surfaced by the gateway engine.
///
/// Cloneable so that a single coalesced fetch can hand the same outcome to
/// every waiting reader.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SspError {
    #[error("no data origin registered for {0}")]
    NotFound(ResourceIdentity),

    #[error("{0} is already registered")]
    AlreadyRegistered(ResourceIdentity),

    #[error("access to {identity} failed: {reason}")]
    Access {
        identity: ResourceIdentity,
        reason: AccessFailure,
    },

    #[error("operation on {identity} timed out after {after:?}")]
    OperationTimeout {
        identity: ResourceIdentity,
        after: Duration,
    },

    #[error("observation of {identity} failed: {reason}")]
    ObservationFailure {
        identity: ResourceIdentity,
        reason: String,
    },

    #[error("graph store failure: {0}")]
    Store(String),

    #[error("{operation} is not supported for {identity}")]
    NotSupported {
        identity: ResourceIdentity,
        operation: &'static str,
    },

    #[error("invalid resource identity {0:?}")]
    InvalidIdentity(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("cache is unavailable")]
    Unavailable,
}

impl SspError {
    pub fn access(identity: &ResourceIdentity, reason: AccessFailure) -> Self {
        SspError::Access {
            identity: identity.clone(),
            reason,
        }
    }

    pub fn timeout(identity: &ResourceIdentity, after: Duration) -> Self {
        SspError::OperationTimeout {
            identity: identity.clone(),
            after,
        }
    }

    pub fn observation(identity: &ResourceIdentity, reason: impl Into<String>) -> Self {
        SspError::ObservationFailure {
            identity: identity.clone(),
            reason: reason.into(),
        }
    }

    /// Timeouts are the one failure class callers usually retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SspError::OperationTimeout { .. })
    }

    /// The identity this error is about, if any.
    pub fn identity(&self) -> Option<&ResourceIdentity> {
        match self {
            SspError::NotFound(identity) | SspError::AlreadyRegistered(identity) => Some(identity),
            SspError::Access { identity, .. }
            | SspError::OperationTimeout { identity, .. }
            | SspError::ObservationFailure { identity, .. }
            | SspError::NotSupported { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

pub type Result<T, E = SspError> = std::result::Result<T, E>;
