//! Core data structures: identities, data origins and snapshots

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::SspError;
use crate::graph::Graph;

static IDENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s<>]+$").expect("valid regex"));

/// Client-visible, globally unique name of a resource. Also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    /// Parse a URI-shaped identity (`scheme:rest`, no whitespace).
    pub fn parse(value: impl Into<String>) -> Result<Self, SspError> {
        let value = value.into();
        if IDENTITY_PATTERN.is_match(&value) {
            Ok(ResourceIdentity(value))
        } else {
            Err(SspError::InvalidIdentity(value))
        }
    }

    /// Build `<base>/<path>`, collapsing duplicate slashes at the seam.
    pub fn under(base: &str, path: &str) -> Result<Self, SspError> {
        let base = base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Self::parse(format!("{}/{}", base, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ResourceIdentity {
    type Err = SspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceIdentity {
    type Error = SspError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ResourceIdentity> for String {
    fn from(identity: ResourceIdentity) -> Self {
        identity.0
    }
}

/// Backend-private address of a resource. Only the owning family's
/// Accessor and Observer ever look inside.
pub trait Locator: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Locator for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// One resource of one provider family: how to reach it and how clients name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataOrigin<L> {
    locator: L,
    identity: ResourceIdentity,
}

impl<L: Locator> DataOrigin<L> {
    pub fn new(locator: L, identity: ResourceIdentity) -> Self {
        DataOrigin { locator, identity }
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl<L: Debug> std::fmt::Display for DataOrigin<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} at {:?}]", self.identity, self.locator)
    }
}

/// What an Accessor or Observer hands back: content plus its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedGraph {
    pub content: Graph,
    pub valid_until: Instant,
}

impl FetchedGraph {
    pub fn new(content: Graph, valid_until: Instant) -> Self {
        FetchedGraph {
            content,
            valid_until,
        }
    }

    /// Content valid for `max_age` from now.
    pub fn valid_for(content: Graph, max_age: Duration) -> Self {
        FetchedGraph {
            content,
            valid_until: Instant::now() + max_age,
        }
    }
}

/// A cached graph of one identity together with its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub identity: ResourceIdentity,
    pub content: Arc<Graph>,
    pub valid_until: Instant,
}

impl Snapshot {
    pub fn is_fresh(&self) -> bool {
        self.valid_until > Instant::now()
    }

    /// Time left until the snapshot expires (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.valid_until.saturating_duration_since(Instant::now())
    }

    /// Wall-clock expiry, for HTTP `Expires` headers and persistence.
    pub fn expires_at(&self) -> DateTime<Utc> {
        wall_clock(self.valid_until)
    }
}

/// Translate a monotonic deadline into wall-clock time.
pub fn wall_clock(deadline: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    chrono::Duration::from_std(remaining)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Translate a wall-clock expiry back into a monotonic deadline, `None` if already past.
pub fn monotonic(expires_at: DateTime<Utc>) -> Option<Instant> {
    let remaining = (expires_at - Utc::now()).to_std().ok()?;
    if remaining.is_zero() {
        return None;
    }
    Some(Instant::now() + remaining)
}
