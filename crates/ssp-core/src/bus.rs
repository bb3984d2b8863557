//! Messages exchanged with the cache task
//!
//! Every cache read and mutation travels over one mpsc channel to a single
//! consumer, so operations on an identity are applied in arrival order.
//! Admitted puts and removals are re-broadcast as [`CacheEvent`]s.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Result;
use crate::graph::Graph;
use crate::model::{ResourceIdentity, Snapshot};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum CacheCommand {
    Get {
        identity: ResourceIdentity,
        reply: Reply<Option<Snapshot>>,
    },
    Put {
        identity: ResourceIdentity,
        content: Arc<Graph>,
        valid_until: Instant,
        reply: Reply<Snapshot>,
    },
    Delete {
        identity: ResourceIdentity,
        reply: Reply<bool>,
    },
    /// Sent by an eviction timer. Ignored unless `generation` is still current.
    Evict {
        identity: ResourceIdentity,
        generation: u64,
    },
    /// All live snapshots, for queries over the union of cached graphs.
    Snapshots { reply: Reply<Vec<Snapshot>> },
}

impl CacheCommand {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CacheCommand::Get { .. } => "get",
            CacheCommand::Put { .. } => "put",
            CacheCommand::Delete { .. } => "delete",
            CacheCommand::Evict { .. } => "evict",
            CacheCommand::Snapshots { .. } => "snapshots",
        }
    }
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Validity window elapsed.
    Expired,
    /// Explicit delete, usually from unregistration.
    Deleted,
}

/// Observable cache mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Updated {
        identity: ResourceIdentity,
        expires_at: DateTime<Utc>,
    },
    Removed {
        identity: ResourceIdentity,
        reason: RemovalReason,
    },
}

impl CacheEvent {
    pub fn identity(&self) -> &ResourceIdentity {
        match self {
            CacheEvent::Updated { identity, .. } | CacheEvent::Removed { identity, .. } => identity,
        }
    }
}
