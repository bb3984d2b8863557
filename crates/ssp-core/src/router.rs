//! Front door for reads: cache first, origin on miss

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

use crate::cache::CacheHandle;
use crate::error::{Result, SspError};
use crate::model::{ResourceIdentity, Snapshot};
use crate::registry::{IdentityClaims, OriginSource};

type PendingFetch = Shared<BoxFuture<'static, Result<Snapshot>>>;

/// Registered identities of one family, for listings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceListing {
    pub family: &'static str,
    pub identities: Vec<ResourceIdentity>,
}

/// Routes reads to the cache or, on a miss, to the owning family.
///
/// Concurrent misses on one identity share a single origin fetch; every
/// waiter sees that fetch's outcome.
#[derive(Clone)]
pub struct RequestRouter {
    cache: CacheHandle,
    claims: IdentityClaims,
    sources: Arc<Vec<Arc<dyn OriginSource>>>,
    pending: Arc<DashMap<ResourceIdentity, PendingFetch>>,
}

impl RequestRouter {
    pub fn new(cache: CacheHandle, claims: IdentityClaims) -> Self {
        RequestRouter {
            cache,
            claims,
            sources: Arc::new(Vec::new()),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Add a family. Families are fixed once the router is shared.
    pub fn with_source(mut self, source: Arc<dyn OriginSource>) -> Self {
        Arc::make_mut(&mut self.sources).push(source);
        self
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Current snapshot of `identity`, fetching from its origin on a miss.
    pub async fn handle(&self, identity: &ResourceIdentity) -> Result<Snapshot> {
        if let Some(snapshot) = self.cache.get(identity).await? {
            debug!("Cache hit for {}", identity);
            return Ok(snapshot);
        }

        let fetch = match self.pending.entry(identity.clone()) {
            Entry::Occupied(pending) => {
                debug!("Joining in-flight fetch for {}", identity);
                pending.get().clone()
            }
            Entry::Vacant(vacant) => {
                // The fetch runs on its own task so it completes, and leaves
                // `pending`, even when every waiter is cancelled.
                let task = tokio::spawn(self.clone().fetch_and_cache(identity.clone()));
                let fetch = async move {
                    task.await.unwrap_or_else(|e| {
                        tracing::error!("Fetch task failed: {}", e);
                        Err(SspError::Unavailable)
                    })
                }
                .boxed()
                .shared();
                vacant.insert(fetch.clone());
                fetch
            }
        };
        fetch.await
    }

    async fn fetch_and_cache(self, identity: ResourceIdentity) -> Result<Snapshot> {
        let result = self.fetch_and_cache_inner(&identity).await;
        self.pending.remove(&identity);
        result
    }

    async fn fetch_and_cache_inner(&self, identity: &ResourceIdentity) -> Result<Snapshot> {
        let source = self.source_for(identity)?;
        debug!("Cache miss for {}; fetching from {}", identity, source.family());
        let fetched = source.fetch(identity).await?;
        if !source.contains(identity) {
            // Unregistered while the fetch was in flight.
            return Err(SspError::NotFound(identity.clone()));
        }
        self.cache
            .put(identity, fetched.content, fetched.valid_until)
            .await
    }

    /// Delete `identity` through its family. Read-only families refuse.
    pub async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        self.source_for(identity)?.delete(identity).await
    }

    /// Registered identities grouped by family, in family order.
    pub fn services(&self) -> Vec<ServiceListing> {
        self.sources
            .iter()
            .map(|source| ServiceListing {
                family: source.family(),
                identities: source.identities(),
            })
            .collect()
    }

    pub fn families(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.family()).collect()
    }

    fn source_for(&self, identity: &ResourceIdentity) -> Result<Arc<dyn OriginSource>> {
        let owner = self
            .claims
            .owner(identity)
            .ok_or_else(|| SspError::NotFound(identity.clone()))?;
        self.sources
            .iter()
            .find(|source| source.family() == owner && source.contains(identity))
            .cloned()
            .ok_or_else(|| SspError::NotFound(identity.clone()))
    }
}
