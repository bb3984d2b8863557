//! Registration lifecycle of data origins
//!
//! A [`Registry`] owns the origins of one provider family. Identity uniqueness
//! is enforced across all families by a shared [`IdentityClaims`] table: a
//! registration first claims its identity, then primes the cache, then starts
//! the family's Observer. Any failure before the Observer starts releases the
//! claim again.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Accessor, Observer, UpdateSink, fetch_with_deadline};
use crate::cache::CacheHandle;
use crate::error::{Result, SspError};
use crate::model::{DataOrigin, FetchedGraph, Locator, ResourceIdentity, Snapshot};

#[derive(Debug, Clone, Copy)]
struct Claim {
    family: &'static str,
    registration: u64,
}

/// Process-wide table of claimed identities, shared by every registry.
#[derive(Debug, Clone, Default)]
pub struct IdentityClaims {
    claims: Arc<DashMap<ResourceIdentity, Claim>>,
    next_registration: Arc<AtomicU64>,
}

impl IdentityClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `identity` for `family`. Returns the registration id.
    pub fn claim(&self, identity: &ResourceIdentity, family: &'static str) -> Result<u64> {
        match self.claims.entry(identity.clone()) {
            Entry::Occupied(_) => Err(SspError::AlreadyRegistered(identity.clone())),
            Entry::Vacant(vacant) => {
                let registration = self.next_registration.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(Claim {
                    family,
                    registration,
                });
                Ok(registration)
            }
        }
    }

    /// Release a claim, but only if it still belongs to `registration`.
    pub fn release(&self, identity: &ResourceIdentity, registration: u64) -> bool {
        self.claims
            .remove_if(identity, |_, claim| claim.registration == registration)
            .is_some()
    }

    /// Family currently holding `identity`.
    pub fn owner(&self, identity: &ResourceIdentity) -> Option<&'static str> {
        self.claims.get(identity).map(|claim| claim.family)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Type-erased view of a registry, used by the request router and the HTTP
/// surface to work across families.
#[async_trait]
pub trait OriginSource: Send + Sync + 'static {
    fn family(&self) -> &'static str;

    fn contains(&self, identity: &ResourceIdentity) -> bool;

    fn identities(&self) -> Vec<ResourceIdentity>;

    /// On-demand fetch for a registered identity, under the family's deadline.
    async fn fetch(&self, identity: &ResourceIdentity) -> Result<FetchedGraph>;

    /// Delete at the origin, then unregister.
    async fn delete(&self, identity: &ResourceIdentity) -> Result<()>;

    async fn unregister(&self, identity: &ResourceIdentity) -> Result<()>;
}

struct Registration<L> {
    origin: DataOrigin<L>,
    registration: u64,
    observer: JoinHandle<()>,
}

/// Sent by an Observer task when its watch ends on its own.
struct ObservationEnded {
    identity: ResourceIdentity,
    registration: u64,
    outcome: Result<()>,
}

struct RegistryInner<L: Locator> {
    family: &'static str,
    accessor: Arc<dyn Accessor<L>>,
    observer: Arc<dyn Observer<L>>,
    cache: CacheHandle,
    claims: IdentityClaims,
    records: DashMap<ResourceIdentity, Registration<L>>,
    ended: mpsc::UnboundedSender<ObservationEnded>,
}

impl<L: Locator> Drop for RegistryInner<L> {
    fn drop(&mut self) {
        for record in self.records.iter() {
            record.observer.abort();
        }
    }
}

/// Registry of one provider family. Cheap to clone.
pub struct Registry<L: Locator> {
    inner: Arc<RegistryInner<L>>,
}

impl<L: Locator> Clone for Registry<L> {
    fn clone(&self) -> Self {
        Registry {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Locator> Registry<L> {
    /// Build a registry and start its supervisor task, which unregisters
    /// origins whose Observer has ended.
    pub fn new(
        family: &'static str,
        accessor: Arc<dyn Accessor<L>>,
        observer: Arc<dyn Observer<L>>,
        cache: CacheHandle,
        claims: IdentityClaims,
    ) -> Self {
        let (ended, ended_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RegistryInner {
            family,
            accessor,
            observer,
            cache,
            claims,
            records: DashMap::new(),
            ended,
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), ended_rx));
        Registry { inner }
    }

    pub fn family(&self) -> &'static str {
        self.inner.family
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.inner.cache
    }

    /// Register `origin`: claim its identity, prime the cache with one fetch
    /// and start observing it. Returns the primed snapshot.
    pub async fn register(&self, origin: DataOrigin<L>) -> Result<Snapshot> {
        let inner = &self.inner;
        let identity = origin.identity().clone();

        let registration = inner.claims.claim(&identity, inner.family).inspect_err(|_| {
            debug!("[{}] Rejected duplicate registration of {}", inner.family, identity);
        })?;

        let primed = match self.prime(&origin).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                inner.claims.release(&identity, registration);
                warn!("[{}] Priming {} failed, registration rolled back: {}", inner.family, origin, e);
                return Err(e);
            }
        };

        match inner.records.entry(identity.clone()) {
            Entry::Occupied(_) => {
                // Unreachable while the claim is held; keep the first record.
                inner.claims.release(&identity, registration);
                return Err(SspError::AlreadyRegistered(identity));
            }
            Entry::Vacant(vacant) => {
                let observer = self.spawn_observer(origin.clone(), registration);
                vacant.insert(Registration {
                    origin: origin.clone(),
                    registration,
                    observer,
                });
            }
        }

        info!("[{}] Registered {}", inner.family, origin);
        Ok(primed)
    }

    async fn prime(&self, origin: &DataOrigin<L>) -> Result<Snapshot> {
        let fetched = fetch_with_deadline(self.inner.accessor.as_ref(), origin).await?;
        self.inner
            .cache
            .put(origin.identity(), fetched.content, fetched.valid_until)
            .await
    }

    fn spawn_observer(&self, origin: DataOrigin<L>, registration: u64) -> JoinHandle<()> {
        let observer = Arc::clone(&self.inner.observer);
        let ended = self.inner.ended.clone();
        let identity = origin.identity().clone();
        let sink = UpdateSink::new(identity.clone(), self.inner.cache.clone());

        tokio::spawn(async move {
            let outcome = observer.observe(origin, sink).await;
            let _ = ended.send(ObservationEnded {
                identity,
                registration,
                outcome,
            });
        })
    }

    /// Stop observing `identity`, forget it and drop its cache entry.
    pub async fn unregister(&self, identity: &ResourceIdentity) -> Result<()> {
        let (_, record) = self
            .inner
            .records
            .remove(identity)
            .ok_or_else(|| SspError::NotFound(identity.clone()))?;
        self.teardown(record).await
    }

    /// Unregister only if the current registration is still `registration`.
    async fn unregister_if_current(&self, identity: &ResourceIdentity, registration: u64) -> Result<bool> {
        match self
            .inner
            .records
            .remove_if(identity, |_, record| record.registration == registration)
        {
            Some((_, record)) => self.teardown(record).await.map(|_| true),
            None => Ok(false),
        }
    }

    async fn teardown(&self, record: Registration<L>) -> Result<()> {
        let inner = &self.inner;
        let identity = record.origin.identity();

        // Observer must be gone before the delete so nothing re-populates the entry.
        record.observer.abort();
        let _ = record.observer.await;

        let deleted = inner.cache.delete(identity).await;
        inner.claims.release(identity, record.registration);
        info!("[{}] Unregistered {}", inner.family, identity);
        deleted.map(|_| ())
    }

    pub fn lookup(&self, identity: &ResourceIdentity) -> Result<DataOrigin<L>> {
        self.inner
            .records
            .get(identity)
            .map(|record| record.origin.clone())
            .ok_or_else(|| SspError::NotFound(identity.clone()))
    }

    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.inner.records.contains_key(identity)
    }

    /// Every registered origin, ordered by identity.
    pub fn origins(&self) -> Vec<DataOrigin<L>> {
        let sorted: BTreeMap<_, _> = self
            .inner
            .records
            .iter()
            .map(|record| (record.key().clone(), record.origin.clone()))
            .collect();
        sorted.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Unregister everything, e.g. on shutdown.
    pub async fn clear(&self) {
        let identities: Vec<_> = self.inner.records.iter().map(|r| r.key().clone()).collect();
        for identity in identities {
            if let Err(e) = self.unregister(&identity).await {
                debug!("[{}] Skipping {} during clear: {}", self.inner.family, identity, e);
            }
        }
    }
}

async fn supervise<L: Locator>(
    registry: Weak<RegistryInner<L>>,
    mut ended: mpsc::UnboundedReceiver<ObservationEnded>,
) {
    while let Some(ObservationEnded {
        identity,
        registration,
        outcome,
    }) = ended.recv().await
    {
        let Some(inner) = registry.upgrade() else {
            break;
        };
        let registry = Registry { inner };
        match &outcome {
            Err(e) => warn!("[{}] {}; unregistering", registry.family(), e),
            Ok(()) => info!("[{}] Origin of {} went away; unregistering", registry.family(), identity),
        }
        match registry.unregister_if_current(&identity, registration).await {
            Ok(true) => {}
            Ok(false) => debug!("[{}] {} was already unregistered", registry.family(), identity),
            Err(e) => warn!("[{}] Unregistering {} failed: {}", registry.family(), identity, e),
        }
    }
}

#[async_trait]
impl<L: Locator> OriginSource for Registry<L> {
    fn family(&self) -> &'static str {
        self.inner.family
    }

    fn contains(&self, identity: &ResourceIdentity) -> bool {
        Registry::contains(self, identity)
    }

    fn identities(&self) -> Vec<ResourceIdentity> {
        self.origins()
            .into_iter()
            .map(|origin| origin.identity().clone())
            .collect()
    }

    async fn fetch(&self, identity: &ResourceIdentity) -> Result<FetchedGraph> {
        let origin = self.lookup(identity)?;
        fetch_with_deadline(self.inner.accessor.as_ref(), &origin).await
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let origin = self.lookup(identity)?;
        self.inner.accessor.delete(&origin).await?;
        Registry::unregister(self, identity).await
    }

    async fn unregister(&self, identity: &ResourceIdentity) -> Result<()> {
        Registry::unregister(self, identity).await
    }
}
