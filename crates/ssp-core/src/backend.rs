//! Contract every provider family implements: an on-demand Accessor and a
//! long-running Observer over the family's locators.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::CacheHandle;
use crate::error::{Result, SspError};
use crate::model::{DataOrigin, FetchedGraph, Locator, ResourceIdentity, Snapshot};

/// One-shot fetch against a data origin.
#[async_trait]
pub trait Accessor<L: Locator>: Send + Sync + 'static {
    /// Fetch the current content of `origin`. Callers bound this with
    /// [`Accessor::timeout`] through [`fetch_with_deadline`].
    async fn fetch(&self, origin: &DataOrigin<L>) -> Result<FetchedGraph>;

    /// Deadline for a single fetch.
    fn timeout(&self) -> Duration;

    /// Remove the resource at its origin. Read-only families keep the default.
    async fn delete(&self, origin: &DataOrigin<L>) -> Result<()> {
        Err(SspError::NotSupported {
            identity: origin.identity().clone(),
            operation: "delete",
        })
    }
}

/// Long-lived watch that pushes fresh content into the cache.
#[async_trait]
pub trait Observer<L: Locator>: Send + Sync + 'static {
    /// Watch `origin` and publish every change through `sink`.
    ///
    /// Runs until the watch can no longer be kept up. An `Err` is an
    /// unrecoverable observation failure; `Ok(())` means the origin reported
    /// itself gone. Either way the owning registry unregisters the origin.
    /// Stopping is done by aborting the task this future runs on.
    async fn observe(&self, origin: DataOrigin<L>, sink: UpdateSink) -> Result<()>;
}

/// Run `accessor.fetch` under its deadline.
pub async fn fetch_with_deadline<L: Locator>(
    accessor: &dyn Accessor<L>,
    origin: &DataOrigin<L>,
) -> Result<FetchedGraph> {
    let after = accessor.timeout();
    match tokio::time::timeout(after, accessor.fetch(origin)).await {
        Ok(result) => result,
        Err(_) => Err(SspError::timeout(origin.identity(), after)),
    }
}

/// Where an Observer sends updates for the one identity it watches.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    identity: ResourceIdentity,
    cache: CacheHandle,
}

impl UpdateSink {
    pub fn new(identity: ResourceIdentity, cache: CacheHandle) -> Self {
        UpdateSink { identity, cache }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub async fn publish(&self, fetched: FetchedGraph) -> Result<Snapshot> {
        self.cache
            .put(&self.identity, fetched.content, fetched.valid_until)
            .await
    }

    /// Read access to the cache, for families computed from other resources.
    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }
}

/// Deadline that fires when a provider has gone quiet for longer than its
/// declared freshness window. Reset on every update.
#[derive(Debug, Clone)]
pub struct StalenessTimer {
    window: Duration,
    deadline: Instant,
}

impl StalenessTimer {
    pub fn new(window: Duration) -> Self {
        StalenessTimer {
            window,
            deadline: Instant::now() + window,
        }
    }

    /// Restart the current window from now.
    pub fn reset(&mut self) {
        self.deadline = Instant::now() + self.window;
    }

    /// Restart with a new window, e.g. the max-age of the latest update.
    pub fn reset_to(&mut self, window: Duration) {
        self.window = window;
        self.reset();
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Completes once the deadline passes.
    pub async fn expired(&self) {
        tokio::time::sleep_until(self.deadline).await
    }
}
