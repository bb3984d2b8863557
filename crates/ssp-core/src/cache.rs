//! Freshness-bounded snapshot cache
//!
//! A single task owns the [`GraphStore`] and an index of live entries. Callers
//! talk to it through a cloneable [`CacheHandle`]. Every admitted put carries a
//! fresh generation number; the eviction timer scheduled for it only removes
//! the entry if that generation is still the current one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{CacheCommand, CacheEvent, RemovalReason, Reply};
use crate::error::{Result, SspError};
use crate::graph::Graph;
use crate::model::{ResourceIdentity, Snapshot, monotonic, wall_clock};
use crate::store::GraphStore;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on a single request to the cache task.
    pub operation_timeout: Duration,
    /// Capacity of the command channel.
    pub queue_depth: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            operation_timeout: Duration::from_secs(5),
            queue_depth: 1024,
            event_capacity: 256,
        }
    }
}

struct Entry {
    generation: u64,
    valid_until: Instant,
    timer: JoinHandle<()>,
}

/// The cache task's private state.
pub struct Cache {
    store: Box<dyn GraphStore>,
    entries: HashMap<ResourceIdentity, Entry>,
    next_generation: u64,
    commands: mpsc::WeakSender<CacheCommand>,
    events: broadcast::Sender<CacheEvent>,
}

impl Cache {
    /// Start the cache task over `store` and return a handle to it.
    ///
    /// Entries the store kept from an earlier run are re-admitted if they are
    /// still valid and dropped otherwise. Must be called inside a tokio runtime.
    pub fn spawn(store: Box<dyn GraphStore>, config: CacheConfig) -> Result<CacheHandle> {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let mut cache = Cache {
            store,
            entries: HashMap::new(),
            next_generation: 0,
            commands: tx.downgrade(),
            events: events.clone(),
        };
        cache.restore()?;

        info!(
            "Cache started on {} store with {} live entries",
            cache.store.name(),
            cache.entries.len()
        );
        tokio::spawn(cache.run(rx));

        Ok(CacheHandle {
            commands: tx,
            events,
            timeout: config.operation_timeout,
        })
    }

    fn restore(&mut self) -> Result<()> {
        for (identity, expires_at) in self.store.entries()? {
            match monotonic(expires_at) {
                Some(valid_until) => {
                    let generation = self.bump_generation();
                    let timer = self.schedule_eviction(&identity, generation, valid_until);
                    self.entries.insert(
                        identity,
                        Entry {
                            generation,
                            valid_until,
                            timer,
                        },
                    );
                }
                None => {
                    debug!("Dropping expired stored entry {}", identity);
                    self.store.delete(&identity)?;
                }
            }
        }
        Ok(())
    }

    async fn run(mut self, mut commands: mpsc::Receiver<CacheCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        debug!("Cache task stopping; all handles dropped");
        for entry in self.entries.values() {
            entry.timer.abort();
        }
    }

    fn handle(&mut self, command: CacheCommand) {
        let kind = command.kind();
        match command {
            CacheCommand::Get { identity, reply } => {
                let _ = reply.send(self.get(&identity));
            }
            CacheCommand::Put {
                identity,
                content,
                valid_until,
                reply,
            } => {
                let _ = reply.send(self.put(identity, content, valid_until));
            }
            CacheCommand::Delete { identity, reply } => {
                let _ = reply.send(self.delete(&identity));
            }
            CacheCommand::Evict {
                identity,
                generation,
            } => {
                if let Err(e) = self.evict(&identity, generation) {
                    warn!("Eviction of {} failed: {}", identity, e);
                }
            }
            CacheCommand::Snapshots { reply } => {
                let _ = reply.send(self.snapshots());
            }
        }
        debug!("Cache handled {}", kind);
    }

    fn get(&mut self, identity: &ResourceIdentity) -> Result<Option<Snapshot>> {
        let Some(valid_until) = self.entries.get(identity).map(|e| e.valid_until) else {
            return Ok(None);
        };
        if valid_until <= Instant::now() {
            // Timer has not fired yet; the entry is already dead to readers.
            self.remove(identity, RemovalReason::Expired)?;
            return Ok(None);
        }
        Ok(self.store.get(identity)?.map(|content| Snapshot {
            identity: identity.clone(),
            content,
            valid_until,
        }))
    }

    fn put(
        &mut self,
        identity: ResourceIdentity,
        content: Arc<Graph>,
        valid_until: Instant,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot {
            identity: identity.clone(),
            content: Arc::clone(&content),
            valid_until,
        };

        if valid_until <= Instant::now() {
            debug!("Put for {} is already expired; dropping entry", identity);
            self.remove(&identity, RemovalReason::Expired)?;
            return Ok(snapshot);
        }

        let expires_at = wall_clock(valid_until);
        self.store.put(&identity, content, expires_at)?;

        let generation = self.bump_generation();
        let timer = self.schedule_eviction(&identity, generation, valid_until);
        let previous = self.entries.insert(
            identity.clone(),
            Entry {
                generation,
                valid_until,
                timer,
            },
        );
        if let Some(previous) = previous {
            previous.timer.abort();
        }

        debug!("Cached {} (generation {})", identity, generation);
        let _ = self.events.send(CacheEvent::Updated {
            identity,
            expires_at,
        });
        Ok(snapshot)
    }

    fn delete(&mut self, identity: &ResourceIdentity) -> Result<bool> {
        self.remove(identity, RemovalReason::Deleted)
    }

    fn evict(&mut self, identity: &ResourceIdentity, generation: u64) -> Result<()> {
        match self.entries.get(identity) {
            Some(entry) if entry.generation == generation => {
                self.remove(identity, RemovalReason::Expired)?;
                debug!("Evicted {} (generation {})", identity, generation);
            }
            _ => debug!(
                "Ignoring stale eviction of {} (generation {})",
                identity, generation
            ),
        }
        Ok(())
    }

    fn remove(&mut self, identity: &ResourceIdentity, reason: RemovalReason) -> Result<bool> {
        let removed = match self.entries.remove(identity) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        };
        // The store may hold a record the index never admitted.
        let stored = self.store.delete(identity)?;
        if removed {
            let _ = self.events.send(CacheEvent::Removed {
                identity: identity.clone(),
                reason,
            });
        }
        Ok(removed || stored)
    }

    fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let now = Instant::now();
        let mut snapshots = Vec::with_capacity(self.entries.len());
        for (identity, entry) in &self.entries {
            if entry.valid_until <= now {
                continue;
            }
            if let Some(content) = self.store.get(identity)? {
                snapshots.push(Snapshot {
                    identity: identity.clone(),
                    content,
                    valid_until: entry.valid_until,
                });
            }
        }
        Ok(snapshots)
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn schedule_eviction(
        &self,
        identity: &ResourceIdentity,
        generation: u64,
        valid_until: Instant,
    ) -> JoinHandle<()> {
        let commands = self.commands.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(valid_until).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands
                    .send(CacheCommand::Evict {
                        identity,
                        generation,
                    })
                    .await;
            }
        })
    }
}

/// Cloneable front end of the cache task.
#[derive(Clone)]
pub struct CacheHandle {
    commands: mpsc::Sender<CacheCommand>,
    events: broadcast::Sender<CacheEvent>,
    timeout: Duration,
}

impl CacheHandle {
    /// Current snapshot for `identity`, `None` if absent or expired.
    pub async fn get(&self, identity: &ResourceIdentity) -> Result<Option<Snapshot>> {
        self.request(Some(identity), |reply| CacheCommand::Get {
            identity: identity.clone(),
            reply,
        })
        .await
    }

    /// Admit or replace the snapshot for `identity`, rescheduling its eviction.
    pub async fn put(
        &self,
        identity: &ResourceIdentity,
        content: Graph,
        valid_until: Instant,
    ) -> Result<Snapshot> {
        self.request(Some(identity), |reply| CacheCommand::Put {
            identity: identity.clone(),
            content: Arc::new(content),
            valid_until,
            reply,
        })
        .await
    }

    /// Remove the entry for `identity`. Idempotent; returns whether anything was removed.
    pub async fn delete(&self, identity: &ResourceIdentity) -> Result<bool> {
        self.request(Some(identity), |reply| CacheCommand::Delete {
            identity: identity.clone(),
            reply,
        })
        .await
    }

    /// Every live snapshot.
    pub async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        self.request(None, |reply| CacheCommand::Snapshots { reply })
            .await
    }

    /// Union of every live graph.
    pub async fn union_graph(&self) -> Result<Graph> {
        let mut union = Graph::new();
        for (index, snapshot) in self.snapshots().await?.iter().enumerate() {
            union.merge_scoped(&snapshot.content, &format!("g{}", index));
        }
        Ok(union)
    }

    /// Subscribe to puts and removals from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn operation_timeout(&self) -> Duration {
        self.timeout
    }

    fn request<T>(
        &self,
        identity: Option<&ResourceIdentity>,
        command: impl FnOnce(Reply<T>) -> CacheCommand,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let command = command(reply);
        let commands = self.commands.clone();
        let after = self.timeout;
        let identity = identity.cloned();

        async move {
            let exchange = async {
                commands
                    .send(command)
                    .await
                    .map_err(|_| SspError::Unavailable)?;
                response.await.map_err(|_| SspError::Unavailable)?
            };
            match tokio::time::timeout(after, exchange).await {
                Ok(result) => result,
                Err(_) => Err(match identity {
                    Some(identity) => SspError::timeout(&identity, after),
                    None => SspError::Unavailable,
                }),
            }
        }
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("timeout", &self.timeout)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
