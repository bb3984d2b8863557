//! Test utilities for SSP core: a scripted provider family

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::*;

pub const FAMILY: &str = "scripted";

pub fn identity(name: &str) -> ResourceIdentity {
    ResourceIdentity::parse(format!("http://gateway.test/{}", name)).unwrap()
}

/// A one-triple graph whose value literal is `value`.
pub fn reading(value: &str) -> Graph {
    let mut graph = Graph::new();
    graph.insert(
        Term::iri("http://gateway.test/sensor"),
        Term::iri("http://gateway.test/value"),
        Term::literal(value),
    );
    graph
}

/// Value literal of a graph built by [`reading`].
pub fn value_of(graph: &Graph) -> String {
    graph
        .iter()
        .next()
        .map(|triple| triple.object.value().to_string())
        .unwrap_or_default()
}

pub fn memory_cache() -> CacheHandle {
    Cache::spawn(Box::new(MemoryStore::new()), CacheConfig::default()).unwrap()
}

/// Let spawned tasks run; advances paused time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// What the scripted origin does on its next fetch.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Graph, Duration),
    Slow(Duration, Graph, Duration),
    Fail(AccessFailure),
    Hang,
}

/// What the scripted origin pushes to its observer.
#[derive(Debug, Clone)]
pub enum Push {
    Update(Graph, Duration),
    Fail(String),
    Gone,
}

#[derive(Default)]
struct Feeds {
    senders: HashMap<ResourceIdentity, mpsc::UnboundedSender<Push>>,
    receivers: HashMap<ResourceIdentity, mpsc::UnboundedReceiver<Push>>,
}

/// Accessor and Observer pair driven entirely by the test.
pub struct ScriptedFamily {
    steps: Mutex<VecDeque<Step>>,
    feeds: Mutex<Feeds>,
    fetches: AtomicUsize,
    timeout: Duration,
}

impl ScriptedFamily {
    pub fn new(first: Step) -> Arc<Self> {
        Arc::new(ScriptedFamily {
            steps: Mutex::new(VecDeque::from([first])),
            feeds: Mutex::new(Feeds::default()),
            fetches: AtomicUsize::new(0),
            timeout: Duration::from_secs(5),
        })
    }

    /// Queue a step; the last queued step repeats once the queue drains.
    pub fn then(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    /// Replace the whole script with a single repeating step.
    pub fn set(&self, step: Step) {
        *self.steps.lock().unwrap() = VecDeque::from([step]);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push(&self, identity: &ResourceIdentity, push: Push) {
        let _ = self.sender(identity).send(push);
    }

    pub fn registry(self: &Arc<Self>, cache: CacheHandle, claims: IdentityClaims) -> Registry<String> {
        Registry::new(FAMILY, self.clone(), self.clone(), cache, claims)
    }

    pub fn origin(name: &str) -> DataOrigin<String> {
        DataOrigin::new(name.to_string(), identity(name))
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap()
        }
    }

    fn sender(&self, identity: &ResourceIdentity) -> mpsc::UnboundedSender<Push> {
        let mut feeds = self.feeds.lock().unwrap();
        match feeds.senders.get(identity) {
            Some(sender) if !sender.is_closed() => sender.clone(),
            _ => {
                let (tx, rx) = mpsc::unbounded_channel();
                feeds.senders.insert(identity.clone(), tx.clone());
                feeds.receivers.insert(identity.clone(), rx);
                tx
            }
        }
    }

    fn take_receiver(&self, identity: &ResourceIdentity) -> mpsc::UnboundedReceiver<Push> {
        let mut feeds = self.feeds.lock().unwrap();
        if let Some(rx) = feeds.receivers.remove(identity) {
            return rx;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        feeds.senders.insert(identity.clone(), tx);
        rx
    }
}

#[async_trait]
impl Accessor<String> for ScriptedFamily {
    async fn fetch(&self, origin: &DataOrigin<String>) -> Result<FetchedGraph> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Respond(graph, ttl) => Ok(FetchedGraph::valid_for(graph, ttl)),
            Step::Slow(delay, graph, ttl) => {
                tokio::time::sleep(delay).await;
                Ok(FetchedGraph::valid_for(graph, ttl))
            }
            Step::Fail(reason) => Err(SspError::access(origin.identity(), reason)),
            Step::Hang => std::future::pending().await,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Observer<String> for ScriptedFamily {
    async fn observe(&self, origin: DataOrigin<String>, sink: UpdateSink) -> Result<()> {
        let mut feed = self.take_receiver(origin.identity());
        while let Some(push) = feed.recv().await {
            match push {
                Push::Update(graph, ttl) => {
                    sink.publish(FetchedGraph::valid_for(graph, ttl)).await?;
                }
                Push::Fail(reason) => return Err(SspError::observation(origin.identity(), reason)),
                Push::Gone => return Ok(()),
            }
        }
        Err(SspError::observation(origin.identity(), "feed closed"))
    }
}
