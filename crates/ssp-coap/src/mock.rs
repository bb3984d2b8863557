//! In-memory transport with scripted endpoints

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{CoapError, CoapRequest, CoapResponse, CoapTransport, ResponseCode};

type Key = (SocketAddr, String);

#[derive(Debug, Clone)]
enum Behaviour {
    Respond(CoapResponse),
    Unreachable,
    Hang,
}

/// Scripted endpoints keyed by socket and path. Unknown resources answer 4.04.
#[derive(Default)]
pub struct MockTransport {
    resources: Mutex<HashMap<Key, Behaviour>>,
    subscribers: Mutex<HashMap<Key, mpsc::Sender<CoapResponse>>>,
    requests: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, addr: SocketAddr, path: &str, response: CoapResponse) {
        self.set(addr, path, Behaviour::Respond(response));
    }

    pub fn unreachable(&self, addr: SocketAddr, path: &str) {
        self.set(addr, path, Behaviour::Unreachable);
    }

    /// Never answer requests or subscriptions for this resource.
    pub fn hang(&self, addr: SocketAddr, path: &str) {
        self.set(addr, path, Behaviour::Hang);
    }

    /// Push a notification to the observer of a resource.
    pub async fn notify(&self, addr: SocketAddr, path: &str, response: CoapResponse) -> bool {
        let sender = self.subscribers.lock().unwrap().get(&key(addr, path)).cloned();
        match sender {
            Some(sender) => sender.send(response).await.is_ok(),
            None => false,
        }
    }

    /// End the observation of a resource from the endpoint side.
    pub fn cancel(&self, addr: SocketAddr, path: &str) {
        self.subscribers.lock().unwrap().remove(&key(addr, path));
    }

    pub fn is_observed(&self, addr: SocketAddr, path: &str) -> bool {
        self.subscribers
            .lock()
            .unwrap()
            .get(&key(addr, path))
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Plain requests served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    fn set(&self, addr: SocketAddr, path: &str, behaviour: Behaviour) {
        self.resources.lock().unwrap().insert(key(addr, path), behaviour);
    }

    fn behaviour(&self, request: &CoapRequest) -> Behaviour {
        self.resources
            .lock()
            .unwrap()
            .get(&key(request.addr, &request.path))
            .cloned()
            .unwrap_or_else(|| Behaviour::Respond(CoapResponse::error(ResponseCode::NOT_FOUND, "no such resource")))
    }
}

fn key(addr: SocketAddr, path: &str) -> Key {
    (addr, format!("/{}", path.trim_start_matches('/')))
}

#[async_trait]
impl CoapTransport for MockTransport {
    async fn request(&self, request: CoapRequest) -> Result<CoapResponse, CoapError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.behaviour(&request) {
            Behaviour::Respond(response) => Ok(response),
            Behaviour::Unreachable => Err(CoapError::Unreachable(request.addr, "no route to host".into())),
            Behaviour::Hang => std::future::pending().await,
        }
    }

    async fn subscribe(&self, request: CoapRequest) -> Result<mpsc::Receiver<CoapResponse>, CoapError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let response = match self.behaviour(&request) {
            Behaviour::Respond(response) => response,
            Behaviour::Unreachable => return Err(CoapError::Unreachable(request.addr, "no route to host".into())),
            Behaviour::Hang => std::future::pending().await,
        };

        let (sender, receiver) = mpsc::channel(16);
        let _ = sender.try_send(response);
        self.subscribers
            .lock()
            .unwrap()
            .insert(key(request.addr, &request.path), sender);
        Ok(receiver)
    }
}
