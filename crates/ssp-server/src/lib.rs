//! HTTP + WebSocket surface of the gateway

pub mod error;
pub mod handlers;
pub mod registration;
pub mod router;
pub mod websocket;

#[cfg(test)]
pub mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use serde::{Deserialize, Serialize};
use ssp_coap::CoapFamily;
use ssp_core::{CacheHandle, RequestRouter};
use ssp_virtual::VirtualSensorsFamily;
use tokio::net::TcpListener;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use router::create_router;

/// Where to listen and how resources are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base of every gateway-minted identity; `http://host:port` if unset.
    pub base_uri: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_uri: None,
        }
    }
}

impl ServerConfig {
    pub fn base_uri(&self) -> String {
        match &self.base_uri {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

/// Shared state of all handlers.
pub struct AppState {
    pub router: RequestRouter,
    pub base_uri: String,
    pub virtual_sensors: Option<Arc<VirtualSensorsFamily>>,
    pub coap: Option<Arc<CoapFamily>>,
}

impl AppState {
    pub fn new(router: RequestRouter, base_uri: impl Into<String>) -> Self {
        AppState {
            router,
            base_uri: base_uri.into(),
            virtual_sensors: None,
            coap: None,
        }
    }

    pub fn with_virtual_sensors(mut self, family: Arc<VirtualSensorsFamily>) -> Self {
        self.virtual_sensors = Some(family);
        self
    }

    pub fn with_coap(mut self, family: Arc<CoapFamily>) -> Self {
        self.coap = Some(family);
        self
    }

    pub fn cache(&self) -> &CacheHandle {
        self.router.cache()
    }
}

/// The gateway's HTTP server.
pub struct SspServer {
    state: Arc<AppState>,
    config: ServerConfig,
}

impl SspServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        SspServer {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn router(&self) -> Router {
        create_router(self.state())
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        info!("Gateway listening on http://{} (base URI {})", local, self.state.base_uri);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the task is dropped.
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
