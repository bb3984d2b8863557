//! Registry glue for announced endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use ssp_core::{AccessFailure, CacheHandle, DataOrigin, IdentityClaims, Registry, ResourceIdentity, Result, Snapshot, SspError};
use tracing::{info, warn};

use crate::accessor::{CoapAccessor, CoapEndpoint};
use crate::config::CoapConfig;
use crate::link_format::{self, Link, WELL_KNOWN_CORE};
use crate::observer::CoapObserver;
use crate::transport::{CoapRequest, CoapTransport, ContentFormat};

pub const FAMILY: &str = "coap";

/// Outcome of registering one discovered resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    /// Another registration already holds the identity.
    Duplicate,
    /// The resource could not be primed.
    Broken { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub identity: ResourceIdentity,
    #[serde(flatten)]
    pub status: RegistrationStatus,
}

/// Result of handling one provider announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub provider: SocketAddr,
    pub resources: Vec<ResourceOutcome>,
}

impl Announcement {
    pub fn registered(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.status == RegistrationStatus::Registered)
            .count()
    }
}

pub struct CoapFamily {
    registry: Registry<CoapEndpoint>,
    transport: Arc<dyn CoapTransport>,
    config: CoapConfig,
}

impl CoapFamily {
    pub fn new(
        config: &CoapConfig,
        transport: Arc<dyn CoapTransport>,
        cache: CacheHandle,
        claims: IdentityClaims,
    ) -> Self {
        let accessor = Arc::new(CoapAccessor::new(Arc::clone(&transport), config.fetch_timeout()));
        let observer = Arc::new(CoapObserver::new(
            Arc::clone(&transport),
            config.subscribe_timeout(),
            config.grace(),
        ));
        let registry: Registry<CoapEndpoint> = Registry::new(FAMILY, accessor, observer, cache, claims);

        CoapFamily {
            registry,
            transport,
            config: config.clone(),
        }
    }

    pub fn registry(&self) -> &Registry<CoapEndpoint> {
        &self.registry
    }

    pub fn origin_for(&self, addr: SocketAddr, path: &str) -> Result<DataOrigin<CoapEndpoint>> {
        let endpoint = CoapEndpoint::new(addr, path);
        let identity = endpoint.identity()?;
        Ok(DataOrigin::new(endpoint, identity))
    }

    /// Register a single resource of an endpoint.
    pub async fn register(&self, addr: SocketAddr, path: &str) -> Result<Snapshot> {
        self.registry.register(self.origin_for(addr, path)?).await
    }

    /// Fetch and parse the endpoint's `/.well-known/core`.
    pub async fn discover(&self, addr: SocketAddr) -> Result<Vec<Link>> {
        let well_known = CoapEndpoint::new(addr, WELL_KNOWN_CORE);
        let identity = well_known.identity()?;
        let request = CoapRequest::get(addr, WELL_KNOWN_CORE, &[ContentFormat::LinkFormat]);

        let response = match tokio::time::timeout(self.config.fetch_timeout(), self.transport.request(request)).await {
            Ok(response) => response.map_err(|e| e.into_access(&identity))?,
            Err(_) => return Err(SspError::timeout(&identity, self.config.fetch_timeout())),
        };
        if !response.code.is_success() {
            return Err(SspError::access(
                &identity,
                AccessFailure::Rejected {
                    code: response.code.to_string(),
                    message: response.text(),
                },
            ));
        }

        let links = link_format::parse(&response.text()).map_err(|e| e.into_access(&identity))?;
        Ok(links.into_iter().filter(|link| link.path != WELL_KNOWN_CORE).collect())
    }

    /// Handle an endpoint announcing itself: discover its resources and
    /// register each of them concurrently.
    pub async fn announce(&self, addr: SocketAddr) -> Result<Announcement> {
        info!("Endpoint {} announced itself", addr);
        let links = self.discover(addr).await.inspect_err(|e| {
            warn!("Discovery on {} failed: {}", addr, e);
        })?;

        let registrations = links.iter().map(|link| async move {
            let origin = self.origin_for(addr, &link.path)?;
            let identity = origin.identity().clone();
            let status = match self.registry.register(origin).await {
                Ok(_) => RegistrationStatus::Registered,
                Err(SspError::AlreadyRegistered(_)) => RegistrationStatus::Duplicate,
                Err(e) => RegistrationStatus::Broken { reason: e.to_string() },
            };
            Ok::<_, SspError>(ResourceOutcome { identity, status })
        });

        let mut resources = Vec::with_capacity(links.len());
        for outcome in join_all(registrations).await {
            match outcome {
                Ok(outcome) => resources.push(outcome),
                Err(e) => warn!("Skipping advertised resource of {}: {}", addr, e),
            }
        }

        let announcement = Announcement {
            provider: addr,
            resources,
        };
        info!(
            "Endpoint {} offered {} resources, {} registered",
            addr,
            announcement.resources.len(),
            announcement.registered()
        );
        Ok(announcement)
    }
}
