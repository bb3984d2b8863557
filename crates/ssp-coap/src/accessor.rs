//! One-shot GET against an endpoint resource

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ssp_core::{AccessFailure, Accessor, DataOrigin, FetchedGraph, Graph, ResourceIdentity, Result, SspError};
use tracing::debug;

use crate::transport::{CoapRequest, CoapResponse, CoapTransport, ContentFormat, DEFAULT_PORT};

/// Where a resource lives: endpoint socket plus resource path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoapEndpoint {
    pub addr: SocketAddr,
    pub path: String,
}

impl CoapEndpoint {
    pub fn new(addr: SocketAddr, path: &str) -> Self {
        CoapEndpoint {
            addr,
            path: format!("/{}", path.trim_start_matches('/')),
        }
    }

    /// `coap://host[:port]/path`; the default port is left out.
    pub fn identity(&self) -> Result<ResourceIdentity> {
        ResourceIdentity::parse(self.to_string())
    }
}

impl fmt::Display for CoapEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = match self.addr {
            SocketAddr::V4(addr) => addr.ip().to_string(),
            SocketAddr::V6(addr) => format!("[{}]", addr.ip()),
        };
        if self.addr.port() == DEFAULT_PORT {
            write!(f, "coap://{}{}", host, self.path)
        } else {
            write!(f, "coap://{}:{}{}", host, self.addr.port(), self.path)
        }
    }
}

pub struct CoapAccessor {
    transport: Arc<dyn CoapTransport>,
    timeout: Duration,
}

impl CoapAccessor {
    pub fn new(transport: Arc<dyn CoapTransport>, timeout: Duration) -> Self {
        CoapAccessor { transport, timeout }
    }
}

#[async_trait]
impl Accessor<CoapEndpoint> for CoapAccessor {
    async fn fetch(&self, origin: &DataOrigin<CoapEndpoint>) -> Result<FetchedGraph> {
        let endpoint = origin.locator();
        let request = CoapRequest::get(endpoint.addr, endpoint.path.clone(), &ContentFormat::GRAPHS);

        let response = self
            .transport
            .request(request)
            .await
            .map_err(|e| e.into_access(origin.identity()))?;
        let content = decode(origin.identity(), &response)?;

        debug!("GET {} returned {} triples (max-age {}s)", endpoint, content.len(), response.max_age);
        Ok(FetchedGraph::valid_for(content, response.max_age()))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Turn a response into graph content, rejecting error codes and
/// non-graph payloads.
pub(crate) fn decode(identity: &ResourceIdentity, response: &CoapResponse) -> Result<Graph> {
    if !response.code.is_success() {
        return Err(SspError::access(
            identity,
            AccessFailure::Rejected {
                code: response.code.to_string(),
                message: response.text(),
            },
        ));
    }

    let format = response
        .format
        .and_then(|format| format.graph_format())
        .ok_or_else(|| {
            SspError::access(
                identity,
                AccessFailure::Malformed(format!("unsupported content format {:?}", response.format)),
            )
        })?;

    let text = std::str::from_utf8(&response.payload)
        .map_err(|e| SspError::access(identity, AccessFailure::Malformed(e.to_string())))?;
    format
        .parse(text)
        .map_err(|e| SspError::access(identity, AccessFailure::Malformed(e.to_string())))
}
