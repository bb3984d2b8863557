//! Observe subscription with a staleness watchdog
//!
//! Two timers guard a subscription. The transport deadline bounds how long
//! setting it up may take. The staleness timer is reset on every
//! notification to that notification's max-age plus a grace period; if it
//! fires, the endpoint has gone silent and the observation fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ssp_core::{DataOrigin, FetchedGraph, Observer, Result, SspError, StalenessTimer, UpdateSink};
use tracing::{debug, info};

use crate::accessor::{CoapEndpoint, decode};
use crate::transport::{CoapRequest, CoapTransport, ContentFormat, DEFAULT_MAX_AGE};

pub struct CoapObserver {
    transport: Arc<dyn CoapTransport>,
    subscribe_timeout: Duration,
    grace: Duration,
}

impl CoapObserver {
    pub fn new(transport: Arc<dyn CoapTransport>, subscribe_timeout: Duration, grace: Duration) -> Self {
        CoapObserver {
            transport,
            subscribe_timeout,
            grace,
        }
    }
}

#[async_trait]
impl Observer<CoapEndpoint> for CoapObserver {
    async fn observe(&self, origin: DataOrigin<CoapEndpoint>, sink: UpdateSink) -> Result<()> {
        let endpoint = origin.locator();
        let identity = origin.identity();
        let request = CoapRequest::observe(endpoint.addr, endpoint.path.clone(), &ContentFormat::GRAPHS);

        let mut notifications = match tokio::time::timeout(self.subscribe_timeout, self.transport.subscribe(request)).await
        {
            Ok(Ok(notifications)) => notifications,
            Ok(Err(e)) => return Err(SspError::observation(identity, format!("subscription failed: {}", e))),
            Err(_) => {
                return Err(SspError::observation(
                    identity,
                    format!("subscription timed out after {:?}", self.subscribe_timeout),
                ));
            }
        };
        info!("Observing {}", endpoint);

        let mut staleness = StalenessTimer::new(Duration::from_secs(u64::from(DEFAULT_MAX_AGE)) + self.grace);
        loop {
            tokio::select! {
                notification = notifications.recv() => {
                    let Some(response) = notification else {
                        return Err(SspError::observation(identity, "notification stream ended"));
                    };
                    if !response.code.is_success() {
                        return Err(SspError::observation(
                            identity,
                            format!("error notification {}: {}", response.code, response.text()),
                        ));
                    }

                    let content = decode(identity, &response)
                        .map_err(|e| SspError::observation(identity, e.to_string()))?;
                    debug!("Notification from {} ({} triples, max-age {}s)", endpoint, content.len(), response.max_age);
                    sink.publish(FetchedGraph::valid_for(content, response.max_age())).await?;
                    staleness.reset_to(response.max_age() + self.grace);
                }
                _ = staleness.expired() => {
                    return Err(SspError::observation(
                        identity,
                        format!("no notification within {:?}", staleness.window()),
                    ));
                }
            }
        }
    }
}
