//! Evaluates a sensor's query over the cache on demand

use std::time::Duration;

use async_trait::async_trait;
use ssp_core::{Accessor, CacheHandle, DataOrigin, FetchedGraph, Graph, Result, Term, query};
use tracing::debug;

use crate::definition::{VALUE_VARIABLE, VirtualSensorDefinition};

pub struct VirtualSensorAccessor {
    cache: CacheHandle,
    interval: Duration,
    timeout: Duration,
}

impl VirtualSensorAccessor {
    pub fn new(cache: CacheHandle, interval: Duration, timeout: Duration) -> Self {
        VirtualSensorAccessor {
            cache,
            interval,
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long one evaluation stays valid: two evaluation intervals.
    pub fn validity(&self) -> Duration {
        self.interval * 2
    }

    /// Current sensor graph, without touching any registry.
    pub async fn evaluate(&self, origin: &DataOrigin<VirtualSensorDefinition>) -> Result<Graph> {
        let definition = origin.locator();
        let results = query::execute(&self.cache, &definition.query).await?;
        let value = results
            .rows
            .into_iter()
            .find_map(|mut row| row.remove(VALUE_VARIABLE))
            .unwrap_or_else(|| Term::literal("null"));

        debug!(
            "Virtual sensor {} evaluated to {:?} in {:?}",
            origin.identity(),
            value.value(),
            results.duration
        );
        Ok(definition.observation_graph(origin.identity(), value))
    }
}

#[async_trait]
impl Accessor<VirtualSensorDefinition> for VirtualSensorAccessor {
    async fn fetch(&self, origin: &DataOrigin<VirtualSensorDefinition>) -> Result<FetchedGraph> {
        let content = self.evaluate(origin).await?;
        Ok(FetchedGraph::valid_for(content, self.validity()))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Nothing lives outside the gateway, so deleting is just unregistering.
    async fn delete(&self, origin: &DataOrigin<VirtualSensorDefinition>) -> Result<()> {
        debug!("Deleting virtual sensor {}", origin.identity());
        Ok(())
    }
}
