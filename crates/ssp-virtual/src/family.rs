//! Registry glue for virtual sensors

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use ssp_core::{CacheHandle, DataOrigin, Graph, IdentityClaims, Registry, ResourceIdentity, Result, Snapshot};
use tracing::{info, warn};

use crate::accessor::VirtualSensorAccessor;
use crate::config::VirtualSensorsConfig;
use crate::definition::VirtualSensorDefinition;
use crate::observer::VirtualSensorObserver;

pub const FAMILY: &str = "virtual";

/// Per-sensor result of a batch creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreationOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResourceIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct VirtualSensorsFamily {
    registry: Registry<VirtualSensorDefinition>,
    accessor: Arc<VirtualSensorAccessor>,
    base_uri: String,
}

impl VirtualSensorsFamily {
    pub fn new(config: &VirtualSensorsConfig, base_uri: &str, cache: CacheHandle, claims: IdentityClaims) -> Self {
        let accessor = Arc::new(VirtualSensorAccessor::new(
            cache.clone(),
            config.interval(),
            config.fetch_timeout(),
        ));
        let observer = Arc::new(VirtualSensorObserver::new(Arc::clone(&accessor)));
        let registry: Registry<VirtualSensorDefinition> =
            Registry::new(FAMILY, accessor.clone(), observer, cache, claims);

        VirtualSensorsFamily {
            registry,
            accessor,
            base_uri: base_uri.trim_end_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> &Registry<VirtualSensorDefinition> {
        &self.registry
    }

    /// `<base>/vs#<name>`
    pub fn identity_for(&self, name: &str) -> Result<ResourceIdentity> {
        ResourceIdentity::parse(format!("{}/vs#{}", self.base_uri, name))
    }

    fn origin_for(&self, definition: VirtualSensorDefinition) -> Result<DataOrigin<VirtualSensorDefinition>> {
        definition.validate()?;
        let identity = self.identity_for(&definition.name)?;
        Ok(DataOrigin::new(definition, identity))
    }

    /// Validate and register one sensor. Returns its first evaluation.
    pub async fn create(&self, definition: VirtualSensorDefinition) -> Result<Snapshot> {
        let origin = self.origin_for(definition)?;
        self.registry.register(origin).await
    }

    /// Register several sensors concurrently, reporting each outcome.
    pub async fn create_batch(&self, definitions: Vec<VirtualSensorDefinition>) -> Vec<CreationOutcome> {
        let creations = definitions.into_iter().map(|definition| async move {
            let name = definition.name.clone();
            match self.create(definition).await {
                Ok(snapshot) => CreationOutcome {
                    name,
                    identity: Some(snapshot.identity),
                    error: None,
                },
                Err(e) => CreationOutcome {
                    name,
                    identity: None,
                    error: Some(e.to_string()),
                },
            }
        });
        let outcomes = join_all(creations).await;

        let created = outcomes.iter().filter(|o| o.error.is_none()).count();
        info!("Created {} of {} virtual sensors", created, outcomes.len());
        outcomes
    }

    /// Evaluate a definition once without registering it.
    pub async fn preview(&self, definition: VirtualSensorDefinition) -> Result<Graph> {
        let origin = self.origin_for(definition)?;
        self.accessor.evaluate(&origin).await
    }

    /// Create the sensors listed in the configuration; failures are logged.
    pub async fn create_configured(&self, config: &VirtualSensorsConfig) -> usize {
        let mut created = 0;
        for definition in config.sensors.iter().cloned() {
            let name = definition.name.clone();
            match self.create(definition).await {
                Ok(_) => created += 1,
                Err(e) => warn!("Configured virtual sensor {} not created: {}", name, e),
            }
        }
        created
    }
}
