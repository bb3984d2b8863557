//! Unit tests for virtual sensors

use std::time::Duration;

use ssp_core::{
    Cache, CacheConfig, CacheHandle, Graph, IdentityClaims, MemoryStore, OriginSource, ResourceIdentity, SspError,
    Term,
};
use tokio::time::Instant;

use crate::*;

const BASE: &str = "http://gateway.test";

fn cache() -> CacheHandle {
    Cache::spawn(Box::new(MemoryStore::new()), CacheConfig::default()).unwrap()
}

fn config(interval_secs: u64) -> VirtualSensorsConfig {
    VirtualSensorsConfig {
        interval_secs,
        ..VirtualSensorsConfig::default()
    }
}

fn family(interval_secs: u64) -> (VirtualSensorsFamily, CacheHandle) {
    let cache = cache();
    let family = VirtualSensorsFamily::new(&config(interval_secs), BASE, cache.clone(), IdentityClaims::new());
    (family, cache)
}

fn definition(name: &str) -> VirtualSensorDefinition {
    VirtualSensorDefinition {
        name: name.to_string(),
        sensor_type: "http://gateway.test/AverageSensor".to_string(),
        feature_of_interest: "http://gateway.test/kitchen".to_string(),
        observed_property: "http://gateway.test/temperature".to_string(),
        query: "SELECT ?val WHERE { <http://gateway.test/thermometer> <http://gateway.test/value> ?val }"
            .to_string(),
    }
}

async fn put_reading(cache: &CacheHandle, value: &str) {
    let mut graph = Graph::new();
    graph.insert(
        Term::iri("http://gateway.test/thermometer"),
        Term::iri("http://gateway.test/value"),
        Term::literal(value),
    );
    let identity = ResourceIdentity::parse("http://gateway.test/thermometer").unwrap();
    cache
        .put(&identity, graph, Instant::now() + Duration::from_secs(3600))
        .await
        .unwrap();
}

fn sensor_value(graph: &Graph) -> Option<String> {
    let has_value = Term::iri(format!("{}hasValue", SSN));
    graph
        .matching(None, Some(&has_value), None)
        .next()
        .map(|t| t.object.value().to_string())
}

async fn cached_sensor_value(cache: &CacheHandle, identity: &ResourceIdentity) -> Option<String> {
    cache
        .get(identity)
        .await
        .unwrap()
        .and_then(|snapshot| sensor_value(&snapshot.content))
}

#[tokio::test]
async fn test_create_evaluates_query() {
    let (family, cache) = family(60);
    put_reading(&cache, "21.5").await;

    let snapshot = family.create(definition("kitchen-avg")).await.unwrap();
    assert_eq!(snapshot.identity.as_str(), "http://gateway.test/vs#kitchen-avg");
    assert_eq!(sensor_value(&snapshot.content).as_deref(), Some("21.5"));
    assert!(family.registry().contains(&snapshot.identity));
}

#[tokio::test]
async fn test_missing_binding_yields_null() {
    let (family, _) = family(60);
    let snapshot = family.create(definition("lonely")).await.unwrap();
    assert_eq!(sensor_value(&snapshot.content).as_deref(), Some("null"));
}

#[tokio::test(start_paused = true)]
async fn test_validity_is_two_intervals() {
    let (family, _) = family(10);
    let snapshot = family.create(definition("kitchen-avg")).await.unwrap();
    assert_eq!(snapshot.valid_until, Instant::now() + Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_reevaluation() {
    let (family, cache) = family(10);
    put_reading(&cache, "21.5").await;
    let identity = family.create(definition("kitchen-avg")).await.unwrap().identity;

    put_reading(&cache, "23.0").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cached_sensor_value(&cache, &identity).await.as_deref(), Some("21.5"));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(cached_sensor_value(&cache, &identity).await.as_deref(), Some("23.0"));

    // Kept alive by the observer well past the first validity window.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(cached_sensor_value(&cache, &identity).await.as_deref(), Some("23.0"));
}

#[tokio::test]
async fn test_delete_unregisters() {
    let (family, cache) = family(60);
    let identity = family.create(definition("kitchen-avg")).await.unwrap().identity;

    OriginSource::delete(family.registry(), &identity).await.unwrap();
    assert!(family.registry().is_empty());
    assert!(cache.get(&identity).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let (family, _) = family(60);
    family.create(definition("kitchen-avg")).await.unwrap();
    let err = family.create(definition("kitchen-avg")).await.unwrap_err();
    assert!(matches!(err, SspError::AlreadyRegistered(_)));
}

#[tokio::test]
async fn test_batch_reports_each_sensor() {
    let (family, _) = family(60);
    let mut broken = definition("broken");
    broken.query = "SELECT ?val".to_string();

    let outcomes = family
        .create_batch(vec![definition("a"), broken, definition("b")])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].identity.is_some());
    assert!(outcomes[1].error.as_deref().unwrap().contains("query"));
    assert!(outcomes[2].identity.is_some());
    assert_eq!(family.registry().len(), 2);

    let json = serde_json::to_value(&outcomes[0]).unwrap();
    assert_eq!(json["identity"], "http://gateway.test/vs#a");
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_preview_does_not_register() {
    let (family, cache) = family(60);
    put_reading(&cache, "19.0").await;

    let graph = family.preview(definition("draft")).await.unwrap();
    assert_eq!(sensor_value(&graph).as_deref(), Some("19.0"));
    assert!(family.registry().is_empty());
}

#[tokio::test]
async fn test_configured_sensors() {
    let config: VirtualSensorsConfig = toml::from_str(
        r#"
        interval_secs = 30

        [[sensor]]
        name = "kitchen-avg"
        sensor_type = "http://gateway.test/AverageSensor"
        feature_of_interest = "http://gateway.test/kitchen"
        observed_property = "http://gateway.test/temperature"
        query = "SELECT ?val WHERE { ?s <http://gateway.test/value> ?val }"

        [[sensor]]
        name = "bad name"
        sensor_type = "http://gateway.test/AverageSensor"
        feature_of_interest = "http://gateway.test/kitchen"
        observed_property = "http://gateway.test/temperature"
        query = "SELECT ?val WHERE { ?s ?p ?val }"
        "#,
    )
    .unwrap();
    assert_eq!(config.interval(), Duration::from_secs(30));
    assert!(config.enabled);

    let cache = cache();
    let family = VirtualSensorsFamily::new(&config, BASE, cache, IdentityClaims::new());
    assert_eq!(family.create_configured(&config).await, 1);
}
