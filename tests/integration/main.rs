//! Integration tests for the gateway
//!
//! A push-style endpoint family behind the request router, driven through
//! the scripted transport on a paused clock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ssp_coap::mock::MockTransport;
use ssp_coap::{CoapConfig, CoapEndpoint, CoapFamily, CoapResponse, ContentFormat};
use ssp_core::{
    Cache, CacheConfig, IdentityClaims, MemoryStore, RequestRouter, ResourceIdentity, Snapshot, SspError, query,
};
use ssp_files::{FilesConfig, FilesFamily};
use ssp_virtual::{VirtualSensorDefinition, VirtualSensorsConfig, VirtualSensorsFamily};
use tokio::time::sleep;

fn endpoint() -> SocketAddr {
    "192.0.2.10:5683".parse().unwrap()
}

fn reading(value: &str) -> CoapResponse {
    let payload = format!("<coap://192.0.2.10/temp> <http://gateway.test/value> \"{}\" .\n", value);
    CoapResponse::content(ContentFormat::NTriples, payload)
}

fn value(snapshot: &Snapshot) -> String {
    snapshot
        .content
        .iter()
        .next()
        .map(|t| t.object.value().to_string())
        .unwrap_or_default()
}

struct Gateway {
    transport: Arc<MockTransport>,
    family: Arc<CoapFamily>,
    router: RequestRouter,
    identity: ResourceIdentity,
}

fn gateway() -> Gateway {
    let transport = MockTransport::new();
    transport.respond(endpoint(), "/temp", reading("G1"));

    let cache = Cache::spawn(Box::new(MemoryStore::new()), CacheConfig::default()).unwrap();
    let claims = IdentityClaims::new();
    let family = Arc::new(CoapFamily::new(
        &CoapConfig::default(),
        transport.clone(),
        cache.clone(),
        claims.clone(),
    ));
    let router = RequestRouter::new(cache, claims).with_source(Arc::new(family.registry().clone()));
    let identity = CoapEndpoint::new(endpoint(), "/temp").identity().unwrap();

    Gateway {
        transport,
        family,
        router,
        identity,
    }
}

async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_registered_resource_is_served_from_cache() {
    let gw = gateway();
    gw.family.register(endpoint(), "/temp").await.unwrap();
    settle().await;

    let snapshot = gw.router.handle(&gw.identity).await.unwrap();
    assert_eq!(value(&snapshot), "G1");
    assert_eq!(gw.transport.requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_fetched_again() {
    let gw = gateway();
    gw.family.register(endpoint(), "/temp").await.unwrap();
    gw.transport.respond(endpoint(), "/temp", reading("G2"));

    sleep(Duration::from_secs(61)).await;
    let snapshot = gw.router.handle(&gw.identity).await.unwrap();
    assert_eq!(value(&snapshot), "G2");
    assert_eq!(gw.transport.requests(), 2);

    sleep(Duration::from_secs(1)).await;
    let again = gw.router.handle(&gw.identity).await.unwrap();
    assert_eq!(value(&again), "G2");
    assert_eq!(gw.transport.requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_push_update_outlives_the_earlier_eviction() {
    let gw = gateway();
    gw.family.register(endpoint(), "/temp").await.unwrap();
    settle().await;

    sleep(Duration::from_secs(30)).await;
    assert!(gw.transport.notify(endpoint(), "/temp", reading("G3").with_max_age(60)).await);
    settle().await;
    assert_eq!(value(&gw.router.handle(&gw.identity).await.unwrap()), "G3");

    // Past the first snapshot's expiry.
    sleep(Duration::from_secs(31)).await;
    assert_eq!(value(&gw.router.handle(&gw.identity).await.unwrap()), "G3");

    sleep(Duration::from_secs(14)).await;
    assert_eq!(value(&gw.router.handle(&gw.identity).await.unwrap()), "G3");
    assert_eq!(gw.transport.requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_registration_has_one_winner() {
    let gw = gateway();
    let (first, second) = tokio::join!(
        gw.family.register(endpoint(), "/temp"),
        gw.family.register(endpoint(), "/temp"),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let loser = outcomes.into_iter().find_map(|o| o.err()).unwrap();
    match loser {
        SspError::AlreadyRegistered(identity) => assert_eq!(identity, gw.identity),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(gw.family.registry().len(), 1);
}

#[tokio::test]
async fn test_query_spans_families() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kitchen.nt"),
        "<http://gateway.test/kitchen> <http://gateway.test/value> \"19.0\" .\n",
    )
    .unwrap();

    let cache = Cache::spawn(Box::new(MemoryStore::new()), CacheConfig::default()).unwrap();
    let claims = IdentityClaims::new();
    let files_config = FilesConfig {
        root: dir.path().to_path_buf(),
        ..FilesConfig::default()
    };
    let files = FilesFamily::new(&files_config, "http://gateway.test", cache.clone(), claims.clone()).unwrap();
    let discovered = files.discover().await;
    assert_eq!(discovered.len(), 1);

    let sensors = VirtualSensorsFamily::new(
        &VirtualSensorsConfig::default(),
        "http://gateway.test",
        cache.clone(),
        claims.clone(),
    );
    sensors
        .create(VirtualSensorDefinition {
            name: "kitchen-temp".to_string(),
            sensor_type: "http://gateway.test/CopySensor".to_string(),
            feature_of_interest: "http://gateway.test/kitchen".to_string(),
            observed_property: "http://gateway.test/temperature".to_string(),
            query: "SELECT ?val WHERE { <http://gateway.test/kitchen> <http://gateway.test/value> ?val }".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(claims.len(), 2);

    let results = query::execute(&cache, "SELECT ?s ?p WHERE { ?s ?p \"19.0\" }").await.unwrap();
    // The file triple, the sensor output and its shortcut on the feature.
    assert_eq!(results.rows.len(), 3);
}
