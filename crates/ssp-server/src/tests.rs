//! Live HTTP round trips against a server on an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};
use ssp_coap::mock::MockTransport;
use ssp_coap::{CoapConfig, CoapFamily, CoapResponse, ContentFormat};
use ssp_core::{Cache, CacheConfig, IdentityClaims, MemoryStore, RequestRouter};
use ssp_virtual::{VirtualSensorsConfig, VirtualSensorsFamily};
use tokio::net::TcpListener;

use crate::*;

const BASE: &str = "http://gateway.test";
const TEMP: &str = "coap://10.0.0.7/temp";

fn endpoint() -> SocketAddr {
    "10.0.0.7:5683".parse().unwrap()
}

fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

struct Gateway {
    url: String,
    client: reqwest::Client,
}

impl Gateway {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.url, path))
    }

    fn graph(&self, identity: &str) -> String {
        format!("{}/graph?uri={}", self.url, encode(identity))
    }
}

fn state(with_coap: bool) -> AppState {
    let cache = Cache::spawn(Box::new(MemoryStore::new()), CacheConfig::default()).unwrap();
    let claims = IdentityClaims::new();

    let transport = MockTransport::new();
    transport.respond(
        endpoint(),
        "/.well-known/core",
        CoapResponse::content(ContentFormat::LinkFormat, "</temp>;obs"),
    );
    transport.respond(
        endpoint(),
        "/temp",
        CoapResponse::content(
            ContentFormat::NTriples,
            "<coap://10.0.0.7/temp> <http://gateway.test/value> \"21.5\" .\n",
        ),
    );
    let coap = Arc::new(CoapFamily::new(&CoapConfig::default(), transport, cache.clone(), claims.clone()));
    let sensors = Arc::new(VirtualSensorsFamily::new(
        &VirtualSensorsConfig::default(),
        BASE,
        cache.clone(),
        claims.clone(),
    ));

    let router = RequestRouter::new(cache, claims)
        .with_source(Arc::new(coap.registry().clone()))
        .with_source(Arc::new(sensors.registry().clone()));
    let state = AppState::new(router, BASE).with_virtual_sensors(sensors);
    if with_coap { state.with_coap(coap) } else { state }
}

async fn spawn(state: AppState) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server = SspServer::new(state, ServerConfig::default());
    tokio::spawn(server.serve(listener));
    Gateway {
        url,
        client: reqwest::Client::new(),
    }
}

async fn announced() -> Gateway {
    let gateway = spawn(state(true)).await;
    let response = gateway
        .client
        .post(format!("{}/registry/coap", gateway.url))
        .json(&json!({ "address": "10.0.0.7:5683" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["resources"][0]["status"], "registered");
    gateway
}

#[tokio::test]
async fn test_health_and_services() {
    let gateway = announced().await;

    let health: Value = gateway.get("/api/health").send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["resources"], 1);

    let services: Value = gateway.get("/services").send().await.unwrap().json().await.unwrap();
    assert_eq!(services[0]["family"], "coap");
    assert_eq!(services[0]["identities"][0], TEMP);
    assert_eq!(services[1]["family"], "virtual");
}

#[tokio::test]
async fn test_graph_read_with_negotiation_and_cache_headers() {
    let gateway = announced().await;

    let response = gateway.client.get(gateway.graph(TEMP)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/n-triples");
    assert!(headers["cache-control"].to_str().unwrap().starts_with("max-age="));
    assert!(headers["expires"].to_str().unwrap().ends_with("GMT"));
    assert!(response.text().await.unwrap().contains("\"21.5\""));

    let json = gateway
        .client
        .get(gateway.graph(TEMP))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(json.headers()["content-type"], "application/json");

    let refused = gateway
        .client
        .get(gateway.graph(TEMP))
        .header("accept", "image/png")
        .send()
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_resource_errors() {
    let gateway = announced().await;

    let missing = gateway.client.get(gateway.graph("http://gateway.test/nope")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let put = gateway.client.put(gateway.graph(TEMP)).send().await.unwrap();
    assert_eq!(put.status(), StatusCode::METHOD_NOT_ALLOWED);

    // The endpoint family is read-only.
    let delete = gateway.client.delete(gateway.graph(TEMP)).send().await.unwrap();
    assert_eq!(delete.status(), StatusCode::METHOD_NOT_ALLOWED);

    let invalid = gateway.client.get(gateway.graph("no identity")).send().await.unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_path_reads_resolve_under_base_uri() {
    let gateway = spawn(state(false)).await;

    let response = gateway.get("/floor1/kitchen").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("http://gateway.test/floor1/kitchen")
    );

    let post = gateway
        .client
        .post(format!("{}/floor1/kitchen", gateway.url))
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_sparql_endpoint() {
    let gateway = announced().await;
    let query = "SELECT ?val WHERE { ?s <http://gateway.test/value> ?val }";

    let via_get: Value = gateway
        .get(&format!("/sparql?query={}", encode(query)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(via_get["variables"], json!(["val"]));
    assert_eq!(via_get["rows"][0]["val"]["value"], "21.5");
    assert!(via_get["duration_ms"].is_number());

    let via_post = gateway
        .client
        .post(format!("{}/sparql", gateway.url))
        .body(query)
        .send()
        .await
        .unwrap();
    assert_eq!(via_post.status(), StatusCode::OK);

    let broken = gateway.get("/sparql?query=SELECT").send().await.unwrap();
    assert_eq!(broken.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resource_description() {
    let gateway = announced().await;
    let text = gateway
        .get(&format!("/resource?uri={}", encode(TEMP)))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.starts_with("<coap://10.0.0.7/temp>"));
}

#[tokio::test]
async fn test_virtual_sensor_lifecycle() {
    let gateway = announced().await;
    let definition = json!({
        "name": "kitchen-avg",
        "sensor_type": "http://gateway.test/AverageSensor",
        "feature_of_interest": "http://gateway.test/kitchen",
        "observed_property": "http://gateway.test/temperature",
        "query": "SELECT ?val WHERE { ?s <http://gateway.test/value> ?val }"
    });

    let created = gateway
        .client
        .post(format!("{}/virtual-sensors", gateway.url))
        .json(&definition)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let identity = created.json::<Value>().await.unwrap()["identity"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(identity, "http://gateway.test/vs#kitchen-avg");

    let duplicate = gateway
        .client
        .post(format!("{}/virtual-sensors", gateway.url))
        .json(&definition)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let read = gateway.client.get(gateway.graph(&identity)).send().await.unwrap();
    assert!(read.text().await.unwrap().contains("\"21.5\""));

    let deleted = gateway.client.delete(gateway.graph(&identity)).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = gateway.client.get(gateway.graph(&identity)).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_virtual_sensor_batch_and_preview() {
    let gateway = spawn(state(false)).await;
    let sensor = |name: &str| {
        json!({
            "name": name,
            "sensor_type": "http://gateway.test/AverageSensor",
            "feature_of_interest": "http://gateway.test/kitchen",
            "observed_property": "http://gateway.test/temperature",
            "query": "SELECT ?val WHERE { ?s ?p ?val }"
        })
    };

    let outcomes: Value = gateway
        .client
        .post(format!("{}/virtual-sensors/batch", gateway.url))
        .json(&json!([sensor("a"), sensor("bad name")]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcomes[0]["identity"], "http://gateway.test/vs#a");
    assert!(outcomes[1]["error"].is_string());

    let preview = gateway
        .client
        .post(format!("{}/virtual-sensors/preview", gateway.url))
        .json(&sensor("draft"))
        .send()
        .await
        .unwrap();
    assert_eq!(preview.status(), StatusCode::OK);
    assert!(preview.text().await.unwrap().contains("/vs#draft"));
}

#[tokio::test]
async fn test_announcement_without_endpoint_family() {
    let gateway = spawn(state(false)).await;
    let response = gateway
        .client
        .post(format!("{}/registry/coap", gateway.url))
        .json(&json!({ "address": "10.0.0.7:5683" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}
