//! Axum router setup for the gateway

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    AppState,
    handlers::{
        delete_graph, describe_resource, health_check, list_services, read_graph, read_path, reject_write,
        sparql_get, sparql_post,
    },
    registration::{announce_endpoint, create_virtual_sensor, create_virtual_sensors, preview_virtual_sensor},
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket endpoint for cache events
        .route("/ws", get(ws_handler))
        // Resource reads
        .route(
            "/graph",
            get(read_graph)
                .delete(delete_graph)
                .put(reject_write)
                .post(reject_write),
        )
        .route("/resource", get(describe_resource))
        // Queries
        .route("/sparql", get(sparql_get).post(sparql_post))
        // Listings and registration
        .route("/services", get(list_services))
        .route("/registry/coap", post(announce_endpoint))
        .route("/virtual-sensors", post(create_virtual_sensor))
        .route("/virtual-sensors/batch", post(create_virtual_sensors))
        .route("/virtual-sensors/preview", post(preview_virtual_sensor))
        .route("/api/health", get(health_check))
        // Everything else is a resource path under the base URI
        .fallback(read_path)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
