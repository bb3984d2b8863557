//! REST handlers: resource reads, queries and listings

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use ssp_core::{Format, Graph, QueryResults, ResourceIdentity, ServiceListing, Snapshot, query};
use tracing::debug;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ResourceParams {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct SparqlParams {
    pub query: String,
}

/// Query results plus how long evaluation took.
#[derive(Debug, Serialize)]
pub struct SparqlResponse {
    #[serde(flatten)]
    pub results: QueryResults,
    pub duration_ms: f64,
}

impl From<QueryResults> for SparqlResponse {
    fn from(results: QueryResults) -> Self {
        let duration_ms = results.duration.as_micros() as f64 / 1000.0;
        SparqlResponse { results, duration_ms }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub resources: usize,
    pub families: Vec<&'static str>,
}

/// `GET /graph?uri=`
pub async fn read_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResourceParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let identity = ResourceIdentity::parse(params.uri)?;
    read(&state, &identity, &headers).await
}

/// `DELETE /graph?uri=`; only writable families accept it.
pub async fn delete_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResourceParams>,
) -> ApiResult<StatusCode> {
    let identity = ResourceIdentity::parse(params.uri)?;
    state.router.delete(&identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resources are read-only through this surface.
pub async fn reject_write(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

/// Every other path: `GET /<path>` reads `<base>/<path>`.
pub async fn read_path(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed(method.to_string()));
    }
    let identity = ResourceIdentity::under(&state.base_uri, uri.path())?;
    read(&state, &identity, &headers).await
}

async fn read(state: &AppState, identity: &ResourceIdentity, headers: &HeaderMap) -> ApiResult<Response> {
    let format = negotiate(headers)?;
    let snapshot = state.router.handle(identity).await?;
    debug!("Serving {} ({} triples)", identity, snapshot.content.len());
    graph_response(format, &snapshot.content, Some(&snapshot))
}

/// `GET /sparql?query=`
pub async fn sparql_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SparqlParams>,
) -> ApiResult<Json<SparqlResponse>> {
    run_query(&state, &params.query).await
}

/// `POST /sparql` with the query text as body.
pub async fn sparql_post(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<SparqlResponse>> {
    let text = std::str::from_utf8(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    run_query(&state, text).await
}

async fn run_query(state: &AppState, text: &str) -> ApiResult<Json<SparqlResponse>> {
    let results = query::execute(state.router.cache(), text).await?;
    debug!("Query returned {} rows in {:?}", results.rows.len(), results.duration);
    Ok(Json(results.into()))
}

/// `GET /resource?uri=`: every cached triple about one subject.
pub async fn describe_resource(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResourceParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = negotiate(&headers)?;
    let subject = ResourceIdentity::parse(params.uri)?;
    let graph = query::describe(state.router.cache(), subject.as_str()).await?;
    graph_response(format, &graph, None)
}

/// `GET /services`
pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceListing>> {
    Json(state.router.services())
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        resources: state.router.claims().len(),
        families: state.router.families(),
    };
    Json(health)
}

pub(crate) fn negotiate(headers: &HeaderMap) -> ApiResult<Format> {
    let accept = headers.get(header::ACCEPT).and_then(|value| value.to_str().ok());
    Format::negotiate(accept).ok_or_else(|| ApiError::NotAcceptable(accept.unwrap_or_default().to_string()))
}

/// Serialise `graph`; with a snapshot, also say how long it may be cached.
pub(crate) fn graph_response(format: Format, graph: &Graph, snapshot: Option<&Snapshot>) -> ApiResult<Response> {
    let body = format.serialize(graph).map_err(ApiError::from)?;
    let mut response = ([(header::CONTENT_TYPE, format.media_type())], body).into_response();

    if let Some(snapshot) = snapshot {
        let headers = response.headers_mut();
        let max_age = format!("max-age={}", snapshot.remaining().as_secs());
        let expires = snapshot.expires_at().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&max_age) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if let Ok(value) = HeaderValue::from_str(&expires) {
            headers.insert(header::EXPIRES, value);
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate() {
        let mut headers = HeaderMap::new();
        assert_eq!(negotiate(&headers).unwrap(), Format::NTriples);

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json, */*;q=0.1"));
        assert_eq!(negotiate(&headers).unwrap(), Format::Json);

        headers.insert(header::ACCEPT, HeaderValue::from_static("image/png"));
        assert!(matches!(negotiate(&headers), Err(ApiError::NotAcceptable(_))));
    }

    #[test]
    fn test_sparql_response_flattens_results() {
        let results = QueryResults {
            variables: vec!["val".to_string()],
            rows: Vec::new(),
            duration: std::time::Duration::from_millis(3),
        };
        let json = serde_json::to_value(SparqlResponse::from(results)).unwrap();
        assert_eq!(json["variables"][0], "val");
        assert_eq!(json["duration_ms"], 3.0);
    }
}
