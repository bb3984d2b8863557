//! Registration surfaces: endpoint announcements and virtual sensors

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::{Deserialize, Serialize};
use ssp_coap::Announcement;
use ssp_core::ResourceIdentity;
use ssp_virtual::{CreationOutcome, VirtualSensorDefinition};

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{graph_response, negotiate};

#[derive(Debug, Deserialize)]
pub struct AnnounceRequest {
    pub address: SocketAddr,
}

#[derive(Debug, Serialize)]
pub struct CreatedSensor {
    pub identity: ResourceIdentity,
}

/// `POST /registry/coap`: an endpoint announces itself.
pub async fn announce_endpoint(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnnounceRequest>,
) -> ApiResult<(StatusCode, Json<Announcement>)> {
    let family = state.coap.as_ref().ok_or(ApiError::FamilyDisabled(ssp_coap::FAMILY))?;
    let announcement = family.announce(request.address).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

/// `POST /virtual-sensors`
pub async fn create_virtual_sensor(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<VirtualSensorDefinition>,
) -> ApiResult<(StatusCode, Json<CreatedSensor>)> {
    let family = state
        .virtual_sensors
        .as_ref()
        .ok_or(ApiError::FamilyDisabled(ssp_virtual::FAMILY))?;
    let snapshot = family.create(definition).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedSensor {
            identity: snapshot.identity,
        }),
    ))
}

/// `POST /virtual-sensors/batch`
pub async fn create_virtual_sensors(
    State(state): State<Arc<AppState>>,
    Json(definitions): Json<Vec<VirtualSensorDefinition>>,
) -> ApiResult<Json<Vec<CreationOutcome>>> {
    let family = state
        .virtual_sensors
        .as_ref()
        .ok_or(ApiError::FamilyDisabled(ssp_virtual::FAMILY))?;
    Ok(Json(family.create_batch(definitions).await))
}

/// `POST /virtual-sensors/preview`: evaluate without registering.
pub async fn preview_virtual_sensor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(definition): Json<VirtualSensorDefinition>,
) -> ApiResult<Response> {
    let family = state
        .virtual_sensors
        .as_ref()
        .ok_or(ApiError::FamilyDisabled(ssp_virtual::FAMILY))?;
    let format = negotiate(&headers)?;
    let graph = family.preview(definition).await?;
    graph_response(format, &graph, None)
}
