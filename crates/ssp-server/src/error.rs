//! Mapping engine errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use ssp_core::SspError;
use tracing::{debug, warn};

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ssp(SspError),
    /// No supported format in the `Accept` header.
    NotAcceptable(String),
    /// Write methods on resource reads.
    MethodNotAllowed(String),
    /// A surface whose provider family is not configured.
    FamilyDisabled(&'static str),
    BadRequest(String),
}

impl From<SspError> for ApiError {
    fn from(e: SspError) -> Self {
        ApiError::Ssp(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ssp(e) => match e {
                SspError::NotFound(_) => StatusCode::NOT_FOUND,
                SspError::AlreadyRegistered(_) => StatusCode::CONFLICT,
                SspError::NotSupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
                SspError::OperationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SspError::Access { .. } => StatusCode::BAD_GATEWAY,
                SspError::Format(_) | SspError::Query(_) | SspError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
                SspError::Store(_) | SspError::Unavailable | SspError::ObservationFailure { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::FamilyDisabled(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Ssp(e) => match e {
                SspError::NotFound(_) => "not_found",
                SspError::AlreadyRegistered(_) => "already_registered",
                SspError::Access { .. } => "access_failed",
                SspError::OperationTimeout { .. } => "timeout",
                SspError::ObservationFailure { .. } => "observation_failed",
                SspError::Store(_) => "store",
                SspError::NotSupported { .. } => "not_supported",
                SspError::InvalidIdentity(_) => "invalid_identity",
                SspError::Format(_) => "format",
                SspError::Query(_) => "query",
                SspError::Unavailable => "unavailable",
            },
            ApiError::NotAcceptable(_) => "not_acceptable",
            ApiError::MethodNotAllowed(_) => "method_not_allowed",
            ApiError::FamilyDisabled(_) => "family_disabled",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Ssp(e) => e.to_string(),
            ApiError::NotAcceptable(accept) => format!("none of {:?} can be produced", accept),
            ApiError::MethodNotAllowed(method) => format!("{} is not allowed on resources", method),
            ApiError::FamilyDisabled(family) => format!("the {} family is not enabled", family),
            ApiError::BadRequest(message) => message.clone(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.message());
        } else {
            debug!("Request rejected ({}): {}", status, self.message());
        }
        (status, Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
