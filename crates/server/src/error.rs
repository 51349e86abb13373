//! Maps [`CollectorError`] onto HTTP responses (§7): `NotFound → 404`,
//! `InvalidStatus → 409`, `InvalidArgument → 400`, everything else `500`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use collector_core::CollectorError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(pub CollectorError);

impl From<CollectorError> for ApiError {
    fn from(e: CollectorError) -> Self {
        Self(e)
    }
}

impl From<collector_store_pg::StorePgError> for ApiError {
    fn from(e: collector_store_pg::StorePgError) -> Self {
        Self(e.into())
    }
}

impl From<collector_store_object::StoreObjectError> for ApiError {
    fn from(e: collector_store_object::StoreObjectError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}
