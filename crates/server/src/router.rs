//! Wires the Task API Surface's routes onto a shared [`AppState`], matching
//! the teacher's router idiom: a flat `Router::new().route(...)` chain,
//! permissive CORS, state injection, then the Scalar docs UI merged in.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::doc::ApiDoc;
use crate::api::{collections, health};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/collections", post(collections::create_collection).get(collections::list_collections))
        .route("/v1/collections/{id}", get(collections::get_collection))
        .route("/v1/collections/{id}/cancel", post(collections::cancel_collection))
        .route("/v1/collections/{id}/result", get(collections::get_result))
        .route("/health", get(health::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
}
