//! Axum handlers for the collections CRUD + result-download surface (§6).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use collector_core::{CollectionFilter, CollectionId, CollectionStatus, CollectorError};
use collector_store_object::get_result_stream;
use collector_store_pg::CollectionRepo;
use futures::stream;
use regex::Regex;

use crate::error::ApiError;
use crate::state::AppState;

use super::types::{CollectionResponse, CreateCollectionRequest, ListCollectionsParams};

/// Create a collection from its selection and completion criteria.
#[utoipa::path(
    post,
    path = "/v1/collections",
    tag = "Collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 201, description = "Collection created", body = CollectionResponse),
        (status = 400, description = "Invalid argument")
    )
)]
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionResponse>), ApiError> {
    if body.request_count_limit > state.config.collector.max_requests_per_collection {
        return Err(ApiError(CollectorError::InvalidArgument(format!(
            "request_count_limit {} exceeds max_requests_per_collection {}",
            body.request_count_limit, state.config.collector.max_requests_per_collection
        ))));
    }
    if body.request_count_limit <= 0 {
        return Err(ApiError(CollectorError::InvalidArgument(
            "request_count_limit must be positive".into(),
        )));
    }
    for criterion in &body.header_criteria {
        if let Err(e) = Regex::new(&criterion.pattern) {
            return Err(ApiError(CollectorError::InvalidArgument(format!(
                "invalid header pattern '{}': {e}",
                criterion.pattern
            ))));
        }
    }

    let task = body.into_task();
    let collection = CollectionRepo::create_collection(&state.pool, &task).await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(collection.into())))
}

/// List collections, optionally filtered by status and creation time window.
#[utoipa::path(
    get,
    path = "/v1/collections",
    tag = "Collections",
    params(ListCollectionsParams),
    responses((status = 200, description = "Matching collections", body = Vec<CollectionResponse>))
)]
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCollectionsParams>,
) -> Result<Json<Vec<CollectionResponse>>, ApiError> {
    let statuses = params
        .parse_statuses()
        .map_err(|e| ApiError(CollectorError::InvalidArgument(e)))?;
    let filter = CollectionFilter { statuses, created_at_from: params.from, created_at_to: params.to };
    let rows = CollectionRepo::get_collections(&state.pool, &filter).await.map_err(ApiError::from)?;
    Ok(Json(rows.into_iter().map(CollectionResponse::from).collect()))
}

/// Fetch one collection by id.
#[utoipa::path(
    get,
    path = "/v1/collections/{id}",
    tag = "Collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Collection", body = CollectionResponse),
        (status = 404, description = "Unknown collection")
    )
)]
pub async fn get_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CollectionId>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let collection = CollectionRepo::get_collection(&state.pool, id, false).await.map_err(ApiError::from)?;
    Ok(Json(collection.into()))
}

/// Cancel a collection that has not yet reached a terminal status.
#[utoipa::path(
    post,
    path = "/v1/collections/{id}/cancel",
    tag = "Collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "Unknown collection"),
        (status = 409, description = "Already terminal")
    )
)]
pub async fn cancel_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CollectionId>,
) -> Result<StatusCode, ApiError> {
    let current = CollectionRepo::get_collection(&state.pool, id, false).await.map_err(ApiError::from)?;
    if current.status.is_terminal() {
        return Err(ApiError(CollectorError::InvalidStatus(format!(
            "collection {id} is already {}",
            current.status
        ))));
    }
    CollectionRepo::update_status(&state.pool, id, CollectionStatus::Cancelled, None, None, None)
        .await
        .map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Download a completed collection's archive as `application/octet-stream`.
#[utoipa::path(
    get,
    path = "/v1/collections/{id}/result",
    tag = "Collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Archive bytes, or an empty body if the collection completed with zero matches", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown collection"),
        (status = 409, description = "Collection is not completed yet")
    )
)]
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CollectionId>,
) -> Result<Response, ApiError> {
    let collection = CollectionRepo::get_collection(&state.pool, id, false).await.map_err(ApiError::from)?;
    if collection.status != CollectionStatus::Completed {
        return Err(ApiError(CollectorError::InvalidStatus(format!(
            "collection {id} is not completed (status: {})",
            collection.status
        ))));
    }
    // A completed collection with no `result_id` never matched any
    // requests (scenario: time-triggered completion with zero matches) —
    // that is a valid terminal state, not a missing archive, so the
    // contract is an empty stream rather than 404.
    let Some(result_id) = collection.result_id else {
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"result-{id}.zip\"")),
            ],
            Body::empty(),
        )
            .into_response());
    };

    let read_chunk_size = state.config.object_store.read_chunk_size_bytes as usize;
    let rx = get_result_stream(state.object_store.as_ref(), &state.object_prefix, &result_id, read_chunk_size)
        .await
        .map_err(ApiError::from)?;

    let body_stream = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    let body = Body::from_stream(body_stream);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"result-{id}.zip\"")),
        ],
        body,
    )
        .into_response())
}
