//! OpenAPI document aggregating every handler in `api::collections` and
//! `api::health`, served via Scalar at `/docs`.

use utoipa::OpenApi;

use super::collections;
use super::health;
use super::types;

#[derive(OpenApi)]
#[openapi(
    info(title = "Ammo Collector API", version = "1.0.0", description = "Task API Surface for sampling live traffic into on-demand collections."),
    tags(
        (name = "Collections", description = "Create, inspect, and retrieve sampling collections"),
        (name = "Health", description = "Liveness probe"),
    ),
    paths(
        collections::create_collection,
        collections::list_collections,
        collections::get_collection,
        collections::cancel_collection,
        collections::get_result,
        health::health,
    ),
    components(schemas(
        types::HeaderCriterionDto,
        types::CreateCollectionRequest,
        types::HeaderCriterionResponse,
        types::CollectionResponse,
        health::HealthResponse,
    ))
)]
pub struct ApiDoc;
