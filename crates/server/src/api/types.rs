//! Request/response DTOs for the collections API. Kept separate from the
//! domain entities in `collector-core` so the wire shape can evolve
//! independently of the persisted one.

use chrono::{DateTime, Utc};
use collector_core::{Collection, CollectionStatus, CompletionCriteria, HeaderCriterion, MessageSelectionCriteria, Task};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct HeaderCriterionDto {
    pub header_name: String,
    pub pattern: String,
}

/// Body of `POST /v1/collections`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCollectionRequest {
    pub handler: String,
    #[serde(default)]
    pub header_criteria: Vec<HeaderCriterionDto>,
    pub time_limit_secs: i64,
    pub request_count_limit: i32,
}

impl CreateCollectionRequest {
    pub fn into_task(self) -> Task {
        Task {
            message_selection: MessageSelectionCriteria {
                handler: self.handler,
                header_criteria: self
                    .header_criteria
                    .into_iter()
                    .map(|c| HeaderCriterion { header_name: c.header_name, pattern: c.pattern })
                    .collect(),
            },
            completion: CompletionCriteria {
                time_limit: chrono::Duration::seconds(self.time_limit_secs),
                request_count_limit: self.request_count_limit,
            },
        }
    }
}

/// Query parameters for `GET /v1/collections`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListCollectionsParams {
    /// Comma-separated status filter, e.g. `in_progress,finalizing`.
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ListCollectionsParams {
    pub fn parse_statuses(&self) -> Result<Vec<CollectionStatus>, String> {
        let Some(raw) = &self.status else { return Ok(Vec::new()) };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_status)
            .collect()
    }
}

fn parse_status(s: &str) -> Result<CollectionStatus, String> {
    match s {
        "pending" => Ok(CollectionStatus::Pending),
        "in_progress" => Ok(CollectionStatus::InProgress),
        "finalizing" => Ok(CollectionStatus::Finalizing),
        "completed" => Ok(CollectionStatus::Completed),
        "failed" => Ok(CollectionStatus::Failed),
        "cancelled" => Ok(CollectionStatus::Cancelled),
        other => Err(format!("unknown status '{other}'")),
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HeaderCriterionResponse {
    pub header_name: String,
    pub pattern: String,
}

/// `GET`/`POST` response shape for a single collection.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CollectionResponse {
    pub id: i64,
    pub handler: String,
    pub header_criteria: Vec<HeaderCriterionResponse>,
    pub time_limit_secs: i64,
    pub request_count_limit: i32,
    #[schema(value_type = String)]
    pub status: CollectionStatus,
    pub request_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl From<Collection> for CollectionResponse {
    fn from(c: Collection) -> Self {
        Self {
            id: c.id,
            handler: c.task.message_selection.handler,
            header_criteria: c
                .task
                .message_selection
                .header_criteria
                .into_iter()
                .map(|h| HeaderCriterionResponse { header_name: h.header_name, pattern: h.pattern })
                .collect(),
            time_limit_secs: c.task.completion.time_limit.num_seconds(),
            request_count_limit: c.task.completion.request_count_limit,
            status: c.status,
            request_count: c.request_count,
            created_at: c.created_at,
            started_at: c.started_at,
            updated_at: c.updated_at,
            completed_at: c.completed_at,
            result_id: c.result_id,
            error_message: c.error_message,
            error_code: c.error_code,
        }
    }
}
