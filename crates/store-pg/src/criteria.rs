//! Mapping between `collections` table rows and [`collector_core::Collection`].
//!
//! The task's message-selection half (`handler` + `header_criteria`) is
//! split across a dedicated `handler` column and a `criteria` JSONB column
//! so the handler stays indexable; the completion half is stored in its own
//! plain columns rather than folded into the JSON blob.

use chrono::{DateTime, Utc};
use collector_core::{
    Collection, CollectionStatus, CompletionCriteria, HeaderCriterion, MessageSelectionCriteria,
    Task,
};

use crate::error::StorePgError;

/// JSON shape of the `criteria` column: just the header criteria, since
/// `handler` already lives in its own column.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct CriteriaJson {
    #[serde(default)]
    pub header_criteria: Vec<HeaderCriterion>,
}

pub(crate) fn encode_criteria(task: &Task) -> Result<serde_json::Value, StorePgError> {
    let json = CriteriaJson {
        header_criteria: task.message_selection.header_criteria.clone(),
    };
    Ok(serde_json::to_value(json)?)
}

/// Raw row shape as returned by `sqlx::query_as`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CollectionRow {
    pub id: i64,
    pub status: i16,
    pub handler: String,
    pub criteria: serde_json::Value,
    pub request_count_limit: i32,
    pub request_duration_limit_secs: i64,
    pub request_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl CollectionRow {
    pub fn into_collection(self) -> Result<Collection, StorePgError> {
        let criteria: CriteriaJson = serde_json::from_value(self.criteria)?;
        let status = CollectionStatus::from_i16(self.status).ok_or_else(|| {
            StorePgError::Database(sqlx::Error::Decode(
                format!("unknown collection status {}", self.status).into(),
            ))
        })?;
        Ok(Collection {
            id: self.id,
            task: Task {
                message_selection: MessageSelectionCriteria {
                    handler: self.handler,
                    header_criteria: criteria.header_criteria,
                },
                completion: CompletionCriteria {
                    time_limit: chrono::Duration::seconds(self.request_duration_limit_secs),
                    request_count_limit: self.request_count_limit,
                },
            },
            status,
            request_count: self.request_count,
            created_at: self.created_at,
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            result_id: self.result_id,
            error_message: self.error_message,
            error_code: self.error_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_only_header_criteria() {
        let task = Task {
            message_selection: MessageSelectionCriteria {
                handler: "checkout".into(),
                header_criteria: vec![HeaderCriterion {
                    header_name: "X-Tenant".into(),
                    pattern: "^acme-.*".into(),
                }],
            },
            completion: CompletionCriteria {
                time_limit: chrono::Duration::minutes(5),
                request_count_limit: 100,
            },
        };
        let v = encode_criteria(&task).unwrap();
        assert!(v.get("handler").is_none());
        assert_eq!(v["header_criteria"][0]["header_name"], "X-Tenant");
    }

    #[test]
    fn row_roundtrips_into_collection() {
        let row = CollectionRow {
            id: 7,
            status: 2,
            handler: "checkout".into(),
            criteria: serde_json::json!({ "header_criteria": [] }),
            request_count_limit: 50,
            request_duration_limit_secs: 300,
            request_count: 3,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            updated_at: None,
            completed_at: None,
            result_id: None,
            error_message: None,
            error_code: None,
        };
        let c = row.into_collection().unwrap();
        assert_eq!(c.status, CollectionStatus::InProgress);
        assert_eq!(c.task.completion.time_limit, chrono::Duration::seconds(300));
    }
}
