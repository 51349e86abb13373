//! Domain entities for the collection engine: collections, requests, and
//! the task criteria that define what a collection samples.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonically assigned collection identifier.
pub type CollectionId = i64;

/// Opaque object-store key identifying a collection's archive blob.
pub type ResultId = String;

/// Advisory-lock namespace. Positive values are per-collection locks
/// (`key = CollectionId`); `CLEANUP_LOCK_KEY` serializes Cleaner ticks.
pub type LockKey = i64;

/// The reserved lock key for the Cleaner's global cleanup lock.
pub const CLEANUP_LOCK_KEY: LockKey = -1;

/// Lifecycle status of a collection.
///
/// `Pending` and `InProgress` are the *collecting* statuses (eligible for
/// ingest matching); `Finalizing` signals that completion criteria have
/// been met and archive production is pending; the remaining three are
/// terminal and immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl CollectionStatus {
    /// Decode the integer representation stored in `collections.status`.
    ///
    /// Unlike the source variant this was ported from, every status —
    /// including `Finalizing` — has a valid integer mapping.
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Pending),
            2 => Some(Self::InProgress),
            3 => Some(Self::Finalizing),
            4 => Some(Self::Completed),
            5 => Some(Self::Failed),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn to_i16(self) -> i16 {
        match self {
            Self::Pending => 1,
            Self::InProgress => 2,
            Self::Finalizing => 3,
            Self::Completed => 4,
            Self::Failed => 5,
            Self::Cancelled => 6,
        }
    }

    /// Eligible for ingest matching (`pending` or `in_progress`).
    pub fn is_collecting(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_finalizing(self) -> bool {
        matches!(self, Self::Finalizing)
    }

    /// `completed`, `failed`, or `cancelled` — immutable once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses the Finalizer's "active" discovery filter considers live.
    pub fn active() -> [Self; 3] {
        [Self::Pending, Self::InProgress, Self::Finalizing]
    }

    /// Statuses the Active-Set Cache snapshot is filtered to.
    pub fn collecting() -> [Self; 2] {
        [Self::Pending, Self::InProgress]
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One header-value match rule: header name is compared case-insensitively,
/// `pattern` is an unanchored regex tested against each of the header's
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderCriterion {
    pub header_name: String,
    pub pattern: String,
}

/// Message-selection half of a collection's task: which bus requests to
/// sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSelectionCriteria {
    pub handler: String,
    #[serde(default)]
    pub header_criteria: Vec<HeaderCriterion>,
}

/// Completion half of a collection's task: when to stop sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompletionCriteria {
    pub time_limit: chrono::Duration,
    pub request_count_limit: i32,
}

/// The full task an operator declares when creating a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub message_selection: MessageSelectionCriteria,
    pub completion: CompletionCriteria,
}

/// The central persisted entity: one sampling task and its progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub task: Task,
    pub status: CollectionStatus,
    pub request_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_id: Option<ResultId>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl Collection {
    /// Whether the collection has accumulated at least its declared limit.
    pub fn is_out_of_request_limit(&self) -> bool {
        self.request_count >= self.task.completion.request_count_limit
    }

    /// Whether the collection's time budget has elapsed.
    ///
    /// Measured from `started_at` once collecting has begun, matching the
    /// spec's stated invariant basis. A collection that has never received
    /// a matching write (`started_at` is `None`) instead measures from
    /// `created_at`, so a zero-match collection still times out — the
    /// behavior the "time-triggered completion with zero matches" scenario
    /// requires.
    pub fn is_out_of_time_limit(&self, now: DateTime<Utc>) -> bool {
        let basis = self.started_at.unwrap_or(self.created_at);
        now.signed_duration_since(basis) >= self.task.completion.time_limit
    }

    /// Whether this collection is due for finalization right now.
    ///
    /// The time-elapsed check applies to `pending` collections too — a
    /// collection that never received a matching write still has a time
    /// budget, and the Finalizer must be able to retire it (§4.5 step 2:
    /// "the Finalizer treats time-elapsed collections as ready regardless
    /// of their stored status").
    pub fn is_due_for_finalization(&self, now: DateTime<Utc>) -> bool {
        self.status.is_finalizing()
            || (self.status.is_collecting()
                && (self.is_out_of_request_limit() || self.is_out_of_time_limit(now)))
    }
}

/// Filter accepted by `GetCollections`.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    pub statuses: Vec<CollectionStatus>,
    pub created_at_from: Option<DateTime<Utc>>,
    pub created_at_to: Option<DateTime<Utc>>,
}

/// A bus payload already decoded from the wire `Request` message.
#[derive(Debug, Clone)]
pub struct RequestContent {
    pub handler: String,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// One request's match result: its position in the input batch and the
/// collections it should be stored against.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub request_pos: usize,
    pub collection_ids: Vec<CollectionId>,
}

/// One chunk of a lazy result sequence: either a payload or a terminal
/// error. An `Err` chunk always ends the sequence.
pub type RequestChunk = Result<Vec<u8>, crate::error::CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_i16_covers_finalizing() {
        assert_eq!(CollectionStatus::from_i16(3), Some(CollectionStatus::Finalizing));
        assert_eq!(CollectionStatus::from_i16(0), None);
        assert_eq!(CollectionStatus::from_i16(7), None);
    }

    #[test]
    fn status_roundtrips_through_i16() {
        for s in [
            CollectionStatus::Pending,
            CollectionStatus::InProgress,
            CollectionStatus::Finalizing,
            CollectionStatus::Completed,
            CollectionStatus::Failed,
            CollectionStatus::Cancelled,
        ] {
            assert_eq!(CollectionStatus::from_i16(s.to_i16()), Some(s));
        }
    }

    fn make_collection(status: CollectionStatus, request_count: i32) -> Collection {
        Collection {
            id: 1,
            task: Task {
                message_selection: MessageSelectionCriteria {
                    handler: "h".into(),
                    header_criteria: vec![],
                },
                completion: CompletionCriteria {
                    time_limit: chrono::Duration::hours(1),
                    request_count_limit: 3,
                },
            },
            status,
            request_count,
            created_at: Utc::now() - chrono::Duration::hours(2),
            started_at: None,
            updated_at: None,
            completed_at: None,
            result_id: None,
            error_message: None,
            error_code: None,
        }
    }

    #[test]
    fn out_of_time_limit_falls_back_to_created_at_when_never_started() {
        let c = make_collection(CollectionStatus::Pending, 0);
        assert!(c.is_out_of_time_limit(Utc::now()));
    }

    #[test]
    fn out_of_request_limit_uses_declared_bound() {
        let c = make_collection(CollectionStatus::InProgress, 3);
        assert!(c.is_out_of_request_limit());
        let c = make_collection(CollectionStatus::InProgress, 2);
        assert!(!c.is_out_of_request_limit());
    }

    #[test]
    fn due_for_finalization_includes_already_finalizing() {
        let c = make_collection(CollectionStatus::Finalizing, 0);
        assert!(c.is_due_for_finalization(Utc::now()));
    }

    #[test]
    fn due_for_finalization_applies_time_check_to_pending_too() {
        // A collection that never received a matching write (still
        // `pending`) but whose time budget has elapsed must still be
        // picked up by the Finalizer.
        let c = make_collection(CollectionStatus::Pending, 0);
        assert!(c.is_due_for_finalization(Utc::now()));
    }

    #[test]
    fn not_due_for_finalization_while_pending_and_within_time_budget() {
        let mut c = make_collection(CollectionStatus::Pending, 0);
        c.created_at = Utc::now();
        assert!(!c.is_due_for_finalization(Utc::now()));
    }
}
