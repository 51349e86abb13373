//! Pure matching logic: which collections in the Active-Set Cache snapshot
//! does each request belong to.
//!
//! Kept free of any I/O so it can be exercised directly in tests without a
//! database or bus double.

use std::collections::HashMap;

use collector_core::{Collection, CollectionId, MatchResult, RequestContent};
use regex::Regex;
use tracing::warn;

/// A collection's selection criteria, pre-compiled once per tick so a
/// batch of N requests against M active collections costs N*M regex
/// evaluations rather than N*M regex *compilations*.
struct CompiledCriteria {
    id: CollectionId,
    handler_lower: String,
    header_criteria: Vec<(String, Regex)>,
}

fn compile_snapshot(snapshot: &HashMap<CollectionId, Collection>) -> Vec<CompiledCriteria> {
    snapshot
        .values()
        .filter_map(|c| {
            let header_criteria = c
                .task
                .message_selection
                .header_criteria
                .iter()
                .filter_map(|hc| match Regex::new(&hc.pattern) {
                    Ok(re) => Some((hc.header_name.to_lowercase(), re)),
                    Err(e) => {
                        warn!(
                            collection_id = c.id,
                            pattern = %hc.pattern,
                            error = %e,
                            "skipping malformed header-criterion regex"
                        );
                        None
                    }
                })
                .collect();
            Some(CompiledCriteria {
                id: c.id,
                handler_lower: c.task.message_selection.handler.to_lowercase(),
                header_criteria,
            })
        })
        .collect()
}

/// Whether `request` satisfies one collection's selection criteria (§4.4).
fn matches_one(request: &RequestContent, criteria: &CompiledCriteria) -> bool {
    if request.handler.to_lowercase() != criteria.handler_lower {
        return false;
    }
    if criteria.header_criteria.is_empty() {
        return true;
    }
    criteria.header_criteria.iter().any(|(name, re)| {
        request
            .headers
            .iter()
            .find(|(h, _)| h.to_lowercase() == *name)
            .map(|(_, values)| values.iter().any(|v| re.is_match(v)))
            .unwrap_or(false)
    })
}

/// Matches every request in `batch` against the active-set `snapshot`,
/// producing one [`MatchResult`] per request that hit at least one
/// collection. Requests with no matches are omitted entirely so the
/// caller never stores them.
pub fn match_batch(
    batch: &[RequestContent],
    snapshot: &HashMap<CollectionId, Collection>,
) -> Vec<MatchResult> {
    if snapshot.is_empty() {
        return Vec::new();
    }
    let compiled = compile_snapshot(snapshot);

    batch
        .iter()
        .enumerate()
        .filter_map(|(pos, req)| {
            let ids: Vec<CollectionId> = compiled
                .iter()
                .filter(|c| matches_one(req, c))
                .map(|c| c.id)
                .collect();
            if ids.is_empty() {
                None
            } else {
                Some(MatchResult { request_pos: pos, collection_ids: ids })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collector_core::{CollectionStatus, CompletionCriteria, HeaderCriterion, MessageSelectionCriteria, Task};
    use std::collections::HashMap as Map;

    fn collection(id: CollectionId, handler: &str, header_criteria: Vec<HeaderCriterion>) -> Collection {
        Collection {
            id,
            task: Task {
                message_selection: MessageSelectionCriteria { handler: handler.into(), header_criteria },
                completion: CompletionCriteria { time_limit: chrono::Duration::hours(1), request_count_limit: 10 },
            },
            status: CollectionStatus::Pending,
            request_count: 0,
            created_at: Utc::now(),
            started_at: None,
            updated_at: None,
            completed_at: None,
            result_id: None,
            error_message: None,
            error_code: None,
        }
    }

    fn request(handler: &str, headers: Vec<(&str, Vec<&str>)>) -> RequestContent {
        RequestContent {
            handler: handler.into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
                .collect(),
            body: b"{}".to_vec(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_snapshot_matches_nothing() {
        let snapshot: Map<CollectionId, Collection> = Map::new();
        let out = match_batch(&[request("h", vec![])], &snapshot);
        assert!(out.is_empty());
    }

    #[test]
    fn handler_match_is_case_insensitive() {
        let mut snapshot = Map::new();
        snapshot.insert(1, collection(1, "Checkout", vec![]));
        let out = match_batch(&[request("checkout", vec![])], &snapshot);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].collection_ids, vec![1]);
    }

    #[test]
    fn header_criterion_requires_name_and_regex_match() {
        let mut snapshot = Map::new();
        snapshot.insert(
            1,
            collection(1, "h", vec![HeaderCriterion { header_name: "X-Env".into(), pattern: "^prod".into() }]),
        );
        let matching = request("h", vec![("x-env", vec!["prod-eu"])]);
        let non_matching = request("h", vec![("x-env", vec!["staging"])]);

        assert_eq!(match_batch(&[matching], &snapshot).len(), 1);
        assert!(match_batch(&[non_matching], &snapshot).is_empty());
    }

    #[test]
    fn any_one_header_criterion_is_sufficient() {
        let mut snapshot = Map::new();
        snapshot.insert(
            1,
            collection(
                1,
                "h",
                vec![
                    HeaderCriterion { header_name: "X-Env".into(), pattern: "^prod".into() },
                    HeaderCriterion { header_name: "X-Tenant".into(), pattern: "^acme".into() },
                ],
            ),
        );
        let req = request("h", vec![("x-tenant", vec!["acme-1"])]);
        assert_eq!(match_batch(&[req], &snapshot).len(), 1);
    }

    #[test]
    fn requests_with_no_matches_are_omitted() {
        let mut snapshot = Map::new();
        snapshot.insert(1, collection(1, "h", vec![]));
        let out = match_batch(&[request("other", vec![])], &snapshot);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_regex_is_skipped_not_fatal() {
        let mut snapshot = Map::new();
        snapshot.insert(
            1,
            collection(1, "h", vec![HeaderCriterion { header_name: "X".into(), pattern: "(".into() }]),
        );
        let out = match_batch(&[request("h", vec![("x", vec!["anything"])])], &snapshot);
        assert!(out.is_empty());
    }

    #[test]
    fn request_position_is_preserved() {
        let mut snapshot = Map::new();
        snapshot.insert(1, collection(1, "h", vec![]));
        let batch = vec![request("nope", vec![]), request("h", vec![])];
        let out = match_batch(&batch, &snapshot);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].request_pos, 1);
    }
}
