//! Intent-to-backend routing
//!
//! `route` is the dispatch policy: first match in the fixed order
//! sql_query > document_search > excel_data > dataverse_query, with
//! vector search as the default for empty or unknown intents.
//!
//! `next_after_understanding` is the conditional edge leaving
//! query_understanding. It applies the same policy to the backends that have
//! not produced an entry yet, and moves on to aggregation/synthesis once every
//! backend implied by the intents has one. Search nodes always write their key
//! (results or an error), so each backend is visited at most once per query.

use crate::graph::{NodeId, Target};
use crate::state::{Backend, Intent, QueryState};

/// Backend used when no known intent is present.
pub const DEFAULT_BACKEND: Backend = Backend::Vector;

/// Search node for the highest-priority known intent, vector search otherwise.
pub fn route(state: &QueryState) -> NodeId {
    NodeId::search(
        planned_backends(&state.intent)
            .first()
            .copied()
            .unwrap_or(DEFAULT_BACKEND),
    )
}

/// Backends implied by `intents`, in routing order, without duplicates.
/// Falls back to `[DEFAULT_BACKEND]` when no intent is known.
pub fn planned_backends(intents: &[Intent]) -> Vec<Backend> {
    let planned: Vec<Backend> = Intent::ROUTING_ORDER
        .iter()
        .filter(|known| intents.contains(known))
        .filter_map(Intent::backend)
        .collect();

    if planned.is_empty() {
        vec![DEFAULT_BACKEND]
    } else {
        planned
    }
}

/// Next planned backend that has no entry in `search_results` yet.
pub fn pending_backend(state: &QueryState) -> Option<Backend> {
    planned_backends(&state.intent)
        .into_iter()
        .find(|b| !state.has_entry_for(*b))
}

/// Conditional edge out of query_understanding.
pub fn next_after_understanding(state: &QueryState, aggregation_enabled: bool) -> Target {
    match pending_backend(state) {
        Some(backend) => Target::Node(NodeId::search(backend)),
        None if aggregation_enabled => Target::Node(NodeId::Aggregation),
        None => Target::Node(NodeId::LlmSynthesis),
    }
}

/// Every target `next_after_understanding` can return.
pub fn understanding_targets(aggregation_enabled: bool) -> Vec<Target> {
    let mut targets: Vec<Target> = NodeId::SEARCH_NODES.iter().copied().map(Target::Node).collect();
    targets.push(Target::Node(if aggregation_enabled {
        NodeId::Aggregation
    } else {
        NodeId::LlmSynthesis
    }));
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FailureKind, SearchEntry, SearchResult};

    fn with_intents(tags: &[&str]) -> QueryState {
        let mut state = QueryState::new("q", "u", "s");
        state.intent = tags.iter().map(|t| Intent::from(*t)).collect();
        state
    }

    #[test]
    fn test_empty_intent_routes_to_vector() {
        assert_eq!(route(&with_intents(&[])), NodeId::VectorSearch);
    }

    #[test]
    fn test_unknown_intent_routes_to_vector() {
        assert_eq!(route(&with_intents(&["small_talk"])), NodeId::VectorSearch);
    }

    #[test]
    fn test_each_intent_maps_to_its_node() {
        assert_eq!(route(&with_intents(&["sql_query"])), NodeId::SqlSearch);
        assert_eq!(route(&with_intents(&["document_search"])), NodeId::VectorSearch);
        assert_eq!(route(&with_intents(&["excel_data"])), NodeId::ExcelSearch);
        assert_eq!(route(&with_intents(&["dataverse_query"])), NodeId::DataverseSearch);
    }

    #[test]
    fn test_sql_wins_over_document_regardless_of_order() {
        assert_eq!(route(&with_intents(&["sql_query", "document_search"])), NodeId::SqlSearch);
        assert_eq!(route(&with_intents(&["document_search", "sql_query"])), NodeId::SqlSearch);
    }

    #[test]
    fn test_tie_break_order_is_fixed() {
        assert_eq!(
            route(&with_intents(&["dataverse_query", "excel_data"])),
            NodeId::ExcelSearch
        );
        assert_eq!(
            route(&with_intents(&["dataverse_query", "excel_data", "document_search"])),
            NodeId::VectorSearch
        );
    }

    #[test]
    fn test_route_ignores_search_results() {
        let mut state = with_intents(&["sql_query", "document_search"]);
        state.record_results(Backend::Sql, vec![SearchEntry::Result(SearchResult::new("row", 1.0))]);
        assert_eq!(route(&state), NodeId::SqlSearch);
    }

    #[test]
    fn test_planned_backends_deduplicates() {
        let planned = planned_backends(&[Intent::ExcelData, Intent::SqlQuery, Intent::ExcelData]);
        assert_eq!(planned, vec![Backend::Sql, Backend::Excel]);
    }

    #[test]
    fn test_understanding_edge_walks_pending_backends() {
        let mut state = with_intents(&["document_search", "sql_query"]);
        assert_eq!(next_after_understanding(&state, true), Target::Node(NodeId::SqlSearch));

        state.record_failure(Backend::Sql, FailureKind::Unavailable, "down");
        assert_eq!(next_after_understanding(&state, true), Target::Node(NodeId::VectorSearch));

        state.record_results(Backend::Vector, vec![]);
        assert_eq!(next_after_understanding(&state, true), Target::Node(NodeId::Aggregation));
        assert_eq!(next_after_understanding(&state, false), Target::Node(NodeId::LlmSynthesis));
    }

    #[test]
    fn test_understanding_edge_defaults_to_vector_once() {
        let mut state = with_intents(&[]);
        assert_eq!(next_after_understanding(&state, true), Target::Node(NodeId::VectorSearch));
        state.record_results(Backend::Vector, vec![]);
        assert_eq!(next_after_understanding(&state, true), Target::Node(NodeId::Aggregation));
    }

    #[test]
    fn test_declared_targets_cover_every_route() {
        let targets = understanding_targets(true);
        for tags in [&["sql_query"][..], &["excel_data"], &["dataverse_query"], &[]] {
            let state = with_intents(tags);
            assert!(targets.contains(&next_after_understanding(&state, true)));
        }
        assert!(targets.contains(&Target::Node(NodeId::Aggregation)));
        assert!(!understanding_targets(false).contains(&Target::Node(NodeId::Aggregation)));
    }
}
