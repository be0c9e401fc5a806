use thiserror::Error;

use crate::graph::{NodeId, Target};
use crate::state::Backend;

/// Malformed graph definition. Raised by `GraphBuilder::compile`, and by the
/// executor only when a router picks a target its edge never declared.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no entry point")]
    MissingEntryPoint,

    #[error("node registered twice: {0}")]
    DuplicateNode(NodeId),

    #[error("node {0} already has an outgoing edge")]
    DuplicateEdge(NodeId),

    #[error("edge references node without a handler: {0}")]
    UnknownNode(NodeId),

    #[error("node {0} has no outgoing edge")]
    MissingEdge(NodeId),

    #[error("conditional edge from {0} declares no targets")]
    EmptyRoute(NodeId),

    #[error("node {0} cannot reach END")]
    UnreachableEnd(NodeId),

    #[error("router at {from} returned undeclared target {target}")]
    UndeclaredRoute { from: NodeId, target: Target },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure inside a single node. Never escapes the executor: it is handed to
/// the node's failure hook and recorded in the step trace.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{backend} backend failed: {source}")]
    Backend {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("{backend} backend is not configured")]
    BackendUnavailable { backend: Backend },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("node {node} timed out after {after_ms}ms")]
    Timeout { node: NodeId, after_ms: u64 },

    #[error("intent classification failed: {0}")]
    Classification(#[source] anyhow::Error),

    #[error("answer synthesis failed: {0}")]
    Synthesis(#[source] anyhow::Error),

    #[error("memory update failed: {0}")]
    Memory(#[source] anyhow::Error),
}
