use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::Backend;

/// Node in the query-routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    UserInput,
    QueryUnderstanding,
    VectorSearch,
    SqlSearch,
    DataverseSearch,
    ExcelSearch,
    Aggregation,
    LlmSynthesis,
    MemoryUpdate,
}

impl NodeId {
    pub const SEARCH_NODES: [NodeId; 4] = [
        NodeId::VectorSearch,
        NodeId::SqlSearch,
        NodeId::DataverseSearch,
        NodeId::ExcelSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::UserInput => "user_input",
            NodeId::QueryUnderstanding => "query_understanding",
            NodeId::VectorSearch => "vector_search",
            NodeId::SqlSearch => "sql_search",
            NodeId::DataverseSearch => "dataverse_search",
            NodeId::ExcelSearch => "excel_search",
            NodeId::Aggregation => "aggregation",
            NodeId::LlmSynthesis => "llm_synthesis",
            NodeId::MemoryUpdate => "memory_update",
        }
    }

    pub fn search(backend: Backend) -> Self {
        match backend {
            Backend::Vector => NodeId::VectorSearch,
            Backend::Sql => NodeId::SqlSearch,
            Backend::Dataverse => NodeId::DataverseSearch,
            Backend::Excel => NodeId::ExcelSearch,
        }
    }

    /// Backend written by this node, for search nodes.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            NodeId::VectorSearch => Some(Backend::Vector),
            NodeId::SqlSearch => Some(Backend::Sql),
            NodeId::DataverseSearch => Some(Backend::Dataverse),
            NodeId::ExcelSearch => Some(Backend::Excel),
            _ => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge destination: another node or the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(NodeId),
    End,
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Node(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(id) => id.fmt(f),
            Target::End => f.write_str("END"),
        }
    }
}
