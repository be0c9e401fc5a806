//! Node implementations for the query graph.

mod aggregation;
mod memory_update;
mod search;
mod synthesis;
mod understanding;
mod user_input;

pub use aggregation::AggregationNode;
pub use memory_update::MemoryUpdateNode;
pub use search::SearchNode;
pub use synthesis::LlmSynthesisNode;
pub use understanding::QueryUnderstandingNode;
pub use user_input::UserInputNode;
