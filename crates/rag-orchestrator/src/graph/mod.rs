//! Orchestration graph: enum-keyed nodes, fixed and conditional edges,
//! build-time validation and a sequential executor.
//!
//! Build with `GraphBuilder`, `compile()` to validate the transition table,
//! then `CompiledGraph::run` with a `QueryState` and a `CancellationFlag`.

mod builder;
mod cancel;
mod compiled;
mod node;
mod node_id;

pub use builder::{GraphBuilder, RouteFn};
pub use cancel::CancellationFlag;
pub use compiled::{CompiledGraph, ExecutionLimits, ExecutionReport, ExecutionStatus, StepOutcome, StepRecord};
pub use node::Node;
pub use node_id::{NodeId, Target};
