//! Compiled graph: immutable transition table plus the sequential executor.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{GraphError, NodeError};
use crate::state::QueryState;

use super::builder::RouteFn;
use super::{CancellationFlag, Node, NodeId, Target};

pub(super) enum Edge {
    Direct(Target),
    Conditional { route: RouteFn, targets: Vec<Target> },
}

impl Edge {
    pub(super) fn targets(&self) -> Vec<Target> {
        match self {
            Edge::Direct(target) => vec![*target],
            Edge::Conditional { targets, .. } => targets.clone(),
        }
    }
}

/// Time and step budgets applied by the executor.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Node executions allowed per run before the executor gives up.
    pub max_steps: usize,
    pub default_timeout: Duration,
    pub node_timeouts: HashMap<NodeId, Duration>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 32,
            default_timeout: Duration::from_secs(30),
            node_timeouts: HashMap::new(),
        }
    }
}

impl ExecutionLimits {
    pub fn timeout_for(&self, node: NodeId) -> Duration {
        self.node_timeouts
            .get(&node)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed { error: String },
    TimedOut { after_ms: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub node: NodeId,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Reached END.
    Completed,
    /// Cancellation flag was set; `next` is the node that did not run.
    Cancelled { next: NodeId },
    /// Step budget exhausted before END.
    StepLimitExceeded { next: NodeId },
}

/// Result of one graph run. The state is returned even when the run stopped
/// early.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub state: QueryState,
    pub status: ExecutionStatus,
    pub steps: Vec<StepRecord>,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Nodes in execution order.
    pub fn visited(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.node).collect()
    }

    pub fn step(&self, node: NodeId) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.node == node)
    }
}

/// Validated graph. Built by `GraphBuilder::compile`.
pub struct CompiledGraph {
    pub(super) nodes: HashMap<NodeId, Arc<dyn Node>>,
    pub(super) edges: HashMap<NodeId, Edge>,
    pub(super) entry: NodeId,
    pub(super) limits: ExecutionLimits,
}

impl CompiledGraph {
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Declared successors of `node`, in declaration order.
    pub fn successors(&self, node: NodeId) -> Vec<Target> {
        self.edges.get(&node).map(Edge::targets).unwrap_or_default()
    }

    /// Runs from the entry node until END, cancellation or the step limit.
    ///
    /// Node failures and timeouts are recorded, never returned. `Err` means
    /// the graph definition itself is broken.
    pub async fn run(
        &self,
        state: QueryState,
        cancel: &CancellationFlag,
    ) -> Result<ExecutionReport, GraphError> {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        let mut state = state;
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut current = self.entry;

        let status = loop {
            if cancel.is_cancelled() {
                tracing::info!(%execution_id, next = %current, "Graph run cancelled");
                break ExecutionStatus::Cancelled { next: current };
            }
            if steps.len() >= self.limits.max_steps {
                tracing::warn!(
                    %execution_id,
                    next = %current,
                    max_steps = self.limits.max_steps,
                    "Graph run hit step limit"
                );
                break ExecutionStatus::StepLimitExceeded { next: current };
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or(GraphError::UnknownNode(current))?;
            let budget = self.limits.timeout_for(current);

            tracing::debug!(%execution_id, node = %current, "Entering node");
            let step_start = Instant::now();
            let outcome = match tokio::time::timeout(budget, node.run(&mut state)).await {
                Ok(Ok(())) => StepOutcome::Completed,
                Ok(Err(err)) => {
                    node.on_failure(&mut state, &err);
                    StepOutcome::Failed {
                        error: err.to_string(),
                    }
                }
                Err(_) => {
                    let after_ms = budget.as_millis() as u64;
                    let err = NodeError::Timeout {
                        node: current,
                        after_ms,
                    };
                    node.on_failure(&mut state, &err);
                    StepOutcome::TimedOut { after_ms }
                }
            };
            steps.push(StepRecord {
                node: current,
                duration_ms: step_start.elapsed().as_millis() as u64,
                outcome,
            });

            match self.next(current, &state)? {
                Target::End => break ExecutionStatus::Completed,
                Target::Node(next) => current = next,
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            %execution_id,
            status = ?status,
            steps = steps.len(),
            elapsed_ms,
            "Graph run finished"
        );

        Ok(ExecutionReport {
            execution_id,
            state,
            status,
            steps,
            elapsed_ms,
        })
    }

    fn next(&self, from: NodeId, state: &QueryState) -> Result<Target, GraphError> {
        match self.edges.get(&from) {
            Some(Edge::Direct(target)) => Ok(*target),
            Some(Edge::Conditional { route, targets }) => {
                let target = route(state);
                if targets.contains(&target) {
                    tracing::debug!(from = %from, to = %target, "Conditional edge resolved");
                    Ok(target)
                } else {
                    Err(GraphError::UndeclaredRoute { from, target })
                }
            }
            None => Err(GraphError::MissingEdge(from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::state::{Backend, FailureKind, SearchEntry, SearchResult};
    use async_trait::async_trait;

    /// Appends a marker result under `backend` and optionally sleeps or fails.
    struct Probe {
        id: NodeId,
        delay: Option<Duration>,
        fail: bool,
        cancel_after: Option<CancellationFlag>,
    }

    impl Probe {
        fn new(id: NodeId) -> Self {
            Self {
                id,
                delay: None,
                fail: false,
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl Node for Probe {
        fn id(&self) -> NodeId {
            self.id
        }

        async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(flag) = &self.cancel_after {
                flag.cancel();
            }
            if self.fail {
                return Err(NodeError::MalformedQuery("probe".into()));
            }
            state.record_results(
                Backend::Vector,
                vec![SearchEntry::Result(SearchResult::new(self.id.as_str(), 1.0))],
            );
            Ok(())
        }

        fn on_failure(&self, state: &mut QueryState, error: &NodeError) {
            state.record_failure(Backend::Sql, FailureKind::Unavailable, error.to_string());
        }
    }

    fn linear(first: Probe) -> CompiledGraph {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(Arc::new(first))
            .add_node(Arc::new(Probe::new(NodeId::MemoryUpdate)))
            .add_edge(NodeId::UserInput, NodeId::MemoryUpdate)
            .add_edge(NodeId::MemoryUpdate, Target::End)
            .set_entry_point(NodeId::UserInput);
        builder.compile().unwrap()
    }

    #[tokio::test]
    async fn test_runs_to_end_in_order() {
        let graph = linear(Probe::new(NodeId::UserInput));
        let report = graph
            .run(QueryState::new("q", "u", "s"), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.visited(), vec![NodeId::UserInput, NodeId::MemoryUpdate]);
        assert_eq!(report.state.search_results[&Backend::Vector].len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_run_continues() {
        let mut probe = Probe::new(NodeId::UserInput);
        probe.fail = true;
        let report = linear(probe)
            .run(QueryState::new("q", "u", "s"), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert!(matches!(
            report.step(NodeId::UserInput).unwrap().outcome,
            StepOutcome::Failed { .. }
        ));
        assert!(report.state.search_results[&Backend::Sql][0].is_error());
    }

    #[tokio::test]
    async fn test_timeout_is_a_node_failure() {
        let mut probe = Probe::new(NodeId::UserInput);
        probe.delay = Some(Duration::from_millis(200));
        let limits = ExecutionLimits {
            node_timeouts: HashMap::from([(NodeId::UserInput, Duration::from_millis(10))]),
            ..Default::default()
        };
        let report = linear(probe)
            .with_limits(limits)
            .run(QueryState::new("q", "u", "s"), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(
            report.step(NodeId::UserInput).unwrap().outcome,
            StepOutcome::TimedOut { after_ms: 10 }
        );
        assert!(report.state.search_results[&Backend::Sql][0].is_error());
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_state() {
        let flag = CancellationFlag::new();
        let mut probe = Probe::new(NodeId::UserInput);
        probe.cancel_after = Some(flag.clone());

        let report = linear(probe)
            .run(QueryState::new("q", "u", "s"), &flag)
            .await
            .unwrap();

        assert_eq!(
            report.status,
            ExecutionStatus::Cancelled {
                next: NodeId::MemoryUpdate
            }
        );
        assert_eq!(report.visited(), vec![NodeId::UserInput]);
        assert_eq!(report.state.search_results[&Backend::Vector].len(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_executes_nothing() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let report = linear(Probe::new(NodeId::UserInput))
            .run(QueryState::new("q", "u", "s"), &flag)
            .await
            .unwrap();
        assert!(report.steps.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_router() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(Arc::new(Probe::new(NodeId::QueryUnderstanding)))
            .add_node(Arc::new(Probe::new(NodeId::VectorSearch)))
            .add_conditional_edges(
                NodeId::QueryUnderstanding,
                |_| Target::Node(NodeId::VectorSearch),
                [Target::Node(NodeId::VectorSearch), Target::End],
            )
            .add_edge(NodeId::VectorSearch, NodeId::QueryUnderstanding)
            .set_entry_point(NodeId::QueryUnderstanding);
        let limits = ExecutionLimits {
            max_steps: 5,
            ..Default::default()
        };
        let graph = builder.compile().unwrap().with_limits(limits);

        let report = graph
            .run(QueryState::new("q", "u", "s"), &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(report.steps.len(), 5);
        assert!(matches!(report.status, ExecutionStatus::StepLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_undeclared_route_is_a_graph_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(Arc::new(Probe::new(NodeId::QueryUnderstanding)))
            .add_node(Arc::new(Probe::new(NodeId::VectorSearch)))
            .add_conditional_edges(
                NodeId::QueryUnderstanding,
                |_| Target::Node(NodeId::QueryUnderstanding),
                [Target::Node(NodeId::VectorSearch), Target::End],
            )
            .add_edge(NodeId::VectorSearch, Target::End)
            .set_entry_point(NodeId::QueryUnderstanding);
        let graph = builder.compile().unwrap();

        let err = graph
            .run(QueryState::new("q", "u", "s"), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UndeclaredRoute {
                from: NodeId::QueryUnderstanding,
                target: Target::Node(NodeId::QueryUnderstanding),
            }
        );
    }
}
