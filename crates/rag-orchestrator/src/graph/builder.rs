//! Graph builder: register nodes and edges, then `compile` to validate.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::error::GraphError;
use crate::state::QueryState;

use super::compiled::{CompiledGraph, Edge, ExecutionLimits};
use super::{Node, NodeId, Target};

/// Conditional-edge router: pure function of the state.
pub type RouteFn = Arc<dyn Fn(&QueryState) -> Target + Send + Sync>;

/// Mutable graph definition.
///
/// Registration problems (duplicate node, second outgoing edge) are kept and
/// reported by `compile`, so the builder methods can be chained.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    entry: Option<NodeId>,
    pending_error: Option<GraphError>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) -> &mut Self {
        let id = node.id();
        if self.nodes.insert(id, node).is_some() {
            self.fail(GraphError::DuplicateNode(id));
        }
        self
    }

    pub fn add_edge(&mut self, from: NodeId, to: impl Into<Target>) -> &mut Self {
        self.insert_edge(from, Edge::Direct(to.into()))
    }

    /// Outgoing edge decided at run time by `route`. Every target the router
    /// may return must be listed in `targets`.
    pub fn add_conditional_edges<F>(
        &mut self,
        from: NodeId,
        route: F,
        targets: impl IntoIterator<Item = Target>,
    ) -> &mut Self
    where
        F: Fn(&QueryState) -> Target + Send + Sync + 'static,
    {
        let targets: Vec<Target> = targets.into_iter().collect();
        self.insert_edge(
            from,
            Edge::Conditional {
                route: Arc::new(route),
                targets,
            },
        )
    }

    pub fn set_entry_point(&mut self, id: NodeId) -> &mut Self {
        self.entry = Some(id);
        self
    }

    /// Validates the transition table and freezes it.
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntryPoint)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        // Sorted for deterministic error reporting.
        let mut sources: Vec<NodeId> = self.edges.keys().copied().collect();
        sources.sort();
        for from in &sources {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(*from));
            }
            let edge = &self.edges[from];
            if edge.targets().is_empty() {
                return Err(GraphError::EmptyRoute(*from));
            }
            for target in edge.targets() {
                if let Target::Node(to) = target {
                    if !self.nodes.contains_key(&to) {
                        return Err(GraphError::UnknownNode(to));
                    }
                }
            }
        }

        let mut registered: Vec<NodeId> = self.nodes.keys().copied().collect();
        registered.sort();
        for id in registered {
            if !self.edges.contains_key(&id) {
                return Err(GraphError::MissingEdge(id));
            }
        }

        check_end_reachable(entry, &self.edges)?;

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            limits: ExecutionLimits::default(),
        })
    }

    fn insert_edge(&mut self, from: NodeId, edge: Edge) -> &mut Self {
        if self.edges.insert(from, edge).is_some() {
            self.fail(GraphError::DuplicateEdge(from));
        }
        self
    }

    fn fail(&mut self, err: GraphError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
    }
}

/// Every node reachable from `entry` must have a path to END.
fn check_end_reachable(entry: NodeId, edges: &HashMap<NodeId, Edge>) -> Result<(), GraphError> {
    let mut reachable = BTreeSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(id) = queue.pop_front() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(edge) = edges.get(&id) {
            for target in edge.targets() {
                if let Target::Node(next) = target {
                    queue.push_back(next);
                }
            }
        }
    }

    // Reverse walk from END.
    let mut reaches_end = BTreeSet::new();
    let mut changed = true;
    while changed {
        changed = false;
        for (id, edge) in edges {
            if reaches_end.contains(id) {
                continue;
            }
            let done = edge.targets().iter().any(|t| match t {
                Target::End => true,
                Target::Node(next) => reaches_end.contains(next),
            });
            if done {
                reaches_end.insert(*id);
                changed = true;
            }
        }
    }

    match reachable.into_iter().find(|id| !reaches_end.contains(id)) {
        Some(stuck) => Err(GraphError::UnreachableEnd(stuck)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use async_trait::async_trait;

    struct Pass(NodeId);

    #[async_trait]
    impl Node for Pass {
        fn id(&self) -> NodeId {
            self.0
        }

        async fn run(&self, _state: &mut QueryState) -> Result<(), NodeError> {
            Ok(())
        }
    }

    fn node(id: NodeId) -> Arc<dyn Node> {
        Arc::new(Pass(id))
    }

    #[test]
    fn test_compile_linear_graph() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_node(node(NodeId::MemoryUpdate))
            .add_edge(NodeId::UserInput, NodeId::MemoryUpdate)
            .add_edge(NodeId::MemoryUpdate, Target::End)
            .set_entry_point(NodeId::UserInput);
        assert!(builder.compile().is_ok());
    }

    #[test]
    fn test_missing_entry_point_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_edge(NodeId::UserInput, Target::End);
        assert_eq!(builder.compile().err(), Some(GraphError::MissingEntryPoint));
    }

    #[test]
    fn test_edge_to_unregistered_node_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_edge(NodeId::UserInput, NodeId::Aggregation)
            .set_entry_point(NodeId::UserInput);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::UnknownNode(NodeId::Aggregation))
        );
    }

    #[test]
    fn test_undeclared_conditional_target_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::QueryUnderstanding))
            .add_conditional_edges(
                NodeId::QueryUnderstanding,
                |_| Target::End,
                [Target::End, Target::Node(NodeId::SqlSearch)],
            )
            .set_entry_point(NodeId::QueryUnderstanding);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::UnknownNode(NodeId::SqlSearch))
        );
    }

    #[test]
    fn test_duplicate_edge_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_edge(NodeId::UserInput, Target::End)
            .add_edge(NodeId::UserInput, Target::End)
            .set_entry_point(NodeId::UserInput);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::DuplicateEdge(NodeId::UserInput))
        );
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_node(node(NodeId::UserInput))
            .add_edge(NodeId::UserInput, Target::End)
            .set_entry_point(NodeId::UserInput);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::DuplicateNode(NodeId::UserInput))
        );
    }

    #[test]
    fn test_node_without_edge_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::UserInput))
            .add_node(node(NodeId::Aggregation))
            .add_edge(NodeId::UserInput, Target::End)
            .set_entry_point(NodeId::UserInput);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::MissingEdge(NodeId::Aggregation))
        );
    }

    #[test]
    fn test_closed_loop_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::QueryUnderstanding))
            .add_node(node(NodeId::VectorSearch))
            .add_edge(NodeId::QueryUnderstanding, NodeId::VectorSearch)
            .add_edge(NodeId::VectorSearch, NodeId::QueryUnderstanding)
            .set_entry_point(NodeId::QueryUnderstanding);
        assert_eq!(
            builder.compile().err(),
            Some(GraphError::UnreachableEnd(NodeId::QueryUnderstanding))
        );
    }

    #[test]
    fn test_loop_with_conditional_exit_compiles() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node(NodeId::QueryUnderstanding))
            .add_node(node(NodeId::VectorSearch))
            .add_conditional_edges(
                NodeId::QueryUnderstanding,
                |_| Target::End,
                [Target::Node(NodeId::VectorSearch), Target::End],
            )
            .add_edge(NodeId::VectorSearch, NodeId::QueryUnderstanding)
            .set_entry_point(NodeId::QueryUnderstanding);
        assert!(builder.compile().is_ok());
    }
}
