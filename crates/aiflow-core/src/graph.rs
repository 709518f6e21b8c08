use crate::{EdgeDefinition, WorkflowDefinition, WorkflowError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Dependency graph induced by a definition's edges.
///
/// Nodes keep their declaration order. Edges whose endpoints are not
/// declared are left out of the graph and reported by `dangling_edges`.
pub struct WorkflowGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
    dangling: Vec<&'a EdgeDefinition>,
}

impl<'a> WorkflowGraph<'a> {
    pub fn build(definition: &'a WorkflowDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &definition.nodes {
            if index.contains_key(node.id.as_str()) {
                continue;
            }
            let idx = graph.add_node(node.id.as_str());
            index.insert(node.id.as_str(), idx);
        }

        let mut dangling = Vec::new();
        for edge in &definition.edges {
            match (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                (Some(from), Some(to)) => {
                    graph.add_edge(*from, *to, ());
                }
                _ => dangling.push(edge),
            }
        }

        Self {
            graph,
            index,
            dangling,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn dangling_edges(&self) -> &[&'a EdgeDefinition] {
        &self.dangling
    }

    /// Direct successors of `id`, in edge declaration order.
    pub fn successors(&self, id: &str) -> Vec<&'a str> {
        match self.index.get(id) {
            Some(idx) => self.successor_indices(*idx).into_iter().map(|i| self.graph[i]).collect(),
            None => Vec::new(),
        }
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|idx| self.graph.neighbors_directed(*idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    /// Depth-first search over an explicit stack; a node met again while
    /// still on the current path closes a cycle.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut stack: Vec<(NodeIndex, std::vec::IntoIter<NodeIndex>)> = Vec::new();

        for start in self.graph.node_indices() {
            if !visited.insert(start) {
                continue;
            }
            on_path.insert(start);
            stack.push((start, self.successor_indices(start).into_iter()));

            while let Some((node, successors)) = stack.last_mut() {
                let node = *node;
                match successors.next() {
                    Some(next) if on_path.contains(&next) => return true,
                    Some(next) => {
                        if visited.insert(next) {
                            on_path.insert(next);
                            stack.push((next, self.successor_indices(next).into_iter()));
                        }
                    }
                    None => {
                        on_path.remove(&node);
                        stack.pop();
                    }
                }
            }
        }
        false
    }

    /// Kahn's algorithm. Zero in-degree nodes are seeded in declaration
    /// order and released targets are queued in edge order, so the result
    /// is deterministic for a given definition.
    pub fn topological_order(&self) -> Result<Vec<&'a str>, WorkflowError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, degree)
            })
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = queue.pop_front() {
            order.push(self.graph[idx]);

            for next in self.successor_indices(idx) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if order.len() < self.graph.node_count() {
            return Err(WorkflowError::CyclicDependency);
        }

        tracing::debug!("Execution order: {:?}", order);
        Ok(order)
    }

    fn successor_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        // petgraph lists neighbors most-recent-edge first
        let mut next: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
        next.reverse();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeDefinition;

    fn definition(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new("test");
        for id in nodes {
            def.add_node(NodeDefinition::new(*id, "start"));
        }
        for (s, t) in edges {
            def.connect(*s, *t);
        }
        def
    }

    #[test]
    fn linear_order() {
        let def = definition(&["output", "llm", "start"], &[("start", "llm"), ("llm", "output")]);
        let graph = WorkflowGraph::build(&def);
        assert_eq!(graph.topological_order().unwrap(), vec!["start", "llm", "output"]);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn independent_nodes_follow_declaration_order() {
        let def = definition(&["a", "b", "c"], &[("a", "c")]);
        let graph = WorkflowGraph::build(&def);
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_releases_targets_in_edge_order() {
        let def = definition(&["a", "b", "c", "d"], &[("a", "c"), ("a", "b"), ("b", "d"), ("c", "d")]);
        let graph = WorkflowGraph::build(&def);
        assert_eq!(graph.successors("a"), vec!["c", "b"]);
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "c", "b", "d"]);
        assert_eq!(graph.in_degree("d"), 2);
    }

    #[test]
    fn cycle_detected_by_both_algorithms() {
        let def = definition(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let graph = WorkflowGraph::build(&def);
        assert!(graph.has_cycle());
        assert_eq!(graph.topological_order(), Err(WorkflowError::CyclicDependency));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let def = definition(&["a"], &[("a", "a")]);
        assert!(WorkflowGraph::build(&def).has_cycle());
    }

    #[test]
    fn dangling_edges_are_excluded() {
        let def = definition(&["a"], &[("a", "ghost")]);
        let graph = WorkflowGraph::build(&def);
        assert_eq!(graph.dangling_edges().len(), 1);
        assert_eq!(graph.topological_order().unwrap(), vec!["a"]);
    }
}
