use crate::error::{OperatorError, OperatorResult};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Directed graph over action names.
///
/// An edge `from -> to` means `from` must complete before `to`. Parallel
/// edges are kept and each one counts towards the in-degree of `to`.
/// Whenever more than one ordering is legal, nodes are taken in name order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    in_degree: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it does not exist yet
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.indices.insert(name.to_string(), index);
        self.in_degree.insert(name.to_string(), 0);
        index
    }

    /// Add an edge `from -> to`, creating missing nodes
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_index = self.add_node(from);
        let to_index = self.add_node(to);
        self.graph.add_edge(from_index, to_index, ());
        if let Some(degree) = self.in_degree.get_mut(to) {
            *degree += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn in_degree(&self, name: &str) -> Option<usize> {
        self.in_degree.get(name).copied()
    }

    /// All node names, sorted
    pub fn nodes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_cycle(&self) -> bool {
        self.search_cycle().is_some()
    }

    /// Members of one cycle in edge order, empty if the graph is acyclic
    pub fn find_cycle(&self) -> Vec<String> {
        self.search_cycle()
            .map(|cycle| cycle.into_iter().map(|n| self.graph[n].clone()).collect())
            .unwrap_or_default()
    }

    /// Nodes in dependency order (Kahn's algorithm)
    pub fn topological_sort(&self) -> OperatorResult<Vec<String>> {
        if self.has_cycle() {
            return Err(OperatorError::CyclicDependency {
                cycle: self.find_cycle(),
            });
        }

        let mut remaining: HashMap<&str, usize> = self
            .in_degree
            .iter()
            .map(|(name, degree)| (name.as_str(), *degree))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());

            for next in self.graph.neighbors_directed(self.indices[name], Direction::Outgoing) {
                let next_name = self.graph[next].as_str();
                if let Some(degree) = remaining.get_mut(next_name) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(next_name);
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(OperatorError::GraphInconsistent {
                sorted: order.len(),
                nodes: self.graph.node_count(),
            });
        }

        Ok(order)
    }

    /// Graph holding exactly `names` and the edges between them.
    ///
    /// Edges to nodes outside `names` are dropped.
    pub fn subgraph<S: AsRef<str>>(&self, names: &[S]) -> DependencyGraph {
        let members: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut subgraph = DependencyGraph::new();
        let mut seen = HashSet::new();

        for name in names.iter().map(AsRef::as_ref) {
            if !seen.insert(name) {
                continue;
            }
            subgraph.add_node(name);

            if let Some(&index) = self.indices.get(name) {
                for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                    let to = self.graph[next].as_str();
                    if members.contains(to) {
                        subgraph.add_edge(name, to);
                    }
                }
            }
        }

        subgraph
    }

    /// Cycle-check the portion of the graph induced by `names`
    pub fn validate_sequence<S: AsRef<str>>(&self, names: &[S]) -> OperatorResult<()> {
        let subgraph = self.subgraph(names);
        if subgraph.has_cycle() {
            return Err(OperatorError::CyclicDependency {
                cycle: subgraph.find_cycle(),
            });
        }
        Ok(())
    }

    /// Everything that must complete before `name`, transitively
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.closure(name, Direction::Incoming)
    }

    /// Everything that waits on `name`, transitively
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.closure(name, Direction::Outgoing)
    }

    /// Group `names` by dependency depth within the induced subgraph.
    ///
    /// A node's level is one more than the deepest of its in-set
    /// dependencies. Every member of a level may run concurrently once all
    /// earlier levels have finished.
    pub fn parallel_groups<S: AsRef<str>>(&self, names: &[S]) -> OperatorResult<Vec<Vec<String>>> {
        let subgraph = self.subgraph(names);
        let order = subgraph.topological_sort()?;

        let mut levels: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        let mut max_level = 0;
        for name in &order {
            let index = subgraph.indices[name.as_str()];
            let level = subgraph
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .filter_map(|dep| levels.get(subgraph.graph[dep].as_str()))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            max_level = max_level.max(level);
            levels.insert(name.as_str(), level);
        }

        let mut groups: Vec<Vec<String>> = vec![Vec::new(); if order.is_empty() { 0 } else { max_level + 1 }];
        for name in &order {
            groups[levels[name.as_str()]].push(name.clone());
        }
        for group in &mut groups {
            group.sort();
        }
        groups.retain(|group| !group.is_empty());

        Ok(groups)
    }

    fn closure(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&start) = self.indices.get(name) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for next in self.graph.neighbors_directed(node, direction) {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }

        let mut names: Vec<String> = visited.into_iter().map(|n| self.graph[n].clone()).collect();
        names.sort();
        names
    }

    fn sorted_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        nodes
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        next
    }

    /// Three-colour depth-first search with an explicit stack.
    /// Returns the first cycle found, starting at the node the back edge
    /// points to.
    fn search_cycle(&self) -> Option<Vec<NodeIndex>> {
        let count = self.graph.node_count();
        let mut color = vec![Color::White; count];
        let mut parent: Vec<Option<NodeIndex>> = vec![None; count];

        for root in self.sorted_nodes() {
            if color[root.index()] != Color::White {
                continue;
            }
            color[root.index()] = Color::Grey;
            let mut stack = vec![(root, self.successors(root), 0usize)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let next = frame.1.get(frame.2).copied();
                frame.2 += 1;

                let Some(next) = next else {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    continue;
                };

                match color[next.index()] {
                    Color::Grey => {
                        let mut path = Vec::new();
                        let mut current = Some(node);
                        while let Some(step) = current {
                            if step == next {
                                break;
                            }
                            path.push(step);
                            current = parent[step.index()];
                        }
                        path.push(next);
                        path.reverse();
                        return Some(path);
                    }
                    Color::White => {
                        parent[next.index()] = Some(node);
                        color[next.index()] = Color::Grey;
                        stack.push((next, self.successors(next), 0));
                    }
                    Color::Black => {}
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        let first = graph.add_node("a");
        let second = graph.add_node("a");

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.in_degree("a"), Some(0));
    }

    #[test]
    fn test_add_edge_counts_in_degree() {
        let graph = graph(&[("a", "c"), ("b", "c"), ("a", "c")]);

        assert_eq!(graph.in_degree("a"), Some(0));
        assert_eq!(graph.in_degree("c"), Some(3));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.nodes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_linear_topological_sort() {
        let graph = graph(&[("step2", "step3"), ("step1", "step2")]);
        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["step1", "step2", "step3"]);
    }

    #[test]
    fn test_topological_sort_respects_every_edge() {
        // Layered DAG with skip edges: i -> j whenever j is a later multiple
        let mut edges = Vec::new();
        let names: Vec<String> = (1..=30).map(|i| format!("n{:02}", 31 - i)).collect();
        for i in 1..=30usize {
            for j in (i * 2..=30).step_by(i) {
                edges.push((names[i - 1].clone(), names[j - 1].clone()));
            }
        }
        let mut graph = DependencyGraph::new();
        for (from, to) in &edges {
            graph.add_edge(from, to);
        }

        let order = graph.topological_sort().unwrap();

        assert_eq!(order.len(), 30);
        for (from, to) in &edges {
            assert!(position(&order, from) < position(&order, to), "{from} before {to}");
        }
    }

    #[test]
    fn test_independent_nodes_sorted_by_name() {
        let mut graph = DependencyGraph::new();
        for name in ["delta", "alpha", "charlie", "bravo"] {
            graph.add_node(name);
        }
        assert_eq!(
            graph.topological_sort().unwrap(),
            vec!["alpha", "bravo", "charlie", "delta"]
        );
    }

    #[test]
    fn test_four_node_cycle_detected() {
        // c depends on b depends on a, d depends on c, a depends on d
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "a")]);

        assert!(graph.has_cycle());
        assert_eq!(graph.find_cycle(), vec!["a", "b", "c", "d"]);

        match graph.topological_sort() {
            Err(OperatorError::CyclicDependency { cycle }) => assert_eq!(cycle.len(), 4),
            other => panic!("expected cyclic dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_find_cycle_ignores_acyclic_prefix() {
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "b"), ("a", "d")]);
        assert_eq!(graph.find_cycle(), vec!["b", "c"]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let graph = graph(&[("a", "a")]);
        assert!(graph.has_cycle());
        assert_eq!(graph.find_cycle(), vec!["a"]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let graph = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert!(!graph.has_cycle());
        assert!(graph.find_cycle().is_empty());
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let mut graph = DependencyGraph::new();
        for i in 0..50_000 {
            graph.add_edge(&format!("n{i}"), &format!("n{}", i + 1));
        }
        assert!(!graph.has_cycle());

        graph.add_edge("n50000", "n0");
        assert!(graph.has_cycle());
        assert_eq!(graph.find_cycle().len(), 50_001);
    }

    #[test]
    fn test_validate_sequence_ignores_out_of_set_dependencies() {
        // x depends on y, but only x is being run
        let graph = graph(&[("y", "x")]);
        assert!(graph.validate_sequence(&["x"]).is_ok());
    }

    #[test]
    fn test_validate_sequence_scopes_cycles() {
        let graph = graph(&[("a", "b"), ("b", "a"), ("c", "d")]);

        assert!(graph.validate_sequence(&["c", "d"]).is_ok());
        assert!(graph.validate_sequence(&["a", "c"]).is_ok());
        assert!(matches!(
            graph.validate_sequence(&["a", "b", "c"]),
            Err(OperatorError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_subgraph_keeps_only_internal_edges() {
        let graph = graph(&[("a", "b"), ("b", "c"), ("x", "c")]);
        let subgraph = graph.subgraph(&["b", "c", "b"]);

        assert_eq!(subgraph.node_count(), 2);
        assert_eq!(subgraph.edge_count(), 1);
        assert_eq!(subgraph.in_degree("b"), Some(0));
        assert_eq!(subgraph.in_degree("c"), Some(1));
    }

    #[test]
    fn test_transitive_dependencies_and_dependents() {
        // Diamond: a -> b, a -> c, b -> d, c -> d, then d -> e
        let graph = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("d", "e")]);

        assert_eq!(graph.dependencies("d"), vec!["a", "b", "c"]);
        assert_eq!(graph.dependencies("a"), Vec::<String>::new());
        assert_eq!(graph.dependents("a"), vec!["b", "c", "d", "e"]);
        assert_eq!(graph.dependents("b"), vec!["d", "e"]);
        assert!(graph.dependents("missing").is_empty());
    }

    #[test]
    fn test_parallel_groups() {
        let graph = graph(&[("a", "c"), ("b", "c")]);
        let groups = graph.parallel_groups(&["a", "b", "c"]).unwrap();
        assert_eq!(groups, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_parallel_groups_use_longest_chain() {
        // d depends on a directly and on c through b
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "d"), ("a", "d"), ("e", "d")]);
        let groups = graph.parallel_groups(&["a", "b", "c", "d", "e"]).unwrap();
        assert_eq!(
            groups,
            vec![vec!["a", "e"], vec!["b"], vec!["c"], vec!["d"]]
        );
    }

    #[test]
    fn test_parallel_groups_scoped_to_names() {
        // b is not part of the run, so c has no in-set dependency left
        let graph = graph(&[("a", "b"), ("b", "c")]);
        let groups = graph.parallel_groups(&["a", "c"]).unwrap();
        assert_eq!(groups, vec![vec!["a", "c"]]);

        assert!(graph.parallel_groups::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parallel_groups_reject_cycles() {
        let graph = graph(&[("a", "b"), ("b", "a")]);
        assert!(matches!(
            graph.parallel_groups(&["a", "b"]),
            Err(OperatorError::CyclicDependency { .. })
        ));
    }
}
