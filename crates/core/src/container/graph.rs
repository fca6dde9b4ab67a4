//! Static dependency graph analysis
//!
//! Built from declared provider dependencies (see
//! [`ProviderRegistry::to_graph`](crate::ProviderRegistry::to_graph)). The
//! graph answers structural questions without instantiating anything: cycle
//! detection, topological resolution order, missing-dependency reporting,
//! and text visualization. Lazy edges stay in the graph; deferral is a
//! runtime concern, the declared shape is what we analyze.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use serde::Serialize;

use crate::container::scope::Scope;
use crate::container::token::Token;
use crate::errors::DiError;

/// One declared dependency edge
#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub token: Token,
    /// Optional edges never count as missing dependencies
    pub optional: bool,
}

/// Graph node for a registered token
#[derive(Debug, Clone, Serialize)]
pub struct DependencyNode {
    pub token: Token,
    pub dependencies: Vec<DependencyEdge>,
    pub scope: Scope,
    /// Whether this node participates in a cycle; populated by
    /// [`DependencyGraph::refresh_analysis`]
    pub circular: bool,
    /// Longest acyclic chain below this node; populated by
    /// [`DependencyGraph::refresh_analysis`]
    pub depth: usize,
}

/// Aggregate cycle report
#[derive(Debug, Clone, Serialize)]
pub struct CycleAnalysis {
    /// Each cycle as the token sequence along its edges
    pub cycles: Vec<Vec<Token>>,
    /// Longest acyclic dependency chain in the graph
    pub depth: usize,
    pub total_nodes: usize,
    /// Nodes participating in at least one cycle
    pub cycle_nodes: usize,
}

/// Dependency graph over registered tokens
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<Token, DependencyNode>,
    order: Vec<Token>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, token: Token, edges: Vec<(Token, bool)>, scope: Scope) {
        let dependencies = edges
            .into_iter()
            .map(|(token, optional)| DependencyEdge { token, optional })
            .collect();
        if !self.nodes.contains_key(&token) {
            self.order.push(token.clone());
        }
        self.nodes.insert(
            token.clone(),
            DependencyNode {
                token,
                dependencies,
                scope,
                circular: false,
                depth: 0,
            },
        );
    }

    /// An alias is a node whose single mandatory edge points at its
    /// target; it carries the target's scope, having none of its own
    pub fn add_alias_node(&mut self, token: Token, target: Token, scope: Scope) {
        self.add_node(token, vec![(target, false)], scope);
    }

    pub fn node(&self, token: &Token) -> Option<&DependencyNode> {
        self.nodes.get(token)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Detect every distinct dependency cycle.
    ///
    /// DFS in registration order; a back-edge onto the current stack yields
    /// the cycle slice starting at the repeated token. Traversal continues
    /// past a found cycle so disjoint cycles are all reported.
    pub fn detect_cycles(&self) -> Vec<Vec<Token>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();

        for token in &self.order {
            if !visited.contains(token) {
                let mut stack = Vec::new();
                let mut on_stack = HashSet::new();
                self.cycle_dfs(token, &mut visited, &mut stack, &mut on_stack, &mut cycles);
            }
        }

        cycles
    }

    fn cycle_dfs(
        &self,
        token: &Token,
        visited: &mut HashSet<Token>,
        stack: &mut Vec<Token>,
        on_stack: &mut HashSet<Token>,
        cycles: &mut Vec<Vec<Token>>,
    ) {
        if on_stack.contains(token) {
            if let Some(start) = stack.iter().position(|t| t == token) {
                cycles.push(stack[start..].to_vec());
            }
            return;
        }
        if visited.contains(token) {
            return;
        }

        visited.insert(token.clone());
        on_stack.insert(token.clone());
        stack.push(token.clone());

        if let Some(node) = self.nodes.get(token) {
            for edge in &node.dependencies {
                self.cycle_dfs(&edge.token, visited, stack, on_stack, cycles);
            }
        }

        stack.pop();
        on_stack.remove(token);
    }

    /// Full cycle report plus depth metrics. Depth counts the longest chain
    /// of mandatory-or-optional edges below a node; cyclic and unregistered
    /// dependencies contribute nothing.
    pub fn cycle_analysis(&self) -> CycleAnalysis {
        let cycles = self.detect_cycles();
        let cyclic: HashSet<&Token> = cycles.iter().flatten().collect();

        let mut depths: HashMap<Token, usize> = HashMap::new();
        let mut max_depth = 0;
        for token in &self.order {
            let d = self.depth_of(token, &cyclic, &mut depths);
            max_depth = max_depth.max(d);
        }

        CycleAnalysis {
            cycle_nodes: cyclic.len(),
            total_nodes: self.order.len(),
            depth: max_depth,
            cycles,
        }
    }

    /// Write cycle membership and depth onto every node.
    ///
    /// [`ProviderRegistry::to_graph`](crate::ProviderRegistry::to_graph)
    /// runs this after assembly; graphs built node by node need it called
    /// again once the last node is in.
    pub fn refresh_analysis(&mut self) {
        let cyclic: HashSet<Token> = self.detect_cycles().into_iter().flatten().collect();
        let cyclic_refs: HashSet<&Token> = cyclic.iter().collect();

        let mut depths = HashMap::new();
        for token in &self.order {
            self.depth_of(token, &cyclic_refs, &mut depths);
        }

        for (token, node) in self.nodes.iter_mut() {
            node.circular = cyclic.contains(token);
            node.depth = depths.get(token).copied().unwrap_or(0);
        }
    }

    fn depth_of(
        &self,
        token: &Token,
        cyclic: &HashSet<&Token>,
        memo: &mut HashMap<Token, usize>,
    ) -> usize {
        if cyclic.contains(token) {
            return 0;
        }
        if let Some(&d) = memo.get(token) {
            return d;
        }
        let d = match self.nodes.get(token) {
            Some(node) => node
                .dependencies
                .iter()
                .filter(|e| self.nodes.contains_key(&e.token) && !cyclic.contains(&e.token))
                .map(|e| self.depth_of(&e.token, cyclic, memo) + 1)
                .max()
                .unwrap_or(0),
            None => 0,
        };
        memo.insert(token.clone(), d);
        d
    }

    /// Tokens with mandatory edges pointing at nothing registered
    pub fn missing_dependencies(&self) -> HashMap<Token, Vec<Token>> {
        let mut missing = HashMap::new();
        for token in &self.order {
            if let Some(node) = self.nodes.get(token) {
                let absent: Vec<Token> = node
                    .dependencies
                    .iter()
                    .filter(|e| !e.optional && !self.nodes.contains_key(&e.token))
                    .map(|e| e.token.clone())
                    .collect();
                if !absent.is_empty() {
                    missing.insert(token.clone(), absent);
                }
            }
        }
        missing
    }

    /// Topological order, dependencies before dependents.
    ///
    /// Kahn's algorithm seeded in registration order so the result is
    /// deterministic. Edges to unregistered tokens are skipped here; they
    /// are [`missing_dependencies`](Self::missing_dependencies)' concern.
    pub fn resolution_order(&self) -> Result<Vec<Token>, DiError> {
        let mut in_degree: HashMap<&Token, usize> = HashMap::new();
        let mut dependents: HashMap<&Token, Vec<&Token>> = HashMap::new();

        for token in &self.order {
            in_degree.entry(token).or_insert(0);
            if let Some(node) = self.nodes.get(token) {
                for edge in &node.dependencies {
                    if let Some((dep, _)) = self.nodes.get_key_value(&edge.token) {
                        *in_degree.entry(token).or_insert(0) += 1;
                        dependents.entry(dep).or_default().push(token);
                    }
                }
            }
        }

        let mut queue: VecDeque<&Token> = self
            .order
            .iter()
            .filter(|t| in_degree.get(*t).copied().unwrap_or(0) == 0)
            .collect();
        let mut result = Vec::new();

        while let Some(token) = queue.pop_front() {
            result.push(token.clone());
            if let Some(deps) = dependents.get(token) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            let cycle = self.detect_cycles().into_iter().next().unwrap_or_default();
            let path = cycle
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiError::CircularDependency {
                token: cycle
                    .first()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                path,
            });
        }

        Ok(result)
    }

    /// ASCII rendering, one node per line with its edges
    pub fn visualize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Dependency graph ({} nodes)", self.order.len());
        for token in &self.order {
            if let Some(node) = self.nodes.get(token) {
                let _ = writeln!(out, "  {} [{}]", token, node.scope);
                for edge in &node.dependencies {
                    let marker = if edge.optional { "?-> " } else { "--> " };
                    let registered = if self.nodes.contains_key(&edge.token) {
                        ""
                    } else {
                        " (missing)"
                    };
                    let _ = writeln!(out, "    {}{}{}", marker, edge.token, registered);
                }
            }
        }
        out
    }

    /// JSON rendering of the node list, registration order, with cycle
    /// and depth annotations freshly computed
    pub fn visualize_json(&self) -> Result<String, DiError> {
        let mut graph = self.clone();
        graph.refresh_analysis();
        let nodes: Vec<&DependencyNode> = graph
            .order
            .iter()
            .filter_map(|t| graph.nodes.get(t))
            .collect();
        serde_json::to_string_pretty(&nodes)
            .map_err(|err| DiError::construction(format!("graph serialization failed: {}", err)))
    }

    /// Graphviz DOT rendering
    pub fn visualize_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph dependencies {{");
        let _ = writeln!(out, "  rankdir=LR;");
        for token in &self.order {
            if let Some(node) = self.nodes.get(token) {
                let _ = writeln!(
                    out,
                    "  \"{}\" [label=\"{}\\n({})\"];",
                    token, token, node.scope
                );
                for edge in &node.dependencies {
                    let style = if edge.optional { " [style=dashed]" } else { "" };
                    let _ = writeln!(out, "  \"{}\" -> \"{}\"{};", token, edge.token, style);
                }
            }
        }
        let _ = writeln!(out, "}}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &'static str) -> Token {
        Token::key(name)
    }

    fn graph(edges: &[(&'static str, &[&'static str])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (token, deps) in edges {
            g.add_node(
                key(token),
                deps.iter().map(|d| (key(d), false)).collect(),
                Scope::Singleton,
            );
        }
        g
    }

    #[test]
    fn test_detect_cycles_finds_two_disjoint_cycles() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["d"]),
            ("d", &["c"]),
            ("e", &[]),
        ]);

        let cycles = g.detect_cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0], vec![key("a"), key("b")]);
        assert_eq!(cycles[1], vec![key("c"), key("d")]);
    }

    #[test]
    fn test_self_cycle() {
        let g = graph(&[("a", &["a"])]);
        let cycles = g.detect_cycles();
        assert_eq!(cycles, vec![vec![key("a")]]);
    }

    #[test]
    fn test_diamond_is_acyclic_and_ordered() {
        // a depends on b and c, both depend on d
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]);

        assert!(g.detect_cycles().is_empty());

        let order = g.resolution_order().unwrap();
        let pos = |t: &'static str| order.iter().position(|x| *x == key(t)).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn test_resolution_order_reports_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = g.resolution_order().unwrap_err();
        assert!(err.is_circular());
    }

    #[test]
    fn test_missing_dependencies_skips_optional() {
        let mut g = DependencyGraph::new();
        g.add_node(
            key("svc"),
            vec![(key("absent"), false), (key("maybe"), true)],
            Scope::Singleton,
        );

        let missing = g.missing_dependencies();
        assert_eq!(missing.get(&key("svc")), Some(&vec![key("absent")]));

        // optional edge alone never counts as missing
        let mut g = DependencyGraph::new();
        g.add_node(key("svc"), vec![(key("maybe"), true)], Scope::Singleton);
        assert!(g.missing_dependencies().is_empty());
    }

    #[test]
    fn test_cycle_analysis_depth_ignores_cyclic_nodes() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &[]),
            ("x", &["y"]),
            ("y", &["x"]),
        ]);

        let analysis = g.cycle_analysis();
        assert_eq!(analysis.total_nodes, 5);
        assert_eq!(analysis.cycle_nodes, 2);
        assert_eq!(analysis.depth, 2);
        assert_eq!(analysis.cycles.len(), 1);
    }

    #[test]
    fn test_visualize_marks_missing_and_optional() {
        let mut g = DependencyGraph::new();
        g.add_node(
            key("svc"),
            vec![(key("gone"), false), (key("maybe"), true)],
            Scope::Request,
        );

        let text = g.visualize();
        assert!(text.contains("svc [request]"));
        assert!(text.contains("--> gone (missing)"));
        assert!(text.contains("?-> maybe"));
    }

    #[test]
    fn test_refresh_analysis_populates_node_annotations() {
        let mut g = graph(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["d"]),
            ("d", &[]),
        ]);
        g.refresh_analysis();

        assert!(g.node(&key("a")).unwrap().circular);
        assert!(g.node(&key("b")).unwrap().circular);

        let c = g.node(&key("c")).unwrap();
        assert!(!c.circular);
        assert_eq!(c.depth, 1);
        assert_eq!(g.node(&key("d")).unwrap().depth, 0);
    }

    #[test]
    fn test_visualize_json_carries_cycle_annotations() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let json = g.visualize_json().unwrap();
        assert!(json.contains("\"circular\": true"));
        assert!(!json.contains("\"circular\": false"));
    }

    #[test]
    fn test_visualize_dot_shape() {
        let g = graph(&[("a", &["b"]), ("b", &[])]);
        let dot = g.visualize_dot();
        assert!(dot.starts_with("digraph dependencies {"));
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
