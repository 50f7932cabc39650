//! Dependency graph construction.
//!
//! Every rule's name and dependency expressions are expanded once, up front. The
//! resulting graph is immutable: the scheduler only reads it.
//!
//! Failure policy while building:
//!
//! - a rule whose *name* cannot be expanded is set aside as an [`UnresolvedRule`];
//! - a rule whose *dependencies* cannot be expanded becomes a broken node that fails
//!   when scheduled;
//! - two rules expanding to the same target, or any dependency cycle, abort the build.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::build::rules::{Rule, PHONY_TARGET};
use crate::errors::{NgmakeError, NgmakeResult};
use crate::loader::Program;
use crate::runtime::Bindings;
use crate::value::Value;

// ============================================================================
// NODES
// ============================================================================

/// One expanded target.
#[derive(Debug, Clone)]
pub struct BuildNode {
    pub name: String,
    /// Dependencies in declaration order, as the action sees them.
    pub deps: Vec<String>,
    pub phony: bool,
    /// Index of the producing rule in the program's registry; `None` for leaves.
    pub rule: Option<usize>,
    /// Why the dependency list could not be expanded.
    pub broken: Option<Arc<NgmakeError>>,
    edges: Vec<usize>,
}

impl BuildNode {
    fn new(name: String, deps: Vec<String>, rule: Option<usize>) -> Self {
        Self {
            name,
            deps,
            phony: false,
            rule,
            broken: None,
            edges: Vec::new(),
        }
    }

    /// A node no rule produces, such as a source file.
    pub fn is_leaf(&self) -> bool {
        self.rule.is_none()
    }

    /// Distinct dependency node indices.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }
}

/// A rule left out of the graph because its name did not expand to a target.
#[derive(Debug)]
pub struct UnresolvedRule {
    /// Source form of the name expression.
    pub rule: String,
    pub origin: String,
    pub error: NgmakeError,
}

// ============================================================================
// GRAPH
// ============================================================================

/// Expanded, acyclic dependency graph.
#[derive(Debug, Default)]
pub struct BuildGraph {
    nodes: Vec<BuildNode>,
    index: HashMap<String, usize>,
    phony: Vec<String>,
    unresolved: Vec<UnresolvedRule>,
}

impl BuildGraph {
    /// Expands every rule of `program` and checks the result for duplicates and cycles.
    pub fn build(program: &Program, max_depth: usize) -> NgmakeResult<Self> {
        let mut graph = BuildGraph::default();

        for (position, rule) in program.rules.iter().enumerate() {
            let name = match expand_name(program, rule, max_depth) {
                Ok(name) => name,
                Err(error) => {
                    warn!(
                        rule = %rule.describe(),
                        origin = %rule.origin,
                        %error,
                        "rule name did not expand; skipping"
                    );
                    graph.unresolved.push(UnresolvedRule {
                        rule: rule.describe(),
                        origin: rule.origin.clone(),
                        error,
                    });
                    continue;
                }
            };

            let deps = expand_deps(program, rule, max_depth);

            if name == PHONY_TARGET {
                match deps {
                    Ok(deps) => graph.phony.extend(deps),
                    Err(error) => graph.unresolved.push(UnresolvedRule {
                        rule: rule.describe(),
                        origin: rule.origin.clone(),
                        error,
                    }),
                }
                continue;
            }

            if graph.index.contains_key(&name) {
                return Err(NgmakeError::DuplicateTarget { target: name });
            }

            let node = match deps {
                Ok(deps) => BuildNode::new(name.clone(), deps, Some(position)),
                Err(error) => {
                    warn!(
                        target_name = %name,
                        %error,
                        "dependencies did not expand; target is broken"
                    );
                    let mut node = BuildNode::new(name.clone(), vec![], Some(position));
                    node.broken = Some(Arc::new(error));
                    node
                }
            };
            debug!(target_name = %name, deps = ?node.deps, "graph node");
            graph.index.insert(name, graph.nodes.len());
            graph.nodes.push(node);
        }

        graph.add_leaves();
        graph.mark_phony();
        graph.link();
        graph.check_acyclic()?;
        Ok(graph)
    }

    pub fn nodes(&self) -> &[BuildNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&BuildNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Targets listed as dependencies of `.PHONY`, in declaration order.
    pub fn phony_targets(&self) -> &[String] {
        &self.phony
    }

    pub fn unresolved(&self) -> &[UnresolvedRule] {
        &self.unresolved
    }

    /// Rule that produces `node`.
    pub fn rule_for<'p>(&self, program: &'p Program, node: &BuildNode) -> Option<&'p Rule> {
        node.rule.and_then(|i| program.rules.rules().get(i))
    }

    /// Nodes reachable from `requested`, dependencies first. Among nodes that are ready
    /// at the same time, the one declared first comes first.
    pub fn plan(&self, requested: &[String]) -> NgmakeResult<Vec<usize>> {
        let mut reachable = HashSet::new();
        let mut stack = Vec::new();
        for name in requested {
            let start = self.index_of(name).ok_or_else(|| NgmakeError::UnknownTarget {
                target: name.clone(),
            })?;
            stack.push(start);
        }
        while let Some(n) = stack.pop() {
            if reachable.insert(n) {
                stack.extend(self.nodes[n].edges.iter().copied());
            }
        }

        let mut pending: HashMap<usize, usize> = HashMap::new();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut ready = BinaryHeap::new();
        for &n in &reachable {
            let edges = &self.nodes[n].edges;
            pending.insert(n, edges.len());
            for &dep in edges {
                dependents.entry(dep).or_default().push(n);
            }
            if edges.is_empty() {
                ready.push(Reverse(n));
            }
        }

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(Reverse(n)) = ready.pop() {
            order.push(n);
            for &dependent in dependents.get(&n).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }
        Ok(order)
    }

    // ------------------------------------------------------------------------
    // Construction helpers
    // ------------------------------------------------------------------------

    fn add_leaves(&mut self) {
        let mut missing = Vec::new();
        for node in &self.nodes {
            for dep in &node.deps {
                if !self.index.contains_key(dep) && !missing.contains(dep) {
                    missing.push(dep.clone());
                }
            }
        }
        for name in missing {
            self.index.insert(name.clone(), self.nodes.len());
            self.nodes.push(BuildNode::new(name, vec![], None));
        }
    }

    fn mark_phony(&mut self) {
        for name in &self.phony {
            match self.index.get(name) {
                Some(&i) => self.nodes[i].phony = true,
                None => debug!(target_name = %name, "phony target has no rule"),
            }
        }
    }

    fn link(&mut self) {
        for i in 0..self.nodes.len() {
            let mut edges = Vec::new();
            for dep in &self.nodes[i].deps {
                if let Some(&d) = self.index.get(dep) {
                    if !edges.contains(&d) {
                        edges.push(d);
                    }
                }
            }
            self.nodes[i].edges = edges;
        }
    }

    /// Depth-first walk with white/gray/black colouring and an explicit stack.
    fn check_acyclic(&self) -> NgmakeResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Gray,
            Black,
        }

        let mut colour = vec![Colour::White; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if colour[start] != Colour::White {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            colour[start] = Colour::Gray;

            while let Some((node, next)) = stack.last_mut() {
                let edges = &self.nodes[*node].edges;
                if *next < edges.len() {
                    let dep = edges[*next];
                    *next += 1;
                    match colour[dep] {
                        Colour::Gray => {
                            let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                            let cycle = stack[from..]
                                .iter()
                                .map(|&(n, _)| self.nodes[n].name.clone())
                                .collect();
                            return Err(NgmakeError::DependencyCycle { cycle });
                        }
                        Colour::White => {
                            colour[dep] = Colour::Gray;
                            stack.push((dep, 0));
                        }
                        Colour::Black => {}
                    }
                } else {
                    colour[*node] = Colour::Black;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// EXPANSION
// ============================================================================

fn expand_name(program: &Program, rule: &Rule, max_depth: usize) -> NgmakeResult<String> {
    let value = program
        .evaluator(max_depth)
        .eval_phrase(&rule.name, &Bindings::new())?;
    match value {
        Value::Atom(name) if !name.is_empty() => Ok(name),
        Value::Seq(mut items) if items.len() == 1 => match items.pop() {
            Some(Value::Atom(name)) if !name.is_empty() => Ok(name),
            _ => Err(not_a_target(&rule.describe())),
        },
        _ => Err(not_a_target(&rule.describe())),
    }
}

fn expand_deps(program: &Program, rule: &Rule, max_depth: usize) -> NgmakeResult<Vec<String>> {
    let Some(deps) = &rule.deps else {
        return Ok(vec![]);
    };
    let value = program
        .evaluator(max_depth)
        .eval_phrase(deps, &Bindings::new())?;
    Ok(value
        .flatten_atoms()
        .into_iter()
        .filter(|dep| !dep.is_empty())
        .collect())
}

fn not_a_target(expr: &str) -> NgmakeError {
    NgmakeError::invalid_value(format!(
        "target name {expr} must expand to a single non-empty atom"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::runtime::DEFAULT_MAX_DEPTH;

    fn graph(text: &str) -> NgmakeResult<BuildGraph> {
        let program = Loader::new().load_str("Ngmakefile", text)?;
        BuildGraph::build(&program, DEFAULT_MAX_DEPTH)
    }

    fn names(graph: &BuildGraph, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| graph.nodes()[i].name.clone()).collect()
    }

    #[test]
    fn chain_is_planned_dependencies_first() {
        let graph = graph(
            "do ('A', ['B']) . do ('B', ['C']) . do ('C') .",
        )
        .unwrap();
        let order = graph.plan(&["A".to_string()]).unwrap();
        assert_eq!(names(&graph, &order), ["C", "B", "A"]);
    }

    #[test]
    fn ties_follow_declaration_order() {
        let graph = graph(
            "do ('all', ['z', 'y']) . do ('y') . do ('z') .",
        )
        .unwrap();
        let order = graph.plan(&["all".to_string()]).unwrap();
        assert_eq!(names(&graph, &order), ["y", "z", "all"]);
    }

    #[test]
    fn missing_dependencies_become_leaves() {
        let graph = graph("do ('app', ['main.c', 'util.c']) .").unwrap();
        let leaf = graph.node("main.c").unwrap();
        assert!(leaf.is_leaf());
        assert_eq!(graph.nodes().len(), 3);
    }

    #[test]
    fn cycle_is_reported_from_the_reentered_node() {
        let err = graph("do ('A', ['B']) . do ('B', ['C']) . do ('C', ['A']) .").unwrap_err();
        match err {
            NgmakeError::DependencyCycle { cycle } => assert_eq!(cycle, ["A", "B", "C"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_target_is_fatal() {
        let err = graph("let n = 'x' . do ('x') . do (n) .").unwrap_err();
        assert!(matches!(err, NgmakeError::DuplicateTarget { target } if target == "x"));
    }

    #[test]
    fn unresolvable_name_is_set_aside() {
        let graph = graph("do (nowhere) . do ('ok') .").unwrap();
        assert_eq!(graph.unresolved().len(), 1);
        assert!(matches!(
            graph.unresolved()[0].error,
            NgmakeError::UnboundIdentifier { .. }
        ));
        assert!(graph.node("ok").is_some());
    }

    #[test]
    fn broken_deps_keep_the_node() {
        let graph = graph("do ('bad', [ nowhere ]) .").unwrap();
        assert!(graph.node("bad").unwrap().broken.is_some());
    }

    #[test]
    fn phony_lists_mark_nodes() {
        let graph = graph(
            "do ('.PHONY', ['all']) . do ('.PHONY', ['clean']) . do ('all') . do ('clean') . do ('out') .",
        )
        .unwrap();
        assert!(graph.node("all").unwrap().phony);
        assert!(graph.node("clean").unwrap().phony);
        assert!(!graph.node("out").unwrap().phony);
        assert_eq!(graph.phony_targets(), ["all", "clean"]);
        assert!(graph.node(PHONY_TARGET).is_none());
    }

    #[test]
    fn unknown_request_is_an_error() {
        let graph = graph("do ('a') .").unwrap();
        assert!(matches!(
            graph.plan(&["b".to_string()]),
            Err(NgmakeError::UnknownTarget { .. })
        ));
    }
}
