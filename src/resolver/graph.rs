//! An arena-based dependency graph: the alternative shape considered for the
//! resolver's working state, kept as an independently-tested data structure
//! rather than wired into [`super::resolve`]. Nodes are small integer
//! `NodeId`s; edges are an adjacency map keyed by `NodeId`, with a
//! `Dependency -> NodeId` lookup table for external callers.

use std::collections::BTreeMap;

pub type NodeId = usize;

use crate::dependency::Dependency;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub remaining: Vec<Dependency>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dependency cycle among {:?}", self.remaining)
    }
}

impl std::error::Error for CycleError {}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Dependency>,
    index: BTreeMap<Dependency, NodeId>,
    edges: BTreeMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `dep` if absent, returning its `NodeId` either way.
    pub fn add_node(&mut self, dep: Dependency) -> NodeId {
        if let Some(&id) = self.index.get(&dep) {
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(dep.clone(), id);
        self.nodes.push(dep);
        self.edges.insert(id, Vec::new());
        id
    }

    /// Record that `from` depends on `to`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        let out = self.edges.entry(from).or_default();
        if !out.contains(&to) {
            out.push(to);
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Dependency {
        &self.nodes[id]
    }

    #[must_use]
    pub fn id_of(&self, dep: &Dependency) -> Option<NodeId> {
        self.index.get(dep).copied()
    }

    #[must_use]
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.edges.get(&id).map_or(0, Vec::len)
    }

    /// A topological order (dependencies before dependents' requirement to
    /// build leaves first is the caller's to interpret; this returns
    /// requirement order, roots first). Ties among simultaneously-available
    /// nodes break by descending out-degree, then by dependency name, for a
    /// deterministic order independent of insertion sequence. Errors with
    /// the nodes still unordered when a cycle prevents full ordering.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut in_degree: BTreeMap<NodeId, usize> = self.nodes.iter().enumerate().map(|(id, _)| (id, 0)).collect();
        for targets in self.edges.values() {
            for &to in targets {
                *in_degree.entry(to).or_insert(0) += 1;
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut remaining: std::collections::BTreeSet<NodeId> = (0..self.nodes.len()).collect();

        loop {
            let ready: Vec<NodeId> =
                remaining.iter().copied().filter(|id| in_degree[id] == 0).collect();
            if ready.is_empty() {
                break;
            }
            let mut ready = ready;
            ready.sort_by(|a, b| {
                self.out_degree(*b).cmp(&self.out_degree(*a)).then_with(|| self.node(*a).name().cmp(&self.node(*b).name()))
            });
            for id in ready {
                remaining.remove(&id);
                order.push(id);
                if let Some(targets) = self.edges.get(&id) {
                    for &to in targets {
                        if let Some(deg) = in_degree.get_mut(&to) {
                            *deg = deg.saturating_sub(1);
                        }
                    }
                }
            }
        }

        if remaining.is_empty() {
            Ok(order)
        } else {
            Err(CycleError { remaining: remaining.into_iter().map(|id| self.node(id).clone()).collect() })
        }
    }
}
