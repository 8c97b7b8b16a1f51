//! Graph Registry
//!
//! The registry holds the full set of named nodes for the life of the
//! session. It is built once at startup via [`GraphBuilder`] and validated
//! eagerly: duplicate names, unknown dependencies, and dependency cycles all
//! fail registration with a [`ConfigurationError`] instead of stalling at
//! first evaluation.
//!
//! Alongside the definitions the registry precomputes everything the
//! propagator needs per pass:
//!
//! - the reverse adjacency (dependents of each node), and
//! - a global topological order of the derived nodes (Kahn's algorithm),
//!   so [`Registry::affected`] can return a change set's transitive dependent
//!   closure already sorted by dependency depth.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;

use super::node::{BoxComputeFuture, ComputeFn, DepList, DepSnapshot, NodeContext, NodeDef, NodeKind, NodeName};
use crate::error::ConfigurationError;

/// Collects node definitions and validates them into a [`Registry`].
#[derive(Default)]
pub struct GraphBuilder {
    entries: Vec<(NodeName, NodeDef)>,
}

impl GraphBuilder {
    /// Start an empty graph definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input node, set only by external events and side writes.
    pub fn input(mut self, name: impl Into<NodeName>) -> Self {
        self.entries.push((name.into(), NodeDef::Input));
        self
    }

    /// Declare a derived node with an explicit dependency list.
    ///
    /// The dependency list is fixed here, once, for the life of the graph;
    /// there is no runtime inference from the compute function.
    pub fn derived<N, D, F>(mut self, name: N, deps: D, compute: F) -> Self
    where
        N: Into<NodeName>,
        D: IntoIterator,
        D::Item: Into<NodeName>,
        F: Fn(DepSnapshot, NodeContext) -> BoxComputeFuture + Send + Sync + 'static,
    {
        let deps: DepList = deps.into_iter().map(Into::into).collect();
        self.entries.push((
            name.into(),
            NodeDef::Derived {
                deps,
                compute: Arc::new(compute),
            },
        ));
        self
    }

    /// Validate the collected definitions and build the registry.
    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let mut nodes: IndexMap<NodeName, NodeDef> = IndexMap::with_capacity(self.entries.len());
        for (name, def) in self.entries {
            if nodes.insert(name.clone(), def).is_some() {
                return Err(ConfigurationError::DuplicateNode(name));
            }
        }

        // Every declared dependency must be defined somewhere in the graph.
        for (name, def) in &nodes {
            if let NodeDef::Derived { deps, .. } = def {
                for dep in deps {
                    if !nodes.contains_key(dep.as_str()) {
                        return Err(ConfigurationError::UnknownDependency {
                            node: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        // Reverse adjacency: dependents of every node.
        let mut dependents: IndexMap<NodeName, Vec<NodeName>> = nodes
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for (name, def) in &nodes {
            if let NodeDef::Derived { deps, .. } = def {
                for dep in deps {
                    if let Some(list) = dependents.get_mut(dep.as_str()) {
                        list.push(name.clone());
                    }
                }
            }
        }

        // Kahn's algorithm over the derived subgraph. Input nodes carry no
        // compute and never appear in a pass closure, so only derived-to-
        // derived edges count toward in-degree.
        let mut in_degree: IndexMap<NodeName, usize> = IndexMap::new();
        for (name, def) in &nodes {
            if let NodeDef::Derived { deps, .. } = def {
                let degree = deps
                    .iter()
                    .filter(|dep| {
                        matches!(
                            nodes.get(dep.as_str()),
                            Some(NodeDef::Derived { .. })
                        )
                    })
                    .count();
                in_degree.insert(name.clone(), degree);
            }
        }

        let mut queue: VecDeque<NodeName> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.clone())
            .collect();
        let mut topo_index: IndexMap<NodeName, usize> = IndexMap::new();

        while let Some(name) = queue.pop_front() {
            topo_index.insert(name.clone(), topo_index.len());
            if let Some(deps_of) = dependents.get(name.as_str()) {
                for dependent in deps_of {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if topo_index.len() < in_degree.len() {
            let mut cyclic: Vec<NodeName> = in_degree
                .keys()
                .filter(|name| !topo_index.contains_key(name.as_str()))
                .cloned()
                .collect();
            cyclic.sort();
            return Err(ConfigurationError::DependencyCycle(cyclic));
        }

        Ok(Registry {
            nodes,
            dependents,
            topo_index,
        })
    }
}

/// The validated, immutable dataflow graph.
pub struct Registry {
    nodes: IndexMap<NodeName, NodeDef>,
    dependents: IndexMap<NodeName, Vec<NodeName>>,
    /// Position of each derived node in the global topological order.
    topo_index: IndexMap<NodeName, usize>,
}

impl Registry {
    /// Kind of the named node, `None` if undefined.
    pub fn kind(&self, name: &str) -> Option<NodeKind> {
        self.nodes.get(name).map(NodeDef::kind)
    }

    /// Whether the graph defines the name.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Declared dependencies of a node (empty for inputs).
    pub fn dependencies(&self, name: &str) -> &[NodeName] {
        match self.nodes.get(name) {
            Some(NodeDef::Derived { deps, .. }) => deps,
            _ => &[],
        }
    }

    /// Direct dependents of a node.
    pub(crate) fn dependents(&self, name: &str) -> &[NodeName] {
        self.dependents
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn compute(&self, name: &str) -> Option<&ComputeFn> {
        match self.nodes.get(name) {
            Some(NodeDef::Derived { compute, .. }) => Some(compute),
            _ => None,
        }
    }

    /// All node names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &NodeName> {
        self.nodes.keys()
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Transitive dependent closure of a change set, topologically ordered.
    ///
    /// The seed set may mix input and derived names; derived seeds are part
    /// of the closure themselves (used when a superseded pass's unresolved
    /// nodes carry over into the replacement pass). The closure is computed
    /// once per pass from the static graph, so a node whose recomputation
    /// changes its value cascades implicitly: its dependents are already in
    /// the closure at a greater depth.
    pub fn affected(&self, seeds: &[NodeName]) -> Vec<NodeName> {
        let mut visited: HashSet<NodeName> = HashSet::new();
        let mut closure: Vec<NodeName> = Vec::new();
        let mut queue: VecDeque<NodeName> = VecDeque::new();

        for seed in seeds {
            if visited.insert(seed.clone()) {
                if self.kind(seed.as_str()) == Some(NodeKind::Derived) {
                    closure.push(seed.clone());
                }
                queue.push_back(seed.clone());
            }
        }

        while let Some(name) = queue.pop_front() {
            for dependent in self.dependents(name.as_str()) {
                if visited.insert(dependent.clone()) {
                    closure.push(dependent.clone());
                    queue.push_back(dependent.clone());
                }
            }
        }

        closure.sort_by_key(|name| self.topo_index.get(name.as_str()).copied());
        closure
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("dependents", &self.dependents)
            .field("topo_index", &self.topo_index)
            .finish()
    }
}

impl Registry {
    /// Global topological order of the derived nodes; used in tests to
    /// compare graphs built in different registration orders.
    #[cfg(test)]
    pub(crate) fn topo_order(&self) -> Vec<NodeName> {
        let mut order: Vec<(usize, NodeName)> = self
            .topo_index
            .iter()
            .map(|(name, index)| (*index, name.clone()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, name)| name).collect()
    }
}
