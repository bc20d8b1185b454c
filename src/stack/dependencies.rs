//! Resource Dependency Tracking
//!
//! Tracks the ordering constraints between resources in a stack. An edge
//! `A -> B` means A must exist before B is created. Edges come from two
//! places:
//!
//! - explicit `DependsOn` entries
//! - `Ref` / `Fn::GetAtt` / `Fn::Sub` references inside properties
//!
//! The graph is used for cycle detection before synthesis, for printing a
//! deploy order and for DOT visualization.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A node in the dependency graph representing one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical id
    pub logical_id: String,
    /// CloudFormation type
    pub resource_type: String,
    /// Declaration sequence number
    pub sequence: u64,
}

impl ResourceNode {
    /// Create a new resource node
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            sequence: 0,
        }
    }
}

/// Why one resource must come before another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// `DependsOn`
    Explicit,
    /// `Ref`, `Fn::GetAtt` or `Fn::Sub`
    Reference,
}

/// A dependency between two resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Resource that must exist first
    pub from_id: String,
    /// Resource that waits for it
    pub to_id: String,
    /// Type of dependency
    pub dependency_type: DependencyType,
    /// Attribute read through the reference, if any
    pub attribute: Option<String>,
}

impl ResourceDependency {
    /// Create a new dependency
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        dependency_type: DependencyType,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            dependency_type,
            attribute: None,
        }
    }

    /// Record the attribute read through a reference
    pub fn with_attribute(mut self, attribute: Option<String>) -> Self {
        self.attribute = attribute;
        self
    }
}

/// The dependency graph for resource relationships
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<ResourceNode, ResourceDependency>,
    node_indices: HashMap<String, NodeIndex>,
    sequence_counter: u64,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            sequence_counter: 0,
        }
    }

    /// Add a node to the graph, replacing any node with the same id
    pub fn add_node(&mut self, mut node: ResourceNode) -> NodeIndex {
        node.sequence = self.sequence_counter;
        self.sequence_counter += 1;

        if let Some(&idx) = self.node_indices.get(&node.logical_id) {
            if let Some(existing) = self.graph.node_weight_mut(idx) {
                *existing = node;
            }
            return idx;
        }

        let id = node.logical_id.clone();
        let idx = self.graph.add_node(node);
        self.node_indices.insert(id, idx);
        idx
    }

    /// Add a dependency edge. A second edge between the same pair is ignored.
    pub fn add_dependency(&mut self, dependency: ResourceDependency) -> Result<()> {
        let from_idx = *self.node_indices.get(&dependency.from_id).ok_or_else(|| {
            Error::dangling_reference(dependency.to_id.clone(), dependency.from_id.clone())
        })?;
        let to_idx = *self
            .node_indices
            .get(&dependency.to_id)
            .ok_or_else(|| Error::ResourceNotFound(dependency.to_id.clone()))?;

        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, dependency);
        }
        Ok(())
    }

    /// Check for dependency cycles, including self references
    pub fn has_cycles(&self) -> bool {
        !self.get_cycles().is_empty()
    }

    /// Get all cycles in the graph
    pub fn get_cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.logical_id.clone()))
                    .collect();
                ids.sort();
                ids
            })
            .collect()
    }

    /// Get a creation order that respects every dependency
    pub fn deploy_order(&self) -> Result<Vec<String>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.logical_id.clone()))
                .collect()),
            Err(_) => Err(Error::DependencyCycle(self.describe_cycles())),
        }
    }

    /// Human-readable listing of every cycle
    pub fn describe_cycles(&self) -> String {
        self.get_cycles()
            .iter()
            .map(|c| c.join(" <-> "))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// All resources that must exist before `logical_id` (transitive)
    pub fn get_dependencies(&self, logical_id: &str) -> Vec<String> {
        self.walk(logical_id, Direction::Incoming)
    }

    /// All resources that wait on `logical_id` (transitive)
    pub fn get_dependents(&self, logical_id: &str) -> Vec<String> {
        self.walk(logical_id, Direction::Outgoing)
    }

    fn walk(&self, logical_id: &str, direction: Direction) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue = VecDeque::new();

        if let Some(&start) = self.node_indices.get(logical_id) {
            queue.push_back(start);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, direction) {
                    if seen.insert(neighbor) {
                        if let Some(node) = self.graph.node_weight(neighbor) {
                            out.push(node.logical_id.clone());
                        }
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        out
    }

    /// Direct dependencies of a resource
    pub fn get_direct_dependencies(&self, logical_id: &str) -> Vec<ResourceDependency> {
        self.node_indices
            .get(logical_id)
            .map(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Incoming)
                    .map(|e| e.weight().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if `dependent` has a direct edge from `dependency`
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        match (
            self.node_indices.get(dependency),
            self.node_indices.get(dependent),
        ) {
            (Some(&from), Some(&to)) => self.graph.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Get a node by logical id
    pub fn get_node(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.node_indices
            .get(logical_id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Generate a DOT format representation for visualization
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph resources {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        let mut nodes: Vec<&ResourceNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.sequence);
        for node in nodes {
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"];\n",
                node.logical_id, node.logical_id, node.resource_type
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = self
                .graph
                .node_weight(edge.source())
                .map(|n| n.logical_id.as_str())
                .unwrap_or("?");
            let target = self
                .graph
                .node_weight(edge.target())
                .map(|n| n.logical_id.as_str())
                .unwrap_or("?");

            let style = match edge.weight().dependency_type {
                DependencyType::Explicit => "bold",
                DependencyType::Reference => "solid",
            };

            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                source, target, style
            ));
        }

        output.push_str("}\n");
        output
    }

    /// Logical ids grouped by resource type, in declaration order
    pub fn resources_by_type(&self) -> HashMap<String, Vec<String>> {
        let mut nodes: Vec<&ResourceNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.sequence);

        let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes {
            by_type
                .entry(node.resource_type.clone())
                .or_default()
                .push(node.logical_id.clone());
        }
        by_type
    }
}
