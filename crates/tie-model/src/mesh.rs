//! Mesh data structures for constraint coupling.
//!
//! Stores nodes, elements with subdomain membership, and the
//! node-to-element adjacency map that connected-DOF discovery relies on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Subdomain (block) identifier
pub type SubdomainId = u32;

/// A node in the finite element mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Node ID (1-based indexing from input file)
    pub id: i32,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Node {
    /// Create a new node
    pub fn new(id: i32, x: f64, y: f64, z: f64) -> Self {
        Self { id, x, y, z }
    }

    /// Get coordinates as an array
    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// An element in the finite element mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element ID (1-based indexing from input file)
    pub id: i32,
    /// Subdomain (block) this element belongs to
    pub subdomain: SubdomainId,
    /// Node connectivity (node IDs)
    pub nodes: Vec<i32>,
}

impl Element {
    /// Create a new element
    pub fn new(id: i32, subdomain: SubdomainId, nodes: Vec<i32>) -> Self {
        Self {
            id,
            subdomain,
            nodes,
        }
    }
}

/// How the mesh is laid out across parallel partitions.
///
/// Node-local constraint evaluation requires every element touching a
/// constrained node to be visible on the evaluating rank, which a
/// distributed mesh does not guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelKind {
    Replicated,
    Distributed,
}

/// Finite element mesh with subdomain names and node-to-element adjacency
#[derive(Debug, Clone)]
pub struct Mesh {
    /// All nodes in the mesh, indexed by node ID
    pub nodes: HashMap<i32, Node>,
    /// All elements in the mesh, indexed by element ID
    pub elements: HashMap<i32, Element>,
    /// Subdomain name registry
    subdomain_names: HashMap<String, SubdomainId>,
    /// Node ID -> IDs of elements containing that node
    node_to_elem: HashMap<i32, Vec<i32>>,
    /// Parallel layout of the mesh
    parallel: ParallelKind,
}

impl Mesh {
    /// Create a new empty (replicated) mesh
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            elements: HashMap::new(),
            subdomain_names: HashMap::new(),
            node_to_elem: HashMap::new(),
            parallel: ParallelKind::Replicated,
        }
    }

    /// Mark the mesh as distributed across parallel partitions
    pub fn set_parallel_kind(&mut self, kind: ParallelKind) {
        self.parallel = kind;
    }

    /// Whether the mesh is distributed across parallel partitions
    pub fn is_distributed(&self) -> bool {
        self.parallel == ParallelKind::Distributed
    }

    /// Add a node to the mesh
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    /// Add an element to the mesh
    pub fn add_element(&mut self, element: Element) -> Result<()> {
        if element.nodes.is_empty() {
            return Err(ModelError::EmptyElement { elem: element.id });
        }
        self.elements.insert(element.id, element);
        Ok(())
    }

    /// Register a name for a subdomain ID
    pub fn name_subdomain(&mut self, name: &str, id: SubdomainId) {
        self.subdomain_names.insert(name.to_string(), id);
    }

    /// Resolve a subdomain name to its ID
    pub fn subdomain_id(&self, name: &str) -> Result<SubdomainId> {
        self.subdomain_names
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownSubdomain(name.to_string()))
    }

    /// Get a node by ID
    pub fn node(&self, id: i32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get an element by ID
    pub fn element(&self, id: i32) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Build the node-to-element adjacency map.
    ///
    /// Must be called after all elements are added and before any
    /// adjacency lookup. Element lists are ID-sorted so lookups are
    /// deterministic across runs.
    pub fn build_node_to_elem(&mut self) {
        self.node_to_elem.clear();
        for element in self.elements.values() {
            for &node_id in &element.nodes {
                self.node_to_elem.entry(node_id).or_default().push(element.id);
            }
        }
        for elems in self.node_to_elem.values_mut() {
            elems.sort_unstable();
            elems.dedup();
        }
    }

    /// Look up the elements adjacent to a node.
    ///
    /// Returns `None` when the node has no entry in the adjacency map;
    /// the constraint engine treats that as a fatal topology violation.
    pub fn node_to_elems(&self, node: i32) -> Option<&[i32]> {
        self.node_to_elem.get(&node).map(Vec::as_slice)
    }

    /// Validate mesh connectivity
    pub fn validate(&self) -> Result<()> {
        for (elem_id, element) in &self.elements {
            for &node_id in &element.nodes {
                if !self.nodes.contains_key(&node_id) {
                    return Err(ModelError::DanglingNode {
                        elem: *elem_id,
                        node: node_id,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}
