//! Model-side collaborators for node-to-element tie constraints.
//!
//! This crate owns the read-only data the constraint engine consumes:
//! the mesh (nodes, elements, subdomains, node-to-element adjacency),
//! the field variables, and the DOF map. The engine in `tie-constraint`
//! borrows these per call and never mutates them.

pub mod dof;
pub mod error;
pub mod mesh;

pub use dof::{DofMap, Variable, VariableFamily, VariableId};
pub use error::{ModelError, Result};
pub use mesh::{Element, Mesh, Node, ParallelKind, SubdomainId};
