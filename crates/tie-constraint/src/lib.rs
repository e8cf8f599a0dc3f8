//! Node-to-element tie constraint engine.
//!
//! Enforces an equality constraint coupling a DOF at a mesh node (the
//! "slave" side of an interface) to the DOFs of a neighboring element on
//! the opposite side (the "master" side), inside an iterative nonlinear
//! finite-element solve. Contributions carry the same sign, ordering,
//! and numerical conventions as ordinary physics contributions.
//!
//! The engine computes, per (node, element) pair:
//! 1. the constrained slave value, written directly into the solution
//!    vector;
//! 2. slave- and master-side residual contributions;
//! 3. the four Jacobian blocks (slave-slave, slave-master, master-slave,
//!    master-master) for the constrained variable;
//! 4. the same four blocks for any other coupled variable.
//!
//! It consumes collaborators it does not own: the mesh with its
//! node-to-element adjacency, the DOF map, master-element quadrature
//! data, and the global solution/residual/tangent storage.

pub mod apply;
pub mod assembly;
pub mod engine;
pub mod error;
pub mod kernels;
pub mod quadrature;

pub use apply::{apply_jacobian, apply_residual};
pub use assembly::{scatter_residual, ConstraintAssembly, TangentAccumulator};
pub use engine::{
    ConstraintKernel, ConstraintSide, CouplingPair, JacobianBlock, QpContext, SolutionState,
    TieConstraint, TieParams,
};
pub use error::{ConstraintError, Result};
pub use kernels::{EqualValueTie, Formulation};
pub use quadrature::{GradTable, MasterQuadrature, ShapeTable};
