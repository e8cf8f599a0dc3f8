//! Error types for tie-constraint

use thiserror::Error;
use tie_model::ModelError;

pub type Result<T> = std::result::Result<T, ConstraintError>;

/// Failures of the constraint contribution engine.
///
/// A degenerate cross-variable block (zero rows or columns) is not an
/// error; the assembly paths guard those dimensions and contribute
/// nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// The constrained node has no entry in the node-to-element map.
    /// Fatal: the mesh/DOF-map state is inconsistent, and skipping the
    /// constraint would silently produce a wrong solution.
    #[error("node {node} has no entry in the node-to-element map")]
    TopologyViolation { node: i32 },

    /// Node-local constraint evaluation needs every element touching the
    /// constrained node on the evaluating rank.
    #[error("node-to-element constraints require a replicated mesh")]
    DistributedMesh,

    #[error(transparent)]
    Model(#[from] ModelError),
}
