//! Error types for tie-model

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("element {elem} references non-existent node {node}")]
    DanglingNode { elem: i32, node: i32 },

    #[error("element {elem} has no nodes")]
    EmptyElement { elem: i32 },

    #[error("unknown subdomain name: {0}")]
    UnknownSubdomain(String),

    #[error("unknown variable number: {0}")]
    UnknownVariable(u32),

    #[error("element {0} not found in mesh")]
    MissingElement(i32),

    #[error("node {0} not found in mesh")]
    MissingNode(i32),

    #[error("variable {var} has no DOF at node {node}")]
    MissingNodalDof { var: u32, node: i32 },
}
