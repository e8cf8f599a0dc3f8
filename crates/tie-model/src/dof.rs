//! Field variables and the DOF map.
//!
//! DOF numbering is variable-major: each variable owns a contiguous index
//! range over its support, assigned in sorted entity-ID order. A variable
//! may be restricted to a set of subdomains, in which case elements
//! outside those subdomains carry no DOFs for it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::mesh::{Element, Mesh, SubdomainId};

/// Field variable number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub u32);

/// Where a variable's DOFs live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableFamily {
    /// One DOF per mesh node in the variable's support (e.g. linear Lagrange)
    Nodal,
    /// One DOF per element in the variable's support (e.g. constant monomial)
    Elemental,
}

/// A field variable declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// DOF placement
    pub family: VariableFamily,
    /// Subdomain restriction; `None` means active everywhere
    pub subdomains: Option<Vec<SubdomainId>>,
}

impl Variable {
    /// Declare a nodal variable active on the whole mesh
    pub fn nodal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            family: VariableFamily::Nodal,
            subdomains: None,
        }
    }

    /// Declare an elemental variable active on the whole mesh
    pub fn elemental(name: &str) -> Self {
        Self {
            name: name.to_string(),
            family: VariableFamily::Elemental,
            subdomains: None,
        }
    }

    /// Restrict the variable to the given subdomains
    pub fn on_subdomains(mut self, subdomains: Vec<SubdomainId>) -> Self {
        self.subdomains = Some(subdomains);
        self
    }

    /// Whether the variable is active on a subdomain
    pub fn is_active_on(&self, subdomain: SubdomainId) -> bool {
        match &self.subdomains {
            Some(subs) => subs.contains(&subdomain),
            None => true,
        }
    }
}

/// Map from (variable, mesh entity) to global DOF indices
#[derive(Debug, Clone)]
pub struct DofMap {
    variables: Vec<Variable>,
    node_dofs: HashMap<(u32, i32), usize>,
    elem_dofs: HashMap<(u32, i32), usize>,
    n_dofs: usize,
}

impl DofMap {
    /// Build the DOF map for a set of variables over a mesh.
    ///
    /// Nodal variables get one DOF per node touched by at least one
    /// element of an active subdomain; elemental variables get one DOF
    /// per active element.
    pub fn build(mesh: &Mesh, variables: Vec<Variable>) -> Result<Self> {
        mesh.validate()?;

        let mut node_dofs = HashMap::new();
        let mut elem_dofs = HashMap::new();
        let mut next_dof = 0usize;

        for (var_num, var) in variables.iter().enumerate() {
            let var_num = var_num as u32;
            match var.family {
                VariableFamily::Nodal => {
                    let mut support = BTreeSet::new();
                    for element in mesh.elements.values() {
                        if var.is_active_on(element.subdomain) {
                            support.extend(element.nodes.iter().copied());
                        }
                    }
                    for node_id in support {
                        node_dofs.insert((var_num, node_id), next_dof);
                        next_dof += 1;
                    }
                }
                VariableFamily::Elemental => {
                    let mut support = BTreeSet::new();
                    for element in mesh.elements.values() {
                        if var.is_active_on(element.subdomain) {
                            support.insert(element.id);
                        }
                    }
                    for elem_id in support {
                        elem_dofs.insert((var_num, elem_id), next_dof);
                        next_dof += 1;
                    }
                }
            }
        }

        Ok(Self {
            variables,
            node_dofs,
            elem_dofs,
            n_dofs: next_dof,
        })
    }

    /// Total number of DOFs across all variables
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    /// Number of declared variables
    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// Look up a variable declaration
    pub fn variable(&self, var: VariableId) -> Result<&Variable> {
        self.variables
            .get(var.0 as usize)
            .ok_or(ModelError::UnknownVariable(var.0))
    }

    /// The element's DOF indices for a variable, in connectivity order.
    ///
    /// Empty when the variable is not active on the element's subdomain;
    /// that emptiness is what degenerate-coupling guards key on.
    pub fn dof_indices(&self, element: &Element, var: VariableId) -> Result<Vec<usize>> {
        let variable = self.variable(var)?;
        if !variable.is_active_on(element.subdomain) {
            return Ok(Vec::new());
        }
        match variable.family {
            VariableFamily::Nodal => element
                .nodes
                .iter()
                .map(|&node_id| {
                    self.node_dofs
                        .get(&(var.0, node_id))
                        .copied()
                        .ok_or(ModelError::MissingNodalDof {
                            var: var.0,
                            node: node_id,
                        })
                })
                .collect(),
            VariableFamily::Elemental => Ok(self
                .elem_dofs
                .get(&(var.0, element.id))
                .copied()
                .into_iter()
                .collect()),
        }
    }

    /// The DOF a nodal variable owns at a node
    pub fn nodal_dof_index(&self, node: i32, var: VariableId) -> Result<usize> {
        self.variable(var)?;
        self.node_dofs
            .get(&(var.0, node))
            .copied()
            .ok_or(ModelError::MissingNodalDof { var: var.0, node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Node;

    fn two_block_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        for (id, x) in [(1, 0.0), (2, 1.0), (3, 2.0), (4, 3.0)] {
            mesh.add_node(Node::new(id, x, 0.0, 0.0));
        }
        // Subdomain 0: elements 1-2, subdomain 1: element 3
        mesh.add_element(Element::new(1, 0, vec![1, 2])).unwrap();
        mesh.add_element(Element::new(2, 0, vec![2, 3])).unwrap();
        mesh.add_element(Element::new(3, 1, vec![3, 4])).unwrap();
        mesh.build_node_to_elem();
        mesh
    }

    #[test]
    fn nodal_variable_numbering() {
        let mesh = two_block_mesh();
        let dof_map = DofMap::build(&mesh, vec![Variable::nodal("u")]).unwrap();

        assert_eq!(dof_map.n_dofs(), 4);
        // Sorted node-ID order
        assert_eq!(dof_map.nodal_dof_index(1, VariableId(0)), Ok(0));
        assert_eq!(dof_map.nodal_dof_index(4, VariableId(0)), Ok(3));
    }

    #[test]
    fn dof_indices_follow_connectivity_order() {
        let mesh = two_block_mesh();
        let dof_map = DofMap::build(&mesh, vec![Variable::nodal("u")]).unwrap();

        let elem = mesh.element(2).unwrap();
        assert_eq!(dof_indices(&dof_map, elem), vec![1, 2]);
    }

    fn dof_indices(dof_map: &DofMap, elem: &Element) -> Vec<usize> {
        dof_map.dof_indices(elem, VariableId(0)).unwrap()
    }

    #[test]
    fn subdomain_restriction_empties_dof_list() {
        let mesh = two_block_mesh();
        let vars = vec![
            Variable::nodal("u"),
            Variable::nodal("p").on_subdomains(vec![0]),
        ];
        let dof_map = DofMap::build(&mesh, vars).unwrap();

        // "p" lives on nodes 1-3 only
        assert_eq!(dof_map.n_dofs(), 4 + 3);

        let off_block = mesh.element(3).unwrap();
        assert_eq!(
            dof_map.dof_indices(off_block, VariableId(1)).unwrap(),
            Vec::<usize>::new()
        );
        let on_block = mesh.element(1).unwrap();
        assert_eq!(dof_map.dof_indices(on_block, VariableId(1)).unwrap().len(), 2);
    }

    #[test]
    fn elemental_variable_one_dof_per_element() {
        let mesh = two_block_mesh();
        let vars = vec![Variable::elemental("k")];
        let dof_map = DofMap::build(&mesh, vars).unwrap();

        assert_eq!(dof_map.n_dofs(), 3);
        let elem = mesh.element(1).unwrap();
        assert_eq!(dof_map.dof_indices(elem, VariableId(0)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let mesh = two_block_mesh();
        let dof_map = DofMap::build(&mesh, vec![Variable::nodal("u")]).unwrap();
        assert_eq!(
            dof_map.variable(VariableId(5)).unwrap_err(),
            ModelError::UnknownVariable(5)
        );
    }
}
