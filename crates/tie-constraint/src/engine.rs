//! The constraint contribution engine.
//!
//! Couples one DOF at a constrained node on the slave side of an
//! interface to the DOFs of a neighboring master element. Contributions
//! go into four blocks: slave-slave and master-slave columns span the
//! connected-DOF set (every DOF of the column variable on any element
//! touching the node), slave-master and master-master columns span the
//! column variable's DOFs on the master element.
//!
//! The slave side is a degenerate single-point evaluation: one test
//! function with value 1, and, for Jacobian columns, an indicator shape
//! function that is 1 exactly at the node's own DOF.
//!
//! Call order per node and solve iteration: `compute_slave_value` first
//! (it writes the constrained value into the shared solution vector),
//! then residual and/or Jacobian evaluation.

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use tie_model::{DofMap, Element, Mesh, ModelError, SubdomainId, VariableId};

use crate::assembly::ConstraintAssembly;
use crate::error::{ConstraintError, Result};
use crate::quadrature::MasterQuadrature;

/// The slave side always has exactly one test function
const N_TEST_SLAVE: usize = 1;

/// Which side of the interface a residual evaluation belongs to.
///
/// The two sides select different physical equations (value matching vs
/// flux balance) evaluated from the same per-point state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSide {
    Slave,
    Master,
}

/// Which Jacobian block an evaluation contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianBlock {
    SlaveSlave,
    SlaveMaster,
    MasterSlave,
    MasterMaster,
}

/// One (constrained node, master element) pair; pairing is selected
/// externally, the engine holds no per-pair state between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingPair {
    pub node: i32,
    pub elem: i32,
}

/// Current and previous solution states read by the engine
#[derive(Debug, Clone, Copy)]
pub struct SolutionState<'a> {
    pub current: &'a DVector<f64>,
    pub old: &'a DVector<f64>,
}

impl<'a> SolutionState<'a> {
    /// State with no history: old values alias the current ones
    pub fn steady(current: &'a DVector<f64>) -> Self {
        Self {
            current,
            old: current,
        }
    }
}

/// Per-quadrature-point state handed to kernel hooks.
///
/// `qp` is fixed at 0: the coupling is evaluated at a single shared
/// point. Master-side tables keep their full per-point layout.
#[derive(Debug)]
pub struct QpContext<'a> {
    pub qp: usize,
    /// Location of the coupling point
    pub q_point: [f64; 3],
    /// Current slave nodal value
    pub u_slave: f64,
    /// Slave nodal value from the previous solution state
    pub u_slave_old: f64,
    /// Interpolated master-variable value per quadrature point
    pub u_master: &'a [f64],
    /// Previous-state interpolated master value per quadrature point
    pub u_master_old: &'a [f64],
    /// Interpolated master-variable gradient per quadrature point
    pub grad_u_master: &'a [[f64; 3]],
    /// Slave test function value (always 1)
    pub test_slave: f64,
    /// Master-side test functions, indexed `[i][qp]`
    pub test_master: &'a [Vec<f64>],
    /// Master-side shape functions, indexed `[j][qp]`
    pub phi_master: &'a [Vec<f64>],
    /// Indicator shape value per connected DOF (Jacobian calls only):
    /// 1 where the connected DOF is the node's own DOF, 0 elsewhere
    pub phi_slave: &'a [f64],
}

/// Physics hooks of a node-to-element constraint.
///
/// One hook per evaluation kind, parameterized by side or block, so the
/// four assembly loops share a single evaluation path.
pub trait ConstraintKernel {
    /// The value the slave DOF is driven to
    fn slave_value(&self, ctx: &QpContext) -> f64;

    /// Residual contribution for test function `i` on the given side
    fn residual(&self, side: ConstraintSide, i: usize, ctx: &QpContext) -> f64;

    /// Same-variable Jacobian contribution for (test `i`, trial `j`)
    fn jacobian(&self, block: JacobianBlock, i: usize, j: usize, ctx: &QpContext) -> f64;

    /// Cross-variable Jacobian contribution; defaults to no coupling
    fn off_diag_jacobian(
        &self,
        _block: JacobianBlock,
        _jvar: VariableId,
        _i: usize,
        _j: usize,
        _ctx: &QpContext,
    ) -> f64 {
        0.0
    }

    /// Whether the slave residual row replaces, rather than sums with,
    /// ordinary physics contributions. Structural property of the
    /// constraint, not a per-call choice.
    fn overwrite_slave_residual(&self) -> bool {
        false
    }
}

/// Constraint configuration resolved at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieParams {
    /// Slave block name
    pub slave: String,
    /// Master block name
    pub master: String,
    /// The constrained variable
    pub variable: VariableId,
    /// The variable on the master side of the interface
    pub master_variable: VariableId,
}

/// Precomputed per-pair field data
struct PairData {
    slave_dof: usize,
    master_var_dofs: Vec<usize>,
    u_slave: f64,
    u_slave_old: f64,
    u_master: Vec<f64>,
    u_master_old: Vec<f64>,
    grad_u_master: Vec<[f64; 3]>,
}

/// Node-to-element constraint engine.
///
/// Owns the per-call scratch: the connected-DOF set, the slave indicator
/// shape values, and the two dynamically sized Jacobian blocks, reused
/// across calls to avoid reallocation over many constrained nodes.
#[derive(Debug, Clone)]
pub struct TieConstraint<K> {
    kernel: K,
    var: VariableId,
    master_var: VariableId,
    slave: SubdomainId,
    master: SubdomainId,
    connected_dof_indices: Vec<usize>,
    phi_slave: Vec<f64>,
    kee: DMatrix<f64>,
    kne: DMatrix<f64>,
}

impl<K: ConstraintKernel> TieConstraint<K> {
    /// Construct the engine, resolving subdomain names.
    ///
    /// Fails if the mesh is distributed: node-local constraint evaluation
    /// needs every element touching a constrained node on the evaluating
    /// rank. This is a hard precondition, not a runtime condition.
    pub fn new(mesh: &Mesh, params: &TieParams, kernel: K) -> Result<Self> {
        if mesh.is_distributed() {
            return Err(ConstraintError::DistributedMesh);
        }
        let slave = mesh.subdomain_id(&params.slave)?;
        let master = mesh.subdomain_id(&params.master)?;
        Ok(Self {
            kernel,
            var: params.variable,
            master_var: params.master_variable,
            slave,
            master,
            connected_dof_indices: Vec::new(),
            phi_slave: Vec::new(),
            kee: DMatrix::zeros(0, 0),
            kne: DMatrix::zeros(0, 0),
        })
    }

    /// The constrained variable
    pub fn variable(&self) -> VariableId {
        self.var
    }

    /// The master-side variable
    pub fn master_variable(&self) -> VariableId {
        self.master_var
    }

    /// Slave block ID
    pub fn slave_subdomain(&self) -> SubdomainId {
        self.slave
    }

    /// Master block ID
    pub fn master_subdomain(&self) -> SubdomainId {
        self.master
    }

    /// Whether the slave residual row is an overwrite-style constraint
    /// row. Pure query, no side effects.
    pub fn overwrite_slave_residual(&self) -> bool {
        self.kernel.overwrite_slave_residual()
    }

    /// Connected-DOF set from the most recent Jacobian call
    pub fn connected_dof_indices(&self) -> &[usize] {
        &self.connected_dof_indices
    }

    /// Indicator shape values from the most recent Jacobian call
    pub fn slave_indicator(&self) -> &[f64] {
        &self.phi_slave
    }

    /// Slave-row × connected-DOF Jacobian block from the most recent call
    pub fn slave_slave_block(&self) -> &DMatrix<f64> {
        &self.kee
    }

    /// Master-row × connected-DOF Jacobian block from the most recent call
    pub fn master_slave_block(&self) -> &DMatrix<f64> {
        &self.kne
    }

    /// Discover the connected-DOF set: the union of the column variable's
    /// DOFs over every element touching the node, deduplicated and
    /// index-sorted.
    ///
    /// Recomputed on every Jacobian call, never cached across calls, so a
    /// set built for one variable can never leak into assembly for
    /// another. A node absent from the node-to-element map is a fatal
    /// topology violation, not an empty set.
    pub fn gather_connected_dofs(
        &mut self,
        mesh: &Mesh,
        dof_map: &DofMap,
        var: VariableId,
        node: i32,
    ) -> Result<&[usize]> {
        let elems = mesh
            .node_to_elems(node)
            .ok_or(ConstraintError::TopologyViolation { node })?;

        let mut unique = BTreeSet::new();
        for &elem_id in elems {
            let element = mesh
                .element(elem_id)
                .ok_or(ModelError::MissingElement(elem_id))?;
            for dof in dof_map.dof_indices(element, var)? {
                unique.insert(dof);
            }
        }

        self.connected_dof_indices.clear();
        self.connected_dof_indices.extend(unique);
        Ok(&self.connected_dof_indices)
    }

    /// Evaluate the constrained value and write it into the global
    /// solution vector at the slave DOF. Direct side effect on shared
    /// state; must run before residual/Jacobian evaluation for the node.
    pub fn compute_slave_value(
        &self,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
        quad: &MasterQuadrature,
        solution: &mut DVector<f64>,
    ) -> Result<f64> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        let data = self.reinit_pair(pair, mesh, element, dof_map, quad, SolutionState::steady(solution))?;

        let value = {
            let ctx = self.qp_context(&data, quad, false);
            self.kernel.slave_value(&ctx)
        };
        solution[data.slave_dof] = value;
        Ok(value)
    }

    /// Accumulate the residual contributions into the two caller-owned
    /// residual blocks.
    pub fn compute_residual(
        &self,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
        quad: &MasterQuadrature,
        state: SolutionState,
        assembly: &mut ConstraintAssembly,
    ) -> Result<()> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        let data = self.reinit_pair(pair, mesh, element, dof_map, quad, state)?;

        let n_test_master = data.master_var_dofs.len();
        assembly.prepare_residual(N_TEST_SLAVE, n_test_master);

        let ctx = self.qp_context(&data, quad, false);
        for i in 0..n_test_master {
            assembly.master_re[i] += self.kernel.residual(ConstraintSide::Master, i, &ctx);
        }
        for i in 0..N_TEST_SLAVE {
            assembly.slave_re[i] += self.kernel.residual(ConstraintSide::Slave, i, &ctx);
        }
        Ok(())
    }

    /// Assemble the four same-variable Jacobian blocks.
    ///
    /// The slave-master and master-master blocks are filled only when
    /// both their dimensions are nonzero, which covers the case where the
    /// master side carries no DOFs for the constrained variable.
    pub fn compute_jacobian(
        &mut self,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
        quad: &MasterQuadrature,
        state: SolutionState,
        assembly: &mut ConstraintAssembly,
    ) -> Result<()> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        let data = self.reinit_pair(pair, mesh, element, dof_map, quad, state)?;

        self.gather_connected_dofs(mesh, dof_map, self.var, pair.node)?;
        self.build_slave_indicator(data.slave_dof);

        let n_conn = self.connected_dof_indices.len();
        let n_test_master = data.master_var_dofs.len();
        let n_col = dof_map.dof_indices(element, self.var)?.len();
        assembly.prepare_jacobian(N_TEST_SLAVE, n_test_master, n_col);

        let mut kee = std::mem::replace(&mut self.kee, DMatrix::zeros(0, 0));
        let mut kne = std::mem::replace(&mut self.kne, DMatrix::zeros(0, 0));
        kee.resize_mut(N_TEST_SLAVE, n_conn, 0.0);
        kne.resize_mut(n_test_master, n_conn, 0.0);
        kee.fill(0.0);
        kne.fill(0.0);

        {
            let ctx = self.qp_context(&data, quad, true);

            for i in 0..N_TEST_SLAVE {
                for j in 0..n_conn {
                    kee[(i, j)] += self.kernel.jacobian(JacobianBlock::SlaveSlave, i, j, &ctx);
                }
            }

            if assembly.ken.nrows() > 0 && assembly.ken.ncols() > 0 {
                for i in 0..N_TEST_SLAVE {
                    for j in 0..assembly.ken.ncols() {
                        assembly.ken[(i, j)] +=
                            self.kernel.jacobian(JacobianBlock::SlaveMaster, i, j, &ctx);
                    }
                }
            }

            for i in 0..n_test_master {
                for j in 0..n_conn {
                    kne[(i, j)] += self.kernel.jacobian(JacobianBlock::MasterSlave, i, j, &ctx);
                }
            }

            if assembly.knn.nrows() > 0 && assembly.knn.ncols() > 0 {
                for i in 0..n_test_master {
                    for j in 0..assembly.knn.ncols() {
                        assembly.knn[(i, j)] +=
                            self.kernel.jacobian(JacobianBlock::MasterMaster, i, j, &ctx);
                    }
                }
            }
        }

        self.kee = kee;
        self.kne = kne;
        Ok(())
    }

    /// Assemble the four cross-variable Jacobian blocks for `jvar`.
    ///
    /// The connected-DOF set is recomputed for `jvar`, whose element
    /// layout may differ from the constrained variable's. The guard
    /// placement intentionally differs from the same-variable path: the
    /// slave-master block is filled unconditionally while the
    /// master-slave block carries the dimension guard.
    pub fn compute_off_diag_jacobian(
        &mut self,
        jvar: VariableId,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
        quad: &MasterQuadrature,
        state: SolutionState,
        assembly: &mut ConstraintAssembly,
    ) -> Result<()> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        let data = self.reinit_pair(pair, mesh, element, dof_map, quad, state)?;

        self.gather_connected_dofs(mesh, dof_map, jvar, pair.node)?;
        self.build_slave_indicator(data.slave_dof);

        let n_conn = self.connected_dof_indices.len();
        let n_test_master = data.master_var_dofs.len();
        let n_col = dof_map.dof_indices(element, jvar)?.len();
        assembly.prepare_jacobian(N_TEST_SLAVE, n_test_master, n_col);

        let mut kee = std::mem::replace(&mut self.kee, DMatrix::zeros(0, 0));
        let mut kne = std::mem::replace(&mut self.kne, DMatrix::zeros(0, 0));
        kee.resize_mut(N_TEST_SLAVE, n_conn, 0.0);
        kne.resize_mut(n_test_master, n_conn, 0.0);
        kee.fill(0.0);
        kne.fill(0.0);

        {
            let ctx = self.qp_context(&data, quad, true);

            for i in 0..N_TEST_SLAVE {
                for j in 0..n_conn {
                    kee[(i, j)] += self
                        .kernel
                        .off_diag_jacobian(JacobianBlock::SlaveSlave, jvar, i, j, &ctx);
                }
            }

            for i in 0..N_TEST_SLAVE {
                for j in 0..assembly.ken.ncols() {
                    assembly.ken[(i, j)] += self
                        .kernel
                        .off_diag_jacobian(JacobianBlock::SlaveMaster, jvar, i, j, &ctx);
                }
            }

            if kne.nrows() > 0 && kne.ncols() > 0 {
                for i in 0..n_test_master {
                    for j in 0..n_conn {
                        kne[(i, j)] += self
                            .kernel
                            .off_diag_jacobian(JacobianBlock::MasterSlave, jvar, i, j, &ctx);
                    }
                }
            }

            for i in 0..n_test_master {
                for j in 0..assembly.knn.ncols() {
                    assembly.knn[(i, j)] += self
                        .kernel
                        .off_diag_jacobian(JacobianBlock::MasterMaster, jvar, i, j, &ctx);
                }
            }
        }

        self.kee = kee;
        self.kne = kne;
        Ok(())
    }

    /// Global row DOFs of the residual blocks: the slave DOF and the
    /// master-side test rows
    pub fn residual_rows(
        &self,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
    ) -> Result<(usize, Vec<usize>)> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        let slave_dof = dof_map.nodal_dof_index(pair.node, self.var)?;
        let master_rows = dof_map.dof_indices(element, self.master_var)?;
        Ok((slave_dof, master_rows))
    }

    /// Global column DOFs of the fixed-size Jacobian blocks for `jvar`
    pub fn master_column_dofs(
        &self,
        pair: CouplingPair,
        mesh: &Mesh,
        dof_map: &DofMap,
        jvar: VariableId,
    ) -> Result<Vec<usize>> {
        let element = mesh
            .element(pair.elem)
            .ok_or(ModelError::MissingElement(pair.elem))?;
        Ok(dof_map.dof_indices(element, jvar)?)
    }

    /// Indicator shape per connected DOF: evaluating every connected
    /// shape function at the constrained node leaves a 1 only at the
    /// node's own DOF.
    fn build_slave_indicator(&mut self, slave_dof: usize) {
        self.phi_slave.clear();
        self.phi_slave.extend(
            self.connected_dof_indices
                .iter()
                .map(|&dof| if dof == slave_dof { 1.0 } else { 0.0 }),
        );
    }

    fn qp_context<'a>(
        &'a self,
        data: &'a PairData,
        quad: &'a MasterQuadrature,
        with_indicator: bool,
    ) -> QpContext<'a> {
        QpContext {
            qp: 0,
            q_point: quad.points.first().copied().unwrap_or([0.0; 3]),
            u_slave: data.u_slave,
            u_slave_old: data.u_slave_old,
            u_master: &data.u_master,
            u_master_old: &data.u_master_old,
            grad_u_master: &data.grad_u_master,
            test_slave: 1.0,
            test_master: &quad.test,
            phi_master: &quad.phi,
            phi_slave: if with_indicator { &self.phi_slave } else { &[] },
        }
    }

    fn reinit_pair(
        &self,
        pair: CouplingPair,
        mesh: &Mesh,
        element: &Element,
        dof_map: &DofMap,
        quad: &MasterQuadrature,
        state: SolutionState,
    ) -> Result<PairData> {
        if mesh.node(pair.node).is_none() {
            return Err(ModelError::MissingNode(pair.node).into());
        }
        let slave_dof = dof_map.nodal_dof_index(pair.node, self.var)?;
        let master_var_dofs = dof_map.dof_indices(element, self.master_var)?;

        let n_qp = quad.n_qp();
        let mut u_master = vec![0.0; n_qp];
        let mut u_master_old = vec![0.0; n_qp];
        let mut grad_u_master = vec![[0.0; 3]; n_qp];
        for qp in 0..n_qp {
            for (j, &dof) in master_var_dofs.iter().enumerate() {
                let phi = quad.phi[j][qp];
                u_master[qp] += phi * state.current[dof];
                u_master_old[qp] += phi * state.old[dof];
                let grad = quad.grad_phi[j][qp];
                for d in 0..3 {
                    grad_u_master[qp][d] += grad[d] * state.current[dof];
                }
            }
        }

        Ok(PairData {
            slave_dof,
            master_var_dofs,
            u_slave: state.current[slave_dof],
            u_slave_old: state.old[slave_dof],
            u_master,
            u_master_old,
            grad_u_master,
        })
    }
}
