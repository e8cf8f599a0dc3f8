//! Batch application of a constraint over many coupling pairs.
//!
//! Enforces the required ordering: constrained values are written into
//! the solution vector for every pair before any residual or Jacobian
//! evaluation reads them. Callers must ensure no two pairs share a slave
//! DOF; with that precondition the Jacobian pass can run in parallel,
//! computing blocks thread-locally and accumulating them serially into
//! the COO tangent (where duplicate indices are summed, so accumulation
//! order does not matter).

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use tie_model::{DofMap, Mesh, VariableId};

use crate::assembly::{scatter_residual, ConstraintAssembly, TangentAccumulator};
use crate::engine::{ConstraintKernel, CouplingPair, SolutionState, TieConstraint};
use crate::error::Result;
use crate::quadrature::MasterQuadrature;

/// Local blocks of one pair, lifted out of the engine for global scatter
struct PairBlocks {
    slave_row: usize,
    master_rows: Vec<usize>,
    connected_cols: Vec<usize>,
    master_cols: Vec<usize>,
    kee: DMatrix<f64>,
    ken: DMatrix<f64>,
    kne: DMatrix<f64>,
    knn: DMatrix<f64>,
}

fn pair_blocks<K: ConstraintKernel>(
    constraint: &mut TieConstraint<K>,
    assembly: &mut ConstraintAssembly,
    jvar: Option<VariableId>,
    pair: CouplingPair,
    quad: &MasterQuadrature,
    mesh: &Mesh,
    dof_map: &DofMap,
    state: SolutionState,
) -> Result<PairBlocks> {
    match jvar {
        None => constraint.compute_jacobian(pair, mesh, dof_map, quad, state, assembly)?,
        Some(jv) => {
            constraint.compute_off_diag_jacobian(jv, pair, mesh, dof_map, quad, state, assembly)?
        }
    }
    let col_var = jvar.unwrap_or_else(|| constraint.variable());
    let (slave_row, master_rows) = constraint.residual_rows(pair, mesh, dof_map)?;
    Ok(PairBlocks {
        slave_row,
        master_rows,
        connected_cols: constraint.connected_dof_indices().to_vec(),
        master_cols: constraint.master_column_dofs(pair, mesh, dof_map, col_var)?,
        kee: constraint.slave_slave_block().clone(),
        ken: assembly.slave_master_block().clone(),
        kne: constraint.master_slave_block().clone(),
        knn: assembly.master_master_block().clone(),
    })
}

/// Residual pass: write constrained values, then accumulate all residual
/// contributions into the global residual vector.
///
/// Overwrite-style constraints replace their slave row instead of adding
/// to it.
pub fn apply_residual<K: ConstraintKernel>(
    constraint: &TieConstraint<K>,
    pairs: &[(CouplingPair, &MasterQuadrature)],
    mesh: &Mesh,
    dof_map: &DofMap,
    solution: &mut DVector<f64>,
    residual: &mut DVector<f64>,
) -> Result<()> {
    for &(pair, quad) in pairs {
        constraint.compute_slave_value(pair, mesh, dof_map, quad, solution)?;
    }

    let state = SolutionState::steady(solution);
    let mut assembly = ConstraintAssembly::new();
    for &(pair, quad) in pairs {
        constraint.compute_residual(pair, mesh, dof_map, quad, state, &mut assembly)?;
        let (slave_dof, master_rows) = constraint.residual_rows(pair, mesh, dof_map)?;
        scatter_residual(
            residual,
            &[slave_dof],
            assembly.slave_residual(),
            constraint.overwrite_slave_residual(),
        );
        scatter_residual(residual, &master_rows, assembly.master_residual(), false);
    }
    Ok(())
}

/// Jacobian pass: write constrained values, then accumulate all four
/// blocks of every pair into the global tangent.
///
/// `jvar = None` assembles the constrained variable's own coupling;
/// `jvar = Some(v)` assembles the cross-variable blocks for `v`.
pub fn apply_jacobian<K>(
    constraint: &TieConstraint<K>,
    jvar: Option<VariableId>,
    pairs: &[(CouplingPair, &MasterQuadrature)],
    mesh: &Mesh,
    dof_map: &DofMap,
    solution: &mut DVector<f64>,
    tangent: &mut TangentAccumulator,
    parallel: bool,
) -> Result<()>
where
    K: ConstraintKernel + Clone + Send + Sync,
{
    for &(pair, quad) in pairs {
        constraint.compute_slave_value(pair, mesh, dof_map, quad, solution)?;
    }

    let state = SolutionState::steady(solution);
    let blocks: Vec<Result<PairBlocks>> = if parallel {
        pairs
            .par_iter()
            .map_init(
                || (constraint.clone(), ConstraintAssembly::new()),
                |(engine, assembly), &(pair, quad)| {
                    pair_blocks(engine, assembly, jvar, pair, quad, mesh, dof_map, state)
                },
            )
            .collect()
    } else {
        let mut engine = constraint.clone();
        let mut assembly = ConstraintAssembly::new();
        pairs
            .iter()
            .map(|&(pair, quad)| {
                pair_blocks(&mut engine, &mut assembly, jvar, pair, quad, mesh, dof_map, state)
            })
            .collect()
    };

    for result in blocks {
        let b = result?;
        tangent.add_block(&[b.slave_row], &b.connected_cols, &b.kee);
        tangent.add_block(&[b.slave_row], &b.master_cols, &b.ken);
        tangent.add_block(&b.master_rows, &b.connected_cols, &b.kne);
        tangent.add_block(&b.master_rows, &b.master_cols, &b.knn);
    }
    Ok(())
}
