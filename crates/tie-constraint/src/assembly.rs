//! Local accumulation targets and global scatter primitives.
//!
//! `ConstraintAssembly` holds the caller-owned blocks for one
//! (node, element) pair: the two residual blocks and the fixed-size
//! slave-master / master-master Jacobian blocks. The dynamically sized
//! slave-column blocks live inside the engine as reusable buffers, since
//! their column count (the connected-DOF count) varies call to call.
//!
//! Global tangent accumulation goes through COO triplets; duplicate
//! (i, j) entries are summed on conversion to CSR, so accumulation from
//! non-overlapping constrained nodes is order-independent.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Caller-owned accumulation targets for one coupling pair
#[derive(Debug, Clone)]
pub struct ConstraintAssembly {
    pub(crate) slave_re: DVector<f64>,
    pub(crate) master_re: DVector<f64>,
    pub(crate) ken: DMatrix<f64>,
    pub(crate) knn: DMatrix<f64>,
}

impl ConstraintAssembly {
    /// Create empty accumulation targets
    pub fn new() -> Self {
        Self {
            slave_re: DVector::zeros(0),
            master_re: DVector::zeros(0),
            ken: DMatrix::zeros(0, 0),
            knn: DMatrix::zeros(0, 0),
        }
    }

    /// Size and zero the residual blocks for a pair
    pub fn prepare_residual(&mut self, n_test_slave: usize, n_test_master: usize) {
        self.slave_re = DVector::zeros(n_test_slave);
        self.master_re = DVector::zeros(n_test_master);
    }

    /// Size and zero the fixed Jacobian blocks for one (row, column
    /// variable) pairing. Either dimension may legitimately be zero when
    /// the column variable carries no DOFs on the master element.
    pub fn prepare_jacobian(
        &mut self,
        n_test_slave: usize,
        n_test_master: usize,
        n_phi_master: usize,
    ) {
        self.ken = DMatrix::zeros(n_test_slave, n_phi_master);
        self.knn = DMatrix::zeros(n_test_master, n_phi_master);
    }

    /// Slave-side residual block (one test function)
    pub fn slave_residual(&self) -> &DVector<f64> {
        &self.slave_re
    }

    /// Master-side residual block
    pub fn master_residual(&self) -> &DVector<f64> {
        &self.master_re
    }

    /// Slave-row × master-column Jacobian block
    pub fn slave_master_block(&self) -> &DMatrix<f64> {
        &self.ken
    }

    /// Master-row × master-column Jacobian block
    pub fn master_master_block(&self) -> &DMatrix<f64> {
        &self.knn
    }
}

impl Default for ConstraintAssembly {
    fn default() -> Self {
        Self::new()
    }
}

/// Global tangent matrix accumulator over COO triplets
#[derive(Debug, Clone)]
pub struct TangentAccumulator {
    coo: CooMatrix<f64>,
}

impl TangentAccumulator {
    /// Create an accumulator for an `n_dofs` × `n_dofs` tangent
    pub fn new(n_dofs: usize) -> Self {
        Self {
            coo: CooMatrix::new(n_dofs, n_dofs),
        }
    }

    /// Accumulate a dense block at the given row/column DOF indices.
    ///
    /// The column count is sized at call time; blocks from dynamically
    /// sized (connected-DOF) columns and fixed element columns go through
    /// the same path. Exact zeros are skipped to preserve sparsity.
    pub fn add_block(&mut self, rows: &[usize], cols: &[usize], block: &DMatrix<f64>) {
        debug_assert_eq!(block.nrows(), rows.len());
        debug_assert_eq!(block.ncols(), cols.len());
        for (i, &row) in rows.iter().enumerate() {
            for (j, &col) in cols.iter().enumerate() {
                let value = block[(i, j)];
                if value != 0.0 {
                    self.coo.push(row, col, value);
                }
            }
        }
    }

    /// Number of accumulated triplets
    pub fn nnz(&self) -> usize {
        self.coo.nnz()
    }

    /// Finalize into CSR; duplicate entries are summed
    pub fn into_csr(self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.coo)
    }
}

/// Scatter a local residual block into the global residual vector.
///
/// With `overwrite` set, the rows are replaced instead of summed:
/// the slave row of an overwrite-style constraint is a pure constraint
/// equation, not a force balance.
pub fn scatter_residual(
    global: &mut DVector<f64>,
    rows: &[usize],
    local: &DVector<f64>,
    overwrite: bool,
) {
    debug_assert_eq!(local.len(), rows.len());
    for (i, &row) in rows.iter().enumerate() {
        if overwrite {
            global[row] = local[i];
        } else {
            global[row] += local[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_jacobian_zeroes_fixed_blocks() {
        let mut assembly = ConstraintAssembly::new();
        assembly.prepare_jacobian(1, 2, 2);
        assembly.ken[(0, 1)] = 3.0;

        assembly.prepare_jacobian(1, 2, 2);
        assert_eq!(assembly.slave_master_block()[(0, 1)], 0.0);
    }

    #[test]
    fn prepare_jacobian_allows_zero_dims() {
        let mut assembly = ConstraintAssembly::new();
        assembly.prepare_jacobian(1, 2, 0);
        assert_eq!(assembly.slave_master_block().ncols(), 0);
        assert_eq!(assembly.master_master_block().nrows(), 2);
    }

    #[test]
    fn coo_accumulation_sums_duplicates() {
        let mut tangent = TangentAccumulator::new(4);
        let block = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        tangent.add_block(&[0], &[0, 2], &block);
        tangent.add_block(&[0], &[0, 2], &block);

        let csr = tangent.into_csr();
        assert_eq!(csr.get_entry(0, 0).unwrap().into_value(), 2.0);
        assert_eq!(csr.get_entry(0, 2).unwrap().into_value(), 4.0);
    }

    #[test]
    fn zero_entries_are_skipped() {
        let mut tangent = TangentAccumulator::new(2);
        let block = DMatrix::from_row_slice(1, 2, &[0.0, 5.0]);
        tangent.add_block(&[1], &[0, 1], &block);
        assert_eq!(tangent.nnz(), 1);
    }

    #[test]
    fn residual_scatter_accumulates_or_overwrites() {
        let mut global = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let local = DVector::from_vec(vec![2.0]);

        scatter_residual(&mut global, &[1], &local, false);
        assert_eq!(global[1], 3.0);

        scatter_residual(&mut global, &[1], &local, true);
        assert_eq!(global[1], 2.0);
    }
}
