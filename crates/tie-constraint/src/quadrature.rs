//! Quadrature data on the master element.
//!
//! The constraint engine does not generate quadrature rules; it consumes
//! per-point shape/test values and gradients owned by the element
//! quadrature subsystem. Tables are indexed `[shape][qp]`, gradients
//! `[shape][qp][component]`.

/// Per-quadrature-point values of a set of shape or test functions
pub type ShapeTable = Vec<Vec<f64>>;

/// Per-quadrature-point reference gradients of a set of shape functions
pub type GradTable = Vec<Vec<[f64; 3]>>;

/// Externally supplied quadrature data for one master element
#[derive(Debug, Clone)]
pub struct MasterQuadrature {
    /// Quadrature point locations
    pub points: Vec<[f64; 3]>,
    /// Quadrature weights
    pub weights: Vec<f64>,
    /// Master-variable shape functions
    pub phi: ShapeTable,
    /// Master-variable shape gradients
    pub grad_phi: GradTable,
    /// Test functions of the master-side residual rows
    pub test: ShapeTable,
    /// Test function gradients
    pub grad_test: GradTable,
}

impl MasterQuadrature {
    /// Number of quadrature points
    pub fn n_qp(&self) -> usize {
        self.points.len()
    }

    /// Single-point data for a linear two-node segment, evaluated at
    /// reference coordinate `xi` in [-1, 1].
    ///
    /// The coupling evaluation uses one shared point, so one entry per
    /// table is enough. Shape and test families coincide for equal-order
    /// Lagrange discretizations.
    pub fn linear_segment(xi: f64) -> Self {
        let phi = vec![vec![0.5 * (1.0 - xi)], vec![0.5 * (1.0 + xi)]];
        let grad_phi = vec![vec![[-0.5, 0.0, 0.0]], vec![[0.5, 0.0, 0.0]]];
        Self {
            points: vec![[xi, 0.0, 0.0]],
            weights: vec![1.0],
            test: phi.clone(),
            grad_test: grad_phi.clone(),
            phi,
            grad_phi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_segment_partition_of_unity() {
        for xi in [-1.0, -0.3, 0.0, 0.7, 1.0] {
            let quad = MasterQuadrature::linear_segment(xi);
            let sum: f64 = quad.phi.iter().map(|shape| shape[0]).sum();
            assert!((sum - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn linear_segment_interpolates_endpoints() {
        let left = MasterQuadrature::linear_segment(-1.0);
        assert_eq!(left.phi[0][0], 1.0);
        assert_eq!(left.phi[1][0], 0.0);

        let right = MasterQuadrature::linear_segment(1.0);
        assert_eq!(right.phi[0][0], 0.0);
        assert_eq!(right.phi[1][0], 1.0);
    }
}
