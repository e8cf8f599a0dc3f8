//! Constraint kernels: the physics hooks the engine evaluates.

use serde::{Deserialize, Serialize};

use crate::engine::{ConstraintKernel, ConstraintSide, JacobianBlock, QpContext};

/// How the equal-value tie enforces the constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formulation {
    /// The slave residual row becomes the pure constraint equation
    /// `u_slave - u_master = 0`, overwriting ordinary physics on that row
    Kinematic,
    /// The constraint is enforced approximately through a penalty factor;
    /// the slave row sums with ordinary physics
    Penalty,
}

/// Ties the constrained nodal value to the interpolated master value.
///
/// The slave row drives `u_slave` toward the master interpolation; the
/// master rows carry the matching reaction so the pair stays
/// self-equilibrated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EqualValueTie {
    pub formulation: Formulation,
    /// Penalty factor; scales the reaction in both formulations
    pub penalty: f64,
}

impl EqualValueTie {
    /// Kinematic (overwrite-style) tie
    pub fn kinematic(penalty: f64) -> Self {
        Self {
            formulation: Formulation::Kinematic,
            penalty,
        }
    }

    /// Penalty tie
    pub fn penalty(penalty: f64) -> Self {
        Self {
            formulation: Formulation::Penalty,
            penalty,
        }
    }

    fn gap(&self, ctx: &QpContext) -> f64 {
        ctx.u_slave - ctx.u_master[ctx.qp]
    }

    /// Scale of the slave residual row
    fn slave_scale(&self) -> f64 {
        match self.formulation {
            Formulation::Kinematic => 1.0,
            Formulation::Penalty => self.penalty,
        }
    }
}

impl ConstraintKernel for EqualValueTie {
    fn slave_value(&self, ctx: &QpContext) -> f64 {
        ctx.u_master[ctx.qp]
    }

    fn residual(&self, side: ConstraintSide, i: usize, ctx: &QpContext) -> f64 {
        match side {
            ConstraintSide::Slave => self.slave_scale() * self.gap(ctx) * ctx.test_slave,
            ConstraintSide::Master => -self.penalty * self.gap(ctx) * ctx.test_master[i][ctx.qp],
        }
    }

    fn jacobian(&self, block: JacobianBlock, i: usize, j: usize, ctx: &QpContext) -> f64 {
        match block {
            JacobianBlock::SlaveSlave => self.slave_scale() * ctx.phi_slave[j] * ctx.test_slave,
            JacobianBlock::SlaveMaster => -self.slave_scale() * ctx.phi_master[j][ctx.qp],
            JacobianBlock::MasterSlave => {
                -self.penalty * ctx.phi_slave[j] * ctx.test_master[i][ctx.qp]
            }
            JacobianBlock::MasterMaster => {
                self.penalty * ctx.phi_master[j][ctx.qp] * ctx.test_master[i][ctx.qp]
            }
        }
    }

    fn overwrite_slave_residual(&self) -> bool {
        self.formulation == Formulation::Kinematic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        u_master: &'a [f64],
        phi_master: &'a [Vec<f64>],
        phi_slave: &'a [f64],
    ) -> QpContext<'a> {
        QpContext {
            qp: 0,
            q_point: [0.0; 3],
            u_slave: 3.0,
            u_slave_old: 3.0,
            u_master,
            u_master_old: u_master,
            grad_u_master: &[],
            test_slave: 1.0,
            test_master: phi_master,
            phi_master,
            phi_slave,
        }
    }

    #[test]
    fn kinematic_overwrites_penalty_does_not() {
        assert!(EqualValueTie::kinematic(1e5).overwrite_slave_residual());
        assert!(!EqualValueTie::penalty(1e5).overwrite_slave_residual());
    }

    #[test]
    fn slave_value_is_master_interpolation() {
        let u_master = [2.5];
        let phi = vec![vec![0.5], vec![0.5]];
        let tie = EqualValueTie::kinematic(1.0);
        assert_eq!(tie.slave_value(&ctx(&u_master, &phi, &[])), 2.5);
    }

    #[test]
    fn residual_pair_is_self_equilibrated() {
        // gap = 3.0 - 1.0 = 2.0, shape values sum to 1
        let u_master = [1.0];
        let phi = vec![vec![0.25], vec![0.75]];
        let tie = EqualValueTie::penalty(10.0);
        let ctx = ctx(&u_master, &phi, &[]);

        let slave = tie.residual(ConstraintSide::Slave, 0, &ctx);
        let master: f64 = (0..2)
            .map(|i| tie.residual(ConstraintSide::Master, i, &ctx))
            .sum();
        assert!((slave + master).abs() < 1e-12);
    }

    #[test]
    fn slave_row_jacobian_follows_indicator() {
        let u_master = [1.0];
        let phi = vec![vec![0.25], vec![0.75]];
        let phi_slave = [0.0, 1.0, 0.0];
        let tie = EqualValueTie::kinematic(1.0);
        let ctx = ctx(&u_master, &phi, &phi_slave);

        assert_eq!(tie.jacobian(JacobianBlock::SlaveSlave, 0, 0, &ctx), 0.0);
        assert_eq!(tie.jacobian(JacobianBlock::SlaveSlave, 0, 1, &ctx), 1.0);
        assert_eq!(tie.jacobian(JacobianBlock::SlaveMaster, 0, 1, &ctx), -0.75);
    }
}
