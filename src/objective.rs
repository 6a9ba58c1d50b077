//! The system-optimal objective and its partial derivatives.
//!
//! The objective is the total density over every cell and time step, plus a
//! logarithmic barrier on each origin's split ratios summing above a
//! feasibility threshold:
//!
//! `J = Σ_{k,i} ρ_i(k) − Σ_{o,k} ε·ln(Σ_c β_o,c(k) − θ)`

use crate::codec::SplitSums;
use crate::{DtaError, DtaResult, Network, SparseVector, Trajectory};
use itertools::iproduct;

/// The default weight of the barrier term.
pub const BARRIER_WEIGHT: f64 = 0.02;

/// The default value the split ratios of an origin must sum above.
pub const FEASIBILITY_THRESHOLD: f64 = 0.999;

/// Parameters of the split-ratio barrier.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarrierParams {
    /// The barrier weight, `ε`.
    pub weight: f64,
    /// The feasibility threshold, `θ`.
    pub threshold: f64,
}

impl Default for BarrierParams {
    fn default() -> Self {
        Self {
            weight: BARRIER_WEIGHT,
            threshold: FEASIBILITY_THRESHOLD,
        }
    }
}

impl BarrierParams {
    /// The barrier term `−ε·ln(sum − θ)` of an origin at a time step.
    pub fn term(&self, sum: f64, origin: usize, step: usize) -> DtaResult<f64> {
        self.check_feasible(sum, origin, step)?;
        let term = -self.weight * (sum - self.threshold).ln();
        finite_barrier(term, origin, step)
    }

    /// The derivative of the barrier term with respect to any one of the
    /// origin's split ratios at that time step, `ε / (θ − sum)`.
    pub fn derivative(&self, sum: f64, origin: usize, step: usize) -> DtaResult<f64> {
        self.check_feasible(sum, origin, step)?;
        let derivative = self.weight / (self.threshold - sum);
        finite_barrier(derivative, origin, step)
    }

    fn check_feasible(&self, sum: f64, origin: usize, step: usize) -> DtaResult<()> {
        if sum.is_nan() {
            return Err(DtaError::NonFiniteBarrier { origin, step });
        }
        if sum <= self.threshold {
            return Err(DtaError::Infeasible {
                origin,
                step,
                sum,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

fn finite_barrier(value: f64, origin: usize, step: usize) -> DtaResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DtaError::NonFiniteBarrier { origin, step })
    }
}

/// Evaluates the objective of a simulated trajectory given the split-ratio sums that produced it.
pub fn objective(trajectory: &Trajectory, sums: &SplitSums, params: &BarrierParams) -> DtaResult<f64> {
    let mut value = trajectory.total_density();
    for (origin, step, sum) in sums.iter() {
        value += params.term(sum, origin, step)?;
    }
    Ok(value)
}

/// The partial derivative of the objective with respect to the control vector.
///
/// Only the barrier depends on the control directly, and only through each
/// origin's sum, so every slot of an origin at a time step gets the same derivative.
pub fn gradient_wrt_control(network: &Network, control: &[f64], params: &BarrierParams) -> DtaResult<Vec<f64>> {
    let layout = network.control_layout();
    if control.len() != layout.len() {
        return Err(DtaError::ControlLength {
            expected: layout.len(),
            actual: control.len(),
        });
    }

    let mut gradient = vec![0.0; layout.len()];
    for (origin, step) in iproduct!(0..network.num_origins(), 0..network.num_steps()) {
        if control[layout.non_compliant_slot(step, origin)] == 0.0 {
            return Err(DtaError::ZeroNonCompliantRatio { origin, step });
        }
        let slots = layout.origin_slots(step, origin);
        let sum = control[slots.clone()].iter().fold(0.0, |sum, ratio| sum + ratio);
        let derivative = params.derivative(sum, origin, step)?;
        for slot in slots {
            gradient[slot] += derivative;
        }
    }
    Ok(gradient)
}

/// The partial derivative of the objective with respect to the state vector:
/// one on every partial density, zero elsewhere.
pub fn gradient_wrt_state(network: &Network) -> SparseVector {
    let layout = network.state_layout();
    let entries = (0..network.num_steps())
        .flat_map(|step| layout.density_range(step))
        .map(|idx| (idx, 1.0))
        .collect();
    SparseVector::from_sorted(layout.len(), entries)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn barrier_rejects_threshold() {
        let params = BarrierParams::default();
        assert!(matches!(
            params.term(0.999, 0, 0),
            Err(DtaError::Infeasible { .. })
        ));
        assert!(matches!(
            params.derivative(0.5, 2, 3),
            Err(DtaError::Infeasible {
                origin: 2,
                step: 3,
                ..
            })
        ));
        assert!(matches!(
            params.term(f64::NAN, 1, 1),
            Err(DtaError::NonFiniteBarrier { origin: 1, step: 1 })
        ));
        assert!(matches!(
            params.term(f64::INFINITY, 1, 1),
            Err(DtaError::NonFiniteBarrier { origin: 1, step: 1 })
        ));
    }

    #[test]
    fn barrier_grows_towards_threshold() {
        let params = BarrierParams::default();
        let sums = [1.5, 1.0, 0.9995, 0.99901];
        let terms = sums
            .iter()
            .map(|sum| params.term(*sum, 0, 0).unwrap())
            .collect::<Vec<_>>();
        assert!(terms.windows(2).all(|w| w[0] < w[1]));
        // ln(Σβ − θ) is negative close to the threshold, so the term adds to the objective
        assert!(terms[1] > 0.0);
        assert_approx_eq!(terms[1], -0.02 * 0.001f64.ln());
    }

    #[test]
    fn derivative_sign() {
        let params = BarrierParams {
            weight: 1.0,
            threshold: 0.999,
        };
        assert_approx_eq!(params.derivative(1.0, 0, 0).unwrap(), -1000.0, 1e-6);
    }
}
