//! Error types for simulation and objective evaluation.

use crate::Commodity;
use thiserror::Error;

/// Errors raised while building a network, simulating it or evaluating the objective.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DtaError {
    #[error("Invalid network: {what}")]
    InvalidNetwork { what: String },

    #[error("Invalid parameter: {what}")]
    InvalidParameter { what: String },

    #[error("Unknown origin")]
    UnknownOrigin,

    #[error("Unknown commodity {commodity:?}")]
    UnknownCommodity { commodity: Commodity },

    #[error("Time step {step} is out of range (horizon is {num_steps} steps)")]
    StepOutOfRange { step: usize, num_steps: usize },

    #[error("Missing split ratio at origin {origin}, step {step}, commodity {commodity:?}")]
    MissingSplitRatio {
        origin: usize,
        step: usize,
        commodity: Commodity,
    },

    #[error("Control vector has length {actual}, expected {expected}")]
    ControlLength { expected: usize, actual: usize },

    #[error("Split ratio {ratio} at origin {origin}, step {step}, commodity {commodity:?} is outside [0, 1]")]
    InvalidSplitRatio {
        origin: usize,
        step: usize,
        commodity: Commodity,
        ratio: f64,
    },

    #[error("Infeasible iterate: split ratios at origin {origin}, step {step} sum to {sum}, which is not above {threshold}")]
    Infeasible {
        origin: usize,
        step: usize,
        sum: f64,
        threshold: f64,
    },

    #[error("Infeasible iterate: non-compliant split ratio at origin {origin}, step {step} is zero")]
    ZeroNonCompliantRatio { origin: usize, step: usize },

    #[error("Non-finite density or flow in cell {cell} at step {step}")]
    NonFiniteFlow { cell: usize, step: usize },

    #[error("Non-finite barrier term at origin {origin}, step {step}")]
    NonFiniteBarrier { origin: usize, step: usize },

    #[error("Not supported: {what}")]
    Unsupported { what: &'static str },
}

pub type DtaResult<T> = Result<T, DtaError>;

impl DtaError {
    /// Whether the error rejects the current iterate only, so an optimizer
    /// may recover by backing off (e.g. shrinking its step) and retrying.
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            DtaError::Infeasible { .. }
                | DtaError::ZeroNonCompliantRatio { .. }
                | DtaError::InvalidSplitRatio { .. }
        )
    }

    pub(crate) fn invalid_network(what: impl Into<String>) -> Self {
        DtaError::InvalidNetwork { what: what.into() }
    }
}
