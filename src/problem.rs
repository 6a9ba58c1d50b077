//! The system-optimal assignment problem as seen by an adjoint optimizer.

use crate::codec::{self, SplitSums};
use crate::objective::{self, BarrierParams};
use crate::{DtaError, DtaResult, Jacobian, Network, Simulator, SparseVector, Trajectory};
use log::{debug, warn};

/// The callbacks a gradient-based adjoint optimizer makes once per iteration.
///
/// Every method takes the iterate's control vector. An error invalidates the
/// whole evaluation for that iterate; errors for which
/// [DtaError::is_infeasible] holds may be recovered from by backing off.
pub trait AdjointProblem {
    /// The length of the control vector.
    fn control_len(&self) -> usize;

    /// The length of the state vector.
    fn state_len(&self) -> usize;

    /// Simulates the network under the given control, collecting per-step history.
    fn forward_simulate(&mut self, control: &[f64]) -> DtaResult<&Trajectory>;

    /// The objective `J`.
    fn objective(&mut self, control: &[f64]) -> DtaResult<f64>;

    /// The partial derivative `dJ/dU`.
    fn gradient_wrt_control(&mut self, control: &[f64]) -> DtaResult<Vec<f64>>;

    /// The partial derivative `dJ/dX`.
    fn gradient_wrt_state(&mut self, control: &[f64]) -> DtaResult<SparseVector>;

    /// The constraint Jacobian `dH/dU`.
    fn dhdu(&mut self, control: &[f64]) -> DtaResult<Jacobian>;

    /// The constraint Jacobian `dH/dX`.
    fn dhdx(&mut self, control: &[f64]) -> DtaResult<Jacobian>;
}

/// Finds the split ratios minimising the total density of a network.
#[derive(Clone, Debug)]
pub struct SystemOptimalProblem {
    simulator: Simulator,
    params: BarrierParams,
    /// The control vector the simulator's trajectory was produced from.
    evaluated: Option<Vec<f64>>,
    /// The split-ratio sums of the evaluated control vector.
    sums: SplitSums,
}

/// A control vector together with the simulation it produced.
///
/// Obtained from [SystemOptimalProblem::evaluate], so the trajectory it reads
/// is always the one simulated from its own control vector.
pub struct Iterate<'a> {
    network: &'a Network,
    trajectory: &'a Trajectory,
    sums: &'a SplitSums,
    control: &'a [f64],
    params: &'a BarrierParams,
}

impl SystemOptimalProblem {
    /// Creates the problem around a simulator whose split ratios are the starting point.
    pub fn new(simulator: Simulator, params: BarrierParams) -> DtaResult<Self> {
        if !(params.weight > 0.0 && params.weight.is_finite() && params.threshold.is_finite()) {
            return Err(DtaError::InvalidParameter {
                what: format!("barrier weight {} must be positive", params.weight),
            });
        }
        simulator.splits().validate(simulator.network())?;
        Ok(Self {
            simulator,
            params,
            evaluated: None,
            sums: Default::default(),
        })
    }

    pub fn network(&self) -> &Network {
        self.simulator.network()
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn params(&self) -> &BarrierParams {
        &self.params
    }

    /// The control vector of the split ratios currently loaded: the initial
    /// ones, or those of the last control vector that simulated successfully.
    pub fn control(&self) -> Vec<f64> {
        codec::encode(self.simulator.network(), self.simulator.splits()).0
    }

    /// Loads a control vector and simulates it. Repeated calls with the
    /// same control vector reuse the previous simulation.
    pub fn evaluate<'a>(&'a mut self, control: &'a [f64]) -> DtaResult<Iterate<'a>> {
        self.simulate(control, false)?;
        Ok(self.iterate(control))
    }

    fn simulate(&mut self, control: &[f64], collect_history: bool) -> DtaResult<()> {
        let cached = self.evaluated.as_deref() == Some(control);
        let has_history = !self.simulator.trajectory().history().is_empty();
        if cached && (has_history || !collect_history) {
            return Ok(());
        }

        self.evaluated = None;
        debug!("Evaluating iterate of {} controls", control.len());
        match self.simulator.run_control(control, collect_history) {
            Ok(sums) => {
                self.sums = sums;
                self.evaluated = Some(control.to_vec());
                Ok(())
            }
            Err(err) => {
                if err.is_infeasible() {
                    warn!("Rejected iterate: {}", err);
                }
                Err(err)
            }
        }
    }

    fn iterate<'a>(&'a self, control: &'a [f64]) -> Iterate<'a> {
        Iterate {
            network: self.simulator.network(),
            trajectory: self.simulator.trajectory(),
            sums: &self.sums,
            control,
            params: &self.params,
        }
    }
}

impl<'a> Iterate<'a> {
    pub fn trajectory(&self) -> &'a Trajectory {
        self.trajectory
    }

    /// The split-ratio sums of every origin and time step.
    pub fn sums(&self) -> &'a SplitSums {
        self.sums
    }

    pub fn control(&self) -> &'a [f64] {
        self.control
    }

    /// The objective `J`.
    pub fn objective(&self) -> DtaResult<f64> {
        objective::objective(self.trajectory, self.sums, self.params)
    }

    /// The partial derivative `dJ/dU`.
    pub fn gradient_wrt_control(&self) -> DtaResult<Vec<f64>> {
        objective::gradient_wrt_control(self.network, self.control, self.params)
    }

    /// The partial derivative `dJ/dX`.
    pub fn gradient_wrt_state(&self) -> SparseVector {
        objective::gradient_wrt_state(self.network)
    }

    /// The simulated trajectory as a state vector.
    pub fn state_vector(&self) -> Vec<f64> {
        codec::state_vector(self.network, self.trajectory)
    }
}

impl AdjointProblem for SystemOptimalProblem {
    fn control_len(&self) -> usize {
        self.network().control_layout().len()
    }

    fn state_len(&self) -> usize {
        self.network().state_layout().len()
    }

    fn forward_simulate(&mut self, control: &[f64]) -> DtaResult<&Trajectory> {
        self.simulate(control, true)?;
        Ok(self.simulator.trajectory())
    }

    fn objective(&mut self, control: &[f64]) -> DtaResult<f64> {
        self.evaluate(control)?.objective()
    }

    fn gradient_wrt_control(&mut self, control: &[f64]) -> DtaResult<Vec<f64>> {
        self.evaluate(control)?.gradient_wrt_control()
    }

    fn gradient_wrt_state(&mut self, control: &[f64]) -> DtaResult<SparseVector> {
        Ok(self.evaluate(control)?.gradient_wrt_state())
    }

    fn dhdu(&mut self, _control: &[f64]) -> DtaResult<Jacobian> {
        Err(DtaError::Unsupported {
            what: "constraint Jacobian dH/dU",
        })
    }

    fn dhdx(&mut self, _control: &[f64]) -> DtaResult<Jacobian> {
        Err(DtaError::Unsupported {
            what: "constraint Jacobian dH/dX",
        })
    }
}
