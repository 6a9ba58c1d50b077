//! Conversions between the split-ratio store and the control vector, and
//! between trajectories and the state vector.
//!
//! The slot order of both vectors is owned by [ControlLayout](crate::ControlLayout)
//! and [StateLayout]; nothing here computes an index by hand.

use crate::layout::StateLayout;
use crate::{DtaError, DtaResult, Network, Profile, SplitRatios, Trajectory};
use itertools::iproduct;

/// The sum of the split ratios of every origin at every time step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitSums {
    /// Indexed by origin index, then time step.
    sums: Vec<Vec<f64>>,
}

impl SplitSums {
    fn zeros(num_origins: usize, num_steps: usize) -> Self {
        Self {
            sums: vec![vec![0.0; num_steps]; num_origins],
        }
    }

    /// The sum of the split ratios of an origin at a time step.
    pub fn get(&self, origin: usize, step: usize) -> f64 {
        self.sums[origin][step]
    }

    /// The sums of an origin over every time step.
    pub fn origin(&self, origin: usize) -> &[f64] {
        &self.sums[origin]
    }

    pub fn num_origins(&self) -> usize {
        self.sums.len()
    }

    /// Iterates over `(origin, step, sum)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.sums.iter().enumerate().flat_map(|(origin, sums)| {
            sums.iter()
                .enumerate()
                .map(move |(step, sum)| (origin, step, *sum))
        })
    }

    fn add(&mut self, origin: usize, step: usize, ratio: f64) {
        self.sums[origin][step] += ratio;
    }
}

/// Reads the split ratios into a control vector. Absent ratios leave their slot at zero.
pub fn encode(network: &Network, splits: &SplitRatios) -> (Vec<f64>, SplitSums) {
    let layout = network.control_layout();
    let mut control = vec![0.0; layout.len()];
    let mut sums = SplitSums::zeros(network.num_origins(), network.num_steps());

    for (origin, step) in iproduct!(network.origins(), 0..network.num_steps()) {
        let Some(ratios) = splits.get(origin.id(), step) else {
            continue;
        };
        for (slot, commodity) in layout.slots(step, origin.index()) {
            if let Some(ratio) = ratios.get(commodity) {
                control[slot] = ratio;
                sums.add(origin.index(), step, ratio);
            }
        }
    }
    (control, sums)
}

/// Writes a control vector into the split ratios, overwriting every slot.
///
/// The vector is checked in full before anything is written, so a rejected
/// vector leaves the store untouched.
pub fn decode(network: &Network, control: &[f64], splits: &mut SplitRatios) -> DtaResult<SplitSums> {
    let layout = network.control_layout();
    if control.len() != layout.len() {
        return Err(DtaError::ControlLength {
            expected: layout.len(),
            actual: control.len(),
        });
    }
    for (origin, step) in iproduct!(network.origins(), 0..network.num_steps()) {
        for (slot, commodity) in layout.slots(step, origin.index()) {
            let ratio = control[slot];
            if !(0.0..=1.0).contains(&ratio) {
                return Err(DtaError::InvalidSplitRatio {
                    origin: origin.index(),
                    step,
                    commodity,
                    ratio,
                });
            }
        }
    }

    let mut sums = SplitSums::zeros(network.num_origins(), network.num_steps());
    for (origin, step) in iproduct!(network.origins(), 0..network.num_steps()) {
        for (slot, commodity) in layout.slots(step, origin.index()) {
            splits.put(origin.id(), step, commodity, control[slot])?;
            sums.add(origin.index(), step, control[slot]);
        }
    }
    Ok(sums)
}

/// Writes one time step of a trajectory into a state vector.
/// Absent commodities leave their entries untouched.
pub fn write_profile(layout: &StateLayout, step: usize, profile: &Profile, state: &mut [f64]) {
    for (cell, info) in profile.iter().enumerate() {
        for (commodity, density) in info.partial_densities.iter() {
            state[layout.density(step, cell, commodity)] = density;
        }
        state[layout.demand(step, cell)] = info.demand;
        state[layout.supply(step, cell)] = info.supply;
        for (commodity, flow) in info.out_flows.iter() {
            state[layout.out_flow(step, cell, commodity)] = flow;
        }
        for (commodity, flow) in info.in_flows.iter() {
            state[layout.in_flow(step, cell, commodity)] = flow;
        }
    }
}

/// Flattens a trajectory into a state vector.
pub fn state_vector(network: &Network, trajectory: &Trajectory) -> Vec<f64> {
    let layout = network.state_layout();
    let mut state = vec![0.0; layout.len()];
    for (step, profile) in trajectory.profiles().iter().enumerate() {
        write_profile(layout, step, profile, &mut state);
    }
    state
}
