//! Simulated network states.

use crate::CommodityMap;

/// The state of one cell during one time step.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellInfo {
    /// The density of each commodity at the start of the step.
    pub partial_densities: CommodityMap,
    /// The sum of the partial densities.
    pub total_density: f64,
    /// The flow the cell could send downstream.
    pub demand: f64,
    /// The flow the cell could receive from upstream.
    pub supply: f64,
    /// The flow of each commodity leaving the cell during the step.
    pub out_flows: CommodityMap,
    /// The flow of each commodity entering the cell during the step.
    pub in_flows: CommodityMap,
}

impl CellInfo {
    pub fn total_out_flow(&self) -> f64 {
        self.out_flows.total()
    }

    pub fn total_in_flow(&self) -> f64 {
        self.in_flows.total()
    }
}

/// A snapshot of every cell at one time step, indexed by cell index.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Profile {
    cells: Vec<CellInfo>,
}

impl Profile {
    pub(crate) fn new(cells: Vec<CellInfo>) -> Self {
        Self { cells }
    }

    /// Gets the state of the cell at the given index.
    pub fn get(&self, cell: usize) -> &CellInfo {
        &self.cells[cell]
    }

    /// Gets a mutable reference to the state of the cell at the given index.
    pub fn get_mut(&mut self, cell: usize) -> &mut CellInfo {
        &mut self.cells[cell]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellInfo> + '_ {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The sum of the total densities of every cell.
    pub fn total_density(&self) -> f64 {
        self.cells.iter().map(|cell| cell.total_density).sum()
    }
}

/// Aggregate figures for one simulated time step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepSummary {
    pub step: usize,
    /// The sum of the total densities of every cell.
    pub total_density: f64,
    /// The vehicles entering the network through the origins.
    pub injected: f64,
    /// The vehicles leaving the network through the destinations.
    pub exited: f64,
}

/// The time-ordered sequence of profiles produced by one simulation run.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trajectory {
    profiles: Vec<Profile>,
    history: Vec<StepSummary>,
}

impl Trajectory {
    pub(crate) fn with_capacity(num_steps: usize) -> Self {
        Self {
            profiles: Vec::with_capacity(num_steps),
            history: vec![],
        }
    }

    pub(crate) fn push(&mut self, profile: Profile) {
        self.profiles.push(profile);
    }

    pub(crate) fn push_summary(&mut self, summary: StepSummary) {
        self.history.push(summary);
    }

    /// Gets the profile at the given time step.
    pub fn get(&self, step: usize) -> Option<&Profile> {
        self.profiles.get(step)
    }

    /// Gets a mutable reference to the profile at the given time step.
    pub fn get_mut(&mut self, step: usize) -> Option<&mut Profile> {
        self.profiles.get_mut(step)
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// The per-step summaries, present if the run collected history.
    pub fn history(&self) -> &[StepSummary] {
        &self.history
    }

    /// The number of time steps.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The sum of every cell's total density over every time step.
    pub fn total_density(&self) -> f64 {
        self.profiles.iter().map(|p| p.total_density()).sum()
    }

    /// Gets the trajectory as a JSON value.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
