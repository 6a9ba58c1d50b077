use crate::codec::{self, SplitSums};
use crate::profile::{CellInfo, Profile, StepSummary, Trajectory};
use crate::{Commodity, CommodityMap, DtaError, DtaResult, Network, SplitRatios};
use log::{debug, trace};

/// A multi-commodity cell transmission simulation.
#[derive(Clone, Debug)]
pub struct Simulator {
    /// The network being simulated.
    network: Network,
    /// The split ratios loaded at the origins.
    splits: SplitRatios,
    /// The profiles produced by the latest run.
    trajectory: Trajectory,
}

impl Simulator {
    /// Creates a new simulation of the network with the given split ratios.
    pub fn new(network: Network, splits: SplitRatios) -> Self {
        Self {
            network,
            splits,
            trajectory: Default::default(),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn splits(&self) -> &SplitRatios {
        &self.splits
    }

    pub fn splits_mut(&mut self) -> &mut SplitRatios {
        &mut self.splits
    }

    /// The profiles produced by the latest run. Empty if the latest run failed.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Writes a control vector into the split ratios and simulates it,
    /// returning the sum of the ratios at every origin and time step.
    ///
    /// The split ratios are only replaced if the run succeeds, so a rejected
    /// control vector leaves the previously loaded one in place.
    pub fn run_control(&mut self, control: &[f64], collect_history: bool) -> DtaResult<SplitSums> {
        let mut splits = self.splits.clone();
        let sums = codec::decode(&self.network, control, &mut splits)?;
        let previous = std::mem::replace(&mut self.splits, splits);
        if let Err(err) = self.run(collect_history).map(|_| ()) {
            self.splits = previous;
            return Err(err);
        }
        Ok(sums)
    }

    /// Simulates every time step from the initial densities, replacing the
    /// previous trajectory. If `collect_history` is set, a [StepSummary] is
    /// recorded for every step.
    pub fn run(&mut self, collect_history: bool) -> DtaResult<&Trajectory> {
        self.trajectory = Default::default();
        self.splits.validate(&self.network)?;

        let num_steps = self.network.num_steps();
        debug!("Simulating {} steps over {} cells", num_steps, self.network.num_cells());

        let mut trajectory = Trajectory::with_capacity(num_steps);
        let mut densities = self.network.initial_densities().to_vec();
        for step in 0..num_steps {
            let (profile, next) = self.step(step, densities)?;
            let summary = self.summarize(step, &profile);
            trace!(
                "Step {}: density {:.6}, injected {:.6}, exited {:.6}",
                step,
                summary.total_density,
                summary.injected,
                summary.exited
            );
            if collect_history {
                trajectory.push_summary(summary);
            }
            trajectory.push(profile);
            densities = next;
        }

        debug!("Simulation complete, total density {:.6}", trajectory.total_density());
        self.trajectory = trajectory;
        Ok(&self.trajectory)
    }

    /// Computes the flows of one time step from the partial densities at its
    /// start, returning the step's profile and the partial densities at the next step.
    fn step(&self, step: usize, densities: Vec<CommodityMap>) -> DtaResult<(Profile, Vec<CommodityMap>)> {
        let network = &self.network;
        let dt = network.dt();

        // Compute the demand and supply of every cell
        let mut infos = network
            .cells()
            .zip(densities)
            .map(|(cell, partial_densities)| {
                let total_density = partial_densities.total();
                CellInfo {
                    demand: cell.demand(total_density, dt),
                    supply: cell.supply(total_density),
                    total_density,
                    partial_densities,
                    ..Default::default()
                }
            })
            .collect::<Vec<_>>();

        // Gather the demand directed at every cell
        let mut requests = vec![0.0; infos.len()];
        for (cell, info) in network.cells().zip(&infos) {
            if !sends(info) {
                continue;
            }
            for (commodity, density) in info.partial_densities.iter() {
                let share = info.demand * density / info.total_density;
                for (next, ratio) in cell.next_cells(commodity) {
                    requests[next] += share * ratio;
                }
            }
        }

        // Scale down the demand directed at cells lacking the supply to receive it
        let factors = infos
            .iter()
            .zip(&requests)
            .map(|(info, request)| {
                if *request > info.supply {
                    info.supply / request
                } else {
                    1.0
                }
            })
            .collect::<Vec<_>>();

        // Send flows downstream, blocking a cell's whole flow by its most restrictive receiver
        let mut in_flows = vec![CommodityMap::new(); infos.len()];
        for (cell, info) in network.cells().zip(infos.iter_mut()) {
            if !sends(info) {
                continue;
            }
            let factor = info
                .partial_densities
                .iter()
                .filter(|(_, density)| *density > 0.0)
                .flat_map(|(commodity, _)| cell.next_cells(commodity))
                .map(|(next, _)| factors[next])
                .fold(1.0, f64::min);
            let out_flow = factor * info.demand;
            for (commodity, density) in info.partial_densities.iter() {
                let flow = out_flow * density / info.total_density;
                info.out_flows.insert(commodity, flow);
                for (next, ratio) in cell.next_cells(commodity) {
                    in_flows[next].add(commodity, flow * ratio);
                }
            }
        }

        // Inject the arrivals at every origin according to its split ratios
        for origin in network.origins() {
            let arrivals = origin.demand()[step];
            let ratios = self.splits.get(origin.id(), step);
            let buffer = network.cell(origin.buffer()).index();
            for commodity in origin.commodities() {
                let ratio = ratios
                    .and_then(|ratios| ratios.get(commodity))
                    .ok_or(DtaError::MissingSplitRatio {
                        origin: origin.index(),
                        step,
                        commodity,
                    })?;
                in_flows[buffer].add(commodity, arrivals * ratio);
            }
        }

        // Conserve every commodity's vehicles
        let mut next_densities = Vec::with_capacity(infos.len());
        for ((cell, info), in_flow) in network.cells().zip(infos.iter_mut()).zip(in_flows) {
            info.in_flows = in_flow;
            let mut next = info.partial_densities.clone();
            if cell.is_sink() {
                info.out_flows = info.in_flows.clone();
            } else {
                let scale = dt / cell.length();
                for (commodity, flow) in info.in_flows.iter() {
                    next.add(commodity, scale * flow);
                }
                for (commodity, flow) in info.out_flows.iter() {
                    next.add(commodity, -scale * flow);
                }
                clamp_roundoff(&mut next);
            }
            if !is_finite(info) || !next.iter().all(|(_, density)| density.is_finite()) {
                return Err(DtaError::NonFiniteFlow {
                    cell: cell.index(),
                    step,
                });
            }
            next_densities.push(next);
        }

        Ok((Profile::new(infos), next_densities))
    }

    /// Totals the vehicles in, entering and leaving the network during a step.
    fn summarize(&self, step: usize, profile: &Profile) -> StepSummary {
        let dt = self.network.dt();
        let mut summary = StepSummary {
            step,
            total_density: profile.total_density(),
            ..Default::default()
        };
        for (cell, info) in self.network.cells().zip(profile.iter()) {
            if cell.is_buffer() {
                summary.injected += dt * info.total_in_flow();
            } else if cell.is_sink() {
                summary.exited += dt * info.total_out_flow();
            }
        }
        summary
    }
}

/// Whether a cell has traffic to send downstream.
fn sends(info: &CellInfo) -> bool {
    info.demand > 0.0 && info.total_density > 0.0
}

/// Whether every simulated quantity of a cell is finite.
fn is_finite(info: &CellInfo) -> bool {
    info.total_density.is_finite()
        && info.demand.is_finite()
        && info.supply.is_finite()
        && info.out_flows.iter().all(|(_, flow)| flow.is_finite())
        && info.in_flows.iter().all(|(_, flow)| flow.is_finite())
}

/// Removes negative densities left by floating point roundoff.
fn clamp_roundoff(densities: &mut CommodityMap) {
    let negative = densities
        .iter()
        .filter(|(_, density)| *density < 0.0)
        .map(|(commodity, _)| commodity)
        .collect::<smallvec::SmallVec<[Commodity; 2]>>();
    for commodity in negative {
        densities.insert(commodity, 0.0);
    }
}
