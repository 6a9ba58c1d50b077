//! The static description of a road network.

pub use cell::{Cell, CellAttributes, CellKind, Successor};

use crate::layout::{ControlLayout, StateLayout};
use crate::{CellId, CellSet, Commodity, CommodityMap, DestinationId, DtaError, DtaResult, OriginId};
use itertools::Itertools;
use log::info;
use slotmap::SlotMap;
use smallvec::SmallVec;

mod cell;

/// Tolerance on the non-compliant turning ratios out of a cell summing to one.
const TURNING_RATIO_TOLERANCE: f64 = 1e-9;

/// Length of buffer and sink cells. Their densities are vehicle counts.
const POINT_CELL_LENGTH: f64 = 1.0;

/// The time discretization of a simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeDiscretization {
    /// The duration of one time step.
    pub dt: f64,
    /// The number of time steps simulated.
    pub num_steps: usize,
}

/// The attributes of an origin.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OriginAttributes {
    /// The flow arriving at the origin during each time step.
    pub demand: Vec<f64>,
    /// The maximum flow leaving the origin's queue per unit time.
    pub capacity: f64,
}

/// The attributes of a destination.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DestinationAttributes {
    /// The maximum flow leaving the network through the destination per unit time.
    pub capacity: f64,
}

/// A network entry point.
#[derive(Clone, Debug)]
pub struct Origin {
    id: OriginId,
    index: usize,
    buffer: CellId,
    demand: Vec<f64>,
    compliant: SmallVec<[Commodity; 4]>,
}

impl Origin {
    pub fn id(&self) -> OriginId {
        self.id
    }

    /// Gets the origin's position in the control vector.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The buffer cell queueing the origin's arrivals.
    pub fn buffer(&self) -> CellId {
        self.buffer
    }

    /// The flow arriving at the origin during each time step.
    pub fn demand(&self) -> &[f64] {
        &self.demand
    }

    /// The compliant commodities injected by this origin, in declaration order.
    pub fn compliant_commodities(&self) -> &[Commodity] {
        &self.compliant
    }

    /// Every commodity injected by this origin, non-compliant first.
    pub fn commodities(&self) -> impl Iterator<Item = Commodity> + '_ {
        std::iter::once(Commodity::NON_COMPLIANT).chain(self.compliant.iter().copied())
    }
}

/// A network exit point.
#[derive(Clone, Debug)]
pub struct Destination {
    id: DestinationId,
    index: usize,
    sink: CellId,
}

impl Destination {
    pub fn id(&self) -> DestinationId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The sink cell absorbing the destination's arrivals.
    pub fn sink(&self) -> CellId {
        self.sink
    }
}

/// The fixed path of a compliant commodity, from an origin buffer to a destination sink.
#[derive(Clone, Debug)]
pub struct Route {
    pub commodity: Commodity,
    pub origin: OriginId,
    pub destination: DestinationId,
    pub cells: Vec<CellId>,
}

/// An immutable road network: cells, origins, destinations and compliant routes.
#[derive(Clone, Debug)]
pub struct Network {
    time: TimeDiscretization,
    cells: CellSet,
    cell_order: Vec<CellId>,
    origins: SlotMap<OriginId, Origin>,
    origin_order: Vec<OriginId>,
    destinations: SlotMap<DestinationId, Destination>,
    destination_order: Vec<DestinationId>,
    routes: Vec<Route>,
    initial_densities: Vec<CommodityMap>,
    control_layout: ControlLayout,
    state_layout: StateLayout,
}

impl Network {
    pub fn time(&self) -> TimeDiscretization {
        self.time
    }

    /// The duration of one time step.
    pub fn dt(&self) -> f64 {
        self.time.dt
    }

    /// The number of time steps, `T`.
    pub fn num_steps(&self) -> usize {
        self.time.num_steps
    }

    pub fn num_cells(&self) -> usize {
        self.cell_order.len()
    }

    /// The number of origins, `O`.
    pub fn num_origins(&self) -> usize {
        self.origin_order.len()
    }

    pub fn num_destinations(&self) -> usize {
        self.destination_order.len()
    }

    /// The number of compliant commodities, `C`.
    pub fn num_compliant(&self) -> usize {
        self.routes.len()
    }

    /// Iterates over the cells in index order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cell_order.iter().map(|id| &self.cells[*id])
    }

    /// Gets a reference to the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Gets a reference to the cell at the given index.
    pub fn cell_at(&self, index: usize) -> &Cell {
        &self.cells[self.cell_order[index]]
    }

    /// Iterates over the origins in index order.
    pub fn origins(&self) -> impl Iterator<Item = &Origin> + '_ {
        self.origin_order.iter().map(|id| &self.origins[*id])
    }

    pub fn origin(&self, id: OriginId) -> Option<&Origin> {
        self.origins.get(id)
    }

    /// Iterates over the destinations in index order.
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> + '_ {
        self.destination_order
            .iter()
            .map(|id| &self.destinations[*id])
    }

    pub fn destination(&self, id: DestinationId) -> Option<&Destination> {
        self.destinations.get(id)
    }

    /// The route of a compliant commodity.
    pub fn route(&self, commodity: Commodity) -> Option<&Route> {
        commodity
            .index()
            .checked_sub(1)
            .and_then(|idx| self.routes.get(idx))
    }

    /// The partial densities at the first time step, by cell index.
    pub fn initial_densities(&self) -> &[CommodityMap] {
        &self.initial_densities
    }

    pub fn control_layout(&self) -> &ControlLayout {
        &self.control_layout
    }

    pub fn state_layout(&self) -> &StateLayout {
        &self.state_layout
    }
}

/// Assembles a [Network].
pub struct NetworkBuilder {
    time: TimeDiscretization,
    cells: CellSet,
    cell_order: Vec<CellId>,
    origins: SlotMap<OriginId, Origin>,
    origin_order: Vec<OriginId>,
    destinations: SlotMap<DestinationId, Destination>,
    destination_order: Vec<DestinationId>,
    routes: Vec<Route>,
    initial_densities: Vec<(CellId, Commodity, f64)>,
}

impl NetworkBuilder {
    /// Creates an empty network with the given time discretization.
    pub fn new(time: TimeDiscretization) -> Self {
        Self {
            time,
            cells: SlotMap::with_key(),
            cell_order: vec![],
            origins: SlotMap::with_key(),
            origin_order: vec![],
            destinations: SlotMap::with_key(),
            destination_order: vec![],
            routes: vec![],
            initial_densities: vec![],
        }
    }

    /// Adds an ordinary cell to the network.
    pub fn add_cell(&mut self, attributes: &CellAttributes) -> CellId {
        self.insert_cell(CellKind::Ordinary, *attributes)
    }

    /// Specifies that the `from` cell feeds the `to` cell, sending the given
    /// fraction of its non-compliant flow there.
    pub fn add_connection(&mut self, from: CellId, to: CellId, turning_ratio: f64) {
        let index = self.cells[to].index();
        self.cells[from].add_successor(Successor {
            cell: to,
            index,
            turning_ratio,
        });
        self.cells[to].add_predecessor(from);
    }

    /// Adds an origin, together with the buffer cell queueing its arrivals.
    /// The buffer must then be connected to the network with [Self::add_connection].
    pub fn add_origin(&mut self, attributes: &OriginAttributes) -> OriginId {
        let buffer = self.insert_cell(
            CellKind::Buffer,
            CellAttributes {
                length: POINT_CELL_LENGTH,
                capacity: attributes.capacity,
                ..Default::default()
            },
        );
        let index = self.origin_order.len();
        let id = self.origins.insert_with_key(|id| Origin {
            id,
            index,
            buffer,
            demand: attributes.demand.clone(),
            compliant: SmallVec::new(),
        });
        self.origin_order.push(id);
        id
    }

    /// Adds a destination, together with its sink cell.
    pub fn add_destination(&mut self, attributes: &DestinationAttributes) -> DestinationId {
        let sink = self.insert_cell(
            CellKind::Sink,
            CellAttributes {
                length: POINT_CELL_LENGTH,
                capacity: attributes.capacity,
                ..Default::default()
            },
        );
        let index = self.destination_order.len();
        let id = self
            .destinations
            .insert_with_key(|id| Destination { id, index, sink });
        self.destination_order.push(id);
        id
    }

    /// Gets the buffer cell of an origin.
    pub fn origin_cell(&self, origin: OriginId) -> CellId {
        self.origins[origin].buffer
    }

    /// Gets the sink cell of a destination.
    pub fn destination_cell(&self, destination: DestinationId) -> CellId {
        self.destinations[destination].sink
    }

    /// Sets the initial partial density of a commodity in an ordinary cell.
    pub fn set_initial_density(&mut self, cell: CellId, commodity: Commodity, density: f64) {
        self.initial_densities.push((cell, commodity, density));
    }

    /// Adds a compliant commodity injected at `origin`, following the fastest
    /// free-flow route to `destination`.
    pub fn add_compliant_commodity(
        &mut self,
        origin: OriginId,
        destination: DestinationId,
    ) -> DtaResult<Commodity> {
        let src = self.origins.get(origin).ok_or(DtaError::UnknownOrigin)?.buffer;
        let dst = self
            .destinations
            .get(destination)
            .ok_or_else(|| DtaError::invalid_network("unknown destination"))?
            .sink;
        let dt = self.time.dt;
        let (cells, _) = pathfinding::directed::dijkstra::dijkstra(
            &src,
            |id| {
                self.cells[*id]
                    .successors()
                    .iter()
                    .map(|succ| (succ.cell, traversal_steps(&self.cells[succ.cell], dt)))
                    .collect::<SmallVec<[_; 2]>>()
            },
            |id| *id == dst,
        )
        .ok_or_else(|| DtaError::invalid_network("destination is unreachable from origin"))?;
        self.add_compliant_commodity_on_route(origin, destination, &cells)
    }

    /// Adds a compliant commodity injected at `origin` and following the given
    /// route, which must run from the origin's buffer to the destination's sink.
    pub fn add_compliant_commodity_on_route(
        &mut self,
        origin: OriginId,
        destination: DestinationId,
        cells: &[CellId],
    ) -> DtaResult<Commodity> {
        let src = self.origins.get(origin).ok_or(DtaError::UnknownOrigin)?.buffer;
        let dst = self
            .destinations
            .get(destination)
            .ok_or_else(|| DtaError::invalid_network("unknown destination"))?
            .sink;
        if cells.first() != Some(&src) || cells.last() != Some(&dst) {
            return Err(DtaError::invalid_network(
                "route must start at the origin buffer and end at the destination sink",
            ));
        }
        if !cells.iter().all_unique() {
            return Err(DtaError::invalid_network("route visits a cell twice"));
        }
        for (from, to) in cells.iter().tuple_windows() {
            if !self.cells[*from].successors().iter().any(|s| s.cell == *to) {
                return Err(DtaError::invalid_network("route uses a missing connection"));
            }
        }

        let commodity = Commodity(self.routes.len() as u32 + 1);
        for (from, to) in cells.iter().tuple_windows() {
            let index = self.cells[*to].index();
            self.cells[*from].add_route_hop(commodity, index);
        }
        self.origins[origin].compliant.push(commodity);
        self.routes.push(Route {
            commodity,
            origin,
            destination,
            cells: cells.to_vec(),
        });
        Ok(commodity)
    }

    /// Validates the network and freezes it.
    pub fn build(self) -> DtaResult<Network> {
        let TimeDiscretization { dt, num_steps } = self.time;
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(DtaError::invalid_network("time step must be positive"));
        }
        if num_steps == 0 {
            return Err(DtaError::invalid_network("horizon must contain at least one step"));
        }
        for id in &self.cell_order {
            self.validate_cell(&self.cells[*id])?;
        }
        for origin in self.origin_order.iter().map(|id| &self.origins[*id]) {
            if origin.demand.len() != num_steps {
                return Err(DtaError::invalid_network(format!(
                    "origin {} has {} demand values for {} steps",
                    origin.index,
                    origin.demand.len(),
                    num_steps
                )));
            }
            if origin.demand.iter().any(|d| !(d.is_finite() && *d >= 0.0)) {
                return Err(DtaError::invalid_network(format!(
                    "origin {} has a negative or non-finite demand",
                    origin.index
                )));
            }
        }

        let mut initial_densities = vec![CommodityMap::new(); self.cell_order.len()];
        for (cell_id, commodity, density) in &self.initial_densities {
            let cell = &self.cells[*cell_id];
            if cell.is_sink() {
                return Err(DtaError::invalid_network("sink cells cannot hold traffic"));
            }
            if !(density.is_finite() && *density >= 0.0) {
                return Err(DtaError::invalid_network("initial density must be non-negative"));
            }
            if commodity.index() > self.routes.len() {
                return Err(DtaError::UnknownCommodity {
                    commodity: *commodity,
                });
            }
            if commodity.is_compliant() && cell.route_hop(*commodity).is_none() {
                return Err(DtaError::invalid_network(
                    "initial compliant density lies off the commodity's route",
                ));
            }
            initial_densities[cell.index()].add(*commodity, *density);
        }

        let control_layout = ControlLayout::new(
            num_steps,
            self.origin_order
                .iter()
                .map(|id| self.origins[*id].compliant_commodities()),
        );
        let state_layout = StateLayout::new(num_steps, self.cell_order.len(), self.routes.len());

        info!(
            "Built network: {} cells, {} origins, {} destinations, {} compliant commodities, {} steps",
            self.cell_order.len(),
            self.origin_order.len(),
            self.destination_order.len(),
            self.routes.len(),
            num_steps
        );

        Ok(Network {
            time: self.time,
            cells: self.cells,
            cell_order: self.cell_order,
            origins: self.origins,
            origin_order: self.origin_order,
            destinations: self.destinations,
            destination_order: self.destination_order,
            routes: self.routes,
            initial_densities,
            control_layout,
            state_layout,
        })
    }

    fn insert_cell(&mut self, kind: CellKind, attribs: CellAttributes) -> CellId {
        let index = self.cell_order.len();
        let id = self
            .cells
            .insert_with_key(|id| Cell::new(id, index, kind, attribs));
        self.cell_order.push(id);
        id
    }

    fn validate_cell(&self, cell: &Cell) -> DtaResult<()> {
        let index = cell.index();
        let attribs = cell.attributes();
        let positive = |value: f64| value > 0.0 && value.is_finite();

        if !positive(attribs.length) || !positive(attribs.capacity) {
            return Err(DtaError::invalid_network(format!(
                "cell {index} needs a positive length and capacity"
            )));
        }
        match cell.kind() {
            CellKind::Ordinary => {
                if !positive(attribs.free_flow_speed)
                    || !positive(attribs.congestion_speed)
                    || !positive(attribs.jam_density)
                {
                    return Err(DtaError::invalid_network(format!(
                        "cell {index} needs positive speeds and jam density"
                    )));
                }
                let max_speed = f64::max(attribs.free_flow_speed, attribs.congestion_speed);
                if max_speed * self.time.dt > attribs.length {
                    return Err(DtaError::invalid_network(format!(
                        "cell {index} violates the CFL condition"
                    )));
                }
            }
            CellKind::Buffer => {
                if !cell.predecessors().is_empty() {
                    return Err(DtaError::invalid_network(format!(
                        "origin buffer {index} cannot have upstream connections"
                    )));
                }
            }
            CellKind::Sink => {
                if !cell.successors().is_empty() {
                    return Err(DtaError::invalid_network(format!(
                        "sink {index} cannot have downstream connections"
                    )));
                }
                return Ok(());
            }
        }

        if cell.successors().is_empty() {
            return Err(DtaError::invalid_network(format!(
                "cell {index} has no downstream connection"
            )));
        }
        if cell
            .successors()
            .iter()
            .any(|succ| !(0.0..=1.0).contains(&succ.turning_ratio))
        {
            return Err(DtaError::invalid_network(format!(
                "cell {index} has a turning ratio outside [0, 1]"
            )));
        }
        let total: f64 = cell.successors().iter().map(|succ| succ.turning_ratio).sum();
        if (total - 1.0).abs() > TURNING_RATIO_TOLERANCE {
            return Err(DtaError::invalid_network(format!(
                "turning ratios out of cell {index} sum to {total}"
            )));
        }
        Ok(())
    }
}

/// The number of time steps needed to cross a cell at free-flow speed.
fn traversal_steps(cell: &Cell, dt: f64) -> u64 {
    match cell.kind() {
        CellKind::Ordinary => {
            let attribs = cell.attributes();
            (attribs.length / (attribs.free_flow_speed * dt)).ceil() as u64
        }
        CellKind::Buffer | CellKind::Sink => 0,
    }
}
