use crate::{CellId, Commodity};
use smallvec::SmallVec;

/// The role a cell plays in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellKind {
    /// A road segment governed by a triangular fundamental diagram.
    Ordinary,
    /// The queue in front of an origin. Accepts any arrival.
    Buffer,
    /// The exit behind a destination. Flow entering it leaves the network.
    Sink,
}

/// The attributes of an ordinary cell.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellAttributes {
    /// The length of the cell.
    pub length: f64,
    /// The free-flow speed.
    pub free_flow_speed: f64,
    /// The backward congestion wave speed.
    pub congestion_speed: f64,
    /// The maximum flow through the cell per unit time.
    pub capacity: f64,
    /// The density at which traffic comes to a standstill.
    pub jam_density: f64,
}

impl Default for CellAttributes {
    /// A normalized cell: unit length, unit speeds, a capacity of one
    /// third and a jam density of one.
    fn default() -> Self {
        Self {
            length: 1.0,
            free_flow_speed: 1.0,
            congestion_speed: 0.5,
            capacity: 1.0 / 3.0,
            jam_density: 1.0,
        }
    }
}

/// A connection to a downstream cell.
#[derive(Clone, Copy, Debug)]
pub struct Successor {
    /// The downstream cell.
    pub cell: CellId,
    /// The dense index of the downstream cell.
    pub index: usize,
    /// The fraction of the non-compliant flow that turns into the downstream cell.
    pub turning_ratio: f64,
}

/// A discretized road segment, the atomic unit of the simulation.
#[derive(Clone, Debug)]
pub struct Cell {
    /// The cell ID.
    id: CellId,
    /// The position of the cell in every flat vector.
    index: usize,
    /// The role of the cell.
    kind: CellKind,
    /// The fundamental diagram parameters.
    attribs: CellAttributes,
    /// The cells that succeed this one.
    successors: SmallVec<[Successor; 2]>,
    /// The cells that precede this one.
    predecessors: SmallVec<[CellId; 2]>,
    /// The next cell of each compliant commodity routed through this one, ordered by commodity.
    route_hops: SmallVec<[(Commodity, usize); 2]>,
}

impl Cell {
    pub(crate) fn new(id: CellId, index: usize, kind: CellKind, attribs: CellAttributes) -> Self {
        Self {
            id,
            index,
            kind,
            attribs,
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            route_hops: SmallVec::new(),
        }
    }

    /// Gets the cell's ID.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Gets the cell's position in every flat vector.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn attributes(&self) -> &CellAttributes {
        &self.attribs
    }

    pub fn length(&self) -> f64 {
        self.attribs.length
    }

    pub fn is_sink(&self) -> bool {
        self.kind == CellKind::Sink
    }

    pub fn is_buffer(&self) -> bool {
        self.kind == CellKind::Buffer
    }

    /// The downstream connections.
    pub fn successors(&self) -> &[Successor] {
        &self.successors
    }

    /// The upstream connections.
    pub fn predecessors(&self) -> &[CellId] {
        &self.predecessors
    }

    /// The index of the next cell on the route of a compliant commodity.
    pub fn route_hop(&self, commodity: Commodity) -> Option<usize> {
        self.route_hops
            .binary_search_by_key(&commodity, |(c, _)| *c)
            .ok()
            .map(|idx| self.route_hops[idx].1)
    }

    /// The cells a commodity is sent to from this cell, with the fraction sent to each.
    pub(crate) fn next_cells(&self, commodity: Commodity) -> SmallVec<[(usize, f64); 2]> {
        if commodity.is_compliant() {
            self.route_hop(commodity)
                .map(|index| (index, 1.0))
                .into_iter()
                .collect()
        } else {
            self.successors
                .iter()
                .filter(|succ| succ.turning_ratio > 0.0)
                .map(|succ| (succ.index, succ.turning_ratio))
                .collect()
        }
    }

    /// The flow the cell would send downstream at the given total density.
    pub fn demand(&self, density: f64, dt: f64) -> f64 {
        let attribs = &self.attribs;
        match self.kind {
            CellKind::Ordinary => f64::min(attribs.free_flow_speed * density, attribs.capacity),
            // Every queued vehicle may leave within one step, up to capacity
            CellKind::Buffer => f64::min(density * attribs.length / dt, attribs.capacity),
            CellKind::Sink => 0.0,
        }
    }

    /// The flow the cell can receive from upstream at the given total density.
    pub fn supply(&self, density: f64) -> f64 {
        let attribs = &self.attribs;
        match self.kind {
            CellKind::Ordinary => (attribs.congestion_speed * (attribs.jam_density - density))
                .clamp(0.0, attribs.capacity),
            // Unbounded, as f64::MAX so flat state vectors stay finite
            CellKind::Buffer => f64::MAX,
            CellKind::Sink => attribs.capacity,
        }
    }

    pub(crate) fn add_successor(&mut self, successor: Successor) {
        self.successors.push(successor);
    }

    pub(crate) fn add_predecessor(&mut self, cell: CellId) {
        self.predecessors.push(cell);
    }

    pub(crate) fn add_route_hop(&mut self, commodity: Commodity, index: usize) {
        let pos = self
            .route_hops
            .binary_search_by_key(&commodity, |(c, _)| *c)
            .unwrap_or_else(|pos| pos);
        self.route_hops.insert(pos, (commodity, index));
    }
}

#[cfg(test)]
mod test {
    use super::{Cell, CellAttributes, CellKind};
    use crate::CellId;
    use assert_approx_eq::assert_approx_eq;

    fn ordinary() -> Cell {
        Cell::new(CellId::default(), 0, CellKind::Ordinary, CellAttributes::default())
    }

    #[test]
    fn triangular_demand() {
        let cell = ordinary();
        assert_approx_eq!(cell.demand(0.0, 1.0), 0.0);
        assert_approx_eq!(cell.demand(0.2, 1.0), 0.2);
        assert_approx_eq!(cell.demand(0.9, 1.0), 1.0 / 3.0);
    }

    #[test]
    fn triangular_supply() {
        let cell = ordinary();
        assert_approx_eq!(cell.supply(0.0), 1.0 / 3.0);
        assert_approx_eq!(cell.supply(0.6), 0.2);
        assert_approx_eq!(cell.supply(1.0), 0.0);
        assert_approx_eq!(cell.supply(1.2), 0.0);
    }

    #[test]
    fn buffer_and_sink() {
        let attribs = CellAttributes {
            capacity: 2.0,
            ..Default::default()
        };
        let buffer = Cell::new(CellId::default(), 0, CellKind::Buffer, attribs);
        assert_approx_eq!(buffer.demand(1.5, 1.0), 1.5);
        assert_approx_eq!(buffer.demand(5.0, 1.0), 2.0);
        assert_eq!(buffer.supply(100.0), f64::MAX);

        let sink = Cell::new(CellId::default(), 1, CellKind::Sink, attribs);
        assert_eq!(sink.demand(1.0, 1.0), 0.0);
        assert_approx_eq!(sink.supply(0.0), 2.0);
    }
}
