pub use commodity::{Commodity, CommodityMap};
pub use error::{DtaError, DtaResult};
pub use layout::{BlockSpec, ControlLayout, Schema, StateLayout};
pub use network::{
    Cell, CellAttributes, CellKind, Destination, DestinationAttributes, Network, NetworkBuilder,
    Origin, OriginAttributes, Route, Successor, TimeDiscretization,
};
pub use objective::BarrierParams;
pub use problem::{AdjointProblem, Iterate, SystemOptimalProblem};
pub use profile::{CellInfo, Profile, StepSummary, Trajectory};
pub use simulation::Simulator;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use splits::SplitRatios;
pub use util::{Jacobian, SparseVector};

pub mod codec;
mod commodity;
mod error;
mod layout;
mod network;
pub mod objective;
mod problem;
mod profile;
mod simulation;
mod splits;
mod util;

new_key_type! {
    /// Unique ID of a [Cell].
    pub struct CellId;
    /// Unique ID of an [Origin].
    pub struct OriginId;
    /// Unique ID of a [Destination].
    pub struct DestinationId;
}

type CellSet = SlotMap<CellId, Cell>;
