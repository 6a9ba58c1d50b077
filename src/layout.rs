//! Flat vector layouts.
//!
//! Both the control vector and the state vector are a repetition, once per
//! time step, of a fixed sequence of named blocks. A [Schema] describes that
//! sequence and is the only place their index arithmetic lives.

use crate::Commodity;
use smallvec::SmallVec;
use std::ops::Range;

/// A named, fixed-size block of a per-step layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSpec {
    pub name: &'static str,
    pub len: usize,
}

/// An ordered list of blocks, repeated once per time step.
#[derive(Clone, Debug)]
pub struct Schema {
    steps: usize,
    blocks: Vec<BlockSpec>,
    offsets: Vec<usize>,
    stride: usize,
}

impl Schema {
    /// Creates a schema repeating `blocks` for `steps` time steps.
    pub fn new(steps: usize, blocks: Vec<BlockSpec>) -> Self {
        let offsets = blocks
            .iter()
            .scan(0, |offset, block| {
                let start = *offset;
                *offset += block.len;
                Some(start)
            })
            .collect();
        let stride = blocks.iter().map(|block| block.len).sum();
        Self {
            steps,
            blocks,
            offsets,
            stride,
        }
    }

    /// The number of time steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The size of the layout for one time step.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The total length of the flat vector.
    pub fn len(&self) -> usize {
        self.steps * self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The blocks of one time step, in order.
    pub fn blocks(&self) -> &[BlockSpec] {
        &self.blocks
    }

    /// The flat index of entry `offset` of `block` at time step `step`.
    pub fn index(&self, step: usize, block: usize, offset: usize) -> usize {
        debug_assert!(step < self.steps);
        debug_assert!(offset < self.blocks[block].len, "offset outside block {}", self.blocks[block].name);
        step * self.stride + self.offsets[block] + offset
    }

    /// The flat index range covered by `block` at time step `step`.
    pub fn block_range(&self, step: usize, block: usize) -> Range<usize> {
        let start = step * self.stride + self.offsets[block];
        start..(start + self.blocks[block].len)
    }
}

/// Layout of the control vector: one block per origin, holding the
/// non-compliant split ratio followed by each compliant split ratio
/// in the order the origin declares its commodities.
#[derive(Clone, Debug)]
pub struct ControlLayout {
    schema: Schema,
    commodities: Vec<SmallVec<[Commodity; 4]>>,
}

impl ControlLayout {
    /// Creates the layout from the compliant commodities of each origin, in origin order.
    pub(crate) fn new<'a>(steps: usize, origins: impl Iterator<Item = &'a [Commodity]>) -> Self {
        let commodities = origins
            .map(|compliant| {
                std::iter::once(Commodity::NON_COMPLIANT)
                    .chain(compliant.iter().copied())
                    .collect::<SmallVec<[_; 4]>>()
            })
            .collect::<Vec<_>>();
        let blocks = commodities
            .iter()
            .map(|slots| BlockSpec {
                name: "origin",
                len: slots.len(),
            })
            .collect();
        Self {
            schema: Schema::new(steps, blocks),
            commodities,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The length of the control vector.
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// The commodities of an origin's block, non-compliant first.
    pub fn commodities(&self, origin: usize) -> &[Commodity] {
        &self.commodities[origin]
    }

    /// The index of the non-compliant slot of an origin at a time step.
    pub fn non_compliant_slot(&self, step: usize, origin: usize) -> usize {
        self.schema.index(step, origin, 0)
    }

    /// The index range of all the slots of an origin at a time step.
    pub fn origin_slots(&self, step: usize, origin: usize) -> Range<usize> {
        self.schema.block_range(step, origin)
    }

    /// Iterates over `(index, commodity)` for the slots of an origin at a time step.
    pub fn slots(&self, step: usize, origin: usize) -> impl Iterator<Item = (usize, Commodity)> + '_ {
        self.origin_slots(step, origin)
            .zip(self.commodities[origin].iter().copied())
    }
}

const DENSITY_BLOCK: usize = 0;
const DEMAND_SUPPLY_BLOCK: usize = 1;
const OUT_FLOW_BLOCK: usize = 2;
const IN_FLOW_BLOCK: usize = 3;

/// Layout of the state vector. Per time step: partial densities,
/// then demand/supply pairs, then out-flows, then in-flows.
#[derive(Clone, Debug)]
pub struct StateLayout {
    schema: Schema,
    num_commodities: usize,
}

impl StateLayout {
    /// Creates the layout for `num_cells` cells carrying `num_compliant` compliant commodities.
    pub(crate) fn new(steps: usize, num_cells: usize, num_compliant: usize) -> Self {
        let num_commodities = num_compliant + 1;
        let per_commodity = num_cells * num_commodities;
        let blocks = vec![
            BlockSpec {
                name: "density",
                len: per_commodity,
            },
            BlockSpec {
                name: "demand_supply",
                len: 2 * num_cells,
            },
            BlockSpec {
                name: "out_flow",
                len: per_commodity,
            },
            BlockSpec {
                name: "in_flow",
                len: per_commodity,
            },
        ];
        Self {
            schema: Schema::new(steps, blocks),
            num_commodities,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The length of the state vector.
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// Index of the partial density of `commodity` in `cell` at `step`.
    pub fn density(&self, step: usize, cell: usize, commodity: Commodity) -> usize {
        self.per_commodity(step, DENSITY_BLOCK, cell, commodity)
    }

    pub fn demand(&self, step: usize, cell: usize) -> usize {
        self.schema.index(step, DEMAND_SUPPLY_BLOCK, 2 * cell)
    }

    pub fn supply(&self, step: usize, cell: usize) -> usize {
        self.schema.index(step, DEMAND_SUPPLY_BLOCK, 2 * cell + 1)
    }

    pub fn out_flow(&self, step: usize, cell: usize, commodity: Commodity) -> usize {
        self.per_commodity(step, OUT_FLOW_BLOCK, cell, commodity)
    }

    pub fn in_flow(&self, step: usize, cell: usize, commodity: Commodity) -> usize {
        self.per_commodity(step, IN_FLOW_BLOCK, cell, commodity)
    }

    /// The index range of the partial densities at `step`.
    pub fn density_range(&self, step: usize) -> Range<usize> {
        self.schema.block_range(step, DENSITY_BLOCK)
    }

    fn per_commodity(&self, step: usize, block: usize, cell: usize, commodity: Commodity) -> usize {
        debug_assert!(commodity.index() < self.num_commodities);
        self.schema
            .index(step, block, cell * self.num_commodities + commodity.index())
    }
}
