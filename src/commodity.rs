//! Commodity identifiers and sparse per-commodity maps.

use smallvec::SmallVec;
use std::fmt::Debug;

/// A distinguishable class of flow.
///
/// Commodity 0 is the non-compliant (uncontrolled) aggregate flow;
/// commodities 1 and above are compliant flows, each following its own route.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Commodity(pub u32);

impl Commodity {
    /// The non-compliant aggregate flow.
    pub const NON_COMPLIANT: Commodity = Commodity(0);

    /// Whether this is a compliant (controllable) flow.
    pub fn is_compliant(self) -> bool {
        self.0 != 0
    }

    /// The commodity as an offset into a per-commodity block of a flat vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for Commodity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_compliant() {
            write!(f, "Commodity({})", self.0)
        } else {
            write!(f, "Commodity(NC)")
        }
    }
}

/// A sparse map from commodity to value, ordered by commodity.
///
/// An absent entry reads as zero but is distinct from a present zero:
/// a present entry means the value was supplied (or computed) for that commodity.
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommodityMap {
    entries: SmallVec<[(Commodity, f64); 4]>,
}

impl CommodityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the value for a commodity, if present.
    pub fn get(&self, commodity: Commodity) -> Option<f64> {
        self.position(commodity)
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    /// Gets the value for a commodity, reading absent entries as zero.
    pub fn value(&self, commodity: Commodity) -> f64 {
        self.get(commodity).unwrap_or(0.0)
    }

    /// Whether a value is present for the commodity.
    pub fn contains(&self, commodity: Commodity) -> bool {
        self.position(commodity).is_ok()
    }

    /// Sets the value for a commodity, returning the previous value if present.
    pub fn insert(&mut self, commodity: Commodity, value: f64) -> Option<f64> {
        match self.position(commodity) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            Err(idx) => {
                self.entries.insert(idx, (commodity, value));
                None
            }
        }
    }

    /// Adds to the value for a commodity, inserting it if absent.
    pub fn add(&mut self, commodity: Commodity, value: f64) {
        match self.position(commodity) {
            Ok(idx) => self.entries[idx].1 += value,
            Err(idx) => self.entries.insert(idx, (commodity, value)),
        }
    }

    /// Removes the entry for a commodity.
    pub fn remove(&mut self, commodity: Commodity) -> Option<f64> {
        self.position(commodity)
            .ok()
            .map(|idx| self.entries.remove(idx).1)
    }

    /// Iterates over the present entries in commodity order.
    pub fn iter(&self) -> impl Iterator<Item = (Commodity, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// The number of present entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sum of all present values.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, value)| value).sum()
    }

    fn position(&self, commodity: Commodity) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&commodity, |(c, _)| *c)
    }
}

impl FromIterator<(Commodity, f64)> for CommodityMap {
    fn from_iter<I: IntoIterator<Item = (Commodity, f64)>>(iter: I) -> Self {
        let mut map = CommodityMap::new();
        for (commodity, value) in iter {
            map.insert(commodity, value);
        }
        map
    }
}

impl Debug for CommodityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
