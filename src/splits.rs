//! The time-indexed store of origin split ratios.

use crate::{Commodity, CommodityMap, DtaError, DtaResult, Network, OriginId};
use rand::Rng;
use rand_distr::{Dirichlet, Distribution};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

/// The split ratios of one origin.
#[derive(Clone, Debug, PartialEq)]
struct OriginSplits {
    /// The origin's position in the control vector.
    index: usize,
    /// The commodities the origin injects, non-compliant first.
    commodities: SmallVec<[Commodity; 4]>,
    /// The ratios at each time step.
    steps: Vec<CommodityMap>,
}

/// For every origin and time step, the fraction of the origin's arrivals
/// assigned to each commodity.
///
/// An absent entry means no ratio was supplied for that commodity at that step,
/// which is distinct from a ratio of zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitRatios {
    num_steps: usize,
    origins: SecondaryMap<OriginId, OriginSplits>,
}

impl SplitRatios {
    /// Creates an empty store sized for the given network.
    pub fn new(network: &Network) -> Self {
        let mut origins = SecondaryMap::new();
        for origin in network.origins() {
            origins.insert(
                origin.id(),
                OriginSplits {
                    index: origin.index(),
                    commodities: origin.commodities().collect(),
                    steps: vec![CommodityMap::new(); network.num_steps()],
                },
            );
        }
        Self {
            num_steps: network.num_steps(),
            origins,
        }
    }

    /// Creates a store in which every origin sends the fraction `alpha` of its
    /// arrivals as non-compliant flow, and splits the rest evenly over its
    /// compliant commodities. An origin without compliant commodities sends everything
    /// as non-compliant flow.
    ///
    /// With `alpha == 0.0` the non-compliant slots are zero, which
    /// [gradient_wrt_control](crate::objective::gradient_wrt_control) rejects
    /// with [DtaError::ZeroNonCompliantRatio]; start an optimizer from a small
    /// positive `alpha` instead.
    pub fn uniform(network: &Network, alpha: f64) -> DtaResult<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(DtaError::InvalidParameter {
                what: format!("non-compliant share {alpha} is outside [0, 1]"),
            });
        }
        let mut splits = Self::new(network);
        for origin in network.origins() {
            let compliant = origin.compliant_commodities();
            let (nc_share, share) = match compliant.len() {
                0 => (1.0, 0.0),
                n => (alpha, (1.0 - alpha) / n as f64),
            };
            for step in 0..network.num_steps() {
                splits.put(origin.id(), step, Commodity::NON_COMPLIANT, nc_share)?;
                for commodity in compliant {
                    splits.put(origin.id(), step, *commodity, share)?;
                }
            }
        }
        Ok(splits)
    }

    /// Creates a store with ratios drawn, for every origin and time step, from a
    /// symmetric Dirichlet distribution with the given concentration, so that
    /// they sum to one. Useful as a random starting point for an optimizer.
    pub fn sample<R: Rng + ?Sized>(network: &Network, concentration: f64, rng: &mut R) -> DtaResult<Self> {
        let invalid = || DtaError::InvalidParameter {
            what: format!("Dirichlet concentration {concentration} must be positive"),
        };
        if !(concentration > 0.0 && concentration.is_finite()) {
            return Err(invalid());
        }
        let mut splits = Self::new(network);
        for origin in network.origins() {
            let commodities = origin.commodities().collect::<SmallVec<[_; 4]>>();
            let distr = match commodities.len() {
                1 => None,
                n => Some(Dirichlet::new(&vec![concentration; n]).map_err(|_| invalid())?),
            };
            for step in 0..network.num_steps() {
                match &distr {
                    Some(distr) => {
                        let ratios: Vec<f64> = distr.sample(rng);
                        for (commodity, ratio) in commodities.iter().zip(ratios) {
                            splits.put(origin.id(), step, *commodity, ratio.clamp(0.0, 1.0))?;
                        }
                    }
                    None => {
                        splits.put(origin.id(), step, Commodity::NON_COMPLIANT, 1.0)?;
                    }
                }
            }
        }
        Ok(splits)
    }

    /// The number of time steps covered.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Gets the ratios of an origin at a time step.
    pub fn get(&self, origin: OriginId, step: usize) -> Option<&CommodityMap> {
        self.origins
            .get(origin)
            .and_then(|splits| splits.steps.get(step))
    }

    /// Sets the ratio of a commodity at an origin and time step,
    /// returning the previous ratio if one was present.
    pub fn put(
        &mut self,
        origin: OriginId,
        step: usize,
        commodity: Commodity,
        ratio: f64,
    ) -> DtaResult<Option<f64>> {
        let num_steps = self.num_steps;
        let splits = self.origins.get_mut(origin).ok_or(DtaError::UnknownOrigin)?;
        if !splits.commodities.contains(&commodity) {
            return Err(DtaError::UnknownCommodity { commodity });
        }
        if !(0.0..=1.0).contains(&ratio) {
            return Err(DtaError::InvalidSplitRatio {
                origin: splits.index,
                step,
                commodity,
                ratio,
            });
        }
        let ratios = splits
            .steps
            .get_mut(step)
            .ok_or(DtaError::StepOutOfRange { step, num_steps })?;
        Ok(ratios.insert(commodity, ratio))
    }

    /// The sum of the ratios present at an origin and time step.
    pub fn sum(&self, origin: OriginId, step: usize) -> f64 {
        self.get(origin, step).map(|ratios| ratios.total()).unwrap_or(0.0)
    }

    /// Checks that every ratio the network needs to simulate is present.
    pub fn validate(&self, network: &Network) -> DtaResult<()> {
        if self.num_steps != network.num_steps() {
            return Err(DtaError::invalid_network(format!(
                "split ratios cover {} steps, network has {}",
                self.num_steps,
                network.num_steps()
            )));
        }
        for origin in network.origins() {
            let splits = self.origins.get(origin.id()).ok_or(DtaError::UnknownOrigin)?;
            for (step, ratios) in splits.steps.iter().enumerate() {
                if let Some(commodity) = origin.commodities().find(|c| !ratios.contains(*c)) {
                    return Err(DtaError::MissingSplitRatio {
                        origin: origin.index(),
                        step,
                        commodity,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::SplitRatios;
    use crate::{
        CellAttributes, Commodity, DestinationAttributes, DtaError, Network, NetworkBuilder,
        OriginAttributes, OriginId, TimeDiscretization,
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::{rngs::StdRng, SeedableRng};

    /// One origin with two compliant commodities over two parallel cells.
    fn network() -> (Network, OriginId) {
        let mut builder = NetworkBuilder::new(TimeDiscretization {
            dt: 1.0,
            num_steps: 3,
        });
        let origin = builder.add_origin(&OriginAttributes {
            demand: vec![0.1; 3],
            capacity: 1.0,
        });
        let destination = builder.add_destination(&DestinationAttributes { capacity: 1.0 });
        let buffer = builder.origin_cell(origin);
        let sink = builder.destination_cell(destination);
        let a = builder.add_cell(&CellAttributes::default());
        let b = builder.add_cell(&CellAttributes::default());
        builder.add_connection(buffer, a, 0.5);
        builder.add_connection(buffer, b, 0.5);
        builder.add_connection(a, sink, 1.0);
        builder.add_connection(b, sink, 1.0);
        builder
            .add_compliant_commodity_on_route(origin, destination, &[buffer, a, sink])
            .unwrap();
        builder
            .add_compliant_commodity_on_route(origin, destination, &[buffer, b, sink])
            .unwrap();
        (builder.build().unwrap(), origin)
    }

    #[test]
    fn uniform_splits_sum_to_one() {
        let (network, origin) = network();
        let splits = SplitRatios::uniform(&network, 0.6).unwrap();
        for step in 0..3 {
            let ratios = splits.get(origin, step).unwrap();
            assert_approx_eq!(ratios.value(Commodity::NON_COMPLIANT), 0.6);
            assert_approx_eq!(ratios.value(Commodity(1)), 0.2);
            assert_approx_eq!(splits.sum(origin, step), 1.0);
        }
        splits.validate(&network).unwrap();
    }

    #[test]
    fn sampled_splits_are_feasible_and_seeded() {
        let (network, origin) = network();
        let a = SplitRatios::sample(&network, 2.0, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = SplitRatios::sample(&network, 2.0, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        for step in 0..3 {
            assert_approx_eq!(a.sum(origin, step), 1.0, 1e-9);
        }
        a.validate(&network).unwrap();
    }

    #[test]
    fn put_rejects_invalid_entries() {
        let (network, origin) = network();
        let mut splits = SplitRatios::new(&network);
        assert!(matches!(
            splits.put(origin, 0, Commodity(1), 1.5),
            Err(DtaError::InvalidSplitRatio { .. })
        ));
        assert!(matches!(
            splits.put(origin, 0, Commodity(9), 0.5),
            Err(DtaError::UnknownCommodity { .. })
        ));
        assert!(matches!(
            splits.put(origin, 3, Commodity(1), 0.5),
            Err(DtaError::StepOutOfRange { step: 3, .. })
        ));
        assert_eq!(splits.put(origin, 0, Commodity(1), 0.5), Ok(None));
        assert_eq!(splits.put(origin, 0, Commodity(1), 0.25), Ok(Some(0.5)));
    }

    #[test]
    fn validate_reports_first_missing_entry() {
        let (network, origin) = network();
        let mut splits = SplitRatios::uniform(&network, 0.5).unwrap();
        splits.origins[origin].steps[1].remove(Commodity(2));
        assert_eq!(
            splits.validate(&network),
            Err(DtaError::MissingSplitRatio {
                origin: 0,
                step: 1,
                commodity: Commodity(2),
            })
        );
    }
}
