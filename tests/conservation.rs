//! Flow conservation and determinism of the cell transmission model.

mod common;

use rand::{rngs::StdRng, SeedableRng};
use traffic_dta::{Commodity, Network, Simulator, SplitRatios, Trajectory};

const TOLERANCE: f64 = 1e-12;

fn simulate(network: &Network, seed: u64) -> Trajectory {
    let splits = SplitRatios::sample(network, 1.0, &mut StdRng::seed_from_u64(seed)).unwrap();
    let mut sim = Simulator::new(network.clone(), splits);
    sim.run(true).unwrap().clone()
}

fn commodities(network: &Network) -> impl Iterator<Item = Commodity> {
    (0..=network.num_compliant() as u32).map(Commodity)
}

#[test]
fn every_commodity_is_conserved_per_cell() {
    let network = common::merge_diverge(24);
    let trajectory = simulate(&network, 11);
    let dt = network.dt();

    for (now, next) in trajectory.profiles().iter().zip(&trajectory.profiles()[1..]) {
        for cell in network.cells().filter(|cell| !cell.is_sink()) {
            let (info, after) = (now.get(cell.index()), next.get(cell.index()));
            let scale = dt / cell.length();
            for commodity in commodities(&network) {
                let expected = info.partial_densities.value(commodity)
                    + scale * (info.in_flows.value(commodity) - info.out_flows.value(commodity));
                let actual = after.partial_densities.value(commodity);
                assert!(
                    (expected - actual).abs() < TOLERANCE,
                    "cell {} {:?}: {} != {}",
                    cell.index(),
                    commodity,
                    expected,
                    actual
                );
            }
        }
    }
}

#[test]
fn flows_respect_demand_and_supply() {
    let network = common::merge_diverge(24);
    let trajectory = simulate(&network, 5);

    let mut congested = false;
    for profile in trajectory.profiles() {
        for cell in network.cells() {
            let info = profile.get(cell.index());
            if !cell.is_sink() {
                assert!(info.total_out_flow() <= info.demand + TOLERANCE);
            }
            assert!(info.total_in_flow() <= info.supply + TOLERANCE);
            congested |= info.total_out_flow() < info.demand - 1e-6;
        }
    }
    assert!(congested, "the scenario should exercise a binding supply");
}

#[test]
fn no_vehicles_are_created_between_cells() {
    let network = common::merge_diverge(24);
    let trajectory = simulate(&network, 3);

    for profile in trajectory.profiles() {
        for commodity in commodities(&network) {
            let sent: f64 = network
                .cells()
                .filter(|cell| !cell.is_sink())
                .map(|cell| profile.get(cell.index()).out_flows.value(commodity))
                .sum();
            let received: f64 = network
                .cells()
                .filter(|cell| !cell.is_buffer())
                .map(|cell| profile.get(cell.index()).in_flows.value(commodity))
                .sum();
            assert!((sent - received).abs() < TOLERANCE, "{commodity:?}: {sent} != {received}");
        }
    }
}

#[test]
fn compliant_flow_stays_on_its_route() {
    let network = common::merge_diverge(24);
    let trajectory = simulate(&network, 8);

    for commodity in (1..=network.num_compliant() as u32).map(Commodity) {
        let route = &network.route(commodity).unwrap().cells;
        for profile in trajectory.profiles() {
            for cell in network.cells().filter(|cell| !route.contains(&cell.id())) {
                assert_eq!(profile.get(cell.index()).partial_densities.value(commodity), 0.0);
            }
        }
    }
}

#[test]
fn identical_inputs_give_identical_trajectories() {
    let network = common::merge_diverge(16);
    assert_eq!(simulate(&network, 42), simulate(&network, 42));
    assert_ne!(simulate(&network, 42), simulate(&network, 43));
}
