//! The optimizer-facing evaluation pipeline.

mod common;

use traffic_dta::objective::objective;
use traffic_dta::{
    AdjointProblem, BarrierParams, DtaError, Simulator, SplitRatios, SystemOptimalProblem,
};

fn problem() -> SystemOptimalProblem {
    let network = common::merge_diverge(12);
    let splits = SplitRatios::uniform(&network, 0.9).unwrap();
    SystemOptimalProblem::new(Simulator::new(network, splits), BarrierParams::default()).unwrap()
}

#[test]
fn vector_lengths_follow_network_counts() {
    let problem = problem();
    let network = problem.network();
    let (steps, compliant, origins) = (12, network.num_compliant(), network.num_origins());
    assert_eq!(problem.control_len(), steps * (compliant + origins));
    assert_eq!(
        problem.state_len(),
        steps * (3 * (compliant + 1) + 2) * network.num_cells()
    );
    assert_eq!(problem.control().len(), problem.control_len());
}

#[test]
fn density_increases_objective() {
    let mut problem = problem();
    let control = problem.control();
    let iterate = problem.evaluate(&control).unwrap();
    let base = iterate.objective().unwrap();

    let mut trajectory = iterate.trajectory().clone();
    let sums = iterate.sums().clone();
    assert_eq!(objective(&trajectory, &sums, &BarrierParams::default()).unwrap(), base);

    trajectory.get_mut(4).unwrap().get_mut(3).total_density += 0.01;
    let denser = objective(&trajectory, &sums, &BarrierParams::default()).unwrap();
    assert!(denser > base);
}

#[test]
fn barrier_increases_objective_towards_threshold() {
    let mut problem = problem();
    let network = problem.network().clone();
    let layout = network.control_layout();
    let mut control = problem.control();

    // Lowering the first origin's compliant ratio at step 0 removes little
    // traffic, so the change in the barrier term dominates.
    let slot = layout.non_compliant_slot(0, 0) + 1;
    let mut previous = problem.objective(&control).unwrap();
    for sum in [0.9999, 0.99901] {
        control[slot] = sum - control[layout.non_compliant_slot(0, 0)];
        let value = problem.objective(&control).unwrap();
        assert!(value > previous, "{value} <= {previous}");
        previous = value;
    }
    control[slot] = 0.999 - control[layout.non_compliant_slot(0, 0)] - 1e-6;
    assert!(problem.objective(&control).unwrap_err().is_infeasible());
}

#[test]
fn control_gradient_is_shared_by_origin_slots() {
    let mut problem = problem();
    let network = problem.network().clone();
    let layout = network.control_layout();
    let control = problem.control();
    let gradient = problem.gradient_wrt_control(&control).unwrap();
    let params = BarrierParams::default();

    for origin in 0..network.num_origins() {
        for step in 0..network.num_steps() {
            let slots = layout.origin_slots(step, origin);
            let sum: f64 = control[slots.clone()].iter().sum();
            for slot in slots {
                let expected = params.weight / (params.threshold - sum);
                assert!((gradient[slot] - expected).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn forward_simulation_collects_history() {
    let mut problem = problem();
    let control = problem.control();
    let objective = problem.objective(&control).unwrap();
    assert_eq!(problem.forward_simulate(&control).unwrap().history().len(), 12);
    // Re-simulating with history leaves the evaluation unchanged
    assert_eq!(problem.objective(&control).unwrap(), objective);
}

#[test]
fn rejected_control_leaves_no_stale_state() {
    let mut problem = problem();
    let control = problem.control();
    let short = &control[1..];
    assert_eq!(
        problem.objective(short),
        Err(DtaError::ControlLength {
            expected: control.len(),
            actual: control.len() - 1
        })
    );

    let mut out_of_range = control.clone();
    out_of_range[2] = 1.2;
    assert!(problem.objective(&out_of_range).unwrap_err().is_infeasible());
    assert_eq!(problem.control(), control);
}

#[test]
fn constraint_jacobians_are_unsupported() {
    let mut problem = problem();
    let control = problem.control();
    assert!(matches!(problem.dhdu(&control), Err(DtaError::Unsupported { .. })));
    assert!(matches!(problem.dhdx(&control), Err(DtaError::Unsupported { .. })));
}

#[test]
fn failed_simulation_keeps_accepted_control() {
    let network = common::single_cell(3, 1.0e308);
    let splits = SplitRatios::uniform(&network, 0.5).unwrap();
    let mut problem =
        SystemOptimalProblem::new(Simulator::new(network, splits), BarrierParams::default()).unwrap();
    let control = problem.control();

    let mut overflowing = control.clone();
    overflowing[0] = 0.6;
    assert!(matches!(
        problem.objective(&overflowing),
        Err(DtaError::NonFiniteFlow { step: 2, .. })
    ));
    assert_eq!(problem.control(), control);
    assert!(problem.simulator().trajectory().is_empty());
}
