use traffic_dta::{
    AdjointProblem, CellAttributes, DestinationAttributes, DtaResult, NetworkBuilder,
    OriginAttributes, Simulator, SplitRatios, SystemOptimalProblem, TimeDiscretization,
};

/// Share of the arrivals that does not comply with routing advice.
const ALPHA: f64 = 0.9;

const NUM_STEPS: usize = 20;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

/// Simulates two parallel paths between one origin and one destination,
/// the shorter of which has the lower capacity, and reports the objective
/// and gradients at a uniform assignment.
fn run() -> DtaResult<()> {
    let mut builder = NetworkBuilder::new(TimeDiscretization {
        dt: 1.0,
        num_steps: NUM_STEPS,
    });
    let origin = builder.add_origin(&OriginAttributes {
        demand: (0..NUM_STEPS).map(|k| if k < 10 { 0.3 } else { 0.0 }).collect(),
        capacity: 1.0,
    });
    let destination = builder.add_destination(&DestinationAttributes { capacity: 1.0 });
    let entry = builder.add_cell(&CellAttributes::default());
    let short = builder.add_cell(&CellAttributes {
        capacity: 0.1,
        ..Default::default()
    });
    let long = [
        builder.add_cell(&CellAttributes::default()),
        builder.add_cell(&CellAttributes::default()),
    ];
    let buffer = builder.origin_cell(origin);
    let sink = builder.destination_cell(destination);
    builder.add_connection(buffer, entry, 1.0);
    builder.add_connection(entry, short, 0.8);
    builder.add_connection(entry, long[0], 0.2);
    builder.add_connection(short, sink, 1.0);
    builder.add_connection(long[0], long[1], 1.0);
    builder.add_connection(long[1], sink, 1.0);
    builder.add_compliant_commodity(origin, destination)?;
    builder.add_compliant_commodity_on_route(
        origin,
        destination,
        &[buffer, entry, long[0], long[1], sink],
    )?;
    let network = builder.build()?;

    let splits = SplitRatios::uniform(&network, ALPHA)?;
    let mut problem = SystemOptimalProblem::new(Simulator::new(network, splits), Default::default())?;
    let control = problem.control();

    println!("Simulating...");
    let trajectory = problem.forward_simulate(&control)?;
    for summary in trajectory.history() {
        println!(
            "Step {:>2}: density {:.4}, injected {:.4}, exited {:.4}",
            summary.step, summary.total_density, summary.injected, summary.exited
        );
    }

    println!("Objective: {:.6}", problem.objective(&control)?);
    let gradient = problem.gradient_wrt_control(&control)?;
    println!("dJ/dU at step 0: {:?}", &gradient[..3]);
    let state_gradient = problem.gradient_wrt_state(&control)?;
    println!(
        "dJ/dX: {} of {} entries are non-zero",
        state_gradient.nnz(),
        problem.state_len()
    );
    if let Err(err) = problem.dhdu(&control) {
        println!("dH/dU: {err}");
    }
    Ok(())
}
