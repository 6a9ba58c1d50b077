//! Networks shared by the integration tests.
#![allow(dead_code)]

use traffic_dta::{
    CellAttributes, DestinationAttributes, Network, NetworkBuilder, OriginAttributes,
    TimeDiscretization,
};

fn time(num_steps: usize) -> TimeDiscretization {
    TimeDiscretization { dt: 1.0, num_steps }
}

/// One origin, one ordinary cell and one destination, with a single compliant commodity.
pub fn single_cell(num_steps: usize, arrivals: f64) -> Network {
    corridor(num_steps, arrivals, 1)
}

/// One origin feeding `len` cells in series to one destination, with a single compliant commodity.
pub fn corridor(num_steps: usize, arrivals: f64, len: usize) -> Network {
    let mut builder = NetworkBuilder::new(time(num_steps));
    let origin = builder.add_origin(&OriginAttributes {
        demand: vec![arrivals; num_steps],
        capacity: 1.0,
    });
    let destination = builder.add_destination(&DestinationAttributes { capacity: 1.0 });
    let mut prev = builder.origin_cell(origin);
    for _ in 0..len {
        let cell = builder.add_cell(&CellAttributes::default());
        builder.add_connection(prev, cell, 1.0);
        prev = cell;
    }
    let sink = builder.destination_cell(destination);
    builder.add_connection(prev, sink, 1.0);
    builder.add_compliant_commodity(origin, destination).unwrap();
    builder.build().unwrap()
}

/// Two origins merging into one cell, which diverges towards two destinations,
/// one of them behind a bottleneck. Each origin has one compliant commodity.
pub fn merge_diverge(num_steps: usize) -> Network {
    let mut builder = NetworkBuilder::new(time(num_steps));
    let demand = (0..num_steps)
        .map(|k| if k < 3 * num_steps / 4 { 0.25 } else { 0.0 })
        .collect::<Vec<_>>();
    let first = builder.add_origin(&OriginAttributes {
        demand: demand.clone(),
        capacity: 1.0,
    });
    let second = builder.add_origin(&OriginAttributes {
        demand,
        capacity: 0.2,
    });
    let near = builder.add_destination(&DestinationAttributes { capacity: 1.0 });
    let far = builder.add_destination(&DestinationAttributes { capacity: 1.0 });

    let a = builder.add_cell(&CellAttributes::default());
    let b = builder.add_cell(&CellAttributes::default());
    let c = builder.add_cell(&CellAttributes::default());
    let d = builder.add_cell(&CellAttributes::default());
    let e = builder.add_cell(&CellAttributes::default());
    let f = builder.add_cell(&CellAttributes {
        capacity: 0.05,
        ..Default::default()
    });

    let (first_buffer, second_buffer) = (builder.origin_cell(first), builder.origin_cell(second));
    let (near_sink, far_sink) = (builder.destination_cell(near), builder.destination_cell(far));
    builder.add_connection(first_buffer, a, 1.0);
    builder.add_connection(second_buffer, b, 1.0);
    builder.add_connection(a, c, 1.0);
    builder.add_connection(b, c, 1.0);
    builder.add_connection(c, d, 0.6);
    builder.add_connection(c, e, 0.4);
    builder.add_connection(d, near_sink, 1.0);
    builder.add_connection(e, f, 1.0);
    builder.add_connection(f, far_sink, 1.0);

    builder.add_compliant_commodity(first, far).unwrap();
    builder.add_compliant_commodity(second, near).unwrap();
    builder.build().unwrap()
}
