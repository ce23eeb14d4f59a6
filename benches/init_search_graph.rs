//! Measure building every search level above a grid of waypoints
//!
//! Grid is 40 waypoints by 40 waypoints
//!

use bevy::prelude::*;
use bevy_waypoint_ground_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Create level `0` of a graph, a grid of waypoints joined to their four neighbours
fn prepare_graph(side: u32, spacing: f32) -> WaypointGraph {
	let mut graph = WaypointGraph::new();
	for row in 0..side {
		for column in 0..side {
			let position = Vec3::new(column as f32 * spacing, row as f32 * spacing, 0.0);
			graph.insert_waypoint(Waypoint::new(WaypointID::new(row * side + column), position));
		}
	}
	for row in 0..side {
		for column in 0..side {
			let id = row * side + column;
			if column + 1 < side {
				graph.add_edge(WaypointID::new(id), WaypointID::new(id + 1));
				graph.add_edge(WaypointID::new(id + 1), WaypointID::new(id));
			}
			if row + 1 < side {
				graph.add_edge(WaypointID::new(id), WaypointID::new(id + side));
				graph.add_edge(WaypointID::new(id + side), WaypointID::new(id));
			}
		}
	}
	graph
}

/// Build the hierarchy
fn init_graph(mut graph: WaypointGraph, builder: DefaultGraphBuilder) {
	graph.create_search_graph(&builder, 16);
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("data_initialisation");
	group.significance_level(0.1).sample_size(10);
	let graph = prepare_graph(40, 5.0);
	group.bench_function("init_search_graph", |b| {
		b.iter(|| init_graph(black_box(graph.clone()), black_box(DefaultGraphBuilder::default())))
	});
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
