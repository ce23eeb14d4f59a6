//! Measure inserting a cloud of random waypoints into an existing hierarchy
//!

use bevy::prelude::*;
use bevy_waypoint_ground_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Length of the square the waypoints are scattered over
const EXTENT: f32 = 500.0;

/// Scatter `count` waypoints starting from id `first`
fn scatter(rng: &mut StdRng, first: u32, count: u32) -> Vec<Waypoint> {
	(first..first + count)
		.map(|id| {
			let position = Vec3::new(rng.random_range(0.0..EXTENT), rng.random_range(0.0..EXTENT), 0.0);
			Waypoint::new(WaypointID::new(id), position)
		})
		.collect()
}

/// A built hierarchy over a random cloud with each waypoint joined to the next
fn prepare_graph(rng: &mut StdRng, count: u32) -> WaypointGraph {
	let mut graph = WaypointGraph::new();
	for waypoint in scatter(rng, 0, count) {
		graph.insert_waypoint(waypoint);
	}
	for id in 1..count {
		graph.add_edge(WaypointID::new(id - 1), WaypointID::new(id));
		graph.add_edge(WaypointID::new(id), WaypointID::new(id - 1));
	}
	graph.create_search_graph(&DefaultGraphBuilder::new(8, f32::INFINITY), 8);
	graph
}

/// Push every waypoint down through the hierarchy
fn insert(mut graph: WaypointGraph, waypoints: Vec<Waypoint>) {
	for waypoint in waypoints {
		graph.insert_waypoint(waypoint);
	}
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("hierarchy_edits");
	group.significance_level(0.1).sample_size(10);
	let mut rng = StdRng::seed_from_u64(7);
	let graph = prepare_graph(&mut rng, 2_000);
	let waypoints = scatter(&mut rng, 10_000, 500);
	group.bench_function("insert_waypoints", |b| {
		b.iter(|| insert(black_box(graph.clone()), black_box(waypoints.clone())))
	});
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
