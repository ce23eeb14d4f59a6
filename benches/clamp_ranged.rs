//! Measure a frame of ranged ground clamping over a heightfield
//!
//! 1000 actors are scattered around the eye point, some within each range
//!

use std::sync::Arc;

use bevy::prelude::*;
use bevy_waypoint_ground_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Create the clamper and the actors to clamp
fn prepare(count: usize) -> (DefaultGroundClamper, Vec<(Transform, GroundClampingData)>) {
	let terrain = HeightfieldTerrain::from_fn(Vec2::new(-256.0, -256.0), 2.0, 257, 257, |x, y| {
		(x * 0.05).sin() * 4.0 + (y * 0.03).cos() * 3.0
	})
	.unwrap();
	let terrain: Arc<dyn TerrainQuery> = Arc::new(terrain);
	let eye: Arc<dyn EyePointSource> = Arc::new(Vec3::new(0.0, 0.0, 20.0));
	let mut clamper = DefaultGroundClamper::new(Some(terrain), Some(eye));
	clamper.get_base_mut().set_high_res_range(60.0);
	clamper.get_base_mut().set_low_res_range(180.0);
	clamper.get_base_mut().update_eye_point();
	let mut rng = StdRng::seed_from_u64(11);
	let actors = (0..count)
		.map(|_| {
			let position = Vec3::new(rng.random_range(-250.0..250.0), rng.random_range(-250.0..250.0), 20.0);
			let data = GroundClampingData::new(0.5, true, Vec3::new(2.0, 4.0, 1.5));
			(Transform::from_translation(position), data)
		})
		.collect();
	(clamper, actors)
}

/// Clamp every actor once and close the frame
fn clamp_frame(clamper: &mut DefaultGroundClamper, mut actors: Vec<(Transform, GroundClampingData)>) {
	let proxy = SimpleActorProxy::new("bench", Vec3::new(2.0, 4.0, 1.5));
	let frame = clamper.get_base().get_frame_context(0.0);
	for (transform, data) in actors.iter_mut() {
		clamper.clamp_to_ground(GroundClampingType::Ranged, &frame, transform, &proxy, data, true, Vec3::ZERO);
	}
	clamper.finish_up();
}

/// Clamp every actor once through a single batch and close the frame
fn clamp_frame_batched(
	clamper: &mut DefaultGroundClamper,
	mut actors: Vec<(Transform, GroundClampingData)>,
) {
	let proxy = SimpleActorProxy::new("bench", Vec3::new(2.0, 4.0, 1.5));
	let frame = clamper.get_base().get_frame_context(0.0);
	let mut batch: Vec<ClampActor<'_>> = actors
		.iter_mut()
		.map(|(transform, data)| {
			ClampActor::new(GroundClampingType::Ranged, transform, &proxy, data, true, Vec3::ZERO)
		})
		.collect();
	clamper.clamp_batch(&frame, &mut batch);
	clamper.finish_up();
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("ground_clamping");
	group.significance_level(0.1).sample_size(10);
	let (mut clamper, actors) = prepare(1_000);
	group.bench_function("clamp_ranged", |b| {
		b.iter(|| clamp_frame(black_box(&mut clamper), black_box(actors.clone())))
	});
	group.bench_function("clamp_batched", |b| {
		b.iter(|| clamp_frame_batched(black_box(&mut clamper), black_box(actors.clone())))
	});
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
