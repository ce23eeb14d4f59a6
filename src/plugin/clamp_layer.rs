//! Logic for clamping the actors of the world onto the terrain once per frame.
//!
//! An actor is authored through its [UnclampedTransform], every frame that
//! transform is copied into the [Transform] of the actor which is then
//! clamped. The clamper itself lives in the [GroundClamperRes] resource
//!

use bevy::render::primitives::Aabb;

use crate::prelude::*;
use bevy::prelude::*;

/// Marks the entity ranges are measured from, usually the camera
#[derive(Component, Default, Clone, Copy, Debug, Reflect)]
pub struct GroundClampEyePoint;

/// The transform of an actor before it is clamped
#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct UnclampedTransform(Transform);

impl UnclampedTransform {
	/// Create a new instance of [UnclampedTransform]
	pub fn new(transform: Transform) -> Self {
		UnclampedTransform(transform)
	}
	pub fn get(&self) -> &Transform {
		&self.0
	}
	pub fn get_mut(&mut self) -> &mut Transform {
		&mut self.0
	}
}

/// Velocity of an actor, a resting actor which has not moved is not
/// sampled again
#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct ClampVelocity(pub Vec3);

/// The [GroundClamper] used by the clamping systems
#[derive(Resource)]
pub struct GroundClamperRes(Box<dyn GroundClamper>);

impl Default for GroundClamperRes {
	fn default() -> Self {
		GroundClamperRes(Box::new(DefaultGroundClamper::default()))
	}
}

impl GroundClamperRes {
	/// Create a new instance of [GroundClamperRes]
	pub fn new(clamper: Box<dyn GroundClamper>) -> Self {
		GroundClamperRes(clamper)
	}
	pub fn get(&self) -> &dyn GroundClamper {
		self.0.as_ref()
	}
	pub fn get_mut(&mut self) -> &mut dyn GroundClamper {
		self.0.as_mut()
	}
}

/// Name used for actors without a [Name]
const UNNAMED_ACTOR: &str = "unnamed actor";

/// Presents the components of an entity as an [ActorProxy]
struct EntityActorProxy<'a> {
	/// Name of the entity
	name: &'a str,
	/// Bounds of the mesh of the entity
	aabb: Option<&'a Aabb>,
}

impl ActorProxy for EntityActorProxy<'_> {
	fn get_name(&self) -> &str {
		self.name
	}
	fn get_model_dimensions(&self) -> Vec3 {
		self.aabb
			.map_or(Vec3::ZERO, |aabb| Vec3::from(aabb.half_extents) * 2.0)
	}
}

/// Cache the position of the [GroundClampEyePoint] entity in the clamper,
/// without one the eye point source of the clamper is sampled instead
#[cfg(not(tarpaulin_include))]
pub fn update_eye_point(
	mut clamper: ResMut<GroundClamperRes>,
	eyes: Query<&GlobalTransform, With<GroundClampEyePoint>>,
) {
	let base = clamper.get_mut().get_base_mut();
	match eyes.iter().next() {
		Some(eye) => base.set_last_eye_point(Some(eye.translation())),
		None => base.update_eye_point(),
	}
}

/// Copy the [UnclampedTransform] of every actor into its [Transform] and
/// clamp it onto the terrain. The actors of a frame are handed over together
/// so that their rays can share terrain queries
#[cfg(not(tarpaulin_include))]
#[allow(clippy::type_complexity)]
pub fn clamp_actors(
	time: Res<Time>,
	mut clamper: ResMut<GroundClamperRes>,
	mut actors: Query<(
		Ref<UnclampedTransform>,
		&GroundClampingType,
		&mut GroundClampingData,
		&mut Transform,
		Option<&ClampVelocity>,
		Option<&Name>,
		Option<&Aabb>,
	)>,
) {
	let frame = clamper
		.get()
		.get_base()
		.get_frame_context(time.elapsed_secs_f64());
	let mut entries: Vec<_> = actors
		.iter_mut()
		.map(|(unclamped, clamp_type, data, transform, velocity, name, aabb)| {
			let proxy = EntityActorProxy {
				name: name.map_or(UNNAMED_ACTOR, |n| n.as_str()),
				aabb,
			};
			(
				*clamp_type,
				unclamped.is_changed(),
				*unclamped.get(),
				velocity.map_or(Vec3::ZERO, |v| v.0),
				proxy,
				data,
				transform,
			)
		})
		.collect();
	let mut batch: Vec<ClampActor<'_>> = entries
		.iter_mut()
		.map(|(clamp_type, changed, clamped, velocity, proxy, data, _)| {
			ClampActor::new(*clamp_type, clamped, &*proxy, &mut **data, *changed, *velocity)
		})
		.collect();
	clamper.get_mut().clamp_batch(&frame, &mut batch);
	drop(batch);
	for (_, _, clamped, _, _, _, transform) in entries.iter_mut() {
		transform.set_if_neq(*clamped);
	}
}

/// Close the clamping frame
#[cfg(not(tarpaulin_include))]
pub fn finish_up(mut clamper: ResMut<GroundClamperRes>) {
	clamper.get_mut().finish_up();
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn proxy_dimensions_from_bounds() {
		let aabb = Aabb::from_min_max(Vec3::new(-1.0, -2.0, 0.0), Vec3::new(1.0, 2.0, 3.0));
		let proxy = EntityActorProxy {
			name: "tank",
			aabb: Some(&aabb),
		};
		assert_eq!(Vec3::new(2.0, 4.0, 3.0), proxy.get_model_dimensions());
		let proxy = EntityActorProxy {
			name: "tank",
			aabb: None,
		};
		assert_eq!(Vec3::ZERO, proxy.get_model_dimensions());
	}
	#[test]
	fn default_resource_has_no_terrain() {
		let res = GroundClamperRes::default();
		assert!(!res.get().get_base().has_valid_surface());
	}
}
