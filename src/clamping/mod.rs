//! Ground clamping moves actors so that they rest on the terrain.
//!
//! Every actor carries a [GroundClampingType] describing how it should be
//! clamped and a [GroundClampingData] with its clamping configuration. Each
//! frame the eye point is sampled once and the clamper then visits every
//! actor, choosing how precisely to sample the terrain based on how far the
//! actor is from the eye:
//!
//! ```text
//!   eye ---- high res range ---- low res range ---->
//!   | three rays + orientation | one ray | no query |
//! ```
//!

pub mod clamper;
pub mod terrain;

use std::any::Any;
use std::sync::{Arc, Weak};

use bevy::prelude::*;

/// How an actor is clamped to the ground
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum GroundClampingType {
	/// The actor is never clamped, it flies
	#[default]
	None,
	/// Clamped every frame with a precision depending on the distance to the
	/// eye point
	Ranged,
	/// Clamped at a fixed interval, in between the last sampled offset from
	/// the ground is reused and changes are blended in over time
	IntermittentSaveOffset,
}

/// State the clamper keeps about an actor between frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Reflect)]
pub struct ClampRuntimeData {
	/// Time of the last terrain sample, `None` if the actor has never been
	/// clamped
	last_clamped_time: Option<f64>,
	/// Vertical distance the last clamp moved the actor by
	last_clamped_offset: f32,
	/// Orientation computed by the last clamp which aligned the actor with
	/// the ground
	last_clamped_rotation: Option<Quat>,
	/// Surface normal found by the last single ray, used to follow the
	/// slope between intermittent samples
	last_ground_normal: Option<Vec3>,
	/// Time the current offset blend began
	smoothing_start: f64,
	/// Offset at the start of the blend
	smoothing_from: f32,
	/// Offset at the end of the blend
	smoothing_to: f32,
}

impl ClampRuntimeData {
	pub fn get_last_clamped_time(&self) -> Option<f64> {
		self.last_clamped_time
	}
	pub fn set_last_clamped_time(&mut self, time: f64) {
		self.last_clamped_time = Some(time);
	}
	/// Whether the actor has ever been sampled against the terrain
	pub fn has_clamped(&self) -> bool {
		self.last_clamped_time.is_some()
	}
	pub fn get_last_clamped_offset(&self) -> f32 {
		self.last_clamped_offset
	}
	pub fn set_last_clamped_offset(&mut self, offset: f32) {
		self.last_clamped_offset = offset;
	}
	pub fn get_last_clamped_rotation(&self) -> Option<Quat> {
		self.last_clamped_rotation
	}
	pub fn set_last_clamped_rotation(&mut self, rotation: Quat) {
		self.last_clamped_rotation = Some(rotation);
	}
	/// Forget the orientation, the next resting clamp keeps the rotation it
	/// is given
	pub fn clear_last_clamped_rotation(&mut self) {
		self.last_clamped_rotation = None;
	}
	pub fn get_last_ground_normal(&self) -> Option<Vec3> {
		self.last_ground_normal
	}
	pub fn set_last_ground_normal(&mut self, normal: Option<Vec3>) {
		self.last_ground_normal = normal;
	}
	/// How much the offset is expected to have changed by `now` for an actor
	/// moving at `velocity` since the last sample. The ground is assumed to
	/// continue along the plane of the last sampled normal and the vertical
	/// part of `velocity` is already in the transform handed to the clamper
	pub fn get_predicted_offset_change(&self, now: f64, velocity: Vec3) -> f32 {
		let (Some(last), Some(normal)) = (self.last_clamped_time, self.last_ground_normal) else {
			return 0.0;
		};
		if normal.z.abs() <= f32::EPSILON || !velocity.is_finite() || !normal.is_finite() {
			return 0.0;
		}
		let travel = velocity * (now - last).max(0.0) as f32;
		let ground_rise = -(normal.x * travel.x + normal.y * travel.y) / normal.z;
		ground_rise - travel.z
	}
	/// Begin blending from the offset currently applied towards `target`
	pub fn start_smoothing(&mut self, now: f64, from: f32, target: f32) {
		self.smoothing_start = now;
		self.smoothing_from = from;
		self.smoothing_to = target;
	}
	/// The blended offset at `now` when a blend lasts `smoothing_time`
	/// seconds
	pub fn get_smoothed_offset(&self, now: f64, smoothing_time: f32) -> f32 {
		if smoothing_time <= 0.0 {
			return self.smoothing_to;
		}
		let fraction = ((now - self.smoothing_start) / smoothing_time as f64).clamp(0.0, 1.0) as f32;
		self.smoothing_from + (self.smoothing_to - self.smoothing_from) * fraction
	}
	/// Forget everything about previous clamps
	pub fn reset(&mut self) {
		*self = ClampRuntimeData::default();
	}
}

/// Per actor clamping configuration
#[derive(Component, Clone, Debug)]
pub struct GroundClampingData {
	/// Desired height of the actor above the terrain surface
	ground_offset: f32,
	/// Align the up axis of the actor with the terrain when it is sampled
	/// at high resolution
	adjust_rotation_to_ground: bool,
	/// When `false` the dimensions are computed from the actor the first
	/// time they are needed
	use_model_dimensions: bool,
	/// Footprint of the actor, `x` is the width and `y` the length
	model_dimensions: Vec3,
	/// Opaque data belonging to the user, never owned
	user_data: Option<Weak<dyn Any + Send + Sync>>,
	/// State kept by the clamper
	runtime: ClampRuntimeData,
}

impl Default for GroundClampingData {
	fn default() -> Self {
		GroundClampingData {
			ground_offset: 0.0,
			adjust_rotation_to_ground: true,
			use_model_dimensions: false,
			model_dimensions: Vec3::ZERO,
			user_data: None,
			runtime: ClampRuntimeData::default(),
		}
	}
}

impl GroundClampingData {
	/// Create a new instance of [GroundClampingData] with a known footprint
	pub fn new(ground_offset: f32, adjust_rotation_to_ground: bool, model_dimensions: Vec3) -> Self {
		GroundClampingData {
			ground_offset,
			adjust_rotation_to_ground,
			use_model_dimensions: true,
			model_dimensions,
			..Default::default()
		}
	}
	pub fn get_ground_offset(&self) -> f32 {
		self.ground_offset
	}
	pub fn set_ground_offset(&mut self, offset: f32) {
		self.ground_offset = offset;
	}
	pub fn get_adjust_rotation_to_ground(&self) -> bool {
		self.adjust_rotation_to_ground
	}
	pub fn set_adjust_rotation_to_ground(&mut self, adjust: bool) {
		self.adjust_rotation_to_ground = adjust;
	}
	pub fn use_model_dimensions(&self) -> bool {
		self.use_model_dimensions
	}
	pub fn set_use_model_dimensions(&mut self, use_dimensions: bool) {
		self.use_model_dimensions = use_dimensions;
	}
	pub fn get_model_dimensions(&self) -> Vec3 {
		self.model_dimensions
	}
	/// Set the footprint of the actor, from then on it is used instead of
	/// asking the actor
	pub fn set_model_dimensions(&mut self, dimensions: Vec3) {
		self.model_dimensions = dimensions;
		self.use_model_dimensions = true;
	}
	/// The user data if it is still alive
	pub fn get_user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
		self.user_data.as_ref().and_then(|w| w.upgrade())
	}
	/// Reference some user data, only a weak reference is kept
	pub fn set_user_data(&mut self, data: &Arc<dyn Any + Send + Sync>) {
		if self.get_user_data().is_some() {
			warn!("Ground clamping user data is being replaced");
		}
		self.user_data = Some(Arc::downgrade(data));
	}
	pub fn clear_user_data(&mut self) {
		self.user_data = None;
	}
	pub fn get_runtime_data(&self) -> &ClampRuntimeData {
		&self.runtime
	}
	pub fn get_runtime_data_mut(&mut self) -> &mut ClampRuntimeData {
		&mut self.runtime
	}
}

/// Everything a clamp needs to know about the current frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameContext {
	/// Position of the eye, `None` when there is no eye point in which case
	/// every actor is treated as being close to it
	eye_position: Option<Vec3>,
	/// Simulation time in seconds
	current_time: f64,
}

impl FrameContext {
	/// Create a new instance of [FrameContext]
	pub fn new(eye_position: Option<Vec3>, current_time: f64) -> Self {
		FrameContext {
			eye_position,
			current_time,
		}
	}
	pub fn get_eye_position(&self) -> Option<Vec3> {
		self.eye_position
	}
	pub fn get_current_time(&self) -> f64 {
		self.current_time
	}
}
