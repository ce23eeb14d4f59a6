//! Clamping actors onto the terrain.
//!
//! [BaseGroundClamper] holds the collaborators and configuration shared by
//! every clamping strategy, a strategy implements [GroundClamper]. The
//! provided [DefaultGroundClamper] picks the sampling precision from the
//! distance between the actor and the eye point:
//!
//! - within the high res range three rays are cast at the footprint of the
//!   actor, the actor is lifted to their mean height and tilted to match the
//!   plane they describe
//! - within the low res range a single ray is cast below the actor and its
//!   orientation is left alone
//! - further away the terrain is not queried at all
//!
//! A range of `0` disables that threshold. Small adjustments to the default
//! behaviour can be made with [ClampHooks] rather than writing a whole new
//! [GroundClamper].
//!
//! [GroundClamper::clamp_batch] takes every actor of a frame at once, the
//! single rays of the low res band are then sent to the terrain in groups
//! of up to [MAX_CLAMP_BATCH_SIZE]
//!

use std::sync::Arc;

use crate::prelude::*;
use bevy::prelude::*;

/// Default time in seconds between terrain samples of an intermittently
/// clamped actor
pub const DEFAULT_INTERMITTENT_TIME_DELTA: f32 = 1.0;
/// Default time in seconds a new intermittent offset takes to blend in
pub const DEFAULT_INTERMITTENT_SMOOTHING_TIME: f32 = 0.25;
/// Default distance each ray reaches above and below the point it is
/// sampling
pub const DEFAULT_RAY_HALF_LENGTH: f32 = 100.0;
/// Most single rays sent to the terrain in one query
pub const MAX_CLAMP_BATCH_SIZE: usize = 32;

/// Configuration and collaborators shared by every [GroundClamper]
pub struct BaseGroundClamper {
	/// What actors are clamped onto, shared with the rest of the application
	terrain: Option<Arc<dyn TerrainQuery>>,
	/// Where the viewer is
	eye_point: Option<Arc<dyn EyePointSource>>,
	/// Eye position cached by the last [BaseGroundClamper::update_eye_point]
	last_eye_point: Option<Vec3>,
	/// Distance within which actors are sampled at high resolution
	high_res_range: f32,
	/// `high_res_range` squared
	high_res_range_squared: f32,
	/// Distance within which actors are sampled at all
	low_res_range: f32,
	/// `low_res_range` squared
	low_res_range_squared: f32,
	/// Seconds between samples of intermittently clamped actors
	intermittent_time_delta: f32,
	/// Seconds a new intermittent offset takes to blend in
	intermittent_smoothing_time: f32,
	/// Vertical reach of each ray
	ray_half_length: f32,
}

impl Default for BaseGroundClamper {
	fn default() -> Self {
		BaseGroundClamper {
			terrain: None,
			eye_point: None,
			last_eye_point: None,
			high_res_range: 0.0,
			high_res_range_squared: 0.0,
			low_res_range: 0.0,
			low_res_range_squared: 0.0,
			intermittent_time_delta: DEFAULT_INTERMITTENT_TIME_DELTA,
			intermittent_smoothing_time: DEFAULT_INTERMITTENT_SMOOTHING_TIME,
			ray_half_length: DEFAULT_RAY_HALF_LENGTH,
		}
	}
}

impl BaseGroundClamper {
	/// Create a new instance of [BaseGroundClamper]
	pub fn new(terrain: Option<Arc<dyn TerrainQuery>>, eye_point: Option<Arc<dyn EyePointSource>>) -> Self {
		BaseGroundClamper {
			terrain,
			eye_point,
			..Default::default()
		}
	}
	pub fn get_terrain(&self) -> Option<&Arc<dyn TerrainQuery>> {
		self.terrain.as_ref()
	}
	pub fn set_terrain(&mut self, terrain: Option<Arc<dyn TerrainQuery>>) {
		self.terrain = terrain;
	}
	/// Whether there is any terrain to clamp onto
	pub fn has_valid_surface(&self) -> bool {
		self.terrain.is_some()
	}
	pub fn get_eye_point_source(&self) -> Option<&Arc<dyn EyePointSource>> {
		self.eye_point.as_ref()
	}
	pub fn set_eye_point_source(&mut self, eye_point: Option<Arc<dyn EyePointSource>>) {
		self.eye_point = eye_point;
	}
	/// Sample the eye point source and cache its position, called once per
	/// frame before any actor is clamped. Without a source the previous
	/// position is kept
	pub fn update_eye_point(&mut self) {
		match &self.eye_point {
			Some(eye) => self.last_eye_point = Some(eye.get_world_position()),
			None => warn_once!("Ground clamper has no eye point, ranges are measured from the last known position"),
		}
	}
	pub fn get_last_eye_point(&self) -> Option<Vec3> {
		self.last_eye_point
	}
	/// Cache an eye position directly, for applications which track the
	/// viewer themselves
	pub fn set_last_eye_point(&mut self, eye: Option<Vec3>) {
		self.last_eye_point = eye;
	}
	/// Everything a clamp needs about the frame at `current_time`
	pub fn get_frame_context(&self, current_time: f64) -> FrameContext {
		FrameContext::new(self.last_eye_point, current_time)
	}
	pub fn get_high_res_range(&self) -> f32 {
		self.high_res_range
	}
	pub fn get_high_res_range_squared(&self) -> f32 {
		self.high_res_range_squared
	}
	pub fn set_high_res_range(&mut self, range: f32) {
		self.high_res_range = range;
		self.high_res_range_squared = range * range;
	}
	pub fn get_low_res_range(&self) -> f32 {
		self.low_res_range
	}
	pub fn get_low_res_range_squared(&self) -> f32 {
		self.low_res_range_squared
	}
	pub fn set_low_res_range(&mut self, range: f32) {
		self.low_res_range = range;
		self.low_res_range_squared = range * range;
	}
	pub fn get_intermittent_time_delta(&self) -> f32 {
		self.intermittent_time_delta
	}
	pub fn set_intermittent_time_delta(&mut self, delta: f32) {
		self.intermittent_time_delta = delta;
	}
	pub fn get_intermittent_smoothing_time(&self) -> f32 {
		self.intermittent_smoothing_time
	}
	pub fn set_intermittent_smoothing_time(&mut self, time: f32) {
		self.intermittent_smoothing_time = time;
	}
	pub fn get_ray_half_length(&self) -> f32 {
		self.ray_half_length
	}
	pub fn set_ray_half_length(&mut self, half_length: f32) {
		self.ray_half_length = half_length;
	}
}

/// A strategy for moving actors onto the terrain
pub trait GroundClamper: Send + Sync {
	fn get_base(&self) -> &BaseGroundClamper;
	fn get_base_mut(&mut self) -> &mut BaseGroundClamper;
	/// Clamp a single actor. The translation of `transform` (and its
	/// rotation when the actor is aligned with the ground) is edited in
	/// place, when the actor cannot be clamped it is left untouched.
	///
	/// `transform_changed` tells whether the actor moved since its last
	/// clamp and `velocity` is its current velocity, together they allow a
	/// clamp to be skipped for resting actors
	#[allow(clippy::too_many_arguments)]
	fn clamp_to_ground(
		&mut self,
		clamp_type: GroundClampingType,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	);
	/// Clamp many actors of the same frame, a clamper may group their
	/// rays into fewer terrain queries. By default each actor is clamped
	/// on its own
	fn clamp_batch(&mut self, frame: &FrameContext, actors: &mut [ClampActor<'_>]) {
		for actor in actors.iter_mut() {
			self.clamp_to_ground(
				actor.clamp_type,
				frame,
				actor.transform,
				actor.proxy,
				actor.data,
				actor.transform_changed,
				actor.velocity,
			);
		}
	}
	/// Called once every actor of a frame has been clamped
	fn finish_up(&mut self);
}

/// One actor handed to [GroundClamper::clamp_batch], the arguments of a
/// single [GroundClamper::clamp_to_ground]
pub struct ClampActor<'a> {
	/// How the actor asks to be clamped
	clamp_type: GroundClampingType,
	/// Edited in place
	transform: &'a mut Transform,
	/// Answers questions about the actor
	proxy: &'a dyn ActorProxy,
	/// Configuration and state of the actor
	data: &'a mut GroundClampingData,
	/// Whether the actor moved since its last clamp
	transform_changed: bool,
	/// Current velocity of the actor
	velocity: Vec3,
}

impl<'a> ClampActor<'a> {
	/// Create a new instance of [ClampActor]
	pub fn new(
		clamp_type: GroundClampingType,
		transform: &'a mut Transform,
		proxy: &'a dyn ActorProxy,
		data: &'a mut GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	) -> Self {
		ClampActor {
			clamp_type,
			transform,
			proxy,
			data,
			transform_changed,
			velocity,
		}
	}
}

/// What a ranged clamp does with an actor this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangedPlan {
	/// Resting actor, the last clamp is reused
	Rest,
	/// Beyond the low res range
	OutOfRange,
	/// One ray below the actor
	Single,
	/// Three rays at the footprint of the actor
	ThreePoint,
}

/// Points where the default clamper can be customised
pub trait ClampHooks: Send + Sync {
	/// Choose how an actor is actually clamped, by default as requested
	fn get_best_clamp_type(
		&self,
		requested: GroundClampingType,
		_transform: &Transform,
		_data: &GroundClampingData,
	) -> GroundClampingType {
		requested
	}
	/// Provide a surface when a ray below `point` found nothing, by
	/// default the point is left where it is
	fn get_missing_hit(&self, _point: Vec3) -> Option<TerrainHit> {
		None
	}
	/// Adjust the three surface points of a high res clamp before the
	/// height and orientation are derived from them
	fn finalize_surface_points(&self, _points: &mut [Vec3; 3]) {}
}

/// [ClampHooks] which change nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClampHooks;

impl ClampHooks for DefaultClampHooks {}

/// Work done by a clamper during a frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClampFrameStats {
	/// Calls made to the terrain
	queries: usize,
	/// Rays cast, a single query may cast several
	rays: usize,
	/// Actors which were not sampled
	skipped: usize,
	/// Actors moved onto freshly sampled terrain
	clamped: usize,
}

impl ClampFrameStats {
	pub fn get_queries(&self) -> usize {
		self.queries
	}
	pub fn get_rays(&self) -> usize {
		self.rays
	}
	pub fn get_skipped(&self) -> usize {
		self.skipped
	}
	pub fn get_clamped(&self) -> usize {
		self.clamped
	}
}

/// The distance based [GroundClamper]
pub struct DefaultGroundClamper<H: ClampHooks = DefaultClampHooks> {
	/// Shared configuration
	base: BaseGroundClamper,
	/// Customisation points
	hooks: H,
	/// Work done so far this frame
	stats: ClampFrameStats,
	/// Work done during the previous frame
	last_frame_stats: ClampFrameStats,
}

impl Default for DefaultGroundClamper {
	fn default() -> Self {
		DefaultGroundClamper::new(None, None)
	}
}

impl DefaultGroundClamper {
	/// Create a new instance of [DefaultGroundClamper]
	pub fn new(terrain: Option<Arc<dyn TerrainQuery>>, eye_point: Option<Arc<dyn EyePointSource>>) -> Self {
		DefaultGroundClamper::with_hooks(BaseGroundClamper::new(terrain, eye_point), DefaultClampHooks)
	}
}

impl<H: ClampHooks> DefaultGroundClamper<H> {
	/// Create a new instance of [DefaultGroundClamper] customised by `hooks`
	pub fn with_hooks(base: BaseGroundClamper, hooks: H) -> Self {
		DefaultGroundClamper {
			base,
			hooks,
			stats: ClampFrameStats::default(),
			last_frame_stats: ClampFrameStats::default(),
		}
	}
	pub fn get_hooks(&self) -> &H {
		&self.hooks
	}
	pub fn get_hooks_mut(&mut self) -> &mut H {
		&mut self.hooks
	}
	/// Work done so far in the current frame
	pub fn get_frame_stats(&self) -> &ClampFrameStats {
		&self.stats
	}
	/// Work done in the frame closed by the last [GroundClamper::finish_up]
	pub fn get_last_frame_stats(&self) -> &ClampFrameStats {
		&self.last_frame_stats
	}
	/// Reapply the result of the last clamp without touching the terrain
	fn apply_saved(&self, transform: &mut Transform, data: &GroundClampingData, restore_rotation: bool) {
		let runtime = data.get_runtime_data();
		transform.translation.z += runtime.get_last_clamped_offset();
		if restore_rotation {
			if let Some(rotation) = runtime.get_last_clamped_rotation() {
				transform.rotation = rotation;
			}
		}
	}
	/// Store the outcome of a fresh sample
	fn record_clamp(&mut self, data: &mut GroundClampingData, now: f64, offset: f32, rotation: Option<Quat>) {
		let runtime = data.get_runtime_data_mut();
		runtime.set_last_clamped_time(now);
		runtime.set_last_clamped_offset(offset);
		match rotation {
			Some(rotation) => runtime.set_last_clamped_rotation(rotation),
			None => runtime.clear_last_clamped_rotation(),
		}
		self.stats.clamped += 1;
	}
	/// Cast one vertical ray through `point`
	fn cast_ray(&mut self, terrain: &dyn TerrainQuery, point: Vec3) -> Option<TerrainHit> {
		let segment = ClampSegment::vertical(point, self.base.get_ray_half_length());
		self.stats.queries += 1;
		self.stats.rays += 1;
		let hits = terrain.intersect(&segment);
		self.closest_or_missing(&hits, point)
	}
	/// The hit nearest to `point`, or whatever the hooks make of a miss
	fn closest_or_missing(&self, hits: &[TerrainHit], point: Vec3) -> Option<TerrainHit> {
		get_closest_hit(hits, point.z).or_else(|| self.hooks.get_missing_hit(point))
	}
	/// The vertical change which puts `point` `ground_offset` above `hit`. A
	/// ray which found nothing yields no change
	fn offset_to(hit: Option<&TerrainHit>, point: Vec3, ground_offset: f32) -> f32 {
		match hit {
			Some(hit) => hit.get_point().z + ground_offset - point.z,
			None => {
				debug!("No terrain found below {}", point);
				0.0
			}
		}
	}
	/// Footprint of the actor, asked of the proxy and cached the first time
	/// it is needed
	fn resolve_model_dimensions(proxy: &dyn ActorProxy, data: &mut GroundClampingData) -> Vec3 {
		if !data.use_model_dimensions() {
			let dimensions = proxy.get_model_dimensions();
			debug!("Caching model dimensions {} of {}", dimensions, proxy.get_name());
			data.set_model_dimensions(dimensions);
		}
		data.get_model_dimensions()
	}
	/// Clamp with a single ray, orientation is left alone
	fn clamp_single(
		&mut self,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
	) {
		let point = transform.translation;
		if !point.is_finite() {
			info!("Actor {} has an invalid position {}, it cannot be clamped", proxy.get_name(), point);
			return;
		}
		let hit = self.cast_ray(terrain, point);
		let offset = Self::offset_to(hit.as_ref(), point, data.get_ground_offset());
		transform.translation.z += offset;
		debug!("Low res clamp of {} moved it by {}", proxy.get_name(), offset);
		self.record_clamp(data, frame.get_current_time(), offset, None);
	}
	/// Clamp with three rays at the footprint of the actor, lifting it to
	/// their mean height and optionally aligning it with their plane
	fn clamp_three_point(
		&mut self,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
	) {
		let dimensions = Self::resolve_model_dimensions(proxy, data);
		let half_width = dimensions.x * 0.5;
		let half_length = dimensions.y * 0.5;
		// front, back right and back left
		let local = [
			Vec3::new(0.0, half_length, 0.0),
			Vec3::new(half_width, -half_length, 0.0),
			Vec3::new(-half_width, -half_length, 0.0),
		];
		let mut points = local.map(|p| transform.translation + transform.rotation * p);
		if points.iter().any(|p| !p.is_finite()) {
			info!(
				"Actor {} produced invalid detection points {:?}, it cannot be clamped",
				proxy.get_name(),
				points
			);
			return;
		}
		let segments = points.map(|p| ClampSegment::vertical(p, self.base.get_ray_half_length()));
		self.stats.queries += 1;
		self.stats.rays += segments.len();
		let hits = terrain.intersect_many(&segments);
		for (i, point) in points.iter_mut().enumerate() {
			let hits = hits.get(i).map_or(&[][..], |h| h.as_slice());
			match self.closest_or_missing(hits, *point) {
				Some(hit) => point.z = hit.get_point().z,
				None => debug!("No terrain found below detection point {} of {}", point, proxy.get_name()),
			}
		}
		self.hooks.finalize_surface_points(&mut points);
		let mean_z = points.iter().map(|p| p.z).sum::<f32>() / points.len() as f32;
		let target_z = mean_z + data.get_ground_offset();
		let offset = target_z - transform.translation.z;
		transform.translation.z = target_z;
		let rotation = if data.get_adjust_rotation_to_ground() {
			Some(orient_to_surface(transform, &points))
		} else {
			None
		};
		debug!(
			"High res clamp of {} moved it by {} with rotation {:?}",
			proxy.get_name(),
			offset,
			rotation
		);
		self.record_clamp(data, frame.get_current_time(), offset, rotation);
	}
	/// Decide how precisely a ranged actor is clamped this frame
	fn plan_ranged(
		&self,
		frame: &FrameContext,
		transform: &Transform,
		data: &GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	) -> RangedPlan {
		if !transform_changed && velocity == Vec3::ZERO && data.get_runtime_data().has_clamped() {
			return RangedPlan::Rest;
		}
		let distance_squared = frame
			.get_eye_position()
			.map(|eye| eye.distance_squared(transform.translation));
		if let Some(d2) = distance_squared {
			if self.base.get_low_res_range() > 0.0 && d2 > self.base.get_low_res_range_squared() {
				return RangedPlan::OutOfRange;
			}
		}
		let beyond_high_res = match distance_squared {
			Some(d2) => {
				self.base.get_high_res_range() > 0.0 && d2 > self.base.get_high_res_range_squared()
			}
			None => false,
		};
		if !data.get_adjust_rotation_to_ground() || beyond_high_res {
			RangedPlan::Single
		} else {
			RangedPlan::ThreePoint
		}
	}
	/// Distance based clamp
	#[allow(clippy::too_many_arguments)]
	fn clamp_ranged(
		&mut self,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	) {
		match self.plan_ranged(frame, transform, data, transform_changed, velocity) {
			RangedPlan::Rest => {
				self.apply_saved(transform, data, true);
				self.stats.skipped += 1;
			}
			RangedPlan::OutOfRange => {
				if data.get_runtime_data().has_clamped() {
					self.apply_saved(transform, data, false);
				}
				self.stats.skipped += 1;
			}
			RangedPlan::Single => self.clamp_single(terrain, frame, transform, proxy, data),
			RangedPlan::ThreePoint => self.clamp_three_point(terrain, frame, transform, proxy, data),
		}
	}
	/// Sample at a fixed interval and blend between samples. In between the
	/// offset follows the slope of the last sample along `velocity`
	fn clamp_intermittent(
		&mut self,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
		velocity: Vec3,
	) {
		let now = frame.get_current_time();
		let delta = self.base.get_intermittent_time_delta() as f64;
		let smoothing = self.base.get_intermittent_smoothing_time();
		let due = match data.get_runtime_data().get_last_clamped_time() {
			Some(last) => last + delta <= now,
			None => true,
		};
		if due {
			let point = transform.translation;
			if !point.is_finite() {
				info!("Actor {} has an invalid position {}, it cannot be clamped", proxy.get_name(), point);
				return;
			}
			let hit = self.cast_ray(terrain, point);
			let target = Self::offset_to(hit.as_ref(), point, data.get_ground_offset());
			let runtime = data.get_runtime_data_mut();
			let from = if runtime.has_clamped() {
				runtime.get_smoothed_offset(now, smoothing)
					+ runtime.get_predicted_offset_change(now, velocity)
			} else {
				target
			};
			runtime.start_smoothing(now, from, target);
			runtime.set_last_ground_normal(hit.map(|h| h.get_normal()));
			self.record_clamp(data, now, target, None);
		} else {
			self.stats.skipped += 1;
		}
		let runtime = data.get_runtime_data();
		let offset =
			runtime.get_smoothed_offset(now, smoothing) + runtime.get_predicted_offset_change(now, velocity);
		transform.translation.z += offset;
	}
	/// Cast the single rays of `batch` in one query and apply them
	fn run_clamp_batch(
		&mut self,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		actors: &mut [ClampActor<'_>],
		batch: &[usize],
	) {
		let half_length = self.base.get_ray_half_length();
		let segments: Vec<ClampSegment> = batch
			.iter()
			.map(|&i| ClampSegment::vertical(actors[i].transform.translation, half_length))
			.collect();
		self.stats.queries += 1;
		self.stats.rays += segments.len();
		let hits = terrain.intersect_many(&segments);
		if hits.len() != segments.len() {
			warn!("Batched terrain query answered {} of {} rays", hits.len(), segments.len());
		}
		for (n, &i) in batch.iter().enumerate() {
			let actor = &mut actors[i];
			let point = actor.transform.translation;
			let hits = hits.get(n).map_or(&[][..], |h| h.as_slice());
			let hit = self.closest_or_missing(hits, point);
			let offset = Self::offset_to(hit.as_ref(), point, actor.data.get_ground_offset());
			actor.transform.translation.z += offset;
			debug!("Batched low res clamp of {} moved it by {}", actor.proxy.get_name(), offset);
			self.record_clamp(&mut *actor.data, frame.get_current_time(), offset, None);
		}
	}
	/// Clamp with a type already filtered through the hooks
	#[allow(clippy::too_many_arguments)]
	fn clamp_resolved(
		&mut self,
		clamp_type: GroundClampingType,
		terrain: &dyn TerrainQuery,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	) {
		match clamp_type {
			GroundClampingType::None => {}
			GroundClampingType::Ranged => self.clamp_ranged(
				terrain,
				frame,
				transform,
				proxy,
				data,
				transform_changed,
				velocity,
			),
			GroundClampingType::IntermittentSaveOffset => {
				self.clamp_intermittent(terrain, frame, transform, proxy, data, velocity)
			}
		}
	}
}

/// Tilt `transform` so that its up axis is the normal of the plane through
/// the front, back right and back left surface points. A degenerate plane
/// keeps the current rotation
fn orient_to_surface(transform: &mut Transform, points: &[Vec3; 3]) -> Quat {
	let [p0, p1, p2] = *points;
	let normal = (p0 - p2).cross(p0 - p1);
	if normal.length_squared() <= f32::EPSILON || !normal.is_finite() {
		debug!("Surface points {:?} do not form a plane", points);
		return transform.rotation;
	}
	let old_up = (transform.rotation * Vec3::Z).normalize_or(Vec3::Z);
	transform.rotation = Quat::from_rotation_arc(old_up, normal.normalize()) * transform.rotation;
	transform.rotation
}

impl<H: ClampHooks> GroundClamper for DefaultGroundClamper<H> {
	fn get_base(&self) -> &BaseGroundClamper {
		&self.base
	}
	fn get_base_mut(&mut self) -> &mut BaseGroundClamper {
		&mut self.base
	}
	#[allow(clippy::too_many_arguments)]
	fn clamp_to_ground(
		&mut self,
		clamp_type: GroundClampingType,
		frame: &FrameContext,
		transform: &mut Transform,
		proxy: &dyn ActorProxy,
		data: &mut GroundClampingData,
		transform_changed: bool,
		velocity: Vec3,
	) {
		let clamp_type = self.hooks.get_best_clamp_type(clamp_type, transform, data);
		if clamp_type == GroundClampingType::None {
			return;
		}
		let Some(terrain) = self.base.get_terrain().cloned() else {
			warn_once!("Ground clamper has no terrain, actors are left unclamped");
			self.stats.skipped += 1;
			return;
		};
		self.clamp_resolved(
			clamp_type,
			terrain.as_ref(),
			frame,
			transform,
			proxy,
			data,
			transform_changed,
			velocity,
		);
	}
	fn clamp_batch(&mut self, frame: &FrameContext, actors: &mut [ClampActor<'_>]) {
		let Some(terrain) = self.base.get_terrain().cloned() else {
			for actor in actors.iter_mut() {
				let clamp_type = self.hooks.get_best_clamp_type(
					actor.clamp_type,
					&*actor.transform,
					&*actor.data,
				);
				if clamp_type != GroundClampingType::None {
					warn_once!("Ground clamper has no terrain, actors are left unclamped");
					self.stats.skipped += 1;
				}
			}
			return;
		};
		let mut pending = Vec::new();
		for (i, actor) in actors.iter_mut().enumerate() {
			let clamp_type = self.hooks.get_best_clamp_type(
				actor.clamp_type,
				&*actor.transform,
				&*actor.data,
			);
			let single = clamp_type == GroundClampingType::Ranged
				&& self.plan_ranged(
					frame,
					&*actor.transform,
					&*actor.data,
					actor.transform_changed,
					actor.velocity,
				) == RangedPlan::Single;
			if single && actor.transform.translation.is_finite() {
				pending.push(i);
				continue;
			}
			self.clamp_resolved(
				clamp_type,
				terrain.as_ref(),
				frame,
				actor.transform,
				actor.proxy,
				actor.data,
				actor.transform_changed,
				actor.velocity,
			);
		}
		for batch in pending.chunks(MAX_CLAMP_BATCH_SIZE) {
			self.run_clamp_batch(terrain.as_ref(), frame, actors, batch);
		}
	}
	fn finish_up(&mut self) {
		if self.stats != ClampFrameStats::default() {
			debug!(
				"Ground clamping frame finished, {} queries cast {} rays, {} actors clamped and {} skipped",
				self.stats.queries, self.stats.rays, self.stats.clamped, self.stats.skipped
			);
		}
		self.last_frame_stats = self.stats;
		self.stats = ClampFrameStats::default();
	}
}
