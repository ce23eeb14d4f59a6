//! The collaborators a ground clamper talks to. Terrain is anything which
//! can intersect a segment ([TerrainQuery]), the eye point is anything with a
//! world position ([EyePointSource]) and an actor exposes its name and
//! footprint through an [ActorProxy].
//!
//! [HeightfieldTerrain] is a ready made terrain built from a regular grid of
//! heights
//!

#[cfg(feature = "heightmap")]
use crate::prelude::*;
use bevy::prelude::*;

/// A line segment used to ray the terrain
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClampSegment {
	/// Where the ray begins
	start: Vec3,
	/// Where the ray ends
	end: Vec3,
}

impl ClampSegment {
	/// Create a new instance of [ClampSegment]
	pub fn new(start: Vec3, end: Vec3) -> Self {
		ClampSegment { start, end }
	}
	/// A segment running straight down through `point`, reaching
	/// `half_length` above and below it
	pub fn vertical(point: Vec3, half_length: f32) -> Self {
		ClampSegment {
			start: point + Vec3::Z * half_length,
			end: point - Vec3::Z * half_length,
		}
	}
	pub fn get_start(&self) -> Vec3 {
		self.start
	}
	pub fn get_end(&self) -> Vec3 {
		self.end
	}
	/// Whether the segment has no horizontal extent
	pub fn is_vertical(&self) -> bool {
		self.start.truncate().abs_diff_eq(self.end.truncate(), f32::EPSILON)
	}
}

/// Where a segment met the terrain
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHit {
	/// Point on the surface
	point: Vec3,
	/// Surface normal at the point
	normal: Vec3,
}

impl TerrainHit {
	/// Create a new instance of [TerrainHit]
	pub fn new(point: Vec3, normal: Vec3) -> Self {
		TerrainHit { point, normal }
	}
	pub fn get_point(&self) -> Vec3 {
		self.point
	}
	pub fn get_normal(&self) -> Vec3 {
		self.normal
	}
}

/// Anything which can be intersected by a [ClampSegment]
pub trait TerrainQuery: Send + Sync {
	/// Every hit along the segment, in no particular order
	fn intersect(&self, segment: &ClampSegment) -> Vec<TerrainHit>;
	/// Intersect several segments in one go, the result holds the hits of
	/// each segment in the order they were given
	fn intersect_many(&self, segments: &[ClampSegment]) -> Vec<Vec<TerrainHit>> {
		segments.iter().map(|s| self.intersect(s)).collect()
	}
}

/// The hit whose height is closest to `z`. When several are equally close
/// the first one wins
pub fn get_closest_hit(hits: &[TerrainHit], z: f32) -> Option<TerrainHit> {
	let mut closest: Option<(TerrainHit, f32)> = None;
	for hit in hits.iter() {
		let distance = (hit.get_point().z - z).abs();
		match closest {
			Some((_, best)) if distance >= best => {}
			_ => closest = Some((*hit, distance)),
		}
	}
	closest.map(|(hit, _)| hit)
}

/// Provides the position clamping precision is measured from, usually the
/// camera
pub trait EyePointSource: Send + Sync {
	/// Current world position of the eye
	fn get_world_position(&self) -> Vec3;
}

impl EyePointSource for Vec3 {
	fn get_world_position(&self) -> Vec3 {
		*self
	}
}

/// What the clamper needs to know about the actor being clamped
pub trait ActorProxy {
	/// Used in log messages
	fn get_name(&self) -> &str;
	/// Size of the bounding box of the actor, only asked for when the
	/// clamping data has no dimensions of its own
	fn get_model_dimensions(&self) -> Vec3;
}

/// An [ActorProxy] holding fixed values
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimpleActorProxy {
	/// Name of the actor
	name: String,
	/// Bounding box size of the actor
	dimensions: Vec3,
}

impl SimpleActorProxy {
	/// Create a new instance of [SimpleActorProxy]
	pub fn new(name: &str, dimensions: Vec3) -> Self {
		SimpleActorProxy {
			name: name.to_string(),
			dimensions,
		}
	}
}

impl ActorProxy for SimpleActorProxy {
	fn get_name(&self) -> &str {
		&self.name
	}
	fn get_model_dimensions(&self) -> Vec3 {
		self.dimensions
	}
}

/// Number of bisection steps used to refine a hit along a sloped segment
const BISECTION_STEPS: usize = 12;
/// Upper bound on the number of steps taken along a sloped segment
const MAX_MARCH_STEPS: usize = 10_000;

/// Terrain described by heights on a regular grid in the XY plane, +Z is up.
///
/// Heights are stored row by row, a row runs along X and rows are stacked
/// along Y starting from `origin`:
///
/// ```text
/// y
/// ^  [2*c] [2*c+1] ...
/// |  [c]   [c+1]   ...
/// |  [0]   [1]     ...   [c-1]
/// o-------------------------> x
/// ```
///
/// Between grid points the height is interpolated bilinearly
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct HeightfieldTerrain {
	/// World position of the first height
	origin: Vec2,
	/// Distance between neighbouring grid points
	spacing: f32,
	/// Number of grid points along X
	columns: usize,
	/// Number of grid points along Y
	rows: usize,
	/// Heights, `rows * columns` of them
	heights: Vec<f32>,
}

impl HeightfieldTerrain {
	/// Create a new instance of [HeightfieldTerrain]. The grid needs at least
	/// two points along each axis, a positive spacing and one height for
	/// every grid point
	pub fn new(origin: Vec2, spacing: f32, columns: usize, rows: usize, heights: Vec<f32>) -> Option<Self> {
		if columns < 2 || rows < 2 || spacing <= 0.0 || !spacing.is_finite() {
			error!(
				"A heightfield needs at least 2x2 points with a positive spacing, found {}x{} with spacing {}",
				columns, rows, spacing
			);
			return None;
		}
		if heights.len() != columns * rows {
			error!(
				"A {}x{} heightfield needs {} heights, found {}",
				columns,
				rows,
				columns * rows,
				heights.len()
			);
			return None;
		}
		Some(HeightfieldTerrain {
			origin,
			spacing,
			columns,
			rows,
			heights,
		})
	}
	/// A level heightfield at height `z`
	pub fn flat(origin: Vec2, spacing: f32, columns: usize, rows: usize, z: f32) -> Option<Self> {
		HeightfieldTerrain::new(origin, spacing, columns, rows, vec![z; columns * rows])
	}
	/// Build a heightfield by evaluating `f(x, y)` at each grid point
	pub fn from_fn<F: Fn(f32, f32) -> f32>(
		origin: Vec2,
		spacing: f32,
		columns: usize,
		rows: usize,
		f: F,
	) -> Option<Self> {
		let mut heights = Vec::with_capacity(columns * rows);
		for row in 0..rows {
			for column in 0..columns {
				let x = origin.x + column as f32 * spacing;
				let y = origin.y + row as f32 * spacing;
				heights.push(f(x, y));
			}
		}
		HeightfieldTerrain::new(origin, spacing, columns, rows, heights)
	}
	/// Build a heightfield from a greyscale image, black is the lowest point
	/// and white reaches `max_height`. The first line of the image is the
	/// row furthest along Y
	#[cfg(feature = "heightmap")]
	pub fn from_heightmap(path: &str, origin: Vec2, spacing: f32, max_height: f32) -> Result<Self, WaypointError> {
		use photon_rs::native::open_image;
		let img = open_image(path).map_err(|e| WaypointError::Heightmap(format!("{:?}", e)))?;
		let columns = img.get_width() as usize;
		let rows = img.get_height() as usize;
		if columns < 2 || rows < 2 {
			return Err(WaypointError::Heightmap(format!(
				"{} is {}x{} pixels which cannot form a heightfield",
				path, columns, rows
			)));
		}
		let raw_pixels = img.get_raw_pixels();
		// pixels come as RGB or RGBA sets starting from the top left
		let chunk_size = if raw_pixels.len() == columns * rows * 4 {
			4
		} else {
			3
		};
		let mut lines: Vec<Vec<f32>> = Vec::with_capacity(rows);
		for line in raw_pixels.chunks(columns * chunk_size) {
			let heights = line
				.chunks_exact(chunk_size)
				.map(|px| {
					let colour_avg = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;
					colour_avg / 255.0 * max_height
				})
				.collect();
			lines.push(heights);
		}
		lines.reverse();
		let heights: Vec<f32> = lines.into_iter().flatten().collect();
		HeightfieldTerrain::new(origin, spacing, columns, rows, heights).ok_or_else(|| {
			WaypointError::Heightmap(format!(
				"{} is {}x{} pixels which cannot form a heightfield",
				path, columns, rows
			))
		})
	}
	pub fn get_origin(&self) -> Vec2 {
		self.origin
	}
	pub fn get_spacing(&self) -> f32 {
		self.spacing
	}
	pub fn get_columns(&self) -> usize {
		self.columns
	}
	pub fn get_rows(&self) -> usize {
		self.rows
	}
	/// World size of the grid along X and Y
	pub fn get_extent(&self) -> Vec2 {
		Vec2::new(
			(self.columns - 1) as f32 * self.spacing,
			(self.rows - 1) as f32 * self.spacing,
		)
	}
	/// Height stored at a grid point
	pub fn get_height(&self, column: usize, row: usize) -> Option<f32> {
		if column >= self.columns || row >= self.rows {
			return None;
		}
		self.heights.get(row * self.columns + column).copied()
	}
	/// Change the height of a grid point, returns `false` if the point is
	/// outside of the grid
	pub fn set_height(&mut self, column: usize, row: usize, z: f32) -> bool {
		if column >= self.columns || row >= self.rows {
			return false;
		}
		match self.heights.get_mut(row * self.columns + column) {
			Some(h) => {
				*h = z;
				true
			}
			None => false,
		}
	}
	/// Interpolated height at `(x, y)`, `None` outside of the grid
	pub fn sample_height(&self, x: f32, y: f32) -> Option<f32> {
		let fx = (x - self.origin.x) / self.spacing;
		let fy = (y - self.origin.y) / self.spacing;
		let max_x = (self.columns - 1) as f32;
		let max_y = (self.rows - 1) as f32;
		if !(0.0..=max_x).contains(&fx) || !(0.0..=max_y).contains(&fy) {
			return None;
		}
		Some(self.interpolate(fx, fy))
	}
	/// Surface normal at `(x, y)` from central differences, positions off
	/// the grid are clamped onto its edge
	pub fn sample_normal(&self, x: f32, y: f32) -> Vec3 {
		let s = self.spacing;
		let dh_dx = (self.sample_height_clamped(x + s, y) - self.sample_height_clamped(x - s, y)) / (2.0 * s);
		let dh_dy = (self.sample_height_clamped(x, y + s) - self.sample_height_clamped(x, y - s)) / (2.0 * s);
		Vec3::new(-dh_dx, -dh_dy, 1.0).normalize_or(Vec3::Z)
	}
	/// Height at `(x, y)` with the position clamped onto the grid
	fn sample_height_clamped(&self, x: f32, y: f32) -> f32 {
		let fx = ((x - self.origin.x) / self.spacing).clamp(0.0, (self.columns - 1) as f32);
		let fy = ((y - self.origin.y) / self.spacing).clamp(0.0, (self.rows - 1) as f32);
		self.interpolate(fx, fy)
	}
	/// Bilinear interpolation at a fractional grid position which must lie
	/// on the grid
	fn interpolate(&self, fx: f32, fy: f32) -> f32 {
		let c0 = (fx.floor() as usize).min(self.columns - 2);
		let r0 = (fy.floor() as usize).min(self.rows - 2);
		let tx = fx - c0 as f32;
		let ty = fy - r0 as f32;
		let h = |c: usize, r: usize| self.heights[r * self.columns + c];
		let bottom = h(c0, r0) * (1.0 - tx) + h(c0 + 1, r0) * tx;
		let top = h(c0, r0 + 1) * (1.0 - tx) + h(c0 + 1, r0 + 1) * tx;
		bottom * (1.0 - ty) + top * ty
	}
	/// Whether `point` lies on or below the surface, `None` off the grid
	fn is_below(&self, point: Vec3) -> Option<bool> {
		self.sample_height(point.x, point.y).map(|h| point.z <= h)
	}
	/// March along a sloped segment until it passes below the surface, then
	/// refine the crossing by bisection
	fn march(&self, segment: &ClampSegment) -> Option<TerrainHit> {
		let start = segment.get_start();
		let direction = segment.get_end() - start;
		let length = direction.length();
		if length <= f32::EPSILON {
			return None;
		}
		let steps = ((length / (self.spacing * 0.5)).ceil() as usize).clamp(1, MAX_MARCH_STEPS);
		let point_at = |t: f32| start + direction * t;
		let mut previous_t = 0.0;
		let mut previous_below = self.is_below(start);
		if previous_below == Some(true) {
			let h = self.sample_height(start.x, start.y)?;
			return Some(TerrainHit::new(
				Vec3::new(start.x, start.y, h),
				self.sample_normal(start.x, start.y),
			));
		}
		for i in 1..=steps {
			let t = i as f32 / steps as f32;
			let below = self.is_below(point_at(t));
			if below == Some(true) && previous_below == Some(false) {
				let mut lo = previous_t;
				let mut hi = t;
				for _ in 0..BISECTION_STEPS {
					let mid = 0.5 * (lo + hi);
					if self.is_below(point_at(mid)) == Some(true) {
						hi = mid;
					} else {
						lo = mid;
					}
				}
				let p = point_at(hi);
				let h = self.sample_height(p.x, p.y)?;
				return Some(TerrainHit::new(Vec3::new(p.x, p.y, h), self.sample_normal(p.x, p.y)));
			}
			previous_t = t;
			previous_below = below;
		}
		None
	}
}

impl TerrainQuery for HeightfieldTerrain {
	fn intersect(&self, segment: &ClampSegment) -> Vec<TerrainHit> {
		if segment.is_vertical() {
			let point = segment.get_start();
			let Some(h) = self.sample_height(point.x, point.y) else {
				return Vec::new();
			};
			let low = segment.get_start().z.min(segment.get_end().z);
			let high = segment.get_start().z.max(segment.get_end().z);
			if h < low || h > high {
				return Vec::new();
			}
			return vec![TerrainHit::new(
				Vec3::new(point.x, point.y, h),
				self.sample_normal(point.x, point.y),
			)];
		}
		self.march(segment).into_iter().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	/// A plane rising along X with a gradient of 0.5
	fn ramp() -> HeightfieldTerrain {
		HeightfieldTerrain::from_fn(Vec2::new(-10.0, -10.0), 1.0, 21, 21, |x, _| x * 0.5).unwrap()
	}
	#[test]
	fn invalid_grid() {
		assert!(HeightfieldTerrain::new(Vec2::ZERO, 1.0, 1, 4, vec![0.0; 4]).is_none());
		assert!(HeightfieldTerrain::new(Vec2::ZERO, 0.0, 2, 2, vec![0.0; 4]).is_none());
		assert!(HeightfieldTerrain::new(Vec2::ZERO, 1.0, 2, 2, vec![0.0; 3]).is_none());
	}
	#[test]
	fn bilinear_sample() {
		let terrain =
			HeightfieldTerrain::new(Vec2::ZERO, 2.0, 2, 2, vec![0.0, 2.0, 4.0, 6.0]).unwrap();
		assert_eq!(Some(0.0), terrain.sample_height(0.0, 0.0));
		assert_eq!(Some(3.0), terrain.sample_height(1.0, 1.0));
		assert_eq!(Some(6.0), terrain.sample_height(2.0, 2.0));
		assert_eq!(None, terrain.sample_height(2.1, 0.0));
		assert_eq!(None, terrain.sample_height(-0.1, 0.0));
	}
	#[test]
	fn flat_normal_is_up() {
		let terrain = HeightfieldTerrain::flat(Vec2::ZERO, 1.0, 4, 4, 3.0).unwrap();
		assert!(terrain.sample_normal(1.5, 1.5).abs_diff_eq(Vec3::Z, 1e-6));
	}
	#[test]
	fn ramp_normal_leans_back() {
		let terrain = ramp();
		let expected = Vec3::new(-0.5, 0.0, 1.0).normalize();
		assert!(terrain.sample_normal(0.0, 0.0).abs_diff_eq(expected, 1e-5));
	}
	#[test]
	fn vertical_hit() {
		let terrain = ramp();
		let hits = terrain.intersect(&ClampSegment::vertical(Vec3::new(4.0, 0.0, 50.0), 100.0));
		assert_eq!(1, hits.len());
		assert!((hits[0].get_point().z - 2.0).abs() < 1e-5);
	}
	#[test]
	fn vertical_miss_when_short() {
		let terrain = ramp();
		let hits = terrain.intersect(&ClampSegment::vertical(Vec3::new(4.0, 0.0, 50.0), 10.0));
		assert!(hits.is_empty());
	}
	#[test]
	fn vertical_miss_off_grid() {
		let terrain = ramp();
		let hits = terrain.intersect(&ClampSegment::vertical(Vec3::new(40.0, 0.0, 0.0), 100.0));
		assert!(hits.is_empty());
	}
	#[test]
	fn sloped_hit() {
		let terrain = HeightfieldTerrain::flat(Vec2::new(-10.0, -10.0), 1.0, 21, 21, 1.0).unwrap();
		let segment = ClampSegment::new(Vec3::new(-5.0, 0.0, 10.0), Vec3::new(5.0, 0.0, -10.0));
		let hits = terrain.intersect(&segment);
		assert_eq!(1, hits.len());
		// the segment crosses z = 1 at x = -0.5
		assert!((hits[0].get_point().x + 0.5).abs() < 0.01);
		assert_eq!(1.0, hits[0].get_point().z);
	}
	#[test]
	fn closest_hit_prefers_first_on_tie() {
		let hits = vec![
			TerrainHit::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z),
			TerrainHit::new(Vec3::new(1.0, 0.0, -5.0), Vec3::Z),
			TerrainHit::new(Vec3::new(2.0, 0.0, 20.0), Vec3::Z),
		];
		let closest = get_closest_hit(&hits, 0.0).unwrap();
		assert_eq!(0.0, closest.get_point().x);
		let closest = get_closest_hit(&hits, 14.0).unwrap();
		assert_eq!(2.0, closest.get_point().x);
		assert!(get_closest_hit(&[], 0.0).is_none());
	}
	#[test]
	fn grid_editing() {
		let mut terrain = HeightfieldTerrain::flat(Vec2::ZERO, 1.0, 3, 3, 0.0).unwrap();
		assert!(terrain.set_height(1, 1, 4.0));
		assert!(!terrain.set_height(3, 1, 4.0));
		assert_eq!(Some(4.0), terrain.get_height(1, 1));
		assert_eq!(Some(2.0), terrain.sample_height(1.5, 1.0));
		assert_eq!(Vec2::new(2.0, 2.0), terrain.get_extent());
	}
	#[test]
	fn eye_point_from_vec() {
		let eye = Vec3::new(1.0, 2.0, 3.0);
		assert_eq!(eye, eye.get_world_position());
	}
}
