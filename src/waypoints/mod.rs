//! Waypoints are identified points of interest within the navigable space of
//! a world. To keep searches over large worlds cheap the waypoints are
//! gathered into a hierarchy of collections, each collection being a bounding
//! sphere over its children.
//!
//! [HPA*](https://webdocs.cs.ualberta.ca/~mmueller/ps/hpastar.pdf)
//!
//! Definitions:
//!
//! * Waypoint - a concrete point in 3d space with a unique [WaypointID]
//! * Collection - a node of the hierarchy grouping waypoints (or other
//! collections) into a single bounding region. A collection is itself
//! addressed by a [WaypointID] so it can take part in higher level searches
//! exactly like a waypoint can
//! * Search level - one layer of the hierarchy. Level `0` holds the concrete
//! waypoints, level `1` the collections grouping them, level `2` the
//! collections grouping those and so on
//!
//! ```text
//! level 2                 (C4)
//!                       /      \
//! level 1           (C1)        (C2)
//!                  / |  \       /   \
//! level 0        w1  w2  w3   w4     w5
//! ```
//!
//! * Nav mesh - the set of directed edges between the nodes of a single
//! search level
//!

pub mod builder;
pub mod collection;
pub mod graph;
pub mod nav_mesh;

use bevy::prelude::*;

/// Unique ID of a waypoint or a collection of waypoints
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Reflect)]
pub struct WaypointID(u32);

impl WaypointID {
	/// Create a new instance of [WaypointID]
	pub fn new(id: u32) -> Self {
		WaypointID(id)
	}
	/// Get the raw id
	pub fn get(&self) -> u32 {
		self.0
	}
}

impl std::fmt::Display for WaypointID {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The closed set of waypoint varieties
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, PartialEq, Eq, Debug, Default, Reflect)]
pub enum WaypointType {
	/// A plain point of navigation
	#[default]
	Default,
	/// A waypoint carrying a human readable name, i.e a spawn point or a
	/// location referenced by scripts
	Named(String),
	/// A waypoint of tactical interest such as cover or a sniping position
	Tactical,
	/// Groups other waypoints, see [crate::prelude::WaypointCollection]
	Collection,
}

/// A concrete point of navigation
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, PartialEq, Debug, Reflect)]
pub struct Waypoint {
	/// Unique identifier
	id: WaypointID,
	/// World position
	position: Vec3,
	/// What kind of waypoint this is
	kind: WaypointType,
}

impl Waypoint {
	/// Create a new [WaypointType::Default] waypoint
	pub fn new(id: WaypointID, position: Vec3) -> Self {
		Waypoint {
			id,
			position,
			kind: WaypointType::Default,
		}
	}
	/// Create a new waypoint of a particular [WaypointType]
	pub fn new_with_type(id: WaypointID, position: Vec3, kind: WaypointType) -> Self {
		Waypoint { id, position, kind }
	}
	pub fn get_id(&self) -> WaypointID {
		self.id
	}
	pub fn get_position(&self) -> Vec3 {
		self.position
	}
	/// Move the waypoint. When the waypoint is held by a
	/// [crate::prelude::WaypointGraph] use
	/// [crate::prelude::WaypointGraph::move_waypoint] instead so that the
	/// bounds of the collections containing it are updated
	pub fn set_position(&mut self, position: Vec3) {
		self.position = position;
	}
	pub fn get_waypoint_type(&self) -> &WaypointType {
		&self.kind
	}
}

/// A borrowed view of anything addressable by a [WaypointID], either a
/// concrete [Waypoint] or a [collection::WaypointCollection]
#[derive(Clone, Copy, Debug)]
pub enum WaypointNode<'a> {
	/// A concrete point
	Waypoint(&'a Waypoint),
	/// A grouping of other nodes
	Collection(&'a collection::WaypointCollection),
}

impl WaypointNode<'_> {
	pub fn get_id(&self) -> WaypointID {
		match self {
			WaypointNode::Waypoint(w) => w.get_id(),
			WaypointNode::Collection(c) => c.get_id(),
		}
	}
	/// For a waypoint its location, for a collection the centroid of its
	/// children
	pub fn get_position(&self) -> Vec3 {
		match self {
			WaypointNode::Waypoint(w) => w.get_position(),
			WaypointNode::Collection(c) => c.get_position(),
		}
	}
	pub fn get_waypoint_type(&self) -> WaypointType {
		match self {
			WaypointNode::Waypoint(w) => w.get_waypoint_type().clone(),
			WaypointNode::Collection(_) => WaypointType::Collection,
		}
	}
	pub fn is_collection(&self) -> bool {
		matches!(self, WaypointNode::Collection(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn waypoint_default_type() {
		let w = Waypoint::new(WaypointID::new(3), Vec3::new(1.0, 2.0, 3.0));
		assert_eq!(WaypointType::Default, *w.get_waypoint_type());
		assert_eq!(WaypointID::new(3), w.get_id());
	}
	#[test]
	fn waypoint_move() {
		let mut w = Waypoint::new_with_type(
			WaypointID::new(1),
			Vec3::ZERO,
			WaypointType::Named("spawn".to_string()),
		);
		w.set_position(Vec3::new(4.0, 0.0, 1.0));
		assert_eq!(Vec3::new(4.0, 0.0, 1.0), w.get_position());
		assert_eq!(WaypointType::Named("spawn".to_string()), *w.get_waypoint_type());
	}
	#[test]
	fn node_view_of_waypoint() {
		let w = Waypoint::new(WaypointID::new(7), Vec3::ONE);
		let node = WaypointNode::Waypoint(&w);
		assert!(!node.is_collection());
		assert_eq!(WaypointID::new(7), node.get_id());
		assert_eq!(Vec3::ONE, node.get_position());
	}
}
