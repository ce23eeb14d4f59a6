//! Errors raised while manipulating the waypoint hierarchy
//!

use crate::prelude::*;

/// Everything that can go wrong when mutating or loading a [WaypointGraph]
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
	/// The id is not known to the graph or tree
	#[error("waypoint {0} does not exist")]
	UnknownWaypoint(WaypointID),
	/// An operation expected a collection but was given a concrete waypoint
	#[error("waypoint {0} is not a collection")]
	NotACollection(WaypointID),
	/// A mutation would break the structure of the hierarchy, for instance
	/// a leaf collection receiving a child collection
	#[error("invariant violation: {0}")]
	InvariantViolation(String),
	/// A child can only be assigned to a collection exactly one search level
	/// above it
	#[error("collection {parent} has search level {parent_level} which should be 1 greater than child {child} search level of {child_level}")]
	LevelMismatch {
		/// The waypoint being assigned
		child: WaypointID,
		/// The collection it was being assigned to
		parent: WaypointID,
		/// Search level of the child
		child_level: u32,
		/// Search level of the parent
		parent_level: u32,
	},
	/// Reading or writing a file failed
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// A RON document could not be parsed
	#[cfg(feature = "ron")]
	#[error(transparent)]
	RonDe(#[from] ron::error::SpannedError),
	/// A RON document could not be produced
	#[cfg(feature = "ron")]
	#[error(transparent)]
	RonSer(#[from] ron::Error),
	/// A CSV record could not be read
	#[cfg(feature = "csv")]
	#[error(transparent)]
	Csv(#[from] csv::Error),
	/// A heightmap image could not be opened or describes an unusable grid
	#[cfg(feature = "heightmap")]
	#[error("heightmap could not be used: {0}")]
	Heightmap(String),
}
