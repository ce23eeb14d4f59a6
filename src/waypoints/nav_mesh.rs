//! Each search level carries a [NavMesh], the directed edges between the
//! nodes of that level. At level `0` the edges are authored by hand (or
//! loaded), at higher levels they are derived from the level below
//!

use std::collections::BTreeMap;

use crate::prelude::*;

/// Directed edges keyed by the [WaypointID] they start from. Duplicate edges
/// are ignored
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavMesh(BTreeMap<WaypointID, Vec<WaypointID>>);

impl NavMesh {
	/// Get a reference to the map of edges
	pub fn get(&self) -> &BTreeMap<WaypointID, Vec<WaypointID>> {
		&self.0
	}
	/// Add the edge `from -> to`, returns `false` if it already existed
	pub fn add_edge(&mut self, from: WaypointID, to: WaypointID) -> bool {
		let edges = self.0.entry(from).or_default();
		if edges.contains(&to) {
			false
		} else {
			edges.push(to);
			true
		}
	}
	/// Remove the edge `from -> to`, returns whether it existed
	pub fn remove_edge(&mut self, from: WaypointID, to: WaypointID) -> bool {
		let Some(edges) = self.0.get_mut(&from) else {
			return false;
		};
		let before = edges.len();
		edges.retain(|e| *e != to);
		let removed = edges.len() != before;
		if edges.is_empty() {
			self.0.remove(&from);
		}
		removed
	}
	/// Remove every edge leaving `from`
	pub fn remove_all_edges(&mut self, from: WaypointID) {
		self.0.remove(&from);
	}
	/// Remove every edge leaving or arriving at `id`
	pub fn remove_waypoint(&mut self, id: WaypointID) {
		self.0.remove(&id);
		self.0.retain(|_, edges| {
			edges.retain(|e| *e != id);
			!edges.is_empty()
		});
	}
	/// Destinations of the edges leaving `from`
	pub fn get_edges(&self, from: WaypointID) -> &[WaypointID] {
		self.0.get(&from).map_or(&[], |e| e.as_slice())
	}
	pub fn contains_edge(&self, from: WaypointID, to: WaypointID) -> bool {
		self.get_edges(from).contains(&to)
	}
	/// Total number of directed edges
	pub fn get_edge_count(&self) -> usize {
		self.0.values().map(|e| e.len()).sum()
	}
	/// Iterate over every edge as a `(from, to)` pair
	pub fn iter(&self) -> impl Iterator<Item = (WaypointID, WaypointID)> + '_ {
		self.0
			.iter()
			.flat_map(|(from, edges)| edges.iter().map(move |to| (*from, *to)))
	}
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
	pub fn clear(&mut self) {
		self.0.clear();
	}
}
