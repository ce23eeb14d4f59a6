//! Building a search level means deciding which nodes of the level below are
//! grouped together into a single collection. The strategy is pluggable via
//! [WaypointGraphBuilder], [DefaultGraphBuilder] clusters nodes which are
//! connected on the nav mesh of the lower level
//!

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::prelude::*;
use bevy::prelude::*;

/// Groups the nodes of a [SearchLevel] into the children of the collections
/// making up the next level
pub trait WaypointGraphBuilder {
	/// Partition the nodes of `level` into groups, every node of the level
	/// must appear in exactly one group. Each group becomes a new collection
	fn group_search_level(&self, level: &SearchLevel, tree: &WaypointTree) -> Vec<Vec<WaypointID>>;
}

/// Greedy clustering of a level. Nodes are visited in level order, each
/// unassigned node seeds a group which then grows breadth-first across the
/// edges of the level until it holds `max_children` nodes or runs out of
/// reachable nodes within `max_radius` of the seed
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct DefaultGraphBuilder {
	/// Upper bound on the children of a collection
	max_children: usize,
	/// Upper bound on the distance between the seed of a group and any
	/// other member
	max_radius: f32,
}

impl Default for DefaultGraphBuilder {
	fn default() -> Self {
		DefaultGraphBuilder {
			max_children: 4,
			max_radius: f32::INFINITY,
		}
	}
}

impl DefaultGraphBuilder {
	/// Create a new instance of [DefaultGraphBuilder]. A `max_children` of
	/// less than `2` can never reduce a level so it is raised to `2`
	pub fn new(max_children: usize, max_radius: f32) -> Self {
		DefaultGraphBuilder {
			max_children: max_children.max(2),
			max_radius,
		}
	}
	pub fn get_max_children(&self) -> usize {
		self.max_children
	}
	pub fn get_max_radius(&self) -> f32 {
		self.max_radius
	}
	/// Undirected neighbours of every node of the level, in a stable order
	fn build_adjacency(level: &SearchLevel) -> BTreeMap<WaypointID, Vec<WaypointID>> {
		let mut adjacency: BTreeMap<WaypointID, Vec<WaypointID>> = BTreeMap::new();
		for (from, to) in level.get_nav_mesh().iter() {
			let forward = adjacency.entry(from).or_default();
			if !forward.contains(&to) {
				forward.push(to);
			}
			let backward = adjacency.entry(to).or_default();
			if !backward.contains(&from) {
				backward.push(from);
			}
		}
		adjacency
	}
}

impl WaypointGraphBuilder for DefaultGraphBuilder {
	fn group_search_level(&self, level: &SearchLevel, tree: &WaypointTree) -> Vec<Vec<WaypointID>> {
		let members: BTreeSet<WaypointID> = level.get_nodes().iter().copied().collect();
		let adjacency = Self::build_adjacency(level);
		let mut assigned: BTreeSet<WaypointID> = BTreeSet::new();
		let mut groups = Vec::new();
		for seed in level.get_nodes() {
			if assigned.contains(seed) {
				continue;
			}
			let seed_position = tree.get_node_position(*seed).unwrap_or(Vec3::ZERO);
			assigned.insert(*seed);
			let mut group = vec![*seed];
			let mut queue = VecDeque::from([*seed]);
			'grow: while let Some(current) = queue.pop_front() {
				let Some(neighbours) = adjacency.get(&current) else {
					continue;
				};
				for next in neighbours.iter() {
					if group.len() >= self.max_children {
						break 'grow;
					}
					if assigned.contains(next) || !members.contains(next) {
						continue;
					}
					let Some(position) = tree.get_node_position(*next) else {
						continue;
					};
					if seed_position.distance(position) > self.max_radius {
						continue;
					}
					assigned.insert(*next);
					group.push(*next);
					queue.push_back(*next);
				}
			}
			groups.push(group);
		}
		debug!(
			"Grouped {} nodes of search level {} into {} collections",
			level.get_nodes().len(),
			level.get_level_num(),
			groups.len()
		);
		groups
	}
}
