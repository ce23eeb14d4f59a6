//! Logic for editing the [WaypointGraph] components of the world through
//! events and rebuilding their search levels once the concrete waypoints
//! have changed
//!

use std::collections::BTreeSet;

use crate::prelude::*;
use bevy::prelude::*;

/// Insert, or move, a waypoint of a [WaypointGraph]
#[derive(Event)]
pub struct EventInsertWaypoint {
	/// Entity holding the graph, `None` targets every graph
	graph: Option<Entity>,
	/// Waypoint to insert
	waypoint: Waypoint,
}

impl EventInsertWaypoint {
	/// Create a new instance of [EventInsertWaypoint]
	#[cfg(not(tarpaulin_include))]
	pub fn new(graph: Option<Entity>, waypoint: Waypoint) -> Self {
		EventInsertWaypoint { graph, waypoint }
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_graph(&self) -> Option<Entity> {
		self.graph
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_waypoint(&self) -> &Waypoint {
		&self.waypoint
	}
}

/// Remove a waypoint from a [WaypointGraph]
#[derive(Event)]
pub struct EventRemoveWaypoint {
	/// Entity holding the graph, `None` targets every graph
	graph: Option<Entity>,
	/// Waypoint to remove
	id: WaypointID,
}

impl EventRemoveWaypoint {
	/// Create a new instance of [EventRemoveWaypoint]
	#[cfg(not(tarpaulin_include))]
	pub fn new(graph: Option<Entity>, id: WaypointID) -> Self {
		EventRemoveWaypoint { graph, id }
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_graph(&self) -> Option<Entity> {
		self.graph
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_id(&self) -> WaypointID {
		self.id
	}
}

/// Rebuild the search levels of a [WaypointGraph] with a [DefaultGraphBuilder]
#[derive(Event)]
pub struct EventRebuildSearchGraph {
	/// Entity holding the graph, `None` targets every graph
	graph: Option<Entity>,
	/// How the levels are grouped
	builder: DefaultGraphBuilder,
	/// Upper bound on the number of search levels, level `0` included
	max_levels: u32,
}

impl EventRebuildSearchGraph {
	/// Create a new instance of [EventRebuildSearchGraph]
	#[cfg(not(tarpaulin_include))]
	pub fn new(graph: Option<Entity>, builder: DefaultGraphBuilder, max_levels: u32) -> Self {
		EventRebuildSearchGraph {
			graph,
			builder,
			max_levels,
		}
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_graph(&self) -> Option<Entity> {
		self.graph
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_builder(&self) -> &DefaultGraphBuilder {
		&self.builder
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_max_levels(&self) -> u32 {
		self.max_levels
	}
}

/// Whether an event aimed at `target` applies to `entity`
fn targets(target: Option<Entity>, entity: Entity) -> bool {
	target.is_none_or(|t| t == entity)
}

/// Read [EventInsertWaypoint] and [EventRemoveWaypoint] and apply them to
/// the targeted graphs
#[cfg(not(tarpaulin_include))]
pub fn process_waypoint_updates(
	mut inserts: EventReader<EventInsertWaypoint>,
	mut removals: EventReader<EventRemoveWaypoint>,
	mut graphs: Query<(Entity, &mut WaypointGraph)>,
) {
	for event in inserts.read() {
		for (entity, mut graph) in graphs.iter_mut() {
			if targets(event.get_graph(), entity) {
				graph.insert_waypoint(event.get_waypoint().clone());
			}
		}
	}
	for event in removals.read() {
		for (entity, mut graph) in graphs.iter_mut() {
			if targets(event.get_graph(), entity) && !graph.remove_waypoint(event.get_id()) {
				debug!("Waypoint {} is not part of graph {}", event.get_id(), entity);
			}
		}
	}
}

/// Read [EventRebuildSearchGraph] and rebuild the targeted graphs, each
/// graph is rebuilt at most once per frame with the last request aimed at it
#[cfg(not(tarpaulin_include))]
pub fn rebuild_search_graphs(
	mut events: EventReader<EventRebuildSearchGraph>,
	mut graphs: Query<(Entity, &mut WaypointGraph)>,
) {
	// coalesce events to avoid rebuilding the same graph repeatedly
	let requests: Vec<&EventRebuildSearchGraph> = events.read().collect();
	let mut rebuilt = BTreeSet::new();
	for event in requests.iter().rev() {
		for (entity, mut graph) in graphs.iter_mut() {
			if !targets(event.get_graph(), entity) || rebuilt.contains(&entity) {
				continue;
			}
			graph.create_search_graph(event.get_builder(), event.get_max_levels());
			info!(
				"Rebuilt waypoint graph {} with {} search levels",
				entity,
				graph.get_num_search_levels()
			);
			rebuilt.insert(entity);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn event_targets() {
		let a = Entity::from_raw(1);
		let b = Entity::from_raw(2);
		assert!(targets(None, a));
		assert!(targets(Some(a), a));
		assert!(!targets(Some(b), a));
	}
}
