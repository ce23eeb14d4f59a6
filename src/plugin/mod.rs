//! Defines the Bevy [Plugin] for waypoint graphs and ground clamping
//!

use crate::prelude::*;
use bevy::prelude::*;

pub mod clamp_layer;
pub mod graph_layer;

/// Graphs are edited before actors are clamped
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum OrderingSet {
	/// Apply waypoint edits and rebuild search levels
	Graph,
	/// Clamp actors onto the terrain
	Clamp,
}

/// Adds the waypoint graph and ground clamping systems
pub struct WaypointGroundPlugin;

impl Plugin for WaypointGroundPlugin {
	#[cfg(not(tarpaulin_include))]
	fn build(&self, app: &mut App) {
		app.init_resource::<clamp_layer::GroundClamperRes>()
			.register_type::<WaypointID>()
			.register_type::<WaypointType>()
			.register_type::<Waypoint>()
			.register_type::<ChildSelection>()
			.register_type::<ChildEdge>()
			.register_type::<DefaultGraphBuilder>()
			.register_type::<GroundClampingType>()
			.register_type::<ClampRuntimeData>()
			.register_type::<clamp_layer::GroundClampEyePoint>()
			.register_type::<clamp_layer::UnclampedTransform>()
			.register_type::<clamp_layer::ClampVelocity>()
			.add_event::<graph_layer::EventInsertWaypoint>()
			.add_event::<graph_layer::EventRemoveWaypoint>()
			.add_event::<graph_layer::EventRebuildSearchGraph>()
			.configure_sets(Update, (OrderingSet::Graph, OrderingSet::Clamp).chain())
			.add_systems(
				Update,
				(
					(
						graph_layer::process_waypoint_updates,
						graph_layer::rebuild_search_graphs,
					)
						.chain()
						.in_set(OrderingSet::Graph),
					(
						clamp_layer::update_eye_point,
						clamp_layer::clamp_actors,
						clamp_layer::finish_up,
					)
						.chain()
						.in_set(OrderingSet::Clamp),
				),
			);
	}
}
