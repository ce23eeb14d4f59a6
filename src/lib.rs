//! This is a plugin for Bevy game engine to build hierarchical waypoint graphs for navigation and to clamp actors onto terrain
//!

pub mod clamping;
pub mod error;
pub mod plugin;
pub mod waypoints;

pub mod prelude;
