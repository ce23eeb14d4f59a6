//! `use bevy_waypoint_ground_plugin::prelude::*;` to import common structures and methods
//!

#[doc(hidden)]
pub use crate::waypoints::{builder::*, collection::*, graph::*, nav_mesh::*, *};

#[doc(hidden)]
pub use crate::clamping::{clamper::*, terrain::*, *};

#[doc(hidden)]
pub use crate::{
	error::*,
	plugin::{clamp_layer::*, graph_layer::*, *},
};
