//! A [WaypointCollection] is a node of the waypoint hierarchy. It aggregates
//! a set of children (either concrete waypoints or other collections, never a
//! mixture) into a bounding sphere whose centre is the centroid of the
//! children.
//!
//! Collections refer to each other by [WaypointID] rather than by pointer,
//! the nodes themselves live in a [WaypointTree] arena. A parent reference is
//! only ever used to propagate bound recalculations towards the root, it
//! carries no ownership.
//!

use std::collections::BTreeMap;

use crate::prelude::*;
use bevy::prelude::*;

/// When a waypoint is inserted into a collection that holds other
/// collections it is handed down to one of them. This decides which one
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum ChildSelection {
	/// Choose the child whose centre is the greatest distance from the
	/// waypoint. This is how the hierarchy has historically behaved and is
	/// retained so that existing data sets build identical trees
	#[default]
	Farthest,
	/// Choose the child whose centre is nearest to the waypoint, keeping the
	/// bounds of the hierarchy tight
	Nearest,
}

/// Records that a child of a collection has an edge to a waypoint, the edge
/// is stored against the collection which owns the destination
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Reflect)]
pub struct ChildEdge {
	/// The child of the collection the edge starts at
	from: WaypointID,
	/// Destination of the edge, one level below the collection
	to: WaypointID,
}

impl ChildEdge {
	/// Create a new instance of [ChildEdge]
	pub fn new(from: WaypointID, to: WaypointID) -> Self {
		ChildEdge { from, to }
	}
	pub fn get_from(&self) -> WaypointID {
		self.from
	}
	pub fn get_to(&self) -> WaypointID {
		self.to
	}
}

/// A bounding sphere over a set of children
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct WaypointCollection {
	/// Unique identifier, shares the id space of concrete waypoints
	id: WaypointID,
	/// Centroid of the children
	position: Vec3,
	/// Distance from `position` to the furthest child
	radius: f32,
	/// Set once the collection has held concrete waypoints, from then on it
	/// can never hold another collection
	is_leaf: bool,
	/// The collection containing this one, `None` for a root
	parent: Option<WaypointID>,
	/// Ordered children
	children: Vec<WaypointID>,
	/// Edges from the children of this collection, keyed by the collection
	/// which owns the destination of the edge
	child_edges: BTreeMap<WaypointID, Vec<ChildEdge>>,
}

impl WaypointCollection {
	/// Create a new empty [WaypointCollection]
	pub(crate) fn new(id: WaypointID) -> Self {
		WaypointCollection {
			id,
			position: Vec3::ZERO,
			radius: 0.0,
			is_leaf: false,
			parent: None,
			children: Vec::new(),
			child_edges: BTreeMap::new(),
		}
	}
	pub fn get_id(&self) -> WaypointID {
		self.id
	}
	/// Centroid of the children
	pub fn get_position(&self) -> Vec3 {
		self.position
	}
	/// Radius of the bounding sphere about [WaypointCollection::get_position]
	pub fn get_radius(&self) -> f32 {
		self.radius
	}
	/// Whether this collection holds concrete waypoints
	pub fn is_leaf(&self) -> bool {
		self.is_leaf
	}
	pub fn get_parent(&self) -> Option<WaypointID> {
		self.parent
	}
	pub fn is_root(&self) -> bool {
		self.parent.is_none()
	}
	pub fn get_children(&self) -> &[WaypointID] {
		&self.children
	}
	/// Number of immediate children
	pub fn degree(&self) -> usize {
		self.children.len()
	}
	pub fn contains_child(&self, id: WaypointID) -> bool {
		self.children.contains(&id)
	}
	/// Edges from the children of this collection which lead into the
	/// collection `to`
	pub fn get_child_edges(&self, to: WaypointID) -> &[ChildEdge] {
		self.child_edges.get(&to).map_or(&[], |edges| edges.as_slice())
	}
	/// Every child edge grouped by destination collection
	pub fn get_all_child_edges(&self) -> &BTreeMap<WaypointID, Vec<ChildEdge>> {
		&self.child_edges
	}
	/// Record an edge from one of the children
	pub(crate) fn add_child_edge(&mut self, to: WaypointID, edge: ChildEdge) {
		let edges = self.child_edges.entry(to).or_default();
		if !edges.contains(&edge) {
			edges.push(edge);
		}
	}
	/// Remove all child edges
	pub(crate) fn clear_child_edges(&mut self) {
		self.child_edges.clear();
	}
}

/// Arena owning every concrete [Waypoint] and every [WaypointCollection] of
/// a hierarchy
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, Default)]
pub struct WaypointTree {
	/// Concrete waypoints
	waypoints: BTreeMap<WaypointID, Waypoint>,
	/// Collections
	collections: BTreeMap<WaypointID, WaypointCollection>,
	/// How inserted waypoints descend through non-leaf collections
	child_selection: ChildSelection,
}

impl WaypointTree {
	/// Create an empty tree using the given [ChildSelection]
	pub fn new(child_selection: ChildSelection) -> Self {
		WaypointTree {
			child_selection,
			..Default::default()
		}
	}
	pub fn get_child_selection(&self) -> ChildSelection {
		self.child_selection
	}
	pub fn set_child_selection(&mut self, child_selection: ChildSelection) {
		self.child_selection = child_selection;
	}
	/// Get a reference to the map of concrete waypoints
	pub fn get_waypoints(&self) -> &BTreeMap<WaypointID, Waypoint> {
		&self.waypoints
	}
	/// Get a reference to the map of collections
	pub fn get_collections(&self) -> &BTreeMap<WaypointID, WaypointCollection> {
		&self.collections
	}
	pub fn get_waypoint(&self, id: WaypointID) -> Option<&Waypoint> {
		self.waypoints.get(&id)
	}
	/// Get a mutable reference to a concrete waypoint
	pub(crate) fn get_waypoint_mut(&mut self, id: WaypointID) -> Option<&mut Waypoint> {
		self.waypoints.get_mut(&id)
	}
	pub fn get_collection(&self, id: WaypointID) -> Option<&WaypointCollection> {
		self.collections.get(&id)
	}
	/// Get a mutable reference to a collection
	pub(crate) fn get_collection_mut(&mut self, id: WaypointID) -> Option<&mut WaypointCollection> {
		self.collections.get_mut(&id)
	}
	/// Look up either kind of node
	pub fn get_node(&self, id: WaypointID) -> Option<WaypointNode<'_>> {
		if let Some(c) = self.collections.get(&id) {
			Some(WaypointNode::Collection(c))
		} else {
			self.waypoints.get(&id).map(WaypointNode::Waypoint)
		}
	}
	/// Position of a waypoint or the centroid of a collection
	pub fn get_node_position(&self, id: WaypointID) -> Option<Vec3> {
		self.get_node(id).map(|n| n.get_position())
	}
	pub fn is_collection(&self, id: WaypointID) -> bool {
		self.collections.contains_key(&id)
	}
	pub fn contains(&self, id: WaypointID) -> bool {
		self.collections.contains_key(&id) || self.waypoints.contains_key(&id)
	}
	/// Store a concrete waypoint in the arena, replacing any waypoint with
	/// the same id
	pub(crate) fn add_waypoint(&mut self, waypoint: Waypoint) {
		self.waypoints.insert(waypoint.get_id(), waypoint);
	}
	/// Create an empty, parentless collection in the arena
	pub(crate) fn add_collection(&mut self, id: WaypointID) {
		self.collections
			.entry(id)
			.or_insert_with(|| WaypointCollection::new(id));
	}
	/// Drop a concrete waypoint from the arena
	pub(crate) fn remove_waypoint_node(&mut self, id: WaypointID) -> Option<Waypoint> {
		self.waypoints.remove(&id)
	}
	/// Drop a collection from the arena, it should already have been
	/// detached with [WaypointTree::clean_up]
	pub(crate) fn remove_collection_node(&mut self, id: WaypointID) -> Option<WaypointCollection> {
		self.collections.remove(&id)
	}
	/// Empty the arena
	pub fn clear(&mut self) {
		self.waypoints.clear();
		self.collections.clear();
	}
	/// Insert any node into `collection`, concrete waypoints go through
	/// [WaypointTree::insert_waypoint] and collections through
	/// [WaypointTree::add_child]. Returns the collection that ended up
	/// holding the node
	pub fn insert(
		&mut self,
		collection: WaypointID,
		child: WaypointID,
	) -> Result<WaypointID, WaypointError> {
		if self.is_collection(child) {
			self.add_child(collection, child)?;
			Ok(collection)
		} else {
			self.insert_waypoint(collection, child)
		}
	}
	/// Insert a concrete waypoint into the subtree of `collection`.
	///
	/// An empty collection becomes a leaf and takes the waypoint. A leaf
	/// appends it. Any other collection hands the waypoint down to the child
	/// picked by [WaypointTree::find_closest_child]. Returns the id of the
	/// leaf that took the waypoint
	pub fn insert_waypoint(
		&mut self,
		collection: WaypointID,
		waypoint: WaypointID,
	) -> Result<WaypointID, WaypointError> {
		let position = self
			.get_waypoint(waypoint)
			.ok_or(WaypointError::UnknownWaypoint(waypoint))?
			.get_position();
		let mut current = collection;
		loop {
			let wc = self.collection_mut_or_err(current)?;
			if wc.children.is_empty() {
				wc.is_leaf = true;
			}
			if wc.is_leaf {
				if !wc.children.contains(&waypoint) {
					wc.children.push(waypoint);
				}
				self.recalculate(current);
				return Ok(current);
			}
			match self.find_closest_child(current, position) {
				Some(child) if self.is_collection(child) => current = child,
				_ => {
					return Err(WaypointError::InvariantViolation(format!(
						"non-leaf collection {} holds a concrete waypoint",
						current
					)))
				}
			}
		}
	}
	/// Make `child` a child collection of `parent`. If `child` already has
	/// a different parent it is moved
	pub fn add_child(&mut self, parent: WaypointID, child: WaypointID) -> Result<(), WaypointError> {
		if parent == child {
			return Err(WaypointError::InvariantViolation(format!(
				"collection {} cannot be its own child",
				parent
			)));
		}
		let parent_wc = self.collection_or_err(parent)?;
		if parent_wc.is_leaf {
			return Err(WaypointError::InvariantViolation(format!(
				"leaf collection {} cannot hold collection {}",
				parent, child
			)));
		}
		let old_parent = self.collection_or_err(child)?.parent;
		if old_parent == Some(parent) {
			return Ok(());
		}
		if self.is_descendant_of(parent, child) {
			return Err(WaypointError::InvariantViolation(format!(
				"collection {} is an ancestor of {} and cannot become its child",
				child, parent
			)));
		}
		if let Some(old) = old_parent {
			self.remove_child(old, child)?;
		}
		self.collection_mut_or_err(child)?.parent = Some(parent);
		self.collection_mut_or_err(parent)?.children.push(child);
		self.recalculate(parent);
		Ok(())
	}
	/// Detach the child collection `child` from `parent`. The child must
	/// actually belong to `parent`
	pub fn remove_child(&mut self, parent: WaypointID, child: WaypointID) -> Result<(), WaypointError> {
		let child_parent = self.collection_or_err(child)?.parent;
		if child_parent != Some(parent) {
			return Err(WaypointError::InvariantViolation(format!(
				"collection {} is not a child of {}",
				child, parent
			)));
		}
		let wc = self.collection_mut_or_err(parent)?;
		wc.children.retain(|c| *c != child);
		self.collection_mut_or_err(child)?.parent = None;
		self.recalculate(parent);
		Ok(())
	}
	/// Remove a concrete waypoint which is an immediate child of
	/// `collection`, the subtree is not searched. Returns whether anything
	/// was removed
	pub fn remove_waypoint(
		&mut self,
		collection: WaypointID,
		waypoint: WaypointID,
	) -> Result<bool, WaypointError> {
		let wc = self.collection_mut_or_err(collection)?;
		let before = wc.children.len();
		wc.children.retain(|c| *c != waypoint);
		let removed = wc.children.len() != before;
		if removed {
			self.recalculate(collection);
		}
		Ok(removed)
	}
	/// Scan the immediate children of `collection` and pick one according
	/// to the [ChildSelection] of the tree. Ties go to the last child
	/// scanned
	pub fn find_closest_child(&self, collection: WaypointID, position: Vec3) -> Option<WaypointID> {
		let wc = self.get_collection(collection)?;
		let mut chosen = None;
		let mut best = match self.child_selection {
			ChildSelection::Farthest => f32::MIN,
			ChildSelection::Nearest => f32::MAX,
		};
		for child in wc.children.iter() {
			let Some(child_position) = self.get_node_position(*child) else {
				continue;
			};
			let distance = position.distance(child_position);
			let better = match self.child_selection {
				ChildSelection::Farthest => distance >= best,
				ChildSelection::Nearest => distance <= best,
			};
			if better {
				best = distance;
				chosen = Some(*child);
			}
		}
		chosen
	}
	/// Recompute the centroid and radius of `collection` from its current
	/// children and then do the same for every ancestor up to the root
	pub fn recalculate(&mut self, collection: WaypointID) {
		let mut current = Some(collection);
		while let Some(id) = current {
			let Some(wc) = self.collections.get(&id) else {
				break;
			};
			let positions: Vec<Vec3> = wc
				.children
				.iter()
				.filter_map(|c| self.get_node_position(*c))
				.collect();
			let mut position = wc.position;
			if positions.len() > 1 {
				position = positions.iter().sum::<Vec3>() / positions.len() as f32;
			} else if let Some(only) = positions.first() {
				position = *only;
			}
			let radius = positions
				.iter()
				.map(|p| position.distance(*p))
				.fold(0.0, f32::max);
			let parent = wc.parent;
			if let Some(wc) = self.collections.get_mut(&id) {
				wc.position = position;
				wc.radius = radius;
			}
			current = parent;
		}
	}
	/// Detach `collection` from its parent (if it is not a root) and drop
	/// all of its children. Child collections become roots
	pub fn clean_up(&mut self, collection: WaypointID) {
		let Some(wc) = self.collections.get_mut(&collection) else {
			return;
		};
		let parent = wc.parent.take();
		let children = std::mem::take(&mut wc.children);
		wc.radius = 0.0;
		if let Some(parent) = parent {
			if let Some(p) = self.collections.get_mut(&parent) {
				p.children.retain(|c| *c != collection);
			}
			self.recalculate(parent);
		}
		for child in children {
			if let Some(c) = self.collections.get_mut(&child) {
				c.parent = None;
			}
		}
	}
	/// Walk the parent references of a collection to the top of its tree
	pub fn get_root(&self, collection: WaypointID) -> Option<WaypointID> {
		let mut current = self.get_collection(collection)?;
		while let Some(parent) = current.parent.and_then(|p| self.get_collection(p)) {
			current = parent;
		}
		Some(current.id)
	}
	/// The chain of collections from `collection` (first) to its root (last)
	pub fn get_ancestors(&self, collection: WaypointID) -> Vec<WaypointID> {
		let mut chain = Vec::new();
		let mut current = self.get_collection(collection);
		while let Some(wc) = current {
			chain.push(wc.id);
			current = wc.parent.and_then(|p| self.get_collection(p));
		}
		chain
	}
	/// Whether `ancestor` is `collection` itself or sits somewhere above it
	pub fn is_descendant_of(&self, collection: WaypointID, ancestor: WaypointID) -> bool {
		self.get_ancestors(collection).contains(&ancestor)
	}
	/// Number of collections above `collection`
	pub fn depth(&self, collection: WaypointID) -> usize {
		self.get_ancestors(collection).len().saturating_sub(1)
	}
	/// Lookup a collection or produce the appropriate error
	fn collection_or_err(&self, id: WaypointID) -> Result<&WaypointCollection, WaypointError> {
		match self.collections.get(&id) {
			Some(wc) => Ok(wc),
			None if self.waypoints.contains_key(&id) => Err(WaypointError::NotACollection(id)),
			None => Err(WaypointError::UnknownWaypoint(id)),
		}
	}
	/// Mutable lookup of a collection or produce the appropriate error
	fn collection_mut_or_err(
		&mut self,
		id: WaypointID,
	) -> Result<&mut WaypointCollection, WaypointError> {
		if !self.collections.contains_key(&id) && self.waypoints.contains_key(&id) {
			return Err(WaypointError::NotACollection(id));
		}
		self.collections
			.get_mut(&id)
			.ok_or(WaypointError::UnknownWaypoint(id))
	}
}
