//! The [WaypointGraph] owns every search level of a hierarchy. Level `0`
//! holds the concrete waypoints and the edges between them, each level above
//! is produced by a [WaypointGraphBuilder] grouping the nodes of the level
//! below into collections and promoting the edges of their children.
//!
//! Consumers such as a hierarchical pathfinder use the graph to answer
//! structural questions cheaply: are two waypoints in the same tree, which is
//! the lowest collection containing both of them and which collections lie
//! between a waypoint and one of its ancestors.
//!

use std::collections::BTreeMap;

use crate::prelude::*;
use bevy::prelude::*;

/// Interception points around the bookkeeping of a [WaypointGraph]. A
/// domain specific graph can veto edges, filter what is reported and clean
/// up its own state without reimplementing any of the graph
pub trait GraphHooks: Send + Sync + 'static {
	/// Called before an edge is added at `level`, returning `false` stops
	/// the edge from being added
	fn allow_edge(&mut self, _from: WaypointID, _to: WaypointID, _level: u32) -> bool {
		true
	}
	/// Called after an edge has been removed from `level`
	fn on_edge_removed(&mut self, _from: WaypointID, _to: WaypointID, _level: u32) {}
	/// Called after every edge leaving `from` has been removed
	fn on_all_edges_removed(&mut self, _from: WaypointID, _level: u32) {}
	/// Called after a node has been removed from the graph
	fn on_waypoint_removed(&mut self, _id: WaypointID, _level: u32) {}
	/// Adjust the destinations reported for the edges leaving `from`
	fn filter_edges(&self, _from: WaypointID, _edges: &mut Vec<WaypointID>) {}
	/// Refine the structural answer of [WaypointGraph::has_path] for the
	/// collections `lhs` and `rhs`
	fn has_path(&self, _lhs: WaypointID, _rhs: WaypointID, structural: bool) -> bool {
		structural
	}
	/// Called once the graph has been emptied
	fn on_clear(&mut self) {}
}

/// [GraphHooks] which leave every behaviour of the graph untouched
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl GraphHooks for NoHooks {}

/// One layer of the hierarchy
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchLevel {
	/// Index of the level, `0` holds concrete waypoints
	level_num: u32,
	/// Members of the level in insertion order
	nodes: Vec<WaypointID>,
	/// Edges between the members
	nav_mesh: NavMesh,
}

impl SearchLevel {
	/// Create a new empty [SearchLevel]
	pub fn new(level_num: u32) -> Self {
		SearchLevel {
			level_num,
			..Default::default()
		}
	}
	pub fn get_level_num(&self) -> u32 {
		self.level_num
	}
	pub fn get_nodes(&self) -> &[WaypointID] {
		&self.nodes
	}
	pub fn get_nav_mesh(&self) -> &NavMesh {
		&self.nav_mesh
	}
	pub fn get_nav_mesh_mut(&mut self) -> &mut NavMesh {
		&mut self.nav_mesh
	}
	pub fn contains(&self, id: WaypointID) -> bool {
		self.nodes.contains(&id)
	}
}

/// Where a node of the graph lives
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ownership {
	/// Search level the node is a member of
	level: u32,
	/// For a concrete waypoint the collection holding it (if any), for a
	/// collection the collection itself
	collection: Option<WaypointID>,
}

/// The state of a [WaypointGraph] without its hooks
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, Default)]
struct GraphData {
	/// Search levels keyed by level number
	levels: BTreeMap<u32, SearchLevel>,
	/// Arena of waypoints and collections
	tree: WaypointTree,
	/// Level and containing collection of every registered node
	ownership: BTreeMap<WaypointID, Ownership>,
	/// Next id handed out by [WaypointGraph::create_collection]
	next_id: u32,
}

impl GraphData {
	/// Get a level, creating it if necessary
	fn level_mut(&mut self, level: u32) -> &mut SearchLevel {
		self.levels
			.entry(level)
			.or_insert_with(|| SearchLevel::new(level))
	}
	/// Make sure ids handed out later never collide with `id`
	fn reserve_id(&mut self, id: WaypointID) {
		self.next_id = self.next_id.max(id.get().saturating_add(1));
	}
	/// Lowest id not used by any node of the arena
	fn compute_next_id(&self) -> u32 {
		let waypoints = self.tree.get_waypoints().keys().last();
		let collections = self.tree.get_collections().keys().last();
		waypoints
			.max(collections)
			.map_or(0, |id| id.get().saturating_add(1))
	}
	/// Register a collection at `level`
	fn register_collection(&mut self, id: WaypointID, level: u32) {
		self.tree.add_collection(id);
		self.level_mut(level).nodes.push(id);
		self.ownership.insert(
			id,
			Ownership {
				level,
				collection: Some(id),
			},
		);
		self.reserve_id(id);
	}
	/// Drop a node from the ownership index and from its search level,
	/// including every edge leading to or from it. The arena is untouched
	fn unregister(&mut self, id: WaypointID) -> Option<u32> {
		let owner = self.ownership.remove(&id)?;
		if let Some(sl) = self.levels.get_mut(&owner.level) {
			sl.nav_mesh.remove_waypoint(id);
			sl.nodes.retain(|n| *n != id);
		}
		Some(owner.level)
	}
	/// The collection a node belongs to, for a collection itself
	fn collection_of(&self, id: WaypointID) -> Option<WaypointID> {
		self.ownership.get(&id).and_then(|o| o.collection)
	}
	/// The parent of a node, for a waypoint its leaf collection and for a
	/// collection the collection above it
	fn parent_of(&self, id: WaypointID) -> Option<WaypointID> {
		let owner = self.ownership.get(&id)?;
		match owner.collection {
			Some(c) if c == id => self.tree.get_collection(id).and_then(|wc| wc.get_parent()),
			other => other,
		}
	}
	/// Destroy every level from `start` upwards, the collections making them
	/// up are removed from the arena and the nodes of the level below become
	/// parentless again
	fn remove_levels_from(&mut self, start: u32) {
		let start = start.max(1);
		let doomed: Vec<u32> = self.levels.range(start..).map(|(k, _)| *k).collect();
		for level in doomed.iter().rev() {
			let Some(sl) = self.levels.remove(level) else {
				continue;
			};
			for id in sl.nodes {
				self.tree.clean_up(id);
				self.tree.remove_collection_node(id);
				self.ownership.remove(&id);
			}
		}
		if let Some(below) = self.levels.get(&(start - 1)) {
			for id in below.nodes.iter() {
				if let Some(owner) = self.ownership.get_mut(id) {
					if owner.collection != Some(*id) {
						owner.collection = None;
					}
				}
			}
		}
		if !doomed.is_empty() {
			debug!("Removed search levels {:?}", doomed);
		}
		self.next_id = self.compute_next_id();
	}
	/// Remove a node and, for a collection, everything beneath it
	fn remove_subtree(&mut self, id: WaypointID, removed: &mut Vec<(WaypointID, u32)>) {
		if self.tree.is_collection(id) {
			let children: Vec<WaypointID> = self
				.tree
				.get_collection(id)
				.map(|wc| wc.get_children().to_vec())
				.unwrap_or_default();
			for child in children {
				self.remove_subtree(child, removed);
			}
			self.tree.clean_up(id);
			self.tree.remove_collection_node(id);
		} else {
			self.tree.remove_waypoint_node(id);
		}
		if let Some(level) = self.unregister(id) {
			removed.push((id, level));
		}
	}
}

/// A hierarchy of waypoints split into search levels
#[derive(Component, Clone, Debug, Default)]
pub struct WaypointGraph<H: GraphHooks = NoHooks> {
	/// Levels, arena and indices
	data: GraphData,
	/// Customisation of the bookkeeping
	hooks: H,
}

impl WaypointGraph<NoHooks> {
	/// Create an empty graph without any hooks
	pub fn new() -> Self {
		WaypointGraph::default()
	}
}

impl<H: GraphHooks> WaypointGraph<H> {
	/// Create an empty graph using the given [GraphHooks]
	pub fn with_hooks(hooks: H) -> Self {
		WaypointGraph {
			data: GraphData::default(),
			hooks,
		}
	}
	pub fn get_hooks(&self) -> &H {
		&self.hooks
	}
	pub fn get_hooks_mut(&mut self) -> &mut H {
		&mut self.hooks
	}
	/// Get a reference to the arena of waypoints and collections
	pub fn get_tree(&self) -> &WaypointTree {
		&self.data.tree
	}
	pub fn get_child_selection(&self) -> ChildSelection {
		self.data.tree.get_child_selection()
	}
	/// Choose how waypoints inserted into an existing hierarchy descend
	/// through it
	pub fn set_child_selection(&mut self, child_selection: ChildSelection) {
		self.data.tree.set_child_selection(child_selection);
	}
	/// Insert a waypoint into level `0` of the graph.
	///
	/// If the id is already known the call is treated as a move of that
	/// waypoint. When a hierarchy has been built the waypoint is also pushed
	/// down from the closest root so the collections above it stay
	/// consistent. A waypoint of [WaypointType::Collection] is registered as
	/// an empty collection on level `1`
	pub fn insert_waypoint(&mut self, waypoint: Waypoint) {
		let id = waypoint.get_id();
		if self.contains(id) {
			if self.data.tree.is_collection(id) {
				self.data.tree.recalculate(id);
			} else {
				self.move_waypoint(id, waypoint.get_position());
			}
			return;
		}
		if self.data.tree.contains(id) {
			error!("Waypoint {} clashes with an unregistered collection", id);
			return;
		}
		if *waypoint.get_waypoint_type() == WaypointType::Collection {
			self.data.register_collection(id, 1);
			return;
		}
		let position = waypoint.get_position();
		self.data.tree.add_waypoint(waypoint);
		self.data.level_mut(0).nodes.push(id);
		self.data.ownership.insert(
			id,
			Ownership {
				level: 0,
				collection: None,
			},
		);
		self.data.reserve_id(id);
		if let Some(root) = self.closest_root(position) {
			match self.data.tree.insert_waypoint(root, id) {
				Ok(leaf) if self.data.ownership.get(&leaf).map(|o| o.level) == Some(1) => {
					if let Some(owner) = self.data.ownership.get_mut(&id) {
						owner.collection = Some(leaf);
					}
				}
				Ok(leaf) => {
					error!(
						"Waypoint {} descended into collection {} which is not on search level 1",
						id, leaf
					);
					let _ = self.data.tree.remove_waypoint(leaf, id);
				}
				Err(e) => error!("Failed to insert waypoint {} into the hierarchy: {}", id, e),
			}
		}
	}
	/// The root on the highest search level nearest to `position`
	fn closest_root(&self, position: Vec3) -> Option<WaypointID> {
		let (_, top) = self
			.data
			.levels
			.range(1..)
			.filter(|(_, sl)| !sl.nodes.is_empty())
			.last()?;
		top.nodes
			.iter()
			.filter_map(|id| self.data.tree.get_collection(*id))
			.filter(|wc| wc.is_root() && wc.degree() > 0)
			.map(|wc| (wc.get_id(), wc.get_position().distance(position)))
			.min_by(|a, b| a.1.total_cmp(&b.1))
			.map(|(id, _)| id)
	}
	/// Move a concrete waypoint and recalculate the collections above it.
	/// Returns `false` if the id does not name a concrete waypoint of the
	/// graph
	pub fn move_waypoint(&mut self, id: WaypointID, position: Vec3) -> bool {
		if !self.data.ownership.contains_key(&id) {
			return false;
		}
		let Some(waypoint) = self.data.tree.get_waypoint_mut(id) else {
			return false;
		};
		waypoint.set_position(position);
		if let Some(collection) = self.data.collection_of(id) {
			self.data.tree.recalculate(collection);
		}
		true
	}
	/// Create a new empty collection with a fresh id. It is not part of any
	/// search level until it is inserted or assigned a child
	pub fn create_collection(&mut self) -> WaypointID {
		let id = WaypointID::new(self.data.next_id);
		self.data.next_id = self.data.next_id.saturating_add(1);
		self.data.tree.add_collection(id);
		id
	}
	/// Register a collection on a particular search level, returns `false`
	/// if the id is already part of the graph or names a concrete waypoint
	pub fn insert_collection(&mut self, id: WaypointID, level: u32) -> bool {
		if self.contains(id) || self.data.tree.get_waypoint(id).is_some() {
			return false;
		}
		self.data.register_collection(id, level);
		true
	}
	/// Remove a node from the graph. Removing a collection removes its whole
	/// subtree. Any collection above the node that is left without children
	/// is collapsed, all the way up to and including the root
	pub fn remove_waypoint(&mut self, id: WaypointID) -> bool {
		if !self.contains(id) {
			return false;
		}
		let parent = self.data.parent_of(id);
		if let Some(parent) = parent {
			if !self.data.tree.is_collection(id) {
				let _ = self.data.tree.remove_waypoint(parent, id);
			}
		}
		let mut removed = Vec::new();
		self.data.remove_subtree(id, &mut removed);
		let mut current = parent;
		while let Some(c) = current {
			let Some(wc) = self.data.tree.get_collection(c) else {
				break;
			};
			if wc.degree() > 0 {
				break;
			}
			current = wc.get_parent();
			debug!("Collapsing empty collection {}", c);
			self.data.tree.clean_up(c);
			self.data.tree.remove_collection_node(c);
			if let Some(level) = self.data.unregister(c) {
				removed.push((c, level));
			}
		}
		for (id, level) in removed {
			self.hooks.on_waypoint_removed(id, level);
		}
		true
	}
	/// Make `parent` the collection holding `child`.
	///
	/// `parent` must be a collection one search level above `child`. If it
	/// is not yet registered it is placed on that level, if it sits on a
	/// different level but is an empty root it is moved to that level.
	/// Otherwise the assignment is refused and `false` returned
	pub fn assign(&mut self, child: WaypointID, parent: WaypointID) -> bool {
		let Some(child_owner) = self.data.ownership.get(&child).copied() else {
			info!("Cannot assign unknown waypoint {} to collection {}", child, parent);
			return false;
		};
		let Some(parent_wc) = self.data.tree.get_collection(parent) else {
			error!("Cannot assign waypoint {} to {}, {}", child, parent, WaypointError::NotACollection(parent));
			return false;
		};
		let child_is_collection = self.data.tree.is_collection(child);
		if child_is_collection && parent_wc.is_leaf() {
			error!(
				"Cannot assign collection {} to leaf collection {}",
				child, parent
			);
			return false;
		}
		let level = child_owner.level + 1;
		match self.data.ownership.get(&parent).copied() {
			None => self.data.register_collection(parent, level),
			Some(parent_owner) if parent_owner.level != level => {
				if parent_wc.is_root() && parent_wc.degree() == 0 {
					self.data.unregister(parent);
					self.data.register_collection(parent, level);
				} else {
					let e = WaypointError::LevelMismatch {
						child,
						parent,
						child_level: child_owner.level,
						parent_level: parent_owner.level,
					};
					error!("{}", e);
					return false;
				}
			}
			Some(_) => {}
		}
		let holder = match self.data.tree.insert(parent, child) {
			Ok(holder) => holder,
			Err(e) => {
				error!("{}", e);
				return false;
			}
		};
		if !child_is_collection {
			if let Some(old) = child_owner.collection {
				if old != holder {
					let _ = self.data.tree.remove_waypoint(old, child);
				}
			}
			if let Some(owner) = self.data.ownership.get_mut(&child) {
				owner.collection = Some(holder);
			}
		}
		true
	}
	/// Rebuild the hierarchy. Every level above `0` is destroyed and then
	/// levels `1..max_levels` are built in turn until one cannot be
	pub fn create_search_graph(&mut self, builder: &dyn WaypointGraphBuilder, max_levels: u32) {
		self.data.remove_levels_from(1);
		for level in 1..max_levels {
			if !self.create_search_level(builder, level) {
				break;
			}
		}
		debug!(
			"Search graph built with {} levels",
			self.get_num_search_levels()
		);
	}
	/// Build a single search level from the one below it, any existing
	/// level at or above `level` is destroyed first. Returns `false` if the
	/// level cannot be built, i.e the level below holds fewer than two nodes
	/// or grouping it does not reduce the number of nodes
	pub fn create_search_level(&mut self, builder: &dyn WaypointGraphBuilder, level: u32) -> bool {
		if level == 0 {
			error!("Cannot create search level 0, search level 0 represents the concrete waypoints");
			return false;
		}
		self.data.remove_levels_from(level);
		let Some(below) = self.data.levels.get(&(level - 1)) else {
			return false;
		};
		if below.nodes.len() < 2 {
			return false;
		}
		let groups = builder.group_search_level(below, &self.data.tree);
		if groups.is_empty() || groups.len() >= below.nodes.len() {
			debug!(
				"Search level {} would not reduce {} nodes, stopping",
				level,
				below.nodes.len()
			);
			return false;
		}
		for group in groups {
			let collection = self.create_collection();
			for child in group {
				if !self.assign(child, collection) {
					error!(
						"Builder failed to assign {} to collection {} on search level {}",
						child, collection, level
					);
					self.data.remove_levels_from(level);
					return false;
				}
			}
		}
		self.create_abstract_edges_at_level(level);
		true
	}
	/// Derive the edges of every level above `0`
	pub fn create_abstract_edges(&mut self) {
		let levels: Vec<u32> = self.data.levels.range(1..).map(|(k, _)| *k).collect();
		for level in levels {
			self.create_abstract_edges_at_level(level);
		}
	}
	/// Derive the edges of `level` from the level below. Two collections are
	/// joined when a child of one has an edge to a child of the other, and
	/// every such edge is recorded as a [ChildEdge] on the collection it
	/// starts from
	pub fn create_abstract_edges_at_level(&mut self, level: u32) {
		if level == 0 {
			return;
		}
		let Some(current) = self.data.levels.get(&level) else {
			return;
		};
		let Some(below) = self.data.levels.get(&(level - 1)) else {
			return;
		};
		let mut promoted = Vec::new();
		let mut child_edges = Vec::new();
		for wc_id in current.nodes.iter() {
			let Some(wc) = self.data.tree.get_collection(*wc_id) else {
				continue;
			};
			for child in wc.get_children() {
				for to in below.nav_mesh.get_edges(*child) {
					let Some(to_parent) = self.data.parent_of(*to) else {
						error!(
							"Error while creating abstract edges for level {}, no parent found for waypoint {}",
							level, to
						);
						continue;
					};
					if to_parent != *wc_id {
						promoted.push((*wc_id, to_parent));
					}
					if child != to {
						child_edges.push((*wc_id, to_parent, ChildEdge::new(*child, *to)));
					}
				}
			}
		}
		let nodes = current.nodes.clone();
		for wc_id in nodes {
			if let Some(wc) = self.data.tree.get_collection_mut(wc_id) {
				wc.clear_child_edges();
			}
			self.data.level_mut(level).nav_mesh.remove_all_edges(wc_id);
		}
		for (wc_id, to_parent, edge) in child_edges {
			if let Some(wc) = self.data.tree.get_collection_mut(wc_id) {
				wc.add_child_edge(to_parent, edge);
			}
		}
		for (from, to) in promoted {
			self.add_edge(from, to);
		}
	}
	/// Check both ends of an edge exist and share a search level
	fn edge_level(&self, from: WaypointID, to: WaypointID) -> Option<u32> {
		let (Some(f), Some(t)) = (self.data.ownership.get(&from), self.data.ownership.get(&to)) else {
			error!("Waypoints must be explicitly added before an edge can be added containing either of them");
			return None;
		};
		if f.level != t.level {
			error!("Cannot use an edge between waypoints that are not on the same level");
			return None;
		}
		Some(f.level)
	}
	/// Add a directed edge between two nodes on the same level. Returns
	/// whether a new edge was added
	pub fn add_edge(&mut self, from: WaypointID, to: WaypointID) -> bool {
		let Some(level) = self.edge_level(from, to) else {
			return false;
		};
		if !self.hooks.allow_edge(from, to, level) {
			return false;
		}
		self.data.level_mut(level).nav_mesh.add_edge(from, to)
	}
	/// Remove a directed edge, returns whether it existed
	pub fn remove_edge(&mut self, from: WaypointID, to: WaypointID) -> bool {
		let Some(level) = self.edge_level(from, to) else {
			return false;
		};
		let removed = self.data.level_mut(level).nav_mesh.remove_edge(from, to);
		if removed {
			self.hooks.on_edge_removed(from, to, level);
		}
		removed
	}
	/// Remove every edge leaving `from`
	pub fn remove_all_edges_from_waypoint(&mut self, from: WaypointID) {
		let Some(owner) = self.data.ownership.get(&from).copied() else {
			return;
		};
		self.data.level_mut(owner.level).nav_mesh.remove_all_edges(from);
		self.hooks.on_all_edges_removed(from, owner.level);
	}
	/// Destinations of every edge leaving `from`
	pub fn get_all_edges_from_waypoint(&self, from: WaypointID) -> Vec<WaypointID> {
		let Some(owner) = self.data.ownership.get(&from) else {
			return Vec::new();
		};
		let mut edges = self
			.data
			.levels
			.get(&owner.level)
			.map(|sl| sl.nav_mesh.get_edges(from).to_vec())
			.unwrap_or_default();
		self.hooks.filter_edges(from, &mut edges);
		edges
	}
	/// Whether `id` is registered with the graph
	pub fn contains(&self, id: WaypointID) -> bool {
		self.data.ownership.contains_key(&id)
	}
	/// Lookup a registered waypoint or collection
	pub fn find_waypoint(&self, id: WaypointID) -> Option<WaypointNode<'_>> {
		if !self.contains(id) {
			return None;
		}
		self.data.tree.get_node(id)
	}
	/// For a collection the collection itself, for a waypoint the collection
	/// holding it
	pub fn find_collection(&self, id: WaypointID) -> Option<&WaypointCollection> {
		self.data
			.collection_of(id)
			.and_then(|c| self.data.tree.get_collection(c))
	}
	/// For a waypoint the collection holding it, for a collection the
	/// collection above it
	pub fn get_parent(&self, id: WaypointID) -> Option<WaypointID> {
		self.data.parent_of(id)
	}
	/// The top of the tree containing `id`
	pub fn get_root_parent(&self, id: WaypointID) -> Option<WaypointID> {
		let collection = self.data.collection_of(id)?;
		self.data.tree.get_root(collection)
	}
	/// Search level of a node, `None` if it is not part of the graph
	pub fn get_search_level_num(&self, id: WaypointID) -> Option<u32> {
		self.data.ownership.get(&id).map(|o| o.level)
	}
	/// Whether two nodes belong to the same tree of collections. This is a
	/// structural pre-filter, it does not prove a walkable path exists
	pub fn has_path(&self, lhs: WaypointID, rhs: WaypointID) -> bool {
		let (Some(l), Some(r)) = (self.data.collection_of(lhs), self.data.collection_of(rhs)) else {
			return false;
		};
		let structural = match self.data.tree.get_root(l) {
			Some(root) => self.data.tree.is_descendant_of(r, root),
			None => false,
		};
		self.hooks.has_path(l, r, structural)
	}
	/// The lowest collection containing both `lhs` and `rhs`
	pub fn find_common_parent(&self, lhs: WaypointID, rhs: WaypointID) -> Option<WaypointID> {
		let mut l = self.data.collection_of(lhs)?;
		let mut r = self.data.collection_of(rhs)?;
		let mut l_level = self.get_search_level_num(l)?;
		let mut r_level = self.get_search_level_num(r)?;
		while l_level < r_level {
			l = self.data.tree.get_collection(l)?.get_parent()?;
			l_level += 1;
		}
		while r_level < l_level {
			r = self.data.tree.get_collection(r)?.get_parent()?;
			r_level += 1;
		}
		loop {
			if l == r {
				return Some(l);
			}
			l = self.data.tree.get_collection(l)?.get_parent()?;
			r = self.data.tree.get_collection(r)?.get_parent()?;
		}
	}
	/// The chain of collections from the one containing `child` up to and
	/// including `ancestor`. `None` if `ancestor` is never reached
	pub fn get_node_path(&self, child: WaypointID, ancestor: WaypointID) -> Option<Vec<WaypointID>> {
		let start = self.data.collection_of(child)?;
		let chain = self.data.tree.get_ancestors(start);
		let end = chain.iter().position(|c| *c == ancestor)?;
		Some(chain[..=end].to_vec())
	}
	pub fn get_nav_mesh_at_search_level(&self, level: u32) -> Option<&NavMesh> {
		self.data.levels.get(&level).map(|sl| &sl.nav_mesh)
	}
	/// Number of search levels, including level `0`
	pub fn get_num_search_levels(&self) -> usize {
		self.data.levels.len()
	}
	pub fn get_search_level(&self, level: u32) -> Option<&SearchLevel> {
		self.data.levels.get(&level)
	}
	/// Get a level, creating it if necessary
	pub fn get_or_create_search_level(&mut self, level: u32) -> &mut SearchLevel {
		self.data.level_mut(level)
	}
	/// Number of concrete waypoints
	pub fn get_waypoint_count(&self) -> usize {
		self.data.tree.get_waypoints().len()
	}
	/// Number of registered nodes, waypoints and collections alike
	pub fn get_node_count(&self) -> usize {
		self.data.ownership.len()
	}
	/// Iterate over the concrete waypoints
	pub fn get_waypoints(&self) -> impl Iterator<Item = &Waypoint> {
		self.data.tree.get_waypoints().values()
	}
	/// Empty the graph
	pub fn clear(&mut self) {
		self.data = GraphData {
			tree: WaypointTree::new(self.data.tree.get_child_selection()),
			..Default::default()
		};
		self.hooks.on_clear();
	}
	/// Write the graph to a `ron` file
	#[cfg(feature = "ron")]
	pub fn save_to_file(&self, path: &str) -> Result<(), WaypointError> {
		let serialized = ron::ser::to_string_pretty(&self.data, ron::ser::PrettyConfig::default())?;
		std::fs::write(path, serialized)?;
		Ok(())
	}
	/// Read waypoints from a CSV file with the header `id,x,y,z`. Returns
	/// the number of records read
	#[cfg(feature = "csv")]
	pub fn load_waypoints_csv(&mut self, path: &str) -> Result<usize, WaypointError> {
		/// Row of the waypoint file
		#[derive(serde::Deserialize)]
		struct WaypointRecord {
			/// Raw id
			id: u32,
			/// X coordinate
			x: f32,
			/// Y coordinate
			y: f32,
			/// Z coordinate
			z: f32,
		}
		let file = std::fs::File::open(path)?;
		let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
		let mut count = 0;
		for record in rdr.deserialize() {
			let r: WaypointRecord = record?;
			self.insert_waypoint(Waypoint::new(WaypointID::new(r.id), Vec3::new(r.x, r.y, r.z)));
			count += 1;
		}
		Ok(count)
	}
	/// Read edges from a CSV file with the header `from,to`. Returns the
	/// number of edges added
	#[cfg(feature = "csv")]
	pub fn load_edges_csv(&mut self, path: &str) -> Result<usize, WaypointError> {
		/// Row of the edge file
		#[derive(serde::Deserialize)]
		struct EdgeRecord {
			/// Start of the edge
			from: u32,
			/// End of the edge
			to: u32,
		}
		let file = std::fs::File::open(path)?;
		let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
		let mut count = 0;
		for record in rdr.deserialize() {
			let r: EdgeRecord = record?;
			if self.add_edge(WaypointID::new(r.from), WaypointID::new(r.to)) {
				count += 1;
			}
		}
		Ok(count)
	}
}

impl<H: GraphHooks + Default> WaypointGraph<H> {
	/// Read a graph previously written with [WaypointGraph::save_to_file]
	#[cfg(feature = "ron")]
	pub fn from_file(path: &str) -> Result<Self, WaypointError> {
		let file = std::fs::File::open(path)?;
		let data: GraphData = ron::de::from_reader(file)?;
		Ok(WaypointGraph {
			data,
			hooks: H::default(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Id shorthand
	fn id(i: u32) -> WaypointID {
		WaypointID::new(i)
	}
	/// Join two waypoints both ways
	fn link(graph: &mut WaypointGraph, a: u32, b: u32) {
		graph.add_edge(id(a), id(b));
		graph.add_edge(id(b), id(a));
	}
	/// Sixteen waypoints along a diagonal with a web of edges between them
	fn diagonal_graph() -> WaypointGraph {
		let mut graph = WaypointGraph::new();
		for i in 0..17 {
			let p = i as f32;
			graph.insert_waypoint(Waypoint::new(id(i), Vec3::new(p, p, p)));
		}
		graph.remove_waypoint(id(0));
		let edges = [
			(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (2, 15), (3, 4), (3, 5), (3, 6),
			(4, 5), (4, 6), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10), (9, 11), (9, 12),
			(10, 11), (10, 12), (11, 12), (11, 13), (11, 14), (12, 13), (12, 14),
			(13, 14), (13, 16), (15, 16),
		];
		for (a, b) in edges {
			link(&mut graph, a, b);
		}
		graph.create_search_graph(&DefaultGraphBuilder::default(), 10);
		graph
	}
	/// Membership, bounds and edges of every level above 0
	#[allow(clippy::type_complexity)]
	fn snapshot(
		graph: &WaypointGraph,
	) -> Vec<(u32, WaypointID, Vec<WaypointID>, Vec3, f32, Vec<(WaypointID, WaypointID)>)> {
		let mut out = Vec::new();
		for level in 1..graph.get_num_search_levels() as u32 {
			let sl = graph.get_search_level(level).unwrap();
			for node in sl.get_nodes() {
				let wc = graph.get_tree().get_collection(*node).unwrap();
				let edges = sl.get_nav_mesh().iter().filter(|(f, _)| f == node).collect();
				out.push((
					level,
					*node,
					wc.get_children().to_vec(),
					wc.get_position(),
					wc.get_radius(),
					edges,
				));
			}
		}
		out
	}

	#[test]
	fn add_remove_waypoints() {
		let mut graph = WaypointGraph::new();
		for i in 1..=3 {
			graph.insert_waypoint(Waypoint::new(id(i), Vec3::splat(i as f32)));
		}
		for i in 1..=3 {
			assert!(graph.contains(id(i)));
			assert!(graph.find_waypoint(id(i)).is_some());
		}
		for i in 1..=3 {
			assert!(graph.remove_waypoint(id(i)));
			assert!(graph.find_waypoint(id(i)).is_none());
		}
		assert!(!graph.remove_waypoint(id(1)));
		assert_eq!(0, graph.get_waypoint_count());
	}
	#[test]
	fn add_remove_edges() {
		let mut graph = WaypointGraph::new();
		for i in 1..=4 {
			graph.insert_waypoint(Waypoint::new(id(i), Vec3::splat(i as f32)));
		}
		assert!(graph.add_edge(id(1), id(2)));
		assert!(graph.add_edge(id(1), id(4)));
		assert!(!graph.add_edge(id(1), id(4)));
		assert!(!graph.add_edge(id(1), id(99)));
		let edges = graph.get_all_edges_from_waypoint(id(1));
		assert_eq!(vec![id(2), id(4)], edges);
		assert!(graph.remove_edge(id(1), id(2)));
		assert!(!graph.remove_edge(id(1), id(2)));
		graph.remove_all_edges_from_waypoint(id(1));
		assert!(graph.get_all_edges_from_waypoint(id(1)).is_empty());
	}
	#[test]
	fn edges_across_levels_refused() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		let c = graph.create_collection();
		assert!(graph.insert_collection(c, 1));
		assert!(!graph.add_edge(id(1), c));
		assert_eq!(0, graph.get_nav_mesh_at_search_level(0).map_or(0, |n| n.get_edge_count()));
	}
	#[test]
	fn removing_waypoint_removes_incoming_edges() {
		let mut graph = WaypointGraph::new();
		for i in 1..=3 {
			graph.insert_waypoint(Waypoint::new(id(i), Vec3::splat(i as f32)));
		}
		link(&mut graph, 1, 2);
		link(&mut graph, 2, 3);
		graph.remove_waypoint(id(2));
		assert!(graph.get_all_edges_from_waypoint(id(1)).is_empty());
		assert!(graph.get_all_edges_from_waypoint(id(3)).is_empty());
	}
	#[test]
	fn build_graph() {
		let graph = diagonal_graph();
		assert_eq!(16, graph.get_search_level(0).unwrap().get_nodes().len());
		let counts: Vec<usize> = (0..graph.get_num_search_levels() as u32)
			.map(|l| graph.get_search_level(l).unwrap().get_nodes().len())
			.collect();
		assert!(counts.len() > 2);
		for pair in counts.windows(2) {
			assert!(pair[1] < pair[0]);
		}
		assert_eq!(Some(&1), counts.last());
		for i in 1..17 {
			for j in 1..17 {
				assert!(graph.has_path(id(i), id(j)));
			}
		}
	}
	#[test]
	fn build_graph_levels_are_consistent() {
		let graph = diagonal_graph();
		for level in 1..graph.get_num_search_levels() as u32 {
			for node in graph.get_search_level(level).unwrap().get_nodes() {
				let wc = graph.get_tree().get_collection(*node).unwrap();
				assert!(wc.degree() > 0);
				for child in wc.get_children() {
					assert_eq!(Some(level - 1), graph.get_search_level_num(*child));
					assert_eq!(Some(*node), graph.get_parent(*child));
					let p = graph.get_tree().get_node_position(*child).unwrap();
					assert!(wc.get_radius() + 1e-4 >= wc.get_position().distance(p));
				}
			}
		}
	}
	#[test]
	fn abstract_edges_join_neighbouring_collections() {
		let graph = diagonal_graph();
		let a = graph.get_parent(id(8)).unwrap();
		let b = graph.get_parent(id(9)).unwrap();
		if a != b {
			assert!(graph.get_all_edges_from_waypoint(a).contains(&b));
			assert!(graph.get_all_edges_from_waypoint(b).contains(&a));
			let wc = graph.find_collection(a).unwrap();
			assert!(wc.get_child_edges(b).contains(&ChildEdge::new(id(8), id(9))));
		}
		// child edges leaving a collection back an edge of its level
		for (from, wc) in graph.get_tree().get_collections() {
			for (to, edges) in wc.get_all_child_edges() {
				if to != from {
					assert!(graph.get_all_edges_from_waypoint(*from).contains(to));
				}
				for edge in edges {
					assert_eq!(Some(*from), graph.get_parent(edge.get_from()));
					assert_eq!(Some(*to), graph.get_parent(edge.get_to()));
				}
			}
		}
		// no collection has an edge to itself
		for level in 1..graph.get_num_search_levels() as u32 {
			for (from, to) in graph.get_nav_mesh_at_search_level(level).unwrap().iter() {
				assert_ne!(from, to);
			}
		}
	}
	#[test]
	fn rebuild_is_idempotent() {
		let mut graph = diagonal_graph();
		let first = snapshot(&graph);
		graph.create_search_graph(&DefaultGraphBuilder::default(), 10);
		let second = snapshot(&graph);
		assert_eq!(first.len(), second.len());
		for (a, b) in first.iter().zip(second.iter()) {
			assert_eq!(a.0, b.0);
			assert_eq!(a.1, b.1);
			assert_eq!(a.2, b.2);
			assert!(a.3.distance(b.3) < 1e-5);
			assert!((a.4 - b.4).abs() < 1e-5);
			assert_eq!(a.5, b.5);
		}
	}
	#[test]
	fn common_parent_is_ancestor_of_both() {
		let graph = diagonal_graph();
		for i in 1..17 {
			for j in 1..17 {
				let common = graph.find_common_parent(id(i), id(j)).unwrap();
				let li = graph.find_collection(id(i)).unwrap().get_id();
				let lj = graph.find_collection(id(j)).unwrap().get_id();
				assert!(graph.get_tree().is_descendant_of(li, common));
				assert!(graph.get_tree().is_descendant_of(lj, common));
			}
		}
		let leaf = graph.get_parent(id(1)).unwrap();
		assert_eq!(Some(leaf), graph.find_common_parent(id(1), id(1)));
	}
	#[test]
	fn common_parent_of_disjoint_trees() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		graph.insert_waypoint(Waypoint::new(id(2), Vec3::X));
		let a = graph.create_collection();
		let b = graph.create_collection();
		assert!(graph.assign(id(1), a));
		assert!(graph.assign(id(2), b));
		assert_eq!(None, graph.find_common_parent(id(1), id(2)));
		assert!(!graph.has_path(id(1), id(2)));
		let root = graph.create_collection();
		assert!(graph.assign(a, root));
		assert!(graph.assign(b, root));
		assert_eq!(Some(root), graph.find_common_parent(id(1), id(2)));
		assert!(graph.has_path(id(1), id(2)));
	}
	#[test]
	fn node_path_includes_ancestor() {
		let graph = diagonal_graph();
		let root = graph.get_root_parent(id(5)).unwrap();
		let path = graph.get_node_path(id(5), root).unwrap();
		assert_eq!(Some(&graph.get_parent(id(5)).unwrap()), path.first());
		assert_eq!(Some(&root), path.last());
		assert_eq!(graph.get_num_search_levels() - 1, path.len());
		for pair in path.windows(2) {
			assert_eq!(Some(pair[1]), graph.get_parent(pair[0]));
		}
	}
	#[test]
	fn node_path_unreached() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		graph.insert_waypoint(Waypoint::new(id(2), Vec3::X));
		let a = graph.create_collection();
		let b = graph.create_collection();
		graph.assign(id(1), a);
		graph.assign(id(2), b);
		assert_eq!(None, graph.get_node_path(id(1), b));
		assert_eq!(Some(vec![a]), graph.get_node_path(id(1), a));
	}
	#[test]
	fn add_duplicates() {
		let mut graph = WaypointGraph::new();
		let wp = Waypoint::new(id(1), Vec3::new(-1.0, 0.0, 0.0));
		for _ in 0..5 {
			graph.insert_waypoint(wp.clone());
		}
		assert_eq!(1, graph.get_node_count());
		let wc = Waypoint::new_with_type(id(2), Vec3::ZERO, WaypointType::Collection);
		for _ in 0..5 {
			graph.insert_waypoint(wc.clone());
		}
		assert_eq!(2, graph.get_node_count());
		for _ in 0..5 {
			assert!(graph.assign(id(1), id(2)));
		}
		assert_eq!(1, graph.find_collection(id(2)).unwrap().degree());
		// a root made on the wrong level is moved up to where it belongs
		let root = Waypoint::new_with_type(id(3), Vec3::ZERO, WaypointType::Collection);
		graph.insert_waypoint(root);
		assert!(graph.assign(id(2), id(3)));
		assert_eq!(1, graph.find_collection(id(3)).unwrap().degree());
		assert_eq!(Some(0), graph.get_search_level_num(id(1)));
		assert_eq!(Some(1), graph.get_search_level_num(id(2)));
		assert_eq!(Some(2), graph.get_search_level_num(id(3)));
		assert_eq!(3, graph.get_node_count());
	}
	#[test]
	fn assign_unknown_child_fails() {
		let mut graph = WaypointGraph::new();
		let c = graph.create_collection();
		assert!(!graph.assign(id(42), c));
		assert_eq!(None, graph.get_search_level_num(c));
	}
	#[test]
	fn assign_wrong_level_fails() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		graph.insert_waypoint(Waypoint::new(id(2), Vec3::X));
		let a = graph.create_collection();
		let root = graph.create_collection();
		assert!(graph.assign(id(1), a));
		assert!(graph.assign(a, root));
		// root is populated on level 2 so a level 0 waypoint cannot join it
		assert!(!graph.assign(id(2), root));
		assert_eq!(1, graph.find_collection(root).unwrap().degree());
	}
	#[test]
	fn assign_collection_to_leaf_fails() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		let leaf = graph.create_collection();
		assert!(graph.assign(id(1), leaf));
		let other = graph.create_collection();
		graph.insert_collection(other, 0);
		assert!(!graph.assign(other, leaf));
		assert!(graph.get_tree().get_collection(other).unwrap().is_root());
	}
	#[test]
	fn assign_moves_waypoint() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		let a = graph.create_collection();
		let b = graph.create_collection();
		assert!(graph.assign(id(1), a));
		assert!(graph.assign(id(1), b));
		assert_eq!(0, graph.get_tree().get_collection(a).unwrap().degree());
		assert_eq!(Some(b), graph.get_parent(id(1)));
	}
	#[test]
	fn removal_collapses_empty_ancestors() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		graph.insert_waypoint(Waypoint::new(id(2), Vec3::X));
		let leaf_a = graph.create_collection();
		let leaf_b = graph.create_collection();
		let mid = graph.create_collection();
		let root = graph.create_collection();
		graph.assign(id(1), leaf_a);
		graph.assign(id(2), leaf_b);
		graph.assign(leaf_a, mid);
		graph.assign(mid, root);
		let other_mid = graph.create_collection();
		graph.assign(leaf_b, other_mid);
		graph.assign(other_mid, root);
		assert!(graph.remove_waypoint(id(1)));
		// leaf_a and mid are empty and collapse, the root still holds other_mid
		assert!(!graph.contains(leaf_a));
		assert!(!graph.contains(mid));
		assert!(graph.get_tree().get_collection(leaf_a).is_none());
		assert!(graph.contains(root));
		assert_eq!(vec![other_mid], graph.find_collection(root).unwrap().get_children().to_vec());
		assert_eq!(Vec3::X, graph.find_collection(root).unwrap().get_position());
		// removing the final waypoint takes the rest of the chain with it
		assert!(graph.remove_waypoint(id(2)));
		assert!(!graph.contains(leaf_b));
		assert!(!graph.contains(other_mid));
		assert!(!graph.contains(root));
		assert_eq!(0, graph.get_node_count());
	}
	#[test]
	fn remove_collection_removes_subtree() {
		let mut graph = diagonal_graph();
		let leaf = graph.get_parent(id(1)).unwrap();
		let children = graph.find_collection(leaf).unwrap().get_children().to_vec();
		assert!(graph.remove_waypoint(leaf));
		for child in children {
			assert!(!graph.contains(child));
			assert!(graph.get_tree().get_waypoint(child).is_none());
		}
		assert!(!graph.contains(leaf));
		assert!(!graph.get_all_edges_from_waypoint(id(5)).is_empty());
	}
	#[test]
	fn insert_into_built_hierarchy() {
		let mut graph = diagonal_graph();
		let root = graph.get_root_parent(id(1)).unwrap();
		let before = graph.find_collection(root).unwrap().get_position();
		graph.insert_waypoint(Waypoint::new(id(50), Vec3::splat(100.0)));
		let leaf = graph.get_parent(id(50)).unwrap();
		assert_eq!(Some(1), graph.get_search_level_num(leaf));
		assert_eq!(Some(root), graph.get_root_parent(id(50)));
		assert_ne!(before, graph.find_collection(root).unwrap().get_position());
	}
	#[test]
	fn move_waypoint_recalculates() {
		let mut graph = diagonal_graph();
		let leaf = graph.get_parent(id(1)).unwrap();
		let before = graph.find_collection(leaf).unwrap().get_position();
		assert!(graph.move_waypoint(id(1), Vec3::splat(-50.0)));
		let wc = graph.find_collection(leaf).unwrap();
		assert_ne!(before, wc.get_position());
		assert!(wc.get_radius() + 1e-4 >= wc.get_position().distance(Vec3::splat(-50.0)));
		// inserting a known id is a move too
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::splat(-60.0)));
		let moved = graph.get_tree().get_waypoint(id(1)).unwrap();
		assert_eq!(Vec3::splat(-60.0), moved.get_position());
	}
	#[test]
	fn create_level_zero_refused() {
		let mut graph = diagonal_graph();
		let levels = graph.get_num_search_levels();
		assert!(!graph.create_search_level(&DefaultGraphBuilder::default(), 0));
		assert_eq!(levels, graph.get_num_search_levels());
	}
	#[test]
	fn single_level_build() {
		let mut graph = diagonal_graph();
		assert!(graph.create_search_level(&DefaultGraphBuilder::default(), 1));
		assert_eq!(2, graph.get_num_search_levels());
		for i in 1..17 {
			assert_eq!(Some(1), graph.get_search_level_num(graph.get_parent(id(i)).unwrap()));
		}
	}
	#[test]
	fn clear_calls_hook() {
		/// Counts how often the graph was cleared
		#[derive(Default)]
		struct CountClears(u32);
		impl GraphHooks for CountClears {
			fn on_clear(&mut self) {
				self.0 += 1;
			}
		}
		let mut graph = WaypointGraph::with_hooks(CountClears::default());
		graph.insert_waypoint(Waypoint::new(id(1), Vec3::ZERO));
		graph.clear();
		assert_eq!(1, graph.get_hooks().0);
		assert_eq!(0, graph.get_node_count());
		assert_eq!(0, graph.get_num_search_levels());
	}
	#[test]
	fn hooks_can_veto_edges() {
		/// Refuses edges into waypoint 3
		#[derive(Default)]
		struct NoEdgesToThree;
		impl GraphHooks for NoEdgesToThree {
			fn allow_edge(&mut self, _from: WaypointID, to: WaypointID, _level: u32) -> bool {
				to != WaypointID::new(3)
			}
		}
		let mut graph = WaypointGraph::with_hooks(NoEdgesToThree);
		for i in 1..=3 {
			graph.insert_waypoint(Waypoint::new(id(i), Vec3::splat(i as f32)));
		}
		assert!(graph.add_edge(id(1), id(2)));
		assert!(!graph.add_edge(id(1), id(3)));
		assert_eq!(vec![id(2)], graph.get_all_edges_from_waypoint(id(1)));
	}
	#[test]
	fn create_collection_ids_do_not_clash() {
		let mut graph = WaypointGraph::new();
		graph.insert_waypoint(Waypoint::new(id(10), Vec3::ZERO));
		let c = graph.create_collection();
		assert!(c.get() > 10);
	}
	#[test]
	#[cfg(feature = "ron")]
	fn save_and_load() {
		let graph = diagonal_graph();
		let path = std::env::temp_dir().join("waypoint_graph_save_and_load.ron");
		let path = path.to_string_lossy().to_string();
		graph.save_to_file(&path).unwrap();
		let loaded: WaypointGraph = WaypointGraph::from_file(&path).unwrap();
		assert_eq!(graph.get_num_search_levels(), loaded.get_num_search_levels());
		assert_eq!(snapshot(&graph).len(), snapshot(&loaded).len());
		for i in 1..17 {
			assert!(loaded.has_path(id(1), id(i)));
		}
		let _ = std::fs::remove_file(path);
	}
	#[test]
	#[cfg(feature = "csv")]
	fn load_from_csv() {
		let mut graph = WaypointGraph::new();
		let dir = env!("CARGO_MANIFEST_DIR").to_string();
		let count = graph.load_waypoints_csv(&(dir.clone() + "/assets/csv/waypoints.csv")).unwrap();
		assert_eq!(8, count);
		let edges = graph.load_edges_csv(&(dir + "/assets/csv/edges.csv")).unwrap();
		assert_eq!(14, edges);
		graph.create_search_graph(&DefaultGraphBuilder::default(), 5);
		assert!(graph.has_path(id(1), id(8)));
	}
}
