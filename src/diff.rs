use crate::{
	dom::{self, Node, NodeType},
	fragment::{self, placeholder_id, Bindings, Fragment, Placeholders, KEY_ATTRIBUTE, STABLE_ATTRIBUTE},
	materialize, page_content,
};
use core::iter;
use hashbrown::{hash_map::Entry, HashMap, HashSet};
use tracing::{error, instrument, trace, trace_span, warn};

/// Reconciles live subtrees against freshly built [`Fragment`]s, keeping as many live nodes as possible.
///
/// # Correct Use
///
/// The fragment passed to [`Differ::diff`] must be built for this call.
/// Its nodes are moved into the live tree where they're new, so reusing a fragment across diffs is a rendering bug.
/// Retaining a *live* node and putting it into a new template is detected and ignored with a warning.
#[derive(Debug, Clone, Copy)]
pub struct Differ {
	depth_limit: usize,
}

impl Default for Differ {
	fn default() -> Self {
		Self::new()
	}
}

impl Differ {
	/// Default maximum nesting depth of a single diff.
	pub const DEFAULT_DEPTH_LIMIT: usize = 1024;

	#[must_use]
	pub fn new() -> Self {
		Self::with_depth_limit(Self::DEFAULT_DEPTH_LIMIT)
	}

	/// Subtrees nested more than `depth_limit` levels deep are left unchanged (with an error log).
	#[must_use]
	pub fn with_depth_limit(depth_limit: usize) -> Self {
		Self { depth_limit }
	}

	#[must_use]
	pub fn depth_limit(&self) -> usize {
		self.depth_limit
	}

	/// Updates `live`'s children to match `fragment`'s.
	///
	/// `live` itself (its tag and attributes) isn't changed.
	#[instrument(skip(fragment))]
	pub fn diff(&self, live: &Node, fragment: Fragment) {
		let (root, placeholders, bindings) = fragment.into_parts();
		let mut pass = Pass { placeholders, bindings };
		pass.diff_children(live, &root, self.depth_limit);

		if !pass.placeholders.is_empty() {
			warn!("{} placeholder value(s) weren't used by the diff.", pass.placeholders.len())
		}
		if !pass.bindings.is_empty() {
			warn!("{} binding(s) weren't applied by the diff.", pass.bindings.len())
		}
	}
}

/// Updates `live`'s children to match `fragment`'s, using the default [`Differ`].
pub fn diff(live: &Node, fragment: Fragment) {
	Differ::default().diff(live, fragment)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
	Explicit(String),
	Index(usize),
}

fn key_of(node: &Node, index: usize) -> Key {
	node.attribute(KEY_ATTRIBUTE).map_or(Key::Index(index), Key::Explicit)
}

/// The state of one [`Differ::diff`] call: the fragment's remaining markers.
struct Pass {
	placeholders: Placeholders,
	bindings: Bindings,
}

impl Pass {
	#[instrument(skip(self, target_parent))]
	fn diff_children(&mut self, live_parent: &Node, target_parent: &Node, depth_limit: usize) {
		if depth_limit == 0 {
			target_parent.children().iter().for_each(dom::release_subtree);
			return error!("Depth limit reached");
		}

		let mut live_by_key = HashMap::new();
		let mut stale = Vec::new();
		for (i, child) in live_parent.children().into_iter().enumerate() {
			match live_by_key.entry(key_of(&child, i)) {
				Entry::Vacant(vacant) => {
					vacant.insert(child);
				}
				Entry::Occupied(occupied) => {
					warn!("Duplicate key {:?} among live children of {:?}. Removing the later node.", occupied.key(), live_parent);
					stale.push(child)
				}
			}
		}

		let targets = self.target_children(target_parent);

		let mut placed = Vec::with_capacity(targets.len());
		let mut placed_ids = HashSet::with_capacity(targets.len());
		for (i, target) in targets.into_iter().enumerate() {
			let key = key_of(&target, i);
			let node = match live_by_key.remove(&key) {
				Some(live) => self.diff_nodes(&live, target, depth_limit),
				None => {
					trace!("Inserting new node for key {:?}.", key);
					materialize::resolve_subtree(&target, &mut self.placeholders, &mut self.bindings);
					target
				}
			};
			if !placed_ids.insert(node.id()) {
				warn!("{:?} appears more than once in the rendered children of {:?}. Keeping the last position.", node, live_parent);
				placed.retain(|placed| placed != &node);
			}
			placed.push(node);
		}

		for unclaimed in live_by_key.into_iter().map(|(_, node)| node).chain(stale) {
			if placed_ids.contains(&unclaimed.id()) {
				continue;
			}
			trace!("Removing {:?}.", unclaimed);
			match live_parent.remove_child(&unclaimed) {
				Ok(removed) => dom::release_subtree(&removed),
				Err(error) => error!("Failed to remove {:?} from {:?}: {}", unclaimed, live_parent, error),
			}
		}

		for (i, node) in placed.iter().enumerate() {
			let current = live_parent.child_at(i);
			if current.as_ref() == Some(node) {
				continue;
			}
			if let Err(error) = live_parent.insert_before(node, current.as_ref()) {
				error!("Failed to place {:?} at index {} of {:?}: {}", node, i, live_parent, error)
			}
		}

		while live_parent.child_count() > placed.len() {
			let extra = match live_parent.child_at(placed.len()) {
				Some(extra) => extra,
				None => break,
			};
			error!("Unexpected trailing child {:?} in {:?}. Removing it.", extra, live_parent);
			extra.remove();
			dom::release_subtree(&extra);
		}
	}

	/// The children of `target_parent` with top-level placeholders replaced by their values (recursively)
	/// and bindings applied to the resulting elements, so that bound keys are visible.
	fn target_children(&mut self, target_parent: &Node) -> Vec<Node> {
		let mut targets = Vec::new();
		for child in target_parent.children() {
			self.expand_target(child, &mut targets);
		}
		targets
	}

	fn expand_target(&mut self, node: Node, targets: &mut Vec<Node>) {
		match placeholder_id(&node) {
			Some(id) => match self.placeholders.remove(&id) {
				Some(value) if value.is_fragment() => {
					for child in value.children() {
						self.expand_target(child, targets)
					}
				}
				Some(value) => self.expand_target(value, targets),
				None => warn!("No value for placeholder {}. Rendering nothing.", id),
			},
			None => {
				if node.is_element() {
					fragment::apply_bindings(&node, &mut self.bindings)
				}
				targets.push(node)
			}
		}
	}

	/// Makes `live` match `target` and returns the node that now takes `live`'s position.
	fn diff_nodes(&mut self, live: &Node, target: Node, depth_limit: usize) -> Node {
		match (live.node_type(), target.node_type()) {
			(NodeType::Text, NodeType::Text) | (NodeType::Comment, NodeType::Comment) => {
				let data = target.data().unwrap_or_default();
				if live.data().as_deref() != Some(data.as_str()) {
					trace!("Updating character data to {:?}.", page_content(&data));
					if let Err(error) = live.set_data(&data) {
						error!("Failed to update {:?}: {}", live, error)
					}
				}
				return live.clone();
			}
			_ => (),
		}

		if live.has_attribute(STABLE_ATTRIBUTE) {
			trace!("Skipping stable subtree {:?}.", live);
			self.discard(&target);
			return live.clone();
		}

		if *live == target {
			warn!(
				"{:?} was rendered again although it's already part of the live tree. \
				Nodes must be built freshly for each render; leaving it unchanged.",
				live
			);
			return live.clone();
		}

		if live.is_element() && live.tag_name() == target.tag_name() {
			let span = trace_span!("Diffing element", tag = live.tag_name().unwrap_or_default(), live = %live.id());
			let _enter = span.enter();

			diff_attributes(live, &target);
			diff_properties(live, &target);
			diff_listeners(live, &target);
			self.diff_children(live, &target, depth_limit - 1);
			// Its children were either moved into `live` or released on their own.
			target.release();
			return live.clone();
		}

		trace!("Replacing {:?} with {:?}.", live, target);
		materialize::resolve_subtree(&target, &mut self.placeholders, &mut self.bindings);
		match live.parent() {
			Some(parent) => match parent.replace_child(&target, live) {
				Ok(()) => dom::release_subtree(live),
				Err(error) => error!("Failed to replace {:?} with {:?}: {}", live, target, error),
			},
			None => error!("Can't replace detached {:?}.", live),
		}
		target
	}

	/// Drops the markers and listeners of a target subtree that won't be used.
	fn discard(&mut self, target: &Node) {
		for node in iter::once(target.clone()).chain(target.descendants()) {
			if let Some(id) = placeholder_id(&node) {
				if let Some(value) = self.placeholders.remove(&id) {
					// Its value may carry markers of its own.
					self.discard(&value)
				}
			}
			for id in fragment::binding_ids(&node) {
				self.bindings.remove(&id);
			}
		}
		dom::release_subtree(target);
	}
}

fn diff_attributes(live: &Node, target: &Node) {
	for (name, _) in live.attributes() {
		if !target.has_attribute(&name) {
			if let Err(error) = live.remove_attribute(&name) {
				error!("Failed to remove attribute {:?} from {:?}: {}", name, live, error)
			}
		}
	}
	for (name, value) in target.attributes() {
		if live.attribute(&name).as_deref() != Some(value.as_str()) {
			if let Err(error) = live.set_attribute(&name, &value) {
				error!("Failed to set attribute {:?} on {:?}: {}", name, live, error)
			}
		}
	}
}

/// Properties only present on `live` are kept. Element properties can't be removed.
fn diff_properties(live: &Node, target: &Node) {
	for (name, value) in target.properties() {
		if live.property(&name).as_ref() != Some(&value) {
			if let Err(error) = live.set_property(&name, value) {
				error!("Failed to set property {:?} on {:?}: {}", name, live, error)
			}
		}
	}
}

fn diff_listeners(live: &Node, target: &Node) {
	let live_listeners = live.listeners();
	let target_listeners = target.listeners();
	let unchanged = live_listeners.len() == target_listeners.len()
		&& live_listeners
			.iter()
			.zip(&target_listeners)
			.all(|((live_name, live_callback), (target_name, target_callback))| live_name == target_name && live_callback.ptr_eq(target_callback));
	if !unchanged {
		trace!("Replacing {} listener(s) with {}.", live_listeners.len(), target_listeners.len());
		if let Err(error) = live.replace_listeners(target_listeners) {
			error!("Failed to replace listeners on {:?}: {}", live, error)
		}
	}
}
