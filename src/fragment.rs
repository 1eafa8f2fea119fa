//! The intermediate render output and its marker vocabulary.
//!
//! A [`Fragment`] is a parsed node tree that still contains *placeholder markers*
//! (elements standing in for rich values) and *binding markers* (attributes pointing at pending property assignments).
//! It's consumed exactly once, either by [`materialize`](crate::materialize::materialize) or by [`diff`](crate::diff::diff).

use crate::{dom::Node, value::Value};
use core::{
	fmt::{self, Display, Formatter},
	str::FromStr,
	sync::atomic::{AtomicU64, Ordering},
};
use hashbrown::HashMap;
use tracing::{error, warn};

/// Tag name of placeholder marker elements.
pub const PLACEHOLDER_TAG: &str = "vui-placeholder";
/// Attribute carrying a placeholder marker's [`PlaceholderId`].
pub const PLACEHOLDER_ATTRIBUTE: &str = "data-vui-placeholder";
/// Prefix of binding marker attributes, followed by the [`BindingId`].
pub const BINDING_ATTRIBUTE_PREFIX: &str = "data-vui-bind-";
/// Attribute used to correlate list children across renders.
pub const KEY_ATTRIBUTE: &str = "key";
/// Attribute that excludes a live element's subtree from diffing.
pub const STABLE_ATTRIBUTE: &str = "vui-stable";

// Placeholders and bindings share one counter so that identifiers are unique across both maps.
static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

macro_rules! marker_id {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(u64);
		impl $name {
			pub(crate) fn next() -> Self {
				Self(NEXT_MARKER.fetch_add(1, Ordering::Relaxed))
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				Display::fmt(&self.0, f)
			}
		}
		impl FromStr for $name {
			type Err = core::num::ParseIntError;
			fn from_str(s: &str) -> Result<Self, Self::Err> {
				s.parse().map(Self)
			}
		}
	};
}
marker_id!(PlaceholderId);
marker_id!(BindingId);

/// What a [`PropertyBinding`] writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
	/// `.name=${value}`: an element property, assigned as-is.
	Property(String),
	/// `name=${value}`: an attribute set to the value's text.
	Attribute(String),
	/// `?name=${true}`: an attribute that is present (with an empty value).
	Flag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBinding {
	pub target: BindingTarget,
	pub value: Value,
}

pub type Placeholders = HashMap<PlaceholderId, Node>;
pub type Bindings = HashMap<BindingId, PropertyBinding>;

#[derive(Debug, Clone)]
pub struct Fragment {
	root: Node,
	placeholders: Placeholders,
	bindings: Bindings,
}

impl Fragment {
	#[must_use]
	pub fn from_parts(root: Node, placeholders: Placeholders, bindings: Bindings) -> Self {
		Self { root, placeholders, bindings }
	}

	#[must_use]
	pub fn root(&self) -> &Node {
		&self.root
	}

	#[must_use]
	pub fn placeholders(&self) -> &Placeholders {
		&self.placeholders
	}

	#[must_use]
	pub fn bindings(&self) -> &Bindings {
		&self.bindings
	}

	#[must_use]
	pub fn into_parts(self) -> (Node, Placeholders, Bindings) {
		(self.root, self.placeholders, self.bindings)
	}

	/// Materializes this fragment with all bindings applied, see [`materialize`](crate::materialize::materialize).
	#[must_use]
	pub fn into_node(self) -> Node {
		crate::materialize::materialize(self, true).root
	}
}

/// Moves `from` into `into`. Later entries win on (unexpected) collisions.
pub(crate) fn merge<K, V>(into: &mut HashMap<K, V>, from: HashMap<K, V>, what: &str)
where
	K: core::hash::Hash + Eq + Display + Copy,
{
	for (id, value) in from {
		if into.insert(id, value).is_some() {
			warn!("Duplicate {} identifier {} while merging a nested fragment. Keeping the later entry.", what, id)
		}
	}
}

#[must_use]
pub fn placeholder_id(node: &Node) -> Option<PlaceholderId> {
	if node.tag_name() != Some(PLACEHOLDER_TAG) {
		return None;
	}
	let id = node.attribute(PLACEHOLDER_ATTRIBUTE)?;
	match id.parse() {
		Ok(id) => Some(id),
		Err(error) => {
			warn!("Malformed placeholder marker id {:?}: {}", id, error);
			None
		}
	}
}

#[must_use]
pub(crate) fn placeholder_markup(id: PlaceholderId) -> String {
	format!(r#"<{tag} {attribute}="{id}"></{tag}>"#, tag = PLACEHOLDER_TAG, attribute = PLACEHOLDER_ATTRIBUTE, id = id)
}

#[must_use]
pub(crate) fn binding_attribute(id: BindingId) -> String {
	format!("{}{}", BINDING_ATTRIBUTE_PREFIX, id)
}

/// The binding markers on `node`, in attribute order.
#[must_use]
pub fn binding_ids(node: &Node) -> Vec<BindingId> {
	node.attributes()
		.into_iter()
		.filter_map(|(name, _)| name.strip_prefix(BINDING_ATTRIBUTE_PREFIX).and_then(|id| id.parse().ok()))
		.collect()
}

#[must_use]
pub fn has_binding_markers(node: &Node) -> bool {
	node.attributes().iter().any(|(name, _)| name.starts_with(BINDING_ATTRIBUTE_PREFIX))
}

/// Replaces each binding marker on `element` with the write it stands for, consuming it from `bindings`.
pub(crate) fn apply_bindings(element: &Node, bindings: &mut Bindings) {
	for id in binding_ids(element) {
		if let Err(error) = element.remove_attribute(&binding_attribute(id)) {
			error!("Failed to strip binding marker {}: {}", id, error)
		}
		match bindings.remove(&id) {
			Some(binding) => apply_binding(element, binding),
			None => warn!("Binding marker {} on {:?} has no pending binding. Ignoring it.", id, element),
		}
	}
}

/// Writes `binding` to `element`, skipping writes that wouldn't change anything.
pub(crate) fn apply_binding(element: &Node, PropertyBinding { target, value }: PropertyBinding) {
	let result = match target {
		BindingTarget::Property(name) => {
			if element.property(&name).as_ref() == Some(&value) {
				return;
			}
			element.set_property(&name, value)
		}
		BindingTarget::Attribute(name) => match value.to_text() {
			Some(text) => {
				if element.attribute(&name).as_deref() == Some(text.as_str()) {
					return;
				}
				element.set_attribute(&name, &text)
			}
			None => return warn!("Can't use a {} value as attribute {:?}. Dropping the binding.", value.type_name(), name),
		},
		BindingTarget::Flag(name) => {
			if element.has_attribute(&name) {
				return;
			}
			element.set_attribute(&name, "")
		}
	};
	if let Err(error) = result {
		error!("Failed to apply binding to {:?}: {}", element, error)
	}
}
