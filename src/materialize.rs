//! First-paint conversion of a [`Fragment`] into a plain subtree without markers.

use crate::{
	dom::Node,
	fragment::{self, placeholder_id, Bindings, Fragment, Placeholders},
};
use core::iter;
use tracing::{error, instrument, trace, warn};

/// The result of [`materialize`].
#[derive(Debug)]
pub struct Materialized {
	/// A fragment node holding the materialized content.
	pub root: Node,
	/// Bindings that weren't applied yet. Their markers are still present below [`root`](`Materialized::root`).
	pub pending: Bindings,
}

impl Materialized {
	/// Applies and clears [`pending`](`Materialized::pending`).
	pub fn apply_pending(&mut self) {
		apply_all(&self.root, &mut self.pending);
		warn_unused_bindings(&self.pending);
		self.pending.clear();
	}
}

/// Splices every placeholder's value into `fragment`'s tree and optionally applies its property bindings.
///
/// Placeholders without a value are dropped (with a warning), so they render as nothing.
#[must_use]
#[instrument(skip(fragment), fields(root = ?fragment.root()))]
pub fn materialize(fragment: Fragment, apply_bindings: bool) -> Materialized {
	let (root, mut placeholders, mut bindings) = fragment.into_parts();

	resolve_placeholders(&root, &mut placeholders);
	if !placeholders.is_empty() {
		warn!("{} placeholder value(s) had no marker in the template and weren't rendered.", placeholders.len())
	}

	if apply_bindings {
		apply_all(&root, &mut bindings);
		warn_unused_bindings(&bindings);
		bindings.clear();
	}

	Materialized { root, pending: bindings }
}

/// Replaces placeholder markers below `root` with their values until none are left.
///
/// Values are consumed from `placeholders`, so markers introduced by a spliced value are resolved in a later round.
pub(crate) fn resolve_placeholders(root: &Node, placeholders: &mut Placeholders) {
	let mut round = 0_usize;
	loop {
		let markers = root.find_all(|node| placeholder_id(node).is_some());
		if markers.is_empty() {
			break;
		}
		round += 1;
		trace!("Resolving {} placeholder marker(s) (round {}).", markers.len(), round);
		for marker in markers {
			splice(&marker, placeholders)
		}
	}
}

/// Puts the value of the placeholder `marker` in its place.
/// A fragment value contributes its children.
pub(crate) fn splice(marker: &Node, placeholders: &mut Placeholders) {
	let parent = match marker.parent() {
		Some(parent) => parent,
		None => return error!("Placeholder marker {:?} is detached.", marker),
	};

	if let Some(id) = placeholder_id(marker) {
		match placeholders.remove(&id) {
			Some(value) if value == *marker || value.contains(marker) => {
				error!("Placeholder value {:?} contains its own marker. Rendering nothing.", value)
			}
			Some(value) => {
				if let Err(error) = parent.insert_before(&value, Some(marker)) {
					error!("Failed to splice {:?} into {:?}: {}", value, parent, error)
				}
			}
			None => warn!("No value for placeholder {}. Rendering nothing.", id),
		}
	}

	if let Err(error) = parent.remove_child(marker) {
		error!("Failed to remove placeholder marker {:?}: {}", marker, error)
	}
}

/// Makes a node that's about to be inserted into a live tree final: resolves all placeholders inside it
/// and applies bindings to it and its descendants.
pub(crate) fn resolve_subtree(node: &Node, placeholders: &mut Placeholders, bindings: &mut Bindings) {
	resolve_placeholders(node, placeholders);
	apply_all(node, bindings);
}

/// Applies bindings to every marked element at or below `root`.
pub(crate) fn apply_all(root: &Node, bindings: &mut Bindings) {
	for element in iter::once(root.clone()).chain(root.descendants()) {
		if fragment::has_binding_markers(&element) {
			fragment::apply_bindings(&element, bindings)
		}
	}
}

fn warn_unused_bindings(bindings: &Bindings) {
	if !bindings.is_empty() {
		warn!("{} binding(s) had no marker in the template and weren't applied.", bindings.len())
	}
}
