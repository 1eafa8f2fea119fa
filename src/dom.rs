//! The live tree that templates are materialized into and diffed against.
//!
//! [`Node`] is a cheap handle: clones refer to the *same* node and `==` compares identity,
//! which is what the differ relies on to preserve nodes across renders.
//!
//! On `wasm32`, a [`Node`] wraps a [`web_sys::Node`] and every operation goes straight to the browser's DOM.
//! Elsewhere, it's a single-threaded in-memory tree with the same interface, which follows the
//! [DOM Standard](https://dom.spec.whatwg.org/#mutation-algorithms) closely enough for reconciliation purposes:
//! inserting a node that already has a parent moves it, and inserting a fragment moves its children instead.
//! The in-memory tree additionally records its mutations, see `observe`.

use core::{
	fmt::{self, Debug, Display, Formatter},
	sync::atomic::{AtomicU64, Ordering},
};
use std::rc::Rc;
use thiserror::Error;
use tracing::error;

#[cfg(not(target_arch = "wasm32"))]
mod memory;
#[cfg(not(target_arch = "wasm32"))]
pub use memory::{observe, Event, MutationKind, MutationRecord, Node};

#[cfg(target_arch = "wasm32")]
mod web;
#[cfg(target_arch = "wasm32")]
pub use web::{Event, Node};

/// Thread-wide unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);
impl NodeId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}
impl Display for NodeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DomError {
	#[error("The operation would yield an incorrect node tree.")]
	HierarchyRequest,
	#[error("The reference node is not a child of this node.")]
	NotFound,
	#[error("The node is not an element.")]
	NotAnElement,
	#[error("The node is neither a text node nor a comment.")]
	NotCharacterData,
	#[error("The browser rejected the operation.")]
	Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
	Element,
	Text,
	Comment,
	Fragment,
	ShadowRoot,
	/// Documents, doctypes and processing instructions. Only found in the browser.
	Other,
}

/// An event listener.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Event)>);
impl Callback {
	pub fn new(f: impl Fn(&Event) + 'static) -> Self {
		Self(Rc::new(f))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event)
	}

	/// Identity comparison. Two separately created callbacks are never equal.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::as_ptr(&self.0).cast::<()>() == Rc::as_ptr(&other.0).cast::<()>()
	}
}
impl Debug for Callback {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Callback({:p})", Rc::as_ptr(&self.0).cast::<()>())
	}
}
impl PartialEq for Callback {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

type AttributeCallback = Rc<dyn Fn(&Node, &str, Option<&str>)>;

impl Node {
	/// Dispatches a bubbling `click` event at this node.
	pub fn click(&self) {
		self.dispatch("click")
	}

	/// All descendants in tree order, not including `self` and not entering shadow roots.
	#[must_use]
	pub fn descendants(&self) -> Vec<Node> {
		let mut result = Vec::new();
		let mut stack: Vec<Node> = self.children().into_iter().rev().collect();
		while let Some(node) = stack.pop() {
			stack.extend(node.children().into_iter().rev());
			result.push(node);
		}
		result
	}

	#[must_use]
	pub fn find_all(&self, predicate: impl Fn(&Node) -> bool) -> Vec<Node> {
		self.descendants().into_iter().filter(|node| predicate(node)).collect()
	}

	#[must_use]
	pub fn find(&self, predicate: impl Fn(&Node) -> bool) -> Option<Node> {
		self.descendants().into_iter().find(|node| predicate(node))
	}

	#[must_use]
	pub fn element_by_id(&self, id: &str) -> Option<Node> {
		self.find(|node| node.attribute("id").as_deref() == Some(id))
	}

	#[must_use]
	pub fn elements_by_tag_name(&self, name: &str) -> Vec<Node> {
		self.find_all(|node| node.tag_name().map_or(false, |tag| tag.eq_ignore_ascii_case(name)))
	}
}

/// Drops the listeners, attribute callback and stored properties of `node` and everything below it, shadow trees included.
///
/// The differ calls this for nodes it takes out of the live tree and for template nodes it doesn't use.
pub fn release_subtree(node: &Node) {
	let mut stack = vec![node.clone()];
	while let Some(node) = stack.pop() {
		node.release();
		stack.extend(node.children());
		stack.extend(node.shadow_root());
	}
}

/// Escapes text for serialization as in the [HTML fragment serialization algorithm](https://html.spec.whatwg.org/multipage/parsing.html#escapingString).
pub(crate) fn escape_into(html: &mut String, text: &str, attribute: bool) {
	for c in text.chars() {
		match c {
			'&' => html.push_str("&amp;"),
			'\u{a0}' => html.push_str("&nbsp;"),
			'"' if attribute => html.push_str("&quot;"),
			'<' if !attribute => html.push_str("&lt;"),
			'>' if !attribute => html.push_str("&gt;"),
			c => html.push(c),
		}
	}
}

/// Appends `child` to `parent`, logging instead of failing.
pub(crate) fn attach(parent: &Node, child: &Node) {
	if let Err(error) = parent.append_child(child) {
		error!("Failed to append {:?} to {:?}: {}", child, parent, error)
	}
}
