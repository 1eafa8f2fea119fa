use super::{escape_into, AttributeCallback, Callback, DomError, NodeId, NodeType};
use crate::value::Value;
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::{trace, trace_span};

#[derive(Debug)]
pub struct Event {
	name: String,
	target: Node,
	current_target: RefCell<Option<Node>>,
	propagation_stopped: Cell<bool>,
}
impl Event {
	fn new(name: &str, target: Node) -> Self {
		Self {
			name: name.to_owned(),
			target,
			current_target: RefCell::new(None),
			propagation_stopped: Cell::new(false),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn target(&self) -> &Node {
		&self.target
	}

	/// The node whose listener is currently running.
	#[must_use]
	pub fn current_target(&self) -> Option<Node> {
		self.current_target.borrow().clone()
	}

	pub fn stop_propagation(&self) {
		self.propagation_stopped.set(true)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
	ChildList,
	Attribute(String),
	CharacterData,
	Property(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
	pub target: NodeId,
	pub kind: MutationKind,
}

thread_local! {
	static MUTATIONS: RefCell<Option<Vec<MutationRecord>>> = RefCell::new(None);
}

fn record(target: NodeId, kind: MutationKind) {
	MUTATIONS.with(|mutations| {
		if let Some(mutations) = mutations.borrow_mut().as_mut() {
			mutations.push(MutationRecord { target, kind })
		}
	})
}

/// Runs `f` and returns the tree mutations it caused on this thread, in order.
///
/// Nested calls see only their own mutations, which are then also reported to the enclosing call.
pub fn observe<R>(f: impl FnOnce() -> R) -> (R, Vec<MutationRecord>) {
	let outer = MUTATIONS.with(|mutations| mutations.replace(Some(Vec::new())));
	let result = f();
	let records = MUTATIONS.with(|mutations| {
		let records = mutations.replace(outer).unwrap_or_default();
		if let Some(outer) = mutations.borrow_mut().as_mut() {
			outer.extend(records.iter().cloned())
		}
		records
	});
	(result, records)
}

struct ElementData {
	name: String,
	attributes: RefCell<Vec<(String, String)>>,
	properties: RefCell<HashMap<String, Value>>,
	listeners: RefCell<Vec<(String, Callback)>>,
	attribute_callback: RefCell<Option<AttributeCallback>>,
	shadow_root: RefCell<Option<Node>>,
}

enum Kind {
	Element(ElementData),
	Text(RefCell<String>),
	Comment(RefCell<String>),
	Fragment,
	ShadowRoot(Weak<NodeCell>),
}

struct NodeCell {
	id: NodeId,
	kind: Kind,
	parent: RefCell<Weak<NodeCell>>,
	children: RefCell<Vec<Node>>,
}

#[derive(Clone)]
pub struct Node(Rc<NodeCell>);

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Node {}
impl core::hash::Hash for Node {
	fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
		self.0.id.hash(state)
	}
}

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			Kind::Element(element) => write!(f, "<{}>{}", element.name, self.0.id),
			Kind::Text(data) => write!(f, "Text{}({:?})", self.0.id, crate::page_content(&data.borrow())),
			Kind::Comment(data) => write!(f, "Comment{}({:?})", self.0.id, crate::page_content(&data.borrow())),
			Kind::Fragment => write!(f, "Fragment{}", self.0.id),
			Kind::ShadowRoot(_) => write!(f, "ShadowRoot{}", self.0.id),
		}
	}
}

impl Node {
	fn new(kind: Kind) -> Self {
		Self(Rc::new(NodeCell {
			id: NodeId::next(),
			kind,
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
		}))
	}

	/// Creates a detached element. The tag name is lower-cased.
	#[must_use]
	pub fn element(name: &str) -> Self {
		Self::new(Kind::Element(ElementData {
			name: name.to_ascii_lowercase(),
			attributes: RefCell::default(),
			properties: RefCell::default(),
			listeners: RefCell::default(),
			attribute_callback: RefCell::default(),
			shadow_root: RefCell::default(),
		}))
	}

	#[must_use]
	pub fn text(data: impl Into<String>) -> Self {
		Self::new(Kind::Text(RefCell::new(data.into())))
	}

	#[must_use]
	pub fn comment(data: impl Into<String>) -> Self {
		Self::new(Kind::Comment(RefCell::new(data.into())))
	}

	#[must_use]
	pub fn fragment() -> Self {
		Self::new(Kind::Fragment)
	}

	#[must_use]
	pub fn id(&self) -> NodeId {
		self.0.id
	}

	#[must_use]
	pub fn node_type(&self) -> NodeType {
		match self.0.kind {
			Kind::Element(_) => NodeType::Element,
			Kind::Text(_) => NodeType::Text,
			Kind::Comment(_) => NodeType::Comment,
			Kind::Fragment => NodeType::Fragment,
			Kind::ShadowRoot(_) => NodeType::ShadowRoot,
		}
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		matches!(self.0.kind, Kind::Element(_))
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		matches!(self.0.kind, Kind::Text(_))
	}

	#[must_use]
	pub fn is_fragment(&self) -> bool {
		matches!(self.0.kind, Kind::Fragment)
	}

	/// The lower-case tag name, for elements.
	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		self.element_data().map(|element| element.name.as_str())
	}

	fn element_data(&self) -> Option<&ElementData> {
		match &self.0.kind {
			Kind::Element(element) => Some(element),
			_ => None,
		}
	}

	fn character_data(&self) -> Option<&RefCell<String>> {
		match &self.0.kind {
			Kind::Text(data) | Kind::Comment(data) => Some(data),
			_ => None,
		}
	}

	fn can_have_children(&self) -> bool {
		matches!(self.0.kind, Kind::Element(_) | Kind::Fragment | Kind::ShadowRoot(_))
	}

	// Tree structure.

	#[must_use]
	pub fn parent(&self) -> Option<Node> {
		self.0.parent.borrow().upgrade().map(Node)
	}

	/// A snapshot of the current child list.
	#[must_use]
	pub fn children(&self) -> Vec<Node> {
		self.0.children.borrow().clone()
	}

	#[must_use]
	pub fn child_count(&self) -> usize {
		self.0.children.borrow().len()
	}

	#[must_use]
	pub fn child_at(&self, index: usize) -> Option<Node> {
		self.0.children.borrow().get(index).cloned()
	}

	#[must_use]
	pub fn first_child(&self) -> Option<Node> {
		self.child_at(0)
	}

	#[must_use]
	pub fn index_in_parent(&self) -> Option<usize> {
		let parent = self.parent()?;
		let index = parent.0.children.borrow().iter().position(|child| child == self);
		index
	}

	#[must_use]
	pub fn next_sibling(&self) -> Option<Node> {
		let parent = self.parent()?;
		let index = self.index_in_parent()?;
		parent.child_at(index + 1)
	}

	/// Whether `self` is `other` or one of its ancestors, crossing shadow boundaries.
	#[must_use]
	pub fn contains(&self, other: &Node) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if &node == self {
				return true;
			}
			current = node.parent_or_host();
		}
		false
	}

	fn parent_or_host(&self) -> Option<Node> {
		match &self.0.kind {
			Kind::ShadowRoot(host) => host.upgrade().map(Node),
			_ => self.parent(),
		}
	}

	fn detach(&self) {
		if let Some(parent) = self.parent() {
			parent.0.children.borrow_mut().retain(|child| child != self);
			record(parent.id(), MutationKind::ChildList);
		}
		*self.0.parent.borrow_mut() = Weak::new();
	}

	/// # Errors
	///
	/// See [`Node::insert_before`].
	pub fn append_child(&self, child: &Node) -> Result<(), DomError> {
		self.insert_before(child, None)
	}

	/// Inserts `child` before `reference`, or at the end if `reference` is [`None`].
	///
	/// A `child` that is already in a tree is moved. Fragments are emptied into `self` instead.
	///
	/// # Errors
	///
	/// [`DomError::HierarchyRequest`] if `self` can't have children, `child` is a shadow root,
	/// or `child` contains `self`.
	/// [`DomError::NotFound`] if `reference` isn't a child of `self`.
	///
	/// The tree is unchanged when an error is returned.
	pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), DomError> {
		if !self.can_have_children() || matches!(child.0.kind, Kind::ShadowRoot(_)) || child.contains(self) {
			return Err(DomError::HierarchyRequest);
		}
		if let Some(reference) = reference {
			if reference.parent().as_ref() != Some(self) {
				return Err(DomError::NotFound);
			}
			if reference == child {
				return Ok(());
			}
		}

		if child.is_fragment() {
			let moved = child.0.children.take();
			if moved.is_empty() {
				return Ok(());
			}
			record(child.id(), MutationKind::ChildList);
			for node in moved {
				*node.0.parent.borrow_mut() = Weak::new();
				self.insert_single(&node, reference);
			}
			return Ok(());
		}

		child.detach();
		self.insert_single(child, reference);
		Ok(())
	}

	fn insert_single(&self, child: &Node, reference: Option<&Node>) {
		{
			let mut children = self.0.children.borrow_mut();
			let index = reference
				.and_then(|reference| children.iter().position(|c| c == reference))
				.unwrap_or_else(|| children.len());
			children.insert(index, child.clone());
		}
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		record(self.id(), MutationKind::ChildList);
	}

	/// # Errors
	///
	/// [`DomError::NotFound`] if `child` isn't a child of `self`.
	pub fn remove_child(&self, child: &Node) -> Result<Node, DomError> {
		if child.parent().as_ref() != Some(self) {
			return Err(DomError::NotFound);
		}
		child.detach();
		Ok(child.clone())
	}

	/// Puts `new` where `old` is and detaches `old`.
	///
	/// # Errors
	///
	/// [`DomError::NotFound`] if `old` isn't a child of `self`, otherwise as [`Node::insert_before`].
	pub fn replace_child(&self, new: &Node, old: &Node) -> Result<(), DomError> {
		if old.parent().as_ref() != Some(self) {
			return Err(DomError::NotFound);
		}
		if new == old {
			return Ok(());
		}
		self.insert_before(new, Some(old))?;
		self.remove_child(old).map(drop)
	}

	/// Detaches this node from its parent, if any.
	pub fn remove(&self) {
		self.detach()
	}

	// Shadow roots.

	/// Attaches a shadow root to this element, or returns the existing one.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn attach_shadow(&self) -> Result<Node, DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		let mut shadow_root = element.shadow_root.borrow_mut();
		Ok(shadow_root
			.get_or_insert_with(|| Node::new(Kind::ShadowRoot(Rc::downgrade(&self.0))))
			.clone())
	}

	#[must_use]
	pub fn shadow_root(&self) -> Option<Node> {
		self.element_data()?.shadow_root.borrow().clone()
	}

	/// The element a shadow root is attached to.
	#[must_use]
	pub fn host(&self) -> Option<Node> {
		match &self.0.kind {
			Kind::ShadowRoot(host) => host.upgrade().map(Node),
			_ => None,
		}
	}

	// Attributes.

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<String> {
		let element = self.element_data()?;
		let attributes = element.attributes.borrow();
		let value = attributes.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone());
		value
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.element_data()
			.map_or(false, |element| element.attributes.borrow().iter().any(|(n, _)| n.eq_ignore_ascii_case(name)))
	}

	/// All attributes in insertion order.
	#[must_use]
	pub fn attributes(&self) -> Vec<(String, String)> {
		self.element_data().map(|element| element.attributes.borrow().clone()).unwrap_or_default()
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		let name = name.to_ascii_lowercase();
		{
			let mut attributes = element.attributes.borrow_mut();
			match attributes.iter_mut().find(|(n, _)| *n == name) {
				Some((_, existing)) => value.clone_into(existing),
				None => attributes.push((name.clone(), value.to_owned())),
			}
		}
		record(self.id(), MutationKind::Attribute(name.clone()));
		self.attribute_changed(&name, Some(value));
		Ok(())
	}

	/// Returns the previous value, if the attribute was present.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn remove_attribute(&self, name: &str) -> Result<Option<String>, DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		let name = name.to_ascii_lowercase();
		let removed = {
			let mut attributes = element.attributes.borrow_mut();
			attributes
				.iter()
				.position(|(n, _)| *n == name)
				.map(|index| attributes.remove(index).1)
		};
		if removed.is_some() {
			record(self.id(), MutationKind::Attribute(name.clone()));
			self.attribute_changed(&name, None);
		}
		Ok(removed)
	}

	/// Registers a callback that runs after each attribute change on this element,
	/// replacing any previous one.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn set_attribute_callback(&self, callback: impl Fn(&Node, &str, Option<&str>) + 'static) -> Result<(), DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		*element.attribute_callback.borrow_mut() = Some(Rc::new(callback));
		Ok(())
	}

	pub fn clear_attribute_callback(&self) {
		if let Some(element) = self.element_data() {
			element.attribute_callback.borrow_mut().take();
		}
	}

	fn attribute_changed(&self, name: &str, value: Option<&str>) {
		let callback = self.element_data().and_then(|element| element.attribute_callback.borrow().clone());
		if let Some(callback) = callback {
			callback(self, name, value)
		}
	}

	// Properties.

	#[must_use]
	pub fn property(&self, name: &str) -> Option<Value> {
		self.element_data()?.properties.borrow().get(name).cloned()
	}

	/// The properties assigned through [`Node::set_property`].
	#[must_use]
	pub fn properties(&self) -> Vec<(String, Value)> {
		self.element_data()
			.map(|element| element.properties.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
			.unwrap_or_default()
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn set_property(&self, name: &str, value: Value) -> Result<(), DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		element.properties.borrow_mut().insert(name.to_owned(), value);
		record(self.id(), MutationKind::Property(name.to_owned()));
		Ok(())
	}

	// Character data.

	/// The data of a text node or comment.
	#[must_use]
	pub fn data(&self) -> Option<String> {
		self.character_data().map(|data| data.borrow().clone())
	}

	/// # Errors
	///
	/// [`DomError::NotCharacterData`].
	pub fn set_data(&self, data: &str) -> Result<(), DomError> {
		let cell = self.character_data().ok_or(DomError::NotCharacterData)?;
		let mut current = cell.borrow_mut();
		data.clone_into(&mut *current);
		drop(current);
		record(self.id(), MutationKind::CharacterData);
		Ok(())
	}

	/// Concatenated text of all descendant text nodes, or the node's own data.
	#[must_use]
	pub fn text_content(&self) -> String {
		match &self.0.kind {
			Kind::Text(data) | Kind::Comment(data) => data.borrow().clone(),
			_ => {
				let mut text = String::new();
				for node in self.descendants() {
					if let Kind::Text(data) = &node.0.kind {
						text.push_str(&data.borrow())
					}
				}
				text
			}
		}
	}

	// Events.

	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn add_event_listener(&self, name: &str, callback: Callback) -> Result<(), DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		element.listeners.borrow_mut().push((name.to_owned(), callback));
		Ok(())
	}

	#[must_use]
	pub fn listeners(&self) -> Vec<(String, Callback)> {
		self.element_data().map(|element| element.listeners.borrow().clone()).unwrap_or_default()
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn replace_listeners(&self, listeners: Vec<(String, Callback)>) -> Result<(), DomError> {
		let element = self.element_data().ok_or(DomError::NotAnElement)?;
		*element.listeners.borrow_mut() = listeners;
		Ok(())
	}

	/// Runs matching listeners on this node and then on each ancestor (crossing into shadow hosts),
	/// until one calls [`Event::stop_propagation`].
	pub fn dispatch(&self, name: &str) {
		let span = trace_span!("dispatch", event = name, target = %self.id());
		let _enter = span.enter();

		let event = Event::new(name, self.clone());
		let mut current = Some(self.clone());
		while let Some(node) = current {
			// Listeners may mutate the tree, so they're collected first.
			let listeners: Vec<Callback> = node
				.listeners()
				.into_iter()
				.filter(|(listened, _)| listened == name)
				.map(|(_, callback)| callback)
				.collect();
			if !listeners.is_empty() {
				*event.current_target.borrow_mut() = Some(node.clone());
				trace!("Calling {} listener(s) on {:?}.", listeners.len(), node);
				for listener in listeners {
					listener.call(&event);
				}
			}
			if event.propagation_stopped.get() {
				break;
			}
			current = node.parent_or_host();
		}
	}

	/// Drops this node's listeners, attribute callback and properties.
	pub(crate) fn release(&self) {
		if let Some(element) = self.element_data() {
			let released = element.listeners.take().len();
			element.properties.borrow_mut().clear();
			element.attribute_callback.borrow_mut().take();
			if released > 0 {
				trace!("Released {} listener(s) of {:?}.", released, self);
			}
		}
	}

	// Serialization.

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut html = String::new();
		let raw = self.tag_name().map_or(false, crate::parse::is_raw_text_element);
		for child in self.0.children.borrow().iter() {
			child.serialize_into(&mut html, raw);
		}
		html
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut html = String::new();
		self.serialize_into(&mut html, false);
		html
	}

	fn serialize_into(&self, html: &mut String, raw_text: bool) {
		match &self.0.kind {
			Kind::Element(element) => {
				html.push('<');
				html.push_str(&element.name);
				for (name, value) in element.attributes.borrow().iter() {
					html.push(' ');
					html.push_str(name);
					html.push_str("=\"");
					escape_into(html, value, true);
					html.push('"');
				}
				html.push('>');
				if crate::parse::is_void_element(&element.name) {
					return;
				}
				html.push_str(&self.inner_html());
				html.push_str("</");
				html.push_str(&element.name);
				html.push('>');
			}
			Kind::Text(data) => {
				if raw_text {
					html.push_str(&data.borrow())
				} else {
					escape_into(html, &data.borrow(), false)
				}
			}
			Kind::Comment(data) => {
				html.push_str("<!--");
				html.push_str(&data.borrow());
				html.push_str("-->");
			}
			Kind::Fragment | Kind::ShadowRoot(_) => html.push_str(&self.inner_html()),
		}
	}
}
