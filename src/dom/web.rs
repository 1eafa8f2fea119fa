use super::{escape_into, AttributeCallback, Callback, DomError, NodeId, NodeType};
use crate::{closure_map, value::Value};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
};
use hashbrown::HashMap;
use js_sys::{Array, Reflect};
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};
use web_sys::{
	CharacterData, Document, DomException, Element, EventInit, MutationObserver, MutationObserverInit, MutationRecord, ShadowRoot, ShadowRootInit,
	ShadowRootMode,
};

/// Expando property that ties a browser node to its [`NodeId`].
const ID_PROPERTY: &str = "__vuiNodeId";

struct AttributeObserver {
	callback: AttributeCallback,
	observer: MutationObserver,
	_closure: Closure<dyn Fn(Array)>,
}

/// What the browser can't store for us.
#[derive(Default)]
struct NodeState {
	/// Everything assigned through [`Node::set_property`]. Values with a JavaScript representation are also set on the node.
	properties: HashMap<String, Value>,
	attributes: Option<AttributeObserver>,
}

thread_local! {
	static DOCUMENT: Document = web_sys::window()
		.and_then(|window| window.document())
		.expect_throw("vui-dom: No document found. Nodes can only be created on a page's main thread.");
	static STATE: RefCell<HashMap<NodeId, NodeState>> = RefCell::new(HashMap::new());
}

#[derive(Debug)]
pub struct Event {
	raw: web_sys::Event,
	name: String,
	target: Node,
	current_target: Node,
}
impl Event {
	pub(crate) fn new(raw: web_sys::Event, current_target: Node) -> Self {
		let target = raw
			.target()
			.and_then(|target| target.dyn_into::<web_sys::Node>().ok())
			.map_or_else(|| current_target.clone(), Node::from);
		Self {
			name: raw.type_(),
			raw,
			target,
			current_target,
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The node the event was dispatched at, as seen from the listener (that is: retargeted across shadow boundaries).
	#[must_use]
	pub fn target(&self) -> &Node {
		&self.target
	}

	/// The node whose listener is running.
	#[must_use]
	pub fn current_target(&self) -> Option<Node> {
		Some(self.current_target.clone())
	}

	pub fn stop_propagation(&self) {
		self.raw.stop_propagation()
	}

	/// The browser event, for example to read pointer coordinates or key codes.
	#[must_use]
	pub fn raw(&self) -> &web_sys::Event {
		&self.raw
	}
}

/// A browser node with a stable [`NodeId`].
#[derive(Clone)]
pub struct Node {
	raw: web_sys::Node,
	id: NodeId,
	tag: Option<Rc<str>>,
}

impl From<web_sys::Node> for Node {
	fn from(raw: web_sys::Node) -> Self {
		let id = node_id(&raw);
		let tag = raw.dyn_ref::<Element>().map(|element| Rc::from(element.local_name().as_str()));
		Self { raw, id, tag }
	}
}

impl AsRef<web_sys::Node> for Node {
	fn as_ref(&self) -> &web_sys::Node {
		&self.raw
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn node_id(raw: &web_sys::Node) -> NodeId {
	let key = JsValue::from_str(ID_PROPERTY);
	if let Some(id) = Reflect::get(raw, &key).ok().and_then(|id| id.as_f64()) {
		return NodeId(id as u64);
	}
	let id = NodeId::next();
	if let Err(error) = Reflect::set(raw, &key, &JsValue::from_f64(id.get() as f64)) {
		error!("Failed to tag a node with its id {}: {:?}", id, error)
	}
	id
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}
impl Eq for Node {}
impl Hash for Node {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state)
	}
}

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self.node_type() {
			NodeType::Element => write!(f, "<{}>{}", self.tag.as_deref().unwrap_or_default(), self.id),
			NodeType::Text => write!(f, "Text{}({:?})", self.id, crate::page_content(&self.data().unwrap_or_default())),
			NodeType::Comment => write!(f, "Comment{}({:?})", self.id, crate::page_content(&self.data().unwrap_or_default())),
			NodeType::Fragment => write!(f, "Fragment{}", self.id),
			NodeType::ShadowRoot => write!(f, "ShadowRoot{}", self.id),
			NodeType::Other => write!(f, "{}{}", self.raw.node_name(), self.id),
		}
	}
}

fn document() -> Document {
	DOCUMENT.with(Document::clone)
}

fn dom_error(error: &JsValue) -> DomError {
	match error.dyn_ref::<DomException>().map(DomException::name).as_deref() {
		Some("HierarchyRequestError") => DomError::HierarchyRequest,
		Some("NotFoundError") => DomError::NotFound,
		_ => {
			warn!("Unexpected DOM exception: {:?}", error);
			DomError::Rejected
		}
	}
}

fn to_js(value: &Value) -> Option<JsValue> {
	Some(match value {
		Value::Null => JsValue::NULL,
		Value::Bool(b) => JsValue::from_bool(*b),
		Value::Number(n) => JsValue::from_f64(*n),
		Value::Text(text) => JsValue::from_str(text),
		Value::Unsafe(html) => JsValue::from_str(html.as_str()),
		_ => return None,
	})
}

fn from_js(value: &JsValue) -> Option<Value> {
	if value.is_null() {
		Some(Value::Null)
	} else if let Some(b) = value.as_bool() {
		Some(Value::Bool(b))
	} else if let Some(n) = value.as_f64() {
		Some(Value::Number(n))
	} else {
		value.as_string().map(Value::Text)
	}
}

impl Node {
	/// Creates a detached element in the page's document.
	///
	/// An invalid tag name is logged and yields a comment instead.
	#[must_use]
	pub fn element(name: &str) -> Self {
		match document().create_element(name) {
			Ok(element) => Self::from(web_sys::Node::from(element)),
			Err(error) => {
				error!("Can't create <{}>: {:?}", name, error);
				Self::comment(name)
			}
		}
	}

	#[must_use]
	pub fn text(data: impl Into<String>) -> Self {
		Self::from(web_sys::Node::from(document().create_text_node(&data.into())))
	}

	#[must_use]
	pub fn comment(data: impl Into<String>) -> Self {
		Self::from(web_sys::Node::from(document().create_comment(&data.into())))
	}

	#[must_use]
	pub fn fragment() -> Self {
		Self::from(web_sys::Node::from(document().create_document_fragment()))
	}

	#[must_use]
	pub fn raw(&self) -> &web_sys::Node {
		&self.raw
	}

	#[must_use]
	pub fn id(&self) -> NodeId {
		self.id
	}

	#[must_use]
	pub fn node_type(&self) -> NodeType {
		match self.raw.node_type() {
			web_sys::Node::ELEMENT_NODE => NodeType::Element,
			web_sys::Node::TEXT_NODE => NodeType::Text,
			web_sys::Node::COMMENT_NODE => NodeType::Comment,
			web_sys::Node::DOCUMENT_FRAGMENT_NODE if self.raw.has_type::<ShadowRoot>() => NodeType::ShadowRoot,
			web_sys::Node::DOCUMENT_FRAGMENT_NODE => NodeType::Fragment,
			_ => NodeType::Other,
		}
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		self.tag.is_some()
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		self.raw.node_type() == web_sys::Node::TEXT_NODE
	}

	#[must_use]
	pub fn is_fragment(&self) -> bool {
		self.node_type() == NodeType::Fragment
	}

	/// The local name, for elements. HTML tag names are lower-case.
	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		self.tag.as_deref()
	}

	fn element(&self) -> Result<&Element, DomError> {
		self.raw.dyn_ref::<Element>().ok_or(DomError::NotAnElement)
	}

	// Tree structure.

	#[must_use]
	pub fn parent(&self) -> Option<Node> {
		self.raw.parent_node().map(Node::from)
	}

	/// A snapshot of the current child list.
	#[must_use]
	pub fn children(&self) -> Vec<Node> {
		let child_nodes = self.raw.child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).map(Node::from).collect()
	}

	#[must_use]
	pub fn child_count(&self) -> usize {
		self.raw.child_nodes().length() as usize
	}

	#[must_use]
	pub fn child_at(&self, index: usize) -> Option<Node> {
		let index = u32::try_from(index).ok()?;
		self.raw.child_nodes().item(index).map(Node::from)
	}

	#[must_use]
	pub fn first_child(&self) -> Option<Node> {
		self.raw.first_child().map(Node::from)
	}

	#[must_use]
	pub fn index_in_parent(&self) -> Option<usize> {
		let parent = self.parent()?;
		let index = parent.children().iter().position(|child| child == self);
		index
	}

	#[must_use]
	pub fn next_sibling(&self) -> Option<Node> {
		self.raw.next_sibling().map(Node::from)
	}

	/// Whether `self` is `other` or one of its ancestors, crossing shadow boundaries.
	#[must_use]
	pub fn contains(&self, other: &Node) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if &node == self {
				return true;
			}
			current = node.host().or_else(|| node.parent());
		}
		false
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
	pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), DomError> {
		self.raw
			.insert_before(&child.raw, reference.map(|reference| &reference.raw))
			.map(drop)
			.map_err(|error| dom_error(&error))
	}

	/// # Errors
	///
	/// [`DomError::NotFound`] if `child` isn't a child of `self`.
	pub fn remove_child(&self, child: &Node) -> Result<Node, DomError> {
		self.raw.remove_child(&child.raw).map(Node::from).map_err(|error| dom_error(&error))
	}

	/// Puts `new` where `old` is and detaches `old`.
	///
	/// # Errors
	///
	/// [`DomError::NotFound`] if `old` isn't a child of `self`, otherwise as [`Node::insert_before`].
	pub fn replace_child(&self, new: &Node, old: &Node) -> Result<(), DomError> {
		if new == old {
			return if old.parent().as_ref() == Some(self) { Ok(()) } else { Err(DomError::NotFound) };
		}
		self.raw.replace_child(&new.raw, &old.raw).map(drop).map_err(|error| dom_error(&error))
	}

	/// Detaches this node from its parent, if any.
	pub fn remove(&self) {
		if let Some(parent) = self.raw.parent_node() {
			if let Err(error) = parent.remove_child(&self.raw) {
				error!("Failed to remove {:?}: {:?}", self, error)
			}
		}
	}

	// Shadow roots.

	/// Attaches an open shadow root to this element, or returns the existing one.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`], or [`DomError::Rejected`] for elements that can't host a shadow root.
	pub fn attach_shadow(&self) -> Result<Node, DomError> {
		let element = self.element()?;
		if let Some(shadow_root) = element.shadow_root() {
			return Ok(Node::from(web_sys::Node::from(shadow_root)));
		}
		element
			.attach_shadow(&ShadowRootInit::new(ShadowRootMode::Open))
			.map(|shadow_root| Node::from(web_sys::Node::from(shadow_root)))
			.map_err(|error| dom_error(&error))
	}

	#[must_use]
	pub fn shadow_root(&self) -> Option<Node> {
		let shadow_root = self.raw.dyn_ref::<Element>()?.shadow_root()?;
		Some(Node::from(web_sys::Node::from(shadow_root)))
	}

	/// The element a shadow root is attached to.
	#[must_use]
	pub fn host(&self) -> Option<Node> {
		let host = self.raw.dyn_ref::<ShadowRoot>()?.host();
		Some(Node::from(web_sys::Node::from(host)))
	}

	// Attributes.

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<String> {
		self.element().ok()?.get_attribute(name)
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.element().map_or(false, |element| element.has_attribute(name))
	}

	/// All attributes in the browser's order, which is insertion order.
	#[must_use]
	pub fn attributes(&self) -> Vec<(String, String)> {
		let attributes = match self.element() {
			Ok(element) => element.attributes(),
			Err(_) => return Vec::new(),
		};
		(0..attributes.length())
			.filter_map(|i| attributes.item(i))
			.map(|attribute| (attribute.name(), attribute.value()))
			.collect()
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`], or [`DomError::Rejected`] for invalid names.
	pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		self.element()?.set_attribute(name, value).map_err(|error| dom_error(&error))?;
		self.attribute_changed(&name.to_ascii_lowercase(), Some(value));
		Ok(())
	}

	/// Returns the previous value, if the attribute was present.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn remove_attribute(&self, name: &str) -> Result<Option<String>, DomError> {
		let element = self.element()?;
		let removed = element.get_attribute(name);
		if removed.is_some() {
			element.remove_attribute(name).map_err(|error| dom_error(&error))?;
			self.attribute_changed(&name.to_ascii_lowercase(), None);
		}
		Ok(removed)
	}

	/// Registers a callback that runs after each attribute change on this element, replacing any previous one.
	///
	/// Changes made through this handle are reported synchronously.
	/// Changes made by other scripts arrive through a [`MutationObserver`], and may then be reported twice.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`], or [`DomError::Rejected`] if the observer can't be created.
	pub fn set_attribute_callback(&self, callback: impl Fn(&Node, &str, Option<&str>) + 'static) -> Result<(), DomError> {
		self.element()?;
		self.clear_attribute_callback();

		let node = self.clone();
		let closure = Closure::wrap(Box::new(move |records: Array| {
			for record in records.iter() {
				if let Some(name) = record.unchecked_into::<MutationRecord>().attribute_name() {
					let value = node.attribute(&name);
					node.attribute_changed(&name, value.as_deref())
				}
			}
		}) as Box<dyn Fn(Array)>);
		let observer = MutationObserver::new(closure.as_ref().unchecked_ref()).map_err(|error| dom_error(&error))?;
		observer
			.observe_with_options(&self.raw, MutationObserverInit::new().attributes(true))
			.map_err(|error| dom_error(&error))?;

		STATE.with(|state| {
			state.borrow_mut().entry(self.id).or_default().attributes = Some(AttributeObserver {
				callback: Rc::new(callback),
				observer,
				_closure: closure,
			})
		});
		Ok(())
	}

	pub fn clear_attribute_callback(&self) {
		let previous = STATE.with(|state| state.borrow_mut().get_mut(&self.id).and_then(|state| state.attributes.take()));
		if let Some(previous) = previous {
			previous.observer.disconnect()
		}
	}

	fn attribute_changed(&self, name: &str, value: Option<&str>) {
		let callback = STATE.with(|state| {
			state
				.borrow()
				.get(&self.id)
				.and_then(|state| state.attributes.as_ref())
				.map(|attributes| Rc::clone(&attributes.callback))
		});
		if let Some(callback) = callback {
			callback(self, name, value)
		}
	}

	// Properties.

	/// The current value of a property, as far as it can be represented.
	///
	/// Values without a JavaScript representation are read back as they were set.
	/// Everything else is read from the node, so user input shows up here.
	#[must_use]
	pub fn property(&self, name: &str) -> Option<Value> {
		self.element().ok()?;
		let stored = STATE.with(|state| state.borrow().get(&self.id).and_then(|state| state.properties.get(name).cloned()));
		match stored {
			Some(value) if to_js(&value).is_none() => Some(value),
			_ => Reflect::get(&self.raw, &JsValue::from_str(name)).ok().and_then(|value| from_js(&value)),
		}
	}

	/// The properties assigned through [`Node::set_property`], with the values they were assigned.
	#[must_use]
	pub fn properties(&self) -> Vec<(String, Value)> {
		STATE.with(|state| {
			state
				.borrow()
				.get(&self.id)
				.map(|state| state.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
				.unwrap_or_default()
		})
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`], or [`DomError::Rejected`] if the node refuses the value.
	pub fn set_property(&self, name: &str, value: Value) -> Result<(), DomError> {
		self.element()?;
		if let Some(js) = to_js(&value) {
			Reflect::set(&self.raw, &JsValue::from_str(name), &js).map_err(|error| dom_error(&error))?;
		}
		STATE.with(|state| state.borrow_mut().entry(self.id).or_default().properties.insert(name.to_owned(), value));
		Ok(())
	}

	// Character data.

	/// The data of a text node or comment.
	#[must_use]
	pub fn data(&self) -> Option<String> {
		self.raw.dyn_ref::<CharacterData>().map(CharacterData::data)
	}

	/// # Errors
	///
	/// [`DomError::NotCharacterData`].
	pub fn set_data(&self, data: &str) -> Result<(), DomError> {
		self.raw.dyn_ref::<CharacterData>().ok_or(DomError::NotCharacterData)?.set_data(data);
		Ok(())
	}

	/// Concatenated text of all descendant text nodes, or the node's own data.
	#[must_use]
	pub fn text_content(&self) -> String {
		self.raw.text_content().unwrap_or_default()
	}

	// Events.

	/// Adds a browser event listener. Its closure is kept in the [`closure_map`] until the node is released.
	///
	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn add_event_listener(&self, name: &str, callback: Callback) -> Result<(), DomError> {
		self.element()?;
		closure_map::publish(self, name, callback).map_err(|error| dom_error(&error))
	}

	#[must_use]
	pub fn listeners(&self) -> Vec<(String, Callback)> {
		closure_map::listeners(self.id)
	}

	/// # Errors
	///
	/// [`DomError::NotAnElement`].
	pub fn replace_listeners(&self, listeners: Vec<(String, Callback)>) -> Result<(), DomError> {
		self.element()?;
		closure_map::release(self);
		for (name, callback) in listeners {
			closure_map::publish(self, &name, callback).map_err(|error| dom_error(&error))?;
		}
		Ok(())
	}

	/// Dispatches a bubbling, composed event named `name` at this node.
	pub fn dispatch(&self, name: &str) {
		let span = trace_span!("dispatch", event = name, target = %self.id);
		let _enter = span.enter();

		let event = match web_sys::Event::new_with_event_init_dict(name, EventInit::new().bubbles(true).composed(true)) {
			Ok(event) => event,
			Err(error) => return error!("Failed to create {:?} event: {:?}", name, error),
		};
		if let Err(error) = self.raw.dispatch_event(&event) {
			error!("Failed to dispatch {:?} event: {:?}", name, error)
		}
	}

	/// Removes this node's listeners and attribute observer and forgets its stored properties.
	pub(crate) fn release(&self) {
		let released = closure_map::release(self);
		let state = STATE.with(|state| state.borrow_mut().remove(&self.id));
		if let Some(AttributeObserver { observer, .. }) = state.and_then(|state| state.attributes) {
			observer.disconnect()
		}
		if released > 0 {
			trace!("Released {} listener(s) of {:?}.", released, self);
		}
	}

	// Serialization.

	#[must_use]
	pub fn inner_html(&self) -> String {
		if let Some(element) = self.raw.dyn_ref::<Element>() {
			element.inner_html()
		} else if let Some(shadow_root) = self.raw.dyn_ref::<ShadowRoot>() {
			shadow_root.inner_html()
		} else {
			self.children().iter().map(Node::outer_html).collect()
		}
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		match self.node_type() {
			NodeType::Element => self.raw.unchecked_ref::<Element>().outer_html(),
			NodeType::Text => {
				let mut html = String::new();
				escape_into(&mut html, &self.data().unwrap_or_default(), false);
				html
			}
			NodeType::Comment => format!("<!--{}-->", self.data().unwrap_or_default()),
			NodeType::Fragment | NodeType::ShadowRoot | NodeType::Other => self.inner_html(),
		}
	}
}
