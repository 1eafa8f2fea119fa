//! A minimal component layer on top of the template builder and the differ.
//!
//! A [`Definition`] names a custom element tag, its fields with their defaults, which host attributes map to which fields,
//! its style sheets and its render function. A [`Registry`] attaches an [`Instance`] to every element with a defined tag.
//!
//! Each instance owns its field values and its host's shadow root.
//! Writing a field requests a render, which is queued as a [microtask](crate::schedule).
//! Any number of requests before it runs collapse into one render.
//! The first render materializes into a fresh shadow root; later ones diff against it.
//! Instances whose hosts a render removes are forgotten, together with the instances nested in them.

use crate::{
	diff::Differ,
	dom::{attach, Event, Node, NodeId},
	fragment::Fragment,
	materialize::materialize,
	schedule::queue_microtask,
	style::{self, StyleSheet},
	value::Value,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	iter,
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{error, instrument, trace, trace_span, warn};

pub type RenderFn = Rc<dyn Fn(&Rc<Instance>) -> Fragment>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
	#[error("invalid component tag {0:?}: it must start with a lower-case ASCII letter and contain a hyphen")]
	InvalidTag(String),
	#[error("component <{0}> has no render function")]
	MissingRender(String),
	#[error("field {0:?} is declared more than once")]
	DuplicateField(String),
	#[error("attribute {0:?} is mapped more than once")]
	DuplicateAttribute(String),
	#[error("attribute {attribute:?} is mapped to undeclared field {field:?}")]
	UnknownField { attribute: String, field: String },
	#[error("component <{0}> is already defined")]
	AlreadyDefined(String),
	#[error("no component is defined for <{0}>")]
	Undefined(String),
}

fn is_valid_tag(tag: &str) -> bool {
	tag.starts_with(|c: char| c.is_ascii_lowercase())
		&& tag.contains('-')
		&& tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

/// The static description of a component type.
pub struct Definition {
	tag: String,
	fields: Vec<(String, Value)>,
	/// Attribute name → field name, fixed at definition time.
	attributes: HashMap<String, String>,
	styles: Vec<StyleSheet>,
	render: RenderFn,
}

impl Definition {
	#[must_use]
	pub fn builder(tag: &str) -> DefinitionBuilder {
		DefinitionBuilder {
			tag: tag.to_owned(),
			fields: Vec::new(),
			attributes: Vec::new(),
			styles: Vec::new(),
			render: None,
		}
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// Field names and defaults in declaration order.
	#[must_use]
	pub fn fields(&self) -> &[(String, Value)] {
		&self.fields
	}

	/// The field that host attribute `attribute` writes to, if any.
	#[must_use]
	pub fn attribute_field(&self, attribute: &str) -> Option<&str> {
		self.attributes.get(attribute.to_ascii_lowercase().as_str()).map(String::as_str)
	}

	#[must_use]
	pub fn styles(&self) -> &[StyleSheet] {
		&self.styles
	}
}

impl Drop for Definition {
	fn drop(&mut self) {
		for sheet in &self.styles {
			style::release(sheet)
		}
	}
}

impl Debug for Definition {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Definition")
			.field("tag", &self.tag)
			.field("fields", &self.fields)
			.field("attributes", &self.attributes)
			.field("styles", &self.styles)
			.finish_non_exhaustive()
	}
}

/// Registration configuration for a [`Definition`].
#[must_use]
pub struct DefinitionBuilder {
	tag: String,
	fields: Vec<(String, Value)>,
	attributes: Vec<(String, String)>,
	styles: Vec<StyleSheet>,
	render: Option<RenderFn>,
}

impl DefinitionBuilder {
	/// Declares a field with its per-instance initial value.
	pub fn field(mut self, name: &str, default: impl Into<Value>) -> Self {
		self.fields.push((name.to_owned(), default.into()));
		self
	}

	/// Routes host attribute `attribute` to `field`. The field receives the attribute's text, or its default once the attribute is removed.
	pub fn attribute(mut self, attribute: &str, field: &str) -> Self {
		self.attributes.push((attribute.to_ascii_lowercase(), field.to_owned()));
		self
	}

	/// Adds a style sheet, usually from [`css`](crate::style::css). Its reference is released with the [`Definition`].
	pub fn styles(mut self, sheet: StyleSheet) -> Self {
		self.styles.push(sheet);
		self
	}

	pub fn render(mut self, render: impl Fn(&Rc<Instance>) -> Fragment + 'static) -> Self {
		self.render = Some(Rc::new(render));
		self
	}

	/// # Errors
	///
	/// Iff the tag is invalid, the render function is missing, a field or attribute is declared twice,
	/// or an attribute is mapped to an undeclared field.
	pub fn build(self) -> Result<Definition, DefinitionError> {
		let Self {
			tag,
			fields,
			attributes,
			styles,
			render,
		} = self;

		// Constructed first so that the sheets are released on every error path.
		let mut definition = Definition {
			tag,
			fields: Vec::with_capacity(fields.len()),
			attributes: HashMap::with_capacity(attributes.len()),
			styles,
			render: Rc::new(|_: &Rc<Instance>| Fragment::from_parts(Node::fragment(), HashMap::new(), HashMap::new())),
		};

		if !is_valid_tag(&definition.tag) {
			return Err(DefinitionError::InvalidTag(definition.tag.clone()));
		}
		definition.render = render.ok_or_else(|| DefinitionError::MissingRender(definition.tag.clone()))?;

		for (name, default) in fields {
			if definition.fields.iter().any(|(existing, _)| *existing == name) {
				return Err(DefinitionError::DuplicateField(name));
			}
			definition.fields.push((name, default));
		}

		for (attribute, field) in attributes {
			if !definition.fields.iter().any(|(name, _)| *name == field) {
				return Err(DefinitionError::UnknownField { attribute, field });
			}
			if definition.attributes.contains_key(&attribute) {
				return Err(DefinitionError::DuplicateAttribute(attribute));
			}
			definition.attributes.insert(attribute, field);
		}

		Ok(definition)
	}
}

struct FieldRecord {
	value: RefCell<Value>,
	notify: Box<dyn Fn()>,
}

/// An instance's reactive fields: current values plus a callback that tells the owner about changes.
struct Fields(HashMap<String, FieldRecord>);

impl Fields {
	fn new(defaults: &[(String, Value)], notify: impl Fn() -> Box<dyn Fn()>) -> Self {
		Self(
			defaults
				.iter()
				.map(|(name, default)| {
					(
						name.clone(),
						FieldRecord {
							value: RefCell::new(default.clone()),
							notify: notify(),
						},
					)
				})
				.collect(),
		)
	}

	fn get(&self, name: &str) -> Option<Value> {
		self.0.get(name).map(|record| record.value.borrow().clone())
	}

	/// Returns whether the value changed. Notifies only on changes.
	fn set(&self, name: &str, value: Value) -> Option<bool> {
		let record = self.0.get(name)?;
		if *record.value.borrow() == value {
			return Some(false);
		}
		*record.value.borrow_mut() = value;
		(record.notify)();
		Some(true)
	}
}

/// A live component attached to a host element.
pub struct Instance {
	host: Node,
	definition: Rc<Definition>,
	fields: Fields,
	registry: Weak<Registry>,
	render_pending: Cell<bool>,
	rendered: Cell<bool>,
	/// Hosts of the instances upgraded inside this instance's shadow root.
	nested: RefCell<Vec<NodeId>>,
}

impl Debug for Instance {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("tag", &self.definition.tag)
			.field("host", &self.host)
			.field("render_pending", &self.render_pending.get())
			.field("rendered", &self.rendered.get())
			.finish_non_exhaustive()
	}
}

impl Instance {
	fn new(host: Node, definition: Rc<Definition>, registry: Weak<Registry>) -> Rc<Self> {
		Rc::new_cyclic(|this: &Weak<Self>| {
			let fields = Fields::new(&definition.fields, || {
				let this = this.clone();
				Box::new(move || {
					if let Some(this) = this.upgrade() {
						this.request_render()
					}
				})
			});
			Self {
				host,
				definition,
				fields,
				registry,
				render_pending: Cell::new(false),
				rendered: Cell::new(false),
				nested: RefCell::default(),
			}
		})
	}

	#[must_use]
	pub fn host(&self) -> &Node {
		&self.host
	}

	#[must_use]
	pub fn definition(&self) -> &Rc<Definition> {
		&self.definition
	}

	#[must_use]
	pub fn styles(&self) -> &[StyleSheet] {
		self.definition.styles()
	}

	/// The host's shadow root, once the first render happened.
	#[must_use]
	pub fn shadow_root(&self) -> Option<Node> {
		self.host.shadow_root()
	}

	/// The current value of field `name`.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<Value> {
		let value = self.fields.get(name);
		if value.is_none() {
			warn!("<{}> has no field {:?}.", self.definition.tag, name)
		}
		value
	}

	/// Writes field `name` and requests a render if the value changed. Returns whether it changed.
	pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
		match self.fields.set(name, value.into()) {
			Some(changed) => changed,
			None => {
				warn!("<{}> has no field {:?}. Ignoring the write.", self.definition.tag, name);
				false
			}
		}
	}

	/// Routes a host attribute change to its mapped field. Unmapped attributes are ignored.
	///
	/// Returns whether a field changed.
	pub fn set_attribute(&self, attribute: &str, value: Option<&str>) -> bool {
		let field = match self.definition.attribute_field(attribute) {
			Some(field) => field,
			None => return false,
		};
		let value = match value {
			Some(text) => Value::Text(text.to_owned()),
			None => self
				.definition
				.fields
				.iter()
				.find(|(name, _)| name == field)
				.map(|(_, default)| default.clone())
				.unwrap_or_default(),
		};
		trace!("Routing attribute {:?} to field {:?}.", attribute, field);
		self.set(field, value)
	}

	/// Wraps `f` into an event listener value that doesn't keep this instance alive.
	pub fn callback(self: &Rc<Self>, f: impl Fn(&Rc<Instance>, &Event) + 'static) -> Value {
		let this = Rc::downgrade(self);
		Value::callback(move |event| match this.upgrade() {
			Some(this) => f(&this, event),
			None => trace!("Ignoring {:?} event for a dropped component instance.", event.name()),
		})
	}

	#[must_use]
	pub fn is_render_pending(&self) -> bool {
		self.render_pending.get()
	}

	/// Schedules a render as microtask unless one is pending already.
	pub fn request_render(self: &Rc<Self>) {
		if self.render_pending.replace(true) {
			trace!("Render of <{}> already pending.", self.definition.tag);
			return;
		}
		let this = Rc::downgrade(self);
		queue_microtask(move || {
			if let Some(this) = this.upgrade() {
				this.render_pending.set(false);
				this.render_now()
			}
		})
	}

	/// Renders synchronously: materializes into a new shadow root the first time and diffs afterwards.
	/// Newly rendered elements with defined tags are upgraded, and the instances of removed ones are forgotten.
	#[instrument(skip(self), fields(tag = %self.definition.tag, host = %self.host.id()))]
	pub fn render_now(self: &Rc<Self>) {
		let fragment = {
			let span = trace_span!("render function");
			let _enter = span.enter();
			(self.definition.render)(self)
		};

		let shadow_root = match self.host.shadow_root() {
			Some(shadow_root) => shadow_root,
			None => match self.host.attach_shadow() {
				Ok(shadow_root) => shadow_root,
				Err(error) => return error!("Failed to attach shadow root to {:?}: {}", self.host, error),
			},
		};

		let registry = self.registry.upgrade();
		if self.rendered.replace(true) {
			registry.as_ref().map_or_else(Differ::default, |registry| registry.differ).diff(&shadow_root, fragment)
		} else {
			let materialized = materialize(fragment, true);
			attach(&shadow_root, &materialized.root);
		}

		if let Some(registry) = registry {
			registry.forget_removed(self, &shadow_root);
			let upgraded = registry.upgrade_within(&shadow_root);
			self.nested.borrow_mut().extend(upgraded.iter().map(|instance| instance.host.id()));
		}
	}
}

/// Component definitions by tag, plus the instances attached so far.
pub struct Registry {
	definitions: RefCell<HashMap<String, Rc<Definition>>>,
	instances: RefCell<HashMap<NodeId, Rc<Instance>>>,
	differ: Differ,
}

impl Debug for Registry {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("definitions", &self.definitions.borrow().keys().collect::<Vec<_>>())
			.field("instances", &self.instances.borrow().len())
			.field("differ", &self.differ)
			.finish()
	}
}

impl Registry {
	#[must_use]
	pub fn new() -> Rc<Self> {
		Self::with_differ(Differ::default())
	}

	/// Instances of this registry re-render with `differ`.
	#[must_use]
	pub fn with_differ(differ: Differ) -> Rc<Self> {
		Rc::new(Self {
			definitions: RefCell::default(),
			instances: RefCell::default(),
			differ,
		})
	}

	/// # Errors
	///
	/// [`DefinitionError::AlreadyDefined`] iff the tag is taken.
	pub fn define(&self, definition: Definition) -> Result<Rc<Definition>, DefinitionError> {
		let mut definitions = self.definitions.borrow_mut();
		if definitions.contains_key(&definition.tag) {
			return Err(DefinitionError::AlreadyDefined(definition.tag.clone()));
		}
		let definition = Rc::new(definition);
		definitions.insert(definition.tag.clone(), Rc::clone(&definition));
		trace!("Defined <{}>.", definition.tag);
		Ok(definition)
	}

	#[must_use]
	pub fn definition(&self, tag: &str) -> Option<Rc<Definition>> {
		self.definitions.borrow().get(tag.to_ascii_lowercase().as_str()).cloned()
	}

	/// Creates a detached host element for `tag` with an attached instance. Its first render is pending.
	///
	/// # Errors
	///
	/// [`DefinitionError::Undefined`] iff no component is defined for `tag`.
	pub fn create(self: &Rc<Self>, tag: &str) -> Result<Rc<Instance>, DefinitionError> {
		let definition = self.definition(tag).ok_or_else(|| DefinitionError::Undefined(tag.to_owned()))?;
		Ok(self.attach(Node::element(tag), definition))
	}

	/// Attaches instances to `root` and its descendants (not crossing shadow roots) where their tag is defined.
	///
	/// Returns the number of new instances.
	pub fn upgrade(self: &Rc<Self>, root: &Node) -> usize {
		self.upgrade_within(root).len()
	}

	#[instrument(skip(self))]
	fn upgrade_within(self: &Rc<Self>, root: &Node) -> Vec<Rc<Instance>> {
		let mut upgraded = Vec::new();
		for element in iter::once(root.clone()).chain(root.descendants()) {
			let definition = match element.tag_name().and_then(|tag| self.definition(tag)) {
				Some(definition) => definition,
				None => continue,
			};
			if self.instances.borrow().contains_key(&element.id()) {
				continue;
			}
			upgraded.push(self.attach(element, definition));
		}
		if !upgraded.is_empty() {
			trace!("Upgraded {} element(s).", upgraded.len());
		}
		upgraded
	}

	fn attach(self: &Rc<Self>, host: Node, definition: Rc<Definition>) -> Rc<Instance> {
		let instance = Instance::new(host.clone(), definition, Rc::downgrade(self));
		self.instances.borrow_mut().insert(host.id(), Rc::clone(&instance));

		for (attribute, value) in host.attributes() {
			instance.set_attribute(&attribute, Some(&value));
		}

		let weak = Rc::downgrade(&instance);
		if let Err(error) = host.set_attribute_callback(move |_, name, value| {
			if let Some(instance) = weak.upgrade() {
				instance.set_attribute(name, value);
			}
		}) {
			error!("Failed to observe attributes of {:?}: {}", host, error)
		}

		instance.request_render();
		instance
	}

	/// The instance attached to `host`, if any.
	#[must_use]
	pub fn instance(&self, host: &Node) -> Option<Rc<Instance>> {
		self.instances.borrow().get(&host.id()).cloned()
	}

	#[must_use]
	pub fn instance_count(&self) -> usize {
		self.instances.borrow().len()
	}

	/// Detaches the instance from `host` and stops routing the host's attribute changes.
	/// Instances nested in its shadow root are forgotten too.
	///
	/// A pending render still runs if the returned handle is kept alive until then.
	pub fn forget(&self, host: &Node) -> Option<Rc<Instance>> {
		self.forget_id(host.id())
	}

	fn forget_id(&self, host: NodeId) -> Option<Rc<Instance>> {
		let instance = self.instances.borrow_mut().remove(&host)?;
		instance.host.clear_attribute_callback();
		for nested in instance.nested.take() {
			self.forget_id(nested);
		}
		Some(instance)
	}

	/// Forgets the instances nested in `owner` whose hosts are no longer inside its shadow root.
	fn forget_removed(&self, owner: &Instance, shadow_root: &Node) {
		let removed: Vec<NodeId> = {
			let instances = self.instances.borrow();
			let mut nested = owner.nested.borrow_mut();
			let (kept, removed) = nested
				.drain(..)
				.partition(|id| instances.get(id).map_or(false, |instance| shadow_root.contains(&instance.host)));
			*nested = kept;
			removed
		};
		for host in removed {
			if let Some(instance) = self.forget_id(host) {
				trace!("Forgot <{}> after its host {} was removed.", instance.definition.tag, host);
			}
		}
	}
}
