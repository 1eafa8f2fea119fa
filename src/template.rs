//! The template builder: literal markup segments interleaved with [`Value`]s become one [`Fragment`].
//!
//! An expression directly after a segment ending in `=` inside a tag is a binding:
//!
//! - `@name=${callback}` attaches an event listener,
//! - `.name=${value}` assigns an element property,
//! - `?name=${bool}` makes an attribute present or absent,
//! - `name=${value}` sets an attribute to the value's text.
//!
//! Every other expression is content: scalars are escaped, nodes and fragments are spliced in through placeholders,
//! lists are flattened and [`UnsafeHtml`](crate::value::UnsafeHtml) is inserted verbatim.

use crate::{
	dom::{Callback, Node},
	fragment::{self, binding_attribute, binding_ids, BindingId, BindingTarget, Bindings, Fragment, PlaceholderId, Placeholders, PropertyBinding},
	page_content,
	parse::parse_fragment,
	value::{escape_html, Value},
};
use hashbrown::HashMap;
use tracing::{error, instrument, trace, warn};

/// Builds a [`Fragment`] from template segments and the expressions between them.
///
/// `values[i]` is placed between `strings[i]` and `strings[i + 1]`.
#[instrument(skip(strings, values), fields(segments = strings.len(), values = values.len()))]
pub fn html(strings: &[&str], values: Vec<Value>) -> Fragment {
	if values.len() + 1 != strings.len() {
		warn!(
			"Template has {} segment(s) but {} value(s); expected exactly one more segment than values.",
			strings.len(),
			values.len()
		);
	}

	let mut assembly = Assembly::default();
	let mut values = values.into_iter();
	let last = strings.len().saturating_sub(1);
	for (i, raw) in strings.iter().enumerate() {
		let segment = trim_segment(raw);
		assembly.state = assembly.state.advance(segment);
		if i == last {
			assembly.markup.push_str(segment);
			break;
		}
		let value = values.next().unwrap_or(Value::Null);
		let syntax = if assembly.state.in_attribute_position() { attribute_syntax(segment) } else { None };
		match syntax {
			Some(syntax) => assembly.push_binding(segment, syntax, value),
			None => {
				assembly.markup.push_str(segment);
				assembly.push_content(value);
			}
		}
	}
	for extra in values {
		warn!("Dropping surplus template value of type {}.", extra.type_name())
	}

	assembly.finish()
}

/// Removes whitespace between a segment's edge and an adjacent tag.
fn trim_segment(raw: &str) -> &str {
	let start_trimmed = raw.trim_start();
	let segment = if start_trimmed.starts_with('<') { start_trimmed } else { raw };
	let end_trimmed = segment.trim_end();
	if end_trimmed.ends_with('>') {
		end_trimmed
	} else {
		segment
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sigil {
	Event,
	Property,
	Flag,
	Attribute,
}

#[derive(Debug, Clone, Copy)]
struct AttributeSyntax<'a> {
	/// Where the binding's text starts in the segment.
	start: usize,
	sigil: Sigil,
	name: &'a str,
}

/// Where the markup is, lexically, at the end of a segment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TagState {
	in_tag: bool,
	quote: Option<u8>,
}

impl TagState {
	#[must_use]
	fn advance(mut self, segment: &str) -> Self {
		let bytes = segment.as_bytes();
		for (i, &byte) in bytes.iter().enumerate() {
			match self.quote {
				Some(quote) => {
					if byte == quote {
						self.quote = None
					}
				}
				None => match byte {
					b'<' if bytes.get(i + 1).map_or(false, u8::is_ascii_alphabetic) => self.in_tag = true,
					b'>' => self.in_tag = false,
					b'"' | b'\'' if self.in_tag => self.quote = Some(byte),
					_ => (),
				},
			}
		}
		self
	}

	fn in_attribute_position(self) -> bool {
		self.in_tag && self.quote.is_none()
	}
}

/// Recognizes a trailing `name=` (optionally with a sigil). Only meaningful where an attribute may start.
fn attribute_syntax(segment: &str) -> Option<AttributeSyntax<'_>> {
	let before = segment.strip_suffix('=')?;
	let start = before
		.rfind(|c: char| c.is_whitespace() || c == '"' || c == '\'')
		.map_or(0, |i| i + before[i..].chars().next().map_or(1, char::len_utf8));
	if before.rfind('<').map_or(false, |tag_start| start <= tag_start) {
		// Still part of the tag name.
		return None;
	}

	let token = &before[start..];
	let (sigil, name) = match token.chars().next() {
		Some('@') => (Sigil::Event, &token[1..]),
		Some('.') => (Sigil::Property, &token[1..]),
		Some('?') => (Sigil::Flag, &token[1..]),
		_ => (Sigil::Attribute, token),
	};
	Some(AttributeSyntax { start, sigil, name })
}

fn is_valid_name(sigil: Sigil, name: &str) -> bool {
	!name.is_empty()
		&& name.chars().all(|c| match sigil {
			Sigil::Attribute => c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'),
			_ => c.is_ascii_alphanumeric() || c == '_',
		})
}

#[derive(Default)]
struct Assembly {
	state: TagState,
	markup: String,
	placeholders: Placeholders,
	bindings: Bindings,
	events: HashMap<BindingId, (String, Callback)>,
}

impl Assembly {
	fn push_binding(&mut self, segment: &str, syntax: AttributeSyntax<'_>, value: Value) {
		let AttributeSyntax { start, sigil, name } = syntax;

		if !is_valid_name(sigil, name) {
			warn!("Invalid binding name {:?}. Keeping the raw text.", name);
			return self.push_inert(segment, &value);
		}

		let target = match (sigil, value) {
			(Sigil::Event, Value::Callback(callback)) => {
				let id = BindingId::next();
				self.events.insert(id, (name.to_owned(), callback));
				return self.push_marker(segment, start, id);
			}
			(Sigil::Event, value) => {
				warn!("Event binding @{} needs a callback but got a {} value. Keeping the raw text.", name, value.type_name());
				return self.push_inert(segment, &value);
			}

			(Sigil::Property, value) => (BindingTarget::Property(name.to_owned()), value),

			(Sigil::Flag, Value::Bool(true)) => (BindingTarget::Flag(name.to_owned()), Value::Bool(true)),
			(Sigil::Flag, Value::Bool(false)) => {
				trace!("Omitting false flag attribute {:?}.", name);
				return self.markup.push_str(&segment[..start]);
			}
			(Sigil::Flag, value) => {
				warn!("Flag binding ?{} needs a bool but got a {} value. Keeping the raw text.", name, value.type_name());
				return self.push_inert(segment, &value);
			}

			(Sigil::Attribute, Value::Null) => {
				trace!("Omitting null attribute {:?}.", name);
				return self.markup.push_str(&segment[..start]);
			}
			(Sigil::Attribute, value) if value.to_text().is_some() => (BindingTarget::Attribute(name.to_owned()), value),
			(Sigil::Attribute, value) => {
				warn!("Attribute {:?} can't hold a {} value. Keeping the raw text.", name, value.type_name());
				return self.push_inert(segment, &value);
			}
		};

		let id = BindingId::next();
		let (target, value) = target;
		self.bindings.insert(id, PropertyBinding { target, value });
		self.push_marker(segment, start, id)
	}

	fn push_marker(&mut self, segment: &str, start: usize, id: BindingId) {
		self.markup.push_str(&segment[..start]);
		self.markup.push_str(&binding_attribute(id));
	}

	/// Emits a rejected binding as plain markup, so that it ends up as an ordinary (inert) attribute.
	fn push_inert(&mut self, segment: &str, value: &Value) {
		self.markup.push_str(segment);
		self.markup.push('"');
		self.markup.push_str(&escape_html(&value.to_text().unwrap_or_default()));
		self.markup.push('"');
	}

	fn push_content(&mut self, value: Value) {
		match value {
			Value::Null | Value::Bool(false) => (),
			Value::Unsafe(html) => self.markup.push_str(html.as_str()),
			Value::Node(node) => self.push_placeholder(node),
			Value::Fragment(fragment) => {
				let (root, placeholders, bindings) = fragment.into_parts();
				fragment::merge(&mut self.placeholders, placeholders, "placeholder");
				fragment::merge(&mut self.bindings, bindings, "binding");
				self.push_placeholder(root)
			}
			Value::List(items) => {
				for item in items {
					self.push_content(item)
				}
			}
			Value::Callback(_) | Value::Object(_) => {
				warn!("Can't render a {} value as content. Rendering nothing.", value.type_name())
			}
			scalar => {
				let text = scalar.to_text().unwrap_or_default();
				trace!("Escaping text {:?}.", page_content(&text));
				self.markup.push_str(&escape_html(&text))
			}
		}
	}

	fn push_placeholder(&mut self, node: Node) {
		let id = PlaceholderId::next();
		if self.placeholders.insert(id, node).is_some() {
			warn!("Duplicate placeholder identifier {}. Keeping the later value.", id)
		}
		self.markup.push_str(&fragment::placeholder_markup(id))
	}

	fn finish(mut self) -> Fragment {
		let root = parse_fragment(&self.markup);

		if !self.events.is_empty() {
			for element in root.find_all(fragment::has_binding_markers) {
				for id in binding_ids(&element) {
					if let Some((name, callback)) = self.events.remove(&id) {
						if let Err(error) = element.remove_attribute(&binding_attribute(id)) {
							error!("Failed to strip event binding marker: {}", error)
						}
						if let Err(error) = element.add_event_listener(&name, callback) {
							error!("Failed to bind event listener: {}", error)
						}
					}
				}
			}
		}
		for (id, (name, _)) in self.events {
			warn!("Event binding {} (@{}) lost its marker element, likely due to malformed markup.", id, name)
		}

		Fragment::from_parts(root, self.placeholders, self.bindings)
	}
}

/// Incremental construction of a template, as used by [`html!`](crate::html!).
#[derive(Debug)]
pub struct TemplateBuilder {
	strings: Vec<String>,
	values: Vec<Value>,
}

impl Default for TemplateBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl TemplateBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self {
			strings: vec![String::new()],
			values: Vec::new(),
		}
	}

	/// Appends literal markup to the current segment.
	pub fn push_str(&mut self, markup: &str) -> &mut Self {
		if let Some(segment) = self.strings.last_mut() {
			segment.push_str(markup)
		}
		self
	}

	/// Ends the current segment with an expression.
	pub fn push_value(&mut self, value: impl Into<Value>) -> &mut Self {
		self.values.push(value.into());
		self.strings.push(String::new());
		self
	}

	#[must_use]
	pub fn build(self) -> Fragment {
		let strings: Vec<&str> = self.strings.iter().map(String::as_str).collect();
		html(&strings, self.values)
	}
}

/// Builds a [`Fragment`] from string literals and `{ expression }` groups.
///
/// ```
/// use vui_dom::html;
///
/// let name = "<world>";
/// let fragment = html!("<p class=" {"greeting"} ">Hello " {name} "!</p>");
/// assert_eq!(fragment.into_node().inner_html(), r#"<p class="greeting">Hello &lt;world&gt;!</p>"#);
/// ```
#[macro_export]
macro_rules! html {
	($($part:tt)*) => {{
		#[allow(unused_mut)]
		let mut template = $crate::template::TemplateBuilder::new();
		$crate::__html_parts!(template; $($part)*);
		template.build()
	}};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __html_parts {
	($template:ident;) => {};
	($template:ident; $literal:literal $($rest:tt)*) => {
		$template.push_str($literal);
		$crate::__html_parts!($template; $($rest)*);
	};
	($template:ident; { $value:expr } $($rest:tt)*) => {
		$template.push_value($value);
		$crate::__html_parts!($template; $($rest)*);
	};
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trims_whitespace_next_to_tags_only() {
		assert_eq!(trim_segment("\n    <div>\n  "), "<div>");
		assert_eq!(trim_segment(" a <b> c "), " a <b> c ");
		assert_eq!(trim_segment("</b> "), "</b>");
	}

	#[test]
	fn recognizes_bindings() {
		let event = attribute_syntax("<button @click=").unwrap();
		assert_eq!((event.sigil, event.name, event.start), (Sigil::Event, "click", 8));
		assert_eq!(attribute_syntax(r#"<input type="checkbox" ?checked="#).unwrap().sigil, Sigil::Flag);
		assert_eq!(attribute_syntax("<x-list .items=").unwrap().name, "items");
		assert_eq!(attribute_syntax("<a href=").unwrap().sigil, Sigil::Attribute);
	}

	#[test]
	fn tracks_tag_state_across_segments() {
		let state = TagState::default().advance("<button");
		assert!(state.in_attribute_position());
		let state = state.advance(r#" title="a > b" .value="#);
		assert!(state.in_attribute_position());
		let state = state.advance(r#" class=""#);
		assert!(!state.in_attribute_position());
		let state = state.advance(r#"">1 + 1 ="#);
		assert_eq!(state, TagState::default());
	}

	#[test]
	fn tag_names_are_not_bindings() {
		assert!(attribute_syntax("<div=").is_none());
		assert_eq!(attribute_syntax(" @click=").unwrap().start, 1);
	}
}
