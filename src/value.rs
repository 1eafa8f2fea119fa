//! Template expression values.

use crate::{
	dom::{Callback, Event, Node},
	fragment::Fragment,
};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;

/// Markup that is inserted into a template without escaping.
///
/// Only create this from trusted strings, see [`unsafe_html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeHtml(String);
impl UnsafeHtml {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

/// Opts `html` out of escaping when used in a text position of a template.
#[must_use]
pub fn unsafe_html(html: impl Into<String>) -> UnsafeHtml {
	UnsafeHtml(html.into())
}

#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Number(f64),
	Text(String),
	Node(Node),
	Fragment(Fragment),
	List(Vec<Value>),
	Unsafe(UnsafeHtml),
	Callback(Callback),
	Object(Rc<dyn Any>),
}

impl Value {
	pub fn callback(f: impl Fn(&Event) + 'static) -> Self {
		Self::Callback(Callback::new(f))
	}

	pub fn object<T: Any>(object: T) -> Self {
		Self::Object(Rc::new(object))
	}

	#[must_use]
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Number(_) => "number",
			Value::Text(_) => "text",
			Value::Node(_) => "node",
			Value::Fragment(_) => "fragment",
			Value::List(_) => "list",
			Value::Unsafe(_) => "unsafe HTML",
			Value::Callback(_) => "callback",
			Value::Object(_) => "object",
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			Value::Bool(b) => Some(b),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Value::Number(n) => Some(n),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Text(text) => Some(text),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_callback(&self) -> Option<&Callback> {
		match self {
			Value::Callback(callback) => Some(callback),
			_ => None,
		}
	}

	#[must_use]
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match self {
			Value::Object(object) => object.downcast_ref(),
			_ => None,
		}
	}

	/// The plain-text rendering of scalar values. [`None`] for everything that isn't a scalar.
	#[must_use]
	pub fn to_text(&self) -> Option<String> {
		match self {
			Value::Null => Some(String::new()),
			Value::Bool(b) => Some(b.to_string()),
			Value::Number(n) => Some(format_number(*n)),
			Value::Text(text) => Some(text.clone()),
			_ => None,
		}
	}
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
	if n.is_nan() {
		"NaN".to_owned()
	} else if n.is_infinite() {
		(if n > 0.0 { "Infinity" } else { "-Infinity" }).to_owned()
	} else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
		(n as i64).to_string()
	} else {
		n.to_string()
	}
}

/// Escapes text for inclusion in markup, in text or quoted attribute positions.
#[must_use]
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			c => escaped.push(c),
		}
	}
	escaped
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			// NaN equals itself here, so that writing it again is no change.
			#[allow(clippy::float_cmp)]
			(Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits() || a == b,
			(Value::Text(a), Value::Text(b)) => a == b,
			(Value::Node(a), Value::Node(b)) => a == b,
			(Value::Fragment(a), Value::Fragment(b)) => a.root() == b.root(),
			(Value::List(a), Value::List(b)) => a == b,
			(Value::Unsafe(a), Value::Unsafe(b)) => a == b,
			(Value::Callback(a), Value::Callback(b)) => a.ptr_eq(b),
			(Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("Null"),
			Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
			Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
			Value::Text(text) => f.debug_tuple("Text").field(&crate::page_content(text)).finish(),
			Value::Node(node) => f.debug_tuple("Node").field(node).finish(),
			Value::Fragment(fragment) => f.debug_tuple("Fragment").field(fragment.root()).finish(),
			Value::List(list) => f.debug_tuple("List").field(list).finish(),
			Value::Unsafe(html) => f.debug_tuple("Unsafe").field(&crate::page_content(html.as_str())).finish(),
			Value::Callback(callback) => callback.fmt(f),
			Value::Object(object) => write!(f, "Object({:p})", Rc::as_ptr(object).cast::<()>()),
		}
	}
}

macro_rules! from_number {
	($($t:ty),*$(,)?) => {$(
		impl From<$t> for Value {
			#[allow(clippy::cast_lossless, clippy::cast_precision_loss, clippy::unnecessary_cast)]
			fn from(n: $t) -> Self {
				Value::Number(n as f64)
			}
		}
	)*};
}
from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<()> for Value {
	fn from((): ()) -> Self {
		Value::Null
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Value::Text(text.to_owned())
	}
}

impl From<String> for Value {
	fn from(text: String) -> Self {
		Value::Text(text)
	}
}

impl From<&String> for Value {
	fn from(text: &String) -> Self {
		Value::Text(text.clone())
	}
}

impl From<Node> for Value {
	fn from(node: Node) -> Self {
		Value::Node(node)
	}
}

impl From<&Node> for Value {
	fn from(node: &Node) -> Self {
		Value::Node(node.clone())
	}
}

impl From<Fragment> for Value {
	fn from(fragment: Fragment) -> Self {
		Value::Fragment(fragment)
	}
}

impl From<UnsafeHtml> for Value {
	fn from(html: UnsafeHtml) -> Self {
		Value::Unsafe(html)
	}
}

impl From<Callback> for Value {
	fn from(callback: Callback) -> Self {
		Value::Callback(callback)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(option: Option<T>) -> Self {
		option.map_or(Value::Null, Into::into)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Value::List(items.into_iter().map(Into::into).collect())
	}
}
