//! Template markup parsing.
//!
//! In the browser, markup is parsed by an inert `<template>` element, so fragments come out exactly as the page would build them.
//! Natively, a lenient tokenizer builds the in-memory tree instead.
//! That isn't the HTML5 tree construction algorithm, only enough of it to turn template markup into a node tree:
//! there are no implied end tags or foster parenting, and `/>` closes any element.

use crate::dom::Node;
#[cfg(not(target_arch = "wasm32"))]
use {
	crate::dom::attach,
	tracing::{error, warn},
};
#[cfg(target_arch = "wasm32")]
use {tracing::error, wasm_bindgen::JsCast, web_sys::HtmlTemplateElement};

#[cfg(not(target_arch = "wasm32"))]
const COMMENT_START: &str = "<!--";
#[cfg(not(target_arch = "wasm32"))]
const COMMENT_END: &str = "-->";

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	StartTag { name: String, attributes: Vec<(String, String)>, self_closing: bool },
	EndTag(String),
	Text(String),
	Comment(String),
}

#[must_use]
pub fn is_void_element(name: &str) -> bool {
	matches!(
		name,
		"area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "param" | "source" | "track" | "wbr"
	)
}

/// Elements whose content is never escaped or parsed as markup.
#[must_use]
pub fn is_raw_text_element(name: &str) -> bool {
	matches!(name, "script" | "style")
}

#[cfg(not(target_arch = "wasm32"))]
fn is_escapable_raw_text_element(name: &str) -> bool {
	matches!(name, "textarea" | "title")
}

/// Parses `html` into a fresh fragment node.
#[cfg(target_arch = "wasm32")]
#[must_use]
pub fn parse_fragment(html: &str) -> Node {
	let template = match Node::element("template").raw().dyn_ref::<HtmlTemplateElement>() {
		Some(template) => template.clone(),
		None => {
			error!("Failed to create a <template> element. Rendering nothing.");
			return Node::fragment();
		}
	};
	template.set_inner_html(html);
	Node::from(web_sys::Node::from(template.content()))
}

/// Parses `html` into a fresh fragment node.
#[cfg(not(target_arch = "wasm32"))]
#[must_use]
pub fn parse_fragment(html: &str) -> Node {
	let root = Node::fragment();
	let mut open: Vec<Node> = vec![root.clone()];

	for token in tokenize(html) {
		let parent = match open.last() {
			Some(parent) => parent.clone(),
			None => root.clone(),
		};
		match token {
			Token::Text(text) => {
				if text.is_empty() {
					continue;
				}
				// Adjacent text tokens (e.g. around a stray `<`) become one node.
				match parent.children().last() {
					Some(last) if last.is_text() => {
						let mut data = last.data().unwrap_or_default();
						data.push_str(&text);
						if let Err(error) = last.set_data(&data) {
							error!("Failed to extend text node: {}", error)
						}
					}
					_ => attach(&parent, &Node::text(text)),
				}
			}

			Token::Comment(comment) => attach(&parent, &Node::comment(comment)),

			Token::StartTag { name, attributes, self_closing } => {
				let element = Node::element(&name);
				for (name, value) in attributes {
					if element.has_attribute(&name) {
						warn!("Ignoring duplicate attribute {:?} on <{}>.", name, element.tag_name().unwrap_or_default());
						continue;
					}
					if let Err(error) = element.set_attribute(&name, &value) {
						error!("Failed to set parsed attribute: {}", error)
					}
				}
				attach(&parent, &element);
				if !self_closing && !is_void_element(&name) {
					open.push(element)
				}
			}

			Token::EndTag(name) => match open.iter().skip(1).rposition(|node| node.tag_name() == Some(name.as_str())) {
				Some(index) => open.truncate(index + 1),
				None => warn!("Ignoring unmatched end tag </{}>.", name),
			},
		}
	}

	root
}

#[cfg(not(target_arch = "wasm32"))]
fn is_name_byte(byte: u8) -> bool {
	!byte.is_ascii_whitespace() && !matches!(byte, b'/' | b'>' | b'=' | b'"' | b'\'' | b'<')
}

#[cfg(not(target_arch = "wasm32"))]
fn starts_with_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
	haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[cfg(not(target_arch = "wasm32"))]
/// Finds `</name` at or after `from`, case-insensitively.
fn find_close_tag(input: &str, from: usize, name: &str) -> Option<usize> {
	let bytes = input.as_bytes();
	let mut i = from;
	while i < bytes.len() {
		let relative = bytes[i..].iter().position(|&b| b == b'<')?;
		i += relative;
		if bytes.get(i + 1) == Some(&b'/') && starts_with_ignore_ascii_case(&bytes[i + 2..], name.as_bytes()) {
			return Some(i);
		}
		i += 1;
	}
	None
}

#[cfg(not(target_arch = "wasm32"))]
// Slice endpoints are only ever placed at ASCII structural bytes, so they are always char boundaries.
#[allow(clippy::too_many_lines)]
fn tokenize(input: &str) -> Vec<Token> {
	let bytes = input.as_bytes();
	let mut tokens = Vec::new();
	let mut i = 0;

	while i < bytes.len() {
		if bytes[i] != b'<' {
			let start = i;
			while i < bytes.len() && bytes[i] != b'<' {
				i += 1;
			}
			tokens.push(Token::Text(decode_entities(&input[start..i])));
			continue;
		}

		if input[i..].starts_with(COMMENT_START) {
			let start = i + COMMENT_START.len();
			match input[start..].find(COMMENT_END) {
				Some(end) => {
					tokens.push(Token::Comment(input[start..start + end].to_owned()));
					i = start + end + COMMENT_END.len();
				}
				None => {
					warn!("Unterminated comment.");
					tokens.push(Token::Comment(input[start..].to_owned()));
					i = bytes.len();
				}
			}
			continue;
		}

		// Doctypes, processing instructions and CDATA aren't meaningful in fragments.
		if matches!(bytes.get(i + 1), Some(b'!' | b'?')) {
			i = match input[i..].find('>') {
				Some(end) => i + end + 1,
				None => bytes.len(),
			};
			continue;
		}

		if bytes.get(i + 1) == Some(&b'/') {
			let start = i + 2;
			let mut end = start;
			while end < bytes.len() && is_name_byte(bytes[end]) {
				end += 1;
			}
			let name = input[start..end].to_ascii_lowercase();
			i = match input[end..].find('>') {
				Some(close) => end + close + 1,
				None => bytes.len(),
			};
			if !name.is_empty() {
				tokens.push(Token::EndTag(name))
			}
			continue;
		}

		if !bytes.get(i + 1).map_or(false, u8::is_ascii_alphabetic) {
			tokens.push(Token::Text("<".to_owned()));
			i += 1;
			continue;
		}

		let start = i + 1;
		let mut j = start;
		while j < bytes.len() && is_name_byte(bytes[j]) {
			j += 1;
		}
		let name = input[start..j].to_ascii_lowercase();

		let mut attributes = Vec::new();
		let mut self_closing = false;
		loop {
			while j < bytes.len() && bytes[j].is_ascii_whitespace() {
				j += 1;
			}
			match bytes.get(j) {
				None => break,
				Some(b'>') => {
					j += 1;
					break;
				}
				Some(b'/') => {
					if bytes.get(j + 1) == Some(&b'>') {
						self_closing = true;
						j += 2;
						break;
					}
					j += 1;
					continue;
				}
				Some(_) => (),
			}

			let name_start = j;
			while j < bytes.len() && is_name_byte(bytes[j]) {
				j += 1;
			}
			if j == name_start {
				// Stray `=` or quote.
				j += 1;
				continue;
			}
			let attribute_name = input[name_start..j].to_ascii_lowercase();

			let mut value_end = j;
			while value_end < bytes.len() && bytes[value_end].is_ascii_whitespace() {
				value_end += 1;
			}
			if bytes.get(value_end) != Some(&b'=') {
				attributes.push((attribute_name, String::new()));
				continue;
			}
			j = value_end + 1;
			while j < bytes.len() && bytes[j].is_ascii_whitespace() {
				j += 1;
			}

			let value = match bytes.get(j) {
				Some(&quote @ (b'"' | b'\'')) => {
					let value_start = j + 1;
					let value_end = bytes[value_start..]
						.iter()
						.position(|&b| b == quote)
						.map_or(bytes.len(), |end| value_start + end);
					j = (value_end + 1).min(bytes.len());
					&input[value_start..value_end]
				}
				_ => {
					let value_start = j;
					while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
						j += 1;
					}
					&input[value_start..j]
				}
			};
			attributes.push((attribute_name, decode_entities(value)));
		}
		i = j;

		let raw = is_raw_text_element(&name);
		let escapable = is_escapable_raw_text_element(&name);
		tokens.push(Token::StartTag {
			name: name.clone(),
			attributes,
			self_closing,
		});

		if (raw || escapable) && !self_closing {
			let end = find_close_tag(input, i, &name).unwrap_or(bytes.len());
			let text = &input[i..end];
			tokens.push(Token::Text(if raw { text.to_owned() } else { decode_entities(text) }));
			i = end;
		}
	}

	tokens
}

#[allow(clippy::non_ascii_literal)]
fn named_entity(name: &str) -> Option<char> {
	Some(match name {
		"amp" => '&',
		"lt" => '<',
		"gt" => '>',
		"quot" => '"',
		"apos" => '\'',
		"nbsp" => '\u{a0}',
		"copy" => '©',
		"reg" => '®',
		"hellip" => '…',
		"mdash" => '—',
		"ndash" => '–',
		"laquo" => '«',
		"raquo" => '»',
		"times" => '×',
		_ => return None,
	})
}

/// Decodes character references. Unknown or malformed references are kept verbatim.
#[must_use]
pub fn decode_entities(text: &str) -> String {
	if !text.contains('&') {
		return text.to_owned();
	}

	let mut decoded = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(ampersand) = rest.find('&') {
		decoded.push_str(&rest[..ampersand]);
		rest = &rest[ampersand..];

		let reference = rest[1..]
			.find(';')
			.filter(|&end| end > 0 && end <= 32)
			.and_then(|end| {
				let name = &rest[1..=end];
				let c = match name.strip_prefix('#') {
					Some(number) => match number.strip_prefix(|c: char| c == 'x' || c == 'X') {
						Some(hex) => u32::from_str_radix(hex, 16).ok(),
						None => number.parse().ok(),
					}
					.and_then(char::from_u32),
					None => named_entity(name),
				}?;
				Some((c, end + 2))
			});

		match reference {
			Some((c, length)) => {
				decoded.push(c);
				rest = &rest[length..];
			}
			None => {
				decoded.push('&');
				rest = &rest[1..];
			}
		}
	}
	decoded.push_str(rest);
	decoded
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
	use super::*;

	#[test]
	fn nested_elements_and_attributes() {
		let root = parse_fragment(r#"<div class="a b" id=x hidden><span>hi</span><br>there</div>"#);
		let div = root.first_child().unwrap();
		assert_eq!(div.tag_name(), Some("div"));
		assert_eq!(div.attribute("class").as_deref(), Some("a b"));
		assert_eq!(div.attribute("id").as_deref(), Some("x"));
		assert_eq!(div.attribute("hidden").as_deref(), Some(""));
		assert_eq!(div.child_count(), 3);
		assert_eq!(div.text_content(), "hithere");
	}

	#[test]
	fn entities() {
		assert_eq!(decode_entities("&lt;b&gt; &amp;&#65;&#x42; &bogus; & x"), "<b> &AB &bogus; & x");
	}

	#[test]
	fn raw_text_is_not_parsed() {
		let root = parse_fragment("<style>a > b { color: red }</style><p>x</p>");
		assert_eq!(root.child_count(), 2);
		assert_eq!(root.first_child().unwrap().text_content(), "a > b { color: red }");
	}

	#[test]
	fn unmatched_end_tags_are_ignored() {
		let root = parse_fragment("<p>a</span>b</p>c");
		assert_eq!(root.inner_html(), "<p>ab</p>c");
	}

	#[test]
	fn comments_and_self_closing() {
		let root = parse_fragment("<!-- note --><x-item/><b>bold</b>");
		assert_eq!(root.child_count(), 3);
		assert_eq!(root.child_at(0).unwrap().data().as_deref(), Some(" note "));
		assert_eq!(root.child_at(1).unwrap().child_count(), 0);
	}

	#[test]
	fn stray_angle_bracket_is_text() {
		let root = parse_fragment("1 < 2");
		assert_eq!(root.child_count(), 1);
		assert_eq!(root.text_content(), "1 < 2");
	}
}
