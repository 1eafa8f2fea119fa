//! Shared, compiled style sheets.
//!
//! [`css`] compiles each distinct text once per thread, so identical style blocks used by many component instances share one [`StyleSheet`].

use crate::rc_hash_map::RcHashMap;
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{instrument, trace, warn};

/// One rule: a selector (or at-rule prelude) with its declarations and nested rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
	pub selector: String,
	pub declarations: Vec<(String, String)>,
	pub nested: Vec<CssRule>,
}

struct Compiled {
	text: String,
	rules: Vec<CssRule>,
}

/// A handle to a compiled style sheet. Clones share the compilation.
#[derive(Clone)]
pub struct StyleSheet(Rc<Compiled>);

impl StyleSheet {
	/// The exact source text.
	#[must_use]
	pub fn text(&self) -> &str {
		&self.0.text
	}

	#[must_use]
	pub fn rules(&self) -> &[CssRule] {
		&self.0.rules
	}

	/// Whether both handles share one compilation.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl Debug for StyleSheet {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("StyleSheet")
			.field("text", &crate::page_content(&self.0.text))
			.field("rules", &self.0.rules.len())
			.finish()
	}
}

thread_local! {
	static CACHE: RefCell<RcHashMap<String, u32, StyleSheet>> = RefCell::new(RcHashMap::new());
}

/// Returns the cached compilation of `text`, compiling it on first use.
///
/// Each call takes a reference that can be given back with [`release`].
#[must_use]
#[instrument(skip(text), fields(text = crate::page_content(text)))]
pub fn css(text: &str) -> StyleSheet {
	CACHE.with(|cache| {
		let mut cache = cache.borrow_mut();
		match cache.increment_or_insert_with(text.to_owned(), || {
			trace!("Compiling new style sheet.");
			compile(text)
		}) {
			Ok(sheet) => sheet.clone(),
			Err(error) => {
				warn!("Style sheet {}. Returning an uncached compilation.", error);
				compile(text)
			}
		}
	})
}

/// Gives back a reference taken by [`css`]. Unused sheets stay cached until [`collect_unused`].
pub fn release(sheet: &StyleSheet) {
	// `try_with`, since definitions holding sheets may be dropped during thread shutdown.
	let released = CACHE.try_with(|cache| match cache.borrow_mut().weak_decrement(sheet.text()) {
		Ok(Some(_)) => (),
		Ok(None) => warn!("Released a style sheet that isn't cached."),
		Err(_) => warn!("Released a style sheet more often than it was requested."),
	});
	if released.is_err() {
		trace!("Style sheet cache is already gone.");
	}
}

/// Evicts cached sheets without references and returns how many were evicted.
pub fn collect_unused() -> usize {
	CACHE.with(|cache| {
		let mut cache = cache.borrow_mut();
		let evicted = cache.drain_weak().count();
		trace!("Evicted {} style sheet(s), {} remain.", evicted, cache.len());
		evicted
	})
}

/// The number of cached sheets, including unreferenced ones.
#[must_use]
pub fn cached_count() -> usize {
	CACHE.with(|cache| cache.borrow().len())
}

fn compile(text: &str) -> StyleSheet {
	let source = strip_comments(text);
	let mut pos = 0;
	let (declarations, rules) = parse_block(&source, &mut pos, true);
	if !declarations.is_empty() {
		warn!("Ignoring {} declaration(s) outside of any rule.", declarations.len())
	}
	StyleSheet(Rc::new(Compiled { text: text.to_owned(), rules }))
}

fn strip_comments(text: &str) -> String {
	let mut stripped = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(start) = rest.find("/*") {
		stripped.push_str(&rest[..start]);
		rest = match rest[start + 2..].find("*/") {
			Some(end) => &rest[start + 2 + end + 2..],
			None => "",
		};
	}
	stripped.push_str(rest);
	stripped
}

/// Scans up to the next structural `{`, `;` or `}` outside of strings and parentheses.
fn scan(source: &str, pos: &mut usize) -> (String, Option<u8>) {
	let bytes = source.as_bytes();
	let start = *pos;
	let mut depth = 0_usize;
	let mut quote = None;
	while *pos < bytes.len() {
		let byte = bytes[*pos];
		match (quote, byte) {
			(Some(_), b'\\') => *pos += 1,
			(Some(q), _) if byte == q => quote = None,
			(Some(_), _) => (),
			(None, b'"' | b'\'') => quote = Some(byte),
			(None, b'(') => depth += 1,
			(None, b')') => depth = depth.saturating_sub(1),
			(None, b'{' | b';' | b'}') if depth == 0 => {
				let chunk = source[start..*pos].trim().to_owned();
				*pos += 1;
				return (chunk, Some(byte));
			}
			(None, _) => (),
		}
		*pos += 1;
	}
	*pos = bytes.len();
	(source[start..].trim().to_owned(), None)
}

fn push_declaration(chunk: &str, declarations: &mut Vec<(String, String)>) {
	if chunk.is_empty() {
		return;
	}
	match chunk.split_once(':') {
		Some((name, value)) if !name.trim().is_empty() => declarations.push((name.trim().to_owned(), value.trim().to_owned())),
		_ => warn!("Ignoring malformed declaration {:?}.", crate::page_content(chunk)),
	}
}

fn parse_block(source: &str, pos: &mut usize, top_level: bool) -> (Vec<(String, String)>, Vec<CssRule>) {
	let mut declarations = Vec::new();
	let mut rules = Vec::new();
	loop {
		let (chunk, delimiter) = scan(source, pos);
		match delimiter {
			Some(b'{') => {
				let (declarations, nested) = parse_block(source, pos, false);
				rules.push(CssRule {
					selector: chunk,
					declarations,
					nested,
				});
			}
			Some(b';') => {
				if chunk.starts_with('@') {
					// Statement at-rules like `@import` have no block.
					rules.push(CssRule {
						selector: chunk,
						declarations: Vec::new(),
						nested: Vec::new(),
					})
				} else {
					push_declaration(&chunk, &mut declarations)
				}
			}
			Some(_) if top_level => {
				push_declaration(&chunk, &mut declarations);
				warn!("Ignoring unmatched `}}` in style sheet.");
			}
			Some(_) => {
				push_declaration(&chunk, &mut declarations);
				return (declarations, rules);
			}
			None => {
				push_declaration(&chunk, &mut declarations);
				if !top_level {
					warn!("Unterminated block in style sheet.");
				}
				return (declarations, rules);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn compiles_rules_and_nesting() {
		let sheet = compile(
			r#"
			/* host */
			:host { display: inline-flex; }
			.option.selected { background-color: darkblue; color: white }
			@media (min-width: 10px) { div { content: "a;b" } }
			"#,
		);
		let rules = sheet.rules();
		assert_eq!(rules.len(), 3);
		assert_eq!(rules[0].selector, ":host");
		assert_eq!(rules[0].declarations, [("display".to_owned(), "inline-flex".to_owned())]);
		assert_eq!(rules[1].declarations.len(), 2);
		assert_eq!(rules[2].selector, "@media (min-width: 10px)");
		assert_eq!(rules[2].nested[0].declarations, [("content".to_owned(), r#""a;b""#.to_owned())]);
	}
}
