#![doc(html_root_url = "https://docs.rs/vui-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A tagged-template HTML builder and a keyed, in-place tree reconciler.
//!
//! Templates ([`html!`], [`template::html`]) produce a [`Fragment`]: parsed markup in which rich values are represented by markers.
//! A fragment is either [materialized](`materialize::materialize`) for the first paint or [diffed](`diff::diff`) against a live subtree,
//! which keeps live nodes wherever their position (or `key` attribute) and tag still match.
//!
//! [`component`] builds a small reactive component layer on top of both.
//!
//! In the browser, the live tree *is* the page's DOM: wrap an existing `web_sys::Node` with `Node::from` and diff into it.
//! Natively, [`Node`] is an in-memory tree with the same interface. The tests run against both.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

#[cfg(target_arch = "wasm32")]
pub mod closure_map;
pub mod component;
pub mod diff;
pub mod dom;
pub mod fragment;
pub mod materialize;
pub mod parse;
pub mod rc_hash_map;
pub mod schedule;
pub mod style;
pub mod template;
pub mod value;

pub use diff::{diff, Differ};
pub use dom::Node;
pub use fragment::Fragment;
pub use materialize::materialize;
pub use style::css;
pub use value::{unsafe_html, Value};

/// Page content as it may appear in log messages, depending on the `"dangerous-logging"` feature.
#[allow(clippy::non_ascii_literal)]
#[must_use]
pub(crate) fn page_content(text: &str) -> &str {
	if cfg!(feature = "dangerous-logging") {
		text
	} else {
		"…"
	}
}
