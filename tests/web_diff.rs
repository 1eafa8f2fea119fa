#![cfg(target_arch = "wasm32")]

use js_sys::Promise;
use vui_dom::{
	component::{Definition, Registry},
	diff, html,
	schedule::pending_microtasks,
	Node, Value,
};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Element};

wasm_bindgen_test_configure!(run_in_browser);


fn mount(html: &str) -> Element {
	let document = window().unwrap().document().unwrap();
	let container = document.create_element("div").unwrap();
	container.set_inner_html(html);
	document.body().unwrap().append_child(&container).unwrap();
	container
}

/// Resolves after the browser has run every microtask queued so far.
async fn next_turn() {
	let promise = Promise::new(&mut |resolve, _| {
		window().unwrap().set_timeout_with_callback(&resolve).unwrap();
	});
	JsFuture::from(promise).await.unwrap();
}

#[wasm_bindgen_test]
fn page_content_is_diffed_in_place() {
	logging_::init();

	let container = mount(r#"<ul><li key="a">a</li><li key="b">b</li></ul><!--note-->"#);
	let list = Node::from(container.first_child().unwrap());
	let b = list.child_at(1).unwrap();
	let raw_b = b.raw().clone();

	let items: Vec<Value> = ["b", "c"].iter().map(|key| html!("<li key=" {*key} ">" {*key} "</li>").into()).collect();
	diff(&list, html!({ items }));
	assert_eq!(list.child_at(0), Some(b));
	assert_eq!(list.first_child().unwrap().raw(), &raw_b);
	assert_eq!(container.inner_html(), r#"<ul><li key="b">b</li><li key="c">c</li></ul><!--note-->"#);

	// Wrapping the same browser node again yields the same identity.
	assert_eq!(Node::from(container.first_child().unwrap()), list);
	container.remove();
}

#[wasm_bindgen_test]
fn shadow_roots_are_open() {
	logging_::init();

	let container = mount("<x-host></x-host>");
	let host = Node::from(container.first_child().unwrap());
	let shadow_root = host.attach_shadow().unwrap();
	diff(&shadow_root, html!("<p>" {"inside"} "</p>"));

	let raw_host: &Element = host.raw().unchecked_ref();
	assert_eq!(raw_host.shadow_root().unwrap().inner_html(), "<p>inside</p>");
	assert_eq!(shadow_root.inner_html(), "<p>inside</p>");
	container.remove();
}

#[wasm_bindgen_test]
async fn components_render_at_the_end_of_the_turn() {
	logging_::init();

	let registry = Registry::new();
	registry
		.define(
			Definition::builder("x-auto")
				.field("n", 1)
				.render(|this| html!("<b>" {this.get("n")} "</b>"))
				.build()
				.unwrap(),
		)
		.unwrap();

	let instance = registry.create("x-auto").unwrap();
	assert!(instance.shadow_root().is_none());
	next_turn().await;
	assert_eq!(instance.shadow_root().unwrap().inner_html(), "<b>1</b>");

	assert!(instance.set("n", 2));
	assert!(instance.set("n", 3));
	assert_eq!(pending_microtasks(), 1);
	next_turn().await;
	assert_eq!(pending_microtasks(), 0);
	assert_eq!(instance.shadow_root().unwrap().inner_html(), "<b>3</b>");
}
