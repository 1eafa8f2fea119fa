use vui_dom::{diff, fragment::PLACEHOLDER_TAG, html, unsafe_html, Fragment, Node, Value};

#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

use logging_::live_mutations;

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn comment() {
	test_create_diff_identical_remove(|| html!("<!--Hello vui-dom comment!-->"), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn text() {
	test_create_diff_identical_remove(|| html!({ "Hello vui-dom text!" }), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn multi() {
	test_create_diff_identical_remove(|| html!("<b>Hello</b>" {" multiple "} "<i>nodes!</i>"), 3);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn keyed() {
	test_create_diff_identical_remove(
		|| {
			let items: Vec<Value> = ["a", "b", "c"].iter().map(|key| html!("<li key=" {*key} ">" {*key} "</li>").into()).collect();
			html!({ items })
		},
		3,
	);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn nested() {
	test_create_diff_identical_remove(
		|| {
			let inner = html!(r#"<span class="inner">"# {unsafe_html("<em>raw</em>")} "</span>");
			html!("<div title=" {"outer"} " .count=" {3} ">" {inner} "</div>")
		},
		1,
	);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn element_node_value() {
	test_create_diff_identical_remove(
		|| {
			let node = Node::element("hr");
			html!("<p>" {node} "</p>")
		},
		1,
	);
}

fn test_create_diff_identical_remove(template: impl Fn() -> Fragment, len: usize) {
	logging_::init();

	let host = Node::element("main");

	diff(&host, template());
	assert_eq!(host.child_count(), len);
	assert!(host.find(|node| node.tag_name() == Some(PLACEHOLDER_TAG)).is_none());
	assert!(host.find(vui_dom::fragment::has_binding_markers).is_none());

	let children = host.children();
	let descendants = host.descendants();
	let html = host.inner_html();

	let mutations = live_mutations(&host, || diff(&host, template()));
	assert!(mutations.is_empty(), "{:?}", mutations);
	assert_eq!(host.children(), children);
	assert_eq!(host.descendants(), descendants);
	assert_eq!(host.inner_html(), html);

	diff(&host, html!());
	assert_eq!(host.child_count(), 0);
	assert_eq!(host.inner_html(), "");
}
