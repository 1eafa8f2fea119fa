use std::{cell::Cell, rc::Rc};
use vui_dom::{
	fragment::{binding_ids, BindingTarget, PLACEHOLDER_TAG},
	html,
	template::{self, TemplateBuilder},
	unsafe_html, Node, Value,
};

#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);


#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn text_is_escaped() {
	logging_::init();

	let root = html!("<p>" {"<script>alert(1)</script>"} "</p>").into_node();
	assert_eq!(root.inner_html(), "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
	assert!(root.elements_by_tag_name("script").is_empty());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn unsafe_html_is_parsed() {
	logging_::init();

	let root = html!("<p>" {unsafe_html("<b>hi</b>")} "</p>").into_node();
	assert_eq!(root.inner_html(), "<p><b>hi</b></p>");
	assert_eq!(root.elements_by_tag_name("b").len(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn flags_toggle_attribute_presence() {
	logging_::init();

	let button = |disabled: bool| html!("<button ?disabled=" {disabled} ">x</button>").into_node().first_child().unwrap();

	let enabled = button(false);
	assert!(!enabled.has_attribute("disabled"));
	assert_eq!(enabled.outer_html(), "<button>x</button>");

	let disabled = button(true);
	assert_eq!(disabled.attribute("disabled").as_deref(), Some(""));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn attributes_are_assigned_not_interpolated() {
	logging_::init();

	let fragment = html!("<a href=" {r#"x" onclick="evil()"#} ">link</a>");
	let binding = fragment.bindings().values().next().unwrap();
	assert_eq!(binding.target, BindingTarget::Attribute("href".to_owned()));

	let a = fragment.into_node().first_child().unwrap();
	assert_eq!(a.attribute("href").as_deref(), Some(r#"x" onclick="evil()"#));
	assert!(!a.has_attribute("onclick"));
	assert_eq!(a.outer_html(), r#"<a href="x&quot; onclick=&quot;evil()">link</a>"#);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn null_and_false_render_nothing() {
	logging_::init();

	let root = html!("<p>" {()} {false} {None::<&str>} {true} {0} {1.5} "</p>").into_node();
	assert_eq!(root.inner_html(), "<p>true01.5</p>");

	let a = html!("<a title=" {()} ">x</a>").into_node().first_child().unwrap();
	assert!(!a.has_attribute("title"));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn lists_are_flattened_in_order() {
	logging_::init();

	let items = vec![Value::from("a"), html!("<b>b</b>").into(), Value::List(vec![Value::from(1), Value::from("c")])];
	let root = html!("<p>" {items} "</p>").into_node();
	assert_eq!(root.inner_html(), "<p>a<b>b</b>1c</p>");
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn events_are_bound_at_build_time() {
	logging_::init();

	let clicks = Rc::new(Cell::new(0));
	let counter = Rc::clone(&clicks);
	let fragment = html!("<button @click=" {Value::callback(move |_| counter.set(counter.get() + 1))} ">+</button>");
	assert!(fragment.bindings().is_empty());

	let button = fragment.root().first_child().unwrap();
	assert!(binding_ids(&button).is_empty());
	assert_eq!(button.listeners().len(), 1);

	let root = fragment.into_node();
	root.first_child().unwrap().click();
	assert_eq!(clicks.get(), 1);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn properties_keep_rich_values() {
	logging_::init();

	let items = Value::object(vec![1, 2, 3]);
	let fragment = html!("<x-list .items=" {items.clone()} "></x-list>");
	let element = fragment.into_node().first_child().unwrap();
	assert_eq!(element.property("items"), Some(items));
	assert_eq!(element.property("items").unwrap().downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
	assert_eq!(element.outer_html(), "<x-list></x-list>");
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn invalid_bindings_fall_back_to_text() {
	logging_::init();

	let root = html!("<div @bad-name=" {Value::callback(|_| ())} " ?flag=" {"yes"} "></div>").into_node();
	let div = root.first_child().unwrap();
	assert!(div.listeners().is_empty());
	assert_eq!(div.attribute("@bad-name").as_deref(), Some(""));
	assert_eq!(div.attribute("?flag").as_deref(), Some("yes"));
	assert!(binding_ids(&div).is_empty());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn callbacks_in_text_render_nothing() {
	logging_::init();

	let root = html!("<p>" {Value::callback(|_| ())} "</p>").into_node();
	assert_eq!(root.inner_html(), "<p></p>");
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn nodes_and_fragments_become_placeholders() {
	logging_::init();

	let node = Node::element("hr");
	let fragment = html!("<div>" {&node} {html!("<i>" {"x"} "</i>")} "</div>");
	assert_eq!(fragment.placeholders().len(), 2);
	assert_eq!(fragment.root().elements_by_tag_name(PLACEHOLDER_TAG).len(), 2);

	let root = fragment.into_node();
	assert_eq!(root.inner_html(), "<div><hr><i>x</i></div>");
	assert_eq!(root.first_child().unwrap().first_child(), Some(node));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn whitespace_between_tags_is_trimmed() {
	logging_::init();

	let root = html!(
		"
		<ul>
			<li>" {"a"} " and " {"b"} "</li>
		</ul>
		"
	)
	.into_node();
	assert_eq!(root.inner_html(), "<ul>\n\t\t\t<li>a and b</li>\n\t\t</ul>");
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn builder_and_function_agree() {
	logging_::init();

	let mut builder = TemplateBuilder::new();
	builder.push_str("<p title=").push_value("t").push_str(">").push_value(42).push_str("</p>");
	let built = builder.build().into_node().inner_html();

	let direct = template::html(&["<p title=", ">", "</p>"], vec!["t".into(), 42.into()]).into_node().inner_html();

	assert_eq!(built, r#"<p title="t">42</p>"#);
	assert_eq!(built, direct);
}
