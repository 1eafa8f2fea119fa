#![cfg(target_arch = "wasm32")]

use std::{cell::Cell, rc::Rc};
use vui_dom::{closure_map, diff, html, Node, Value};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlElement, HtmlInputElement};

wasm_bindgen_test_configure!(run_in_browser);


fn mount() -> Node {
	let document = window().unwrap().document().unwrap();
	let container = document.create_element("div").unwrap();
	document.body().unwrap().append_child(&container).unwrap();
	Node::from(web_sys::Node::from(container))
}

#[wasm_bindgen_test]
fn click() {
	logging_::init();

	let host = mount();
	let published = closure_map::published_count();

	let clicks = Rc::new(Cell::new(0));
	let counter = Rc::clone(&clicks);
	diff(
		&host,
		html!(r#"<button id="test-button" @click="# {Value::callback(move |event| {
			assert_eq!(event.name(), "click");
			counter.set(counter.get() + 1);
		})} ">+</button>"),
	);
	assert_eq!(closure_map::published_count(), published + 1);

	let document = window().unwrap().document().unwrap();
	let button: HtmlElement = document.get_element_by_id("test-button").unwrap().dyn_into().unwrap();
	assert_eq!(host.first_child().unwrap().raw(), button.unchecked_ref::<web_sys::Node>());
	assert_eq!(clicks.get(), 0);
	button.click();
	assert_eq!(clicks.get(), 1);

	diff(&host, html!());
	assert!(document.get_element_by_id("test-button").is_none());
	assert_eq!(closure_map::published_count(), published);
	button.click();
	assert_eq!(clicks.get(), 1);

	host.remove();
}

#[wasm_bindgen_test]
fn listeners_see_what_the_user_typed() {
	logging_::init();

	let host = mount();
	let seen = Rc::new(Cell::new(None::<f64>));
	let sink = Rc::clone(&seen);
	diff(
		&host,
		html!(r#"<input type="number" @input="# {Value::callback(move |event| {
			sink.set(event.target().property("value").and_then(|value| value.as_str().and_then(|text| text.parse().ok())));
		})} ">"),
	);

	let input: HtmlInputElement = host.first_child().unwrap().raw().clone().dyn_into().unwrap();
	input.set_value("42");
	input.dispatch_event(&web_sys::Event::new("input").unwrap()).unwrap();
	assert_eq!(seen.get(), Some(42.0));

	diff(&host, html!());
	host.remove();
}

#[wasm_bindgen_test]
fn replaced_listeners_are_unpublished() {
	logging_::init();

	let host = mount();
	let published = closure_map::published_count();
	let template = |n: i32| html!("<p @click=" {Value::callback(|_| ())} ">" {n} "</p>");

	diff(&host, template(1));
	let p = host.first_child().unwrap();
	for n in 2..10 {
		diff(&host, template(n));
	}
	assert_eq!(host.first_child(), Some(p));
	assert_eq!(closure_map::published_count(), published + 1);

	diff(&host, html!());
	assert_eq!(closure_map::published_count(), published);
	host.remove();
}
