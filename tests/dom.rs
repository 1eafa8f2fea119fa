use std::{cell::RefCell, rc::Rc};
#[cfg(not(target_arch = "wasm32"))]
use vui_dom::dom::{observe, MutationKind, MutationRecord};
use vui_dom::{
	dom::{Callback, DomError, NodeType},
	parse::parse_fragment,
	Node,
};

#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);


#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn insertion_moves_and_validates() {
	logging_::init();

	let (a, b) = (Node::element("div"), Node::element("div"));
	let child = Node::text("x");
	a.append_child(&child).unwrap();
	b.append_child(&child).unwrap();
	assert_eq!(a.child_count(), 0);
	assert_eq!(child.parent(), Some(b.clone()));

	assert_eq!(child.append_child(&a), Err(DomError::HierarchyRequest));
	assert_eq!(b.append_child(&b), Err(DomError::HierarchyRequest));
	a.append_child(&b).unwrap();
	assert_eq!(b.append_child(&a), Err(DomError::HierarchyRequest));
	assert_eq!(a.insert_before(&Node::comment("c"), Some(&child)), Err(DomError::NotFound));
	assert_eq!(a.children(), [b.clone()]);

	b.insert_before(&child, Some(&child)).unwrap();
	assert_eq!(b.children(), [child.clone()]);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn fragments_are_emptied_into_their_parent() {
	logging_::init();

	let parent = Node::element("p");
	let last = Node::text("!");
	parent.append_child(&last).unwrap();

	let fragment = parse_fragment("<b>1</b>2");
	parent.insert_before(&fragment, Some(&last)).unwrap();
	assert_eq!(fragment.child_count(), 0);
	assert_eq!(parent.inner_html(), "<b>1</b>2!");
	assert_eq!(last.index_in_parent(), Some(2));
	assert_eq!(parent.first_child().unwrap().next_sibling().unwrap().node_type(), NodeType::Text);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn replace_and_remove() {
	logging_::init();

	let root = parse_fragment("<i></i><u></u>");
	let (i, u) = (root.child_at(0).unwrap(), root.child_at(1).unwrap());
	let s = Node::element("s");

	root.replace_child(&s, &i).unwrap();
	assert!(i.parent().is_none());
	assert_eq!(root.children(), [s.clone(), u.clone()]);
	assert_eq!(root.replace_child(&s, &i), Err(DomError::NotFound));

	u.remove();
	assert_eq!(root.remove_child(&u), Err(DomError::NotFound));
	assert_eq!(root.inner_html(), "<s></s>");
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn attributes_keep_their_order() {
	logging_::init();

	let element = Node::element("INPUT");
	assert_eq!(element.tag_name(), Some("input"));
	element.set_attribute("Type", "text").unwrap();
	element.set_attribute("value", "a<b").unwrap();
	element.set_attribute("type", "checkbox").unwrap();
	element.set_attribute("checked", "").unwrap();
	assert_eq!(element.outer_html(), r#"<input type="checkbox" value="a<b" checked="">"#);

	assert_eq!(element.remove_attribute("value"), Ok(Some("a<b".to_owned())));
	assert_eq!(element.remove_attribute("value"), Ok(None));
	assert_eq!(Node::text("t").set_attribute("a", "b"), Err(DomError::NotAnElement));
	assert_eq!(Node::element("p").set_data("x"), Err(DomError::NotCharacterData));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn events_bubble_until_stopped() {
	logging_::init();

	let root = parse_fragment(r#"<section><div><button id="b">x</button></div></section>"#);
	let log = Rc::new(RefCell::new(Vec::new()));
	let listen = |node: &Node, label: &'static str, stop: bool| {
		let log = Rc::clone(&log);
		node.add_event_listener(
			"click",
			Callback::new(move |event| {
				log.borrow_mut().push((label, event.target().tag_name().map(str::to_owned), event.current_target()));
				if stop {
					event.stop_propagation()
				}
			}),
		)
		.unwrap();
	};

	let button = root.element_by_id("b").unwrap();
	let div = button.parent().unwrap();
	let section = div.parent().unwrap();
	listen(&button, "button", false);
	listen(&div, "div", true);
	listen(&section, "section", false);

	button.click();
	let log = log.borrow();
	assert_eq!(log.len(), 2);
	assert_eq!(log[0], ("button", Some("button".to_owned()), Some(button.clone())));
	assert_eq!(log[1], ("div", Some("button".to_owned()), Some(div)));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn events_cross_shadow_boundaries() {
	logging_::init();

	let host = Node::element("x-host");
	let shadow_root = host.attach_shadow().unwrap();
	assert_eq!(host.attach_shadow(), Ok(shadow_root.clone()));
	assert_eq!(shadow_root.host(), Some(host.clone()));

	let inner = Node::element("span");
	shadow_root.append_child(&inner).unwrap();
	assert!(host.descendants().is_empty());
	assert!(host.contains(&inner));

	let hits = Rc::new(RefCell::new(0));
	let counter = Rc::clone(&hits);
	host.add_event_listener("click", Callback::new(move |_| *counter.borrow_mut() += 1)).unwrap();
	inner.click();
	assert_eq!(*hits.borrow(), 1);
}

#[cfg(not(target_arch = "wasm32"))]
#[test]
fn mutations_are_observed() {
	logging_::init();

	let element = Node::element("p");
	let text = Node::text("a");
	let ((), records) = observe(|| {
		element.append_child(&text).unwrap();
		text.set_data("b").unwrap();
		element.set_attribute("class", "c").unwrap();
		let ((), inner) = observe(|| element.set_property("value", 1.into()).unwrap());
		assert_eq!(inner.len(), 1);
	});

	let expected = [
		MutationRecord {
			target: element.id(),
			kind: MutationKind::ChildList,
		},
		MutationRecord {
			target: text.id(),
			kind: MutationKind::CharacterData,
		},
		MutationRecord {
			target: element.id(),
			kind: MutationKind::Attribute("class".to_owned()),
		},
		MutationRecord {
			target: element.id(),
			kind: MutationKind::Property("value".to_owned()),
		},
	];
	assert_eq!(records, expected);

	let ((), none) = observe(|| ());
	assert!(none.is_empty());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn text_content_and_lookup() {
	logging_::init();

	let root = parse_fragment("<ul><li>a</li><!--skip--><li>b<em>c</em></li></ul>");
	assert_eq!(root.text_content(), "abc");
	assert_eq!(root.elements_by_tag_name("LI").len(), 2);
	assert_eq!(root.find_all(Node::is_text).len(), 3);
	assert_eq!(root.descendants().len(), 8);
	assert!(root.element_by_id("missing").is_none());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn serialization_escapes_by_context() {
	logging_::init();

	let p = Node::element("p");
	p.set_attribute("title", "\"a\" & <b>").unwrap();
	p.append_child(&Node::text("1 < 2 & \"3\"")).unwrap();
	assert_eq!(p.outer_html(), r#"<p title="&quot;a&quot; &amp; <b>">1 &lt; 2 &amp; "3"</p>"#);
}
