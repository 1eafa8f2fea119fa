// The sheet cache is per thread, and browser tests all share one.
#![cfg(not(target_arch = "wasm32"))]

use vui_dom::{
	css,
	style::{cached_count, collect_unused, release},
};


#[test]
fn identical_text_shares_one_sheet() {
	logging_::init();

	let a = css(".shared { color: red; }");
	let b = css(".shared { color: red; }");
	let c = css(".shared { color: blue; }");

	assert!(a.ptr_eq(&b));
	assert!(!a.ptr_eq(&c));
	assert_eq!(cached_count(), 2);
	assert_eq!(a.text(), ".shared { color: red; }");
	assert_eq!(a.rules()[0].selector, ".shared");
	assert_eq!(a.rules()[0].declarations, [("color".to_owned(), "red".to_owned())]);
}

#[test]
fn released_sheets_are_collected() {
	logging_::init();

	let first = css("p { margin: 0 }");
	let second = css("p { margin: 0 }");
	let other = css("b { font-weight: 900 }");
	assert_eq!(cached_count(), 2);

	release(&first);
	assert_eq!(collect_unused(), 0);

	release(&second);
	release(&other);
	assert_eq!(cached_count(), 2);
	assert_eq!(collect_unused(), 2);
	assert_eq!(cached_count(), 0);

	let again = css("p { margin: 0 }");
	assert!(!again.ptr_eq(&first));
	assert_eq!(again.rules(), first.rules());
}

#[test]
fn releasing_too_often_is_harmless() {
	logging_::init();

	let sheet = css("i { color: green }");
	release(&sheet);
	release(&sheet);
	assert_eq!(collect_unused(), 1);
	release(&sheet);
	assert_eq!(cached_count(), 0);
}
