//! Keeps the [`Closure`]s behind browser event listeners alive, grouped by the node they're registered on.

use crate::dom::{Callback, Event, Node, NodeId};
use core::cell::RefCell;
use hashbrown::HashMap;
use tracing::{error, trace, trace_span};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

struct Published {
	event_name: String,
	callback: Callback,
	closure: Closure<dyn Fn(web_sys::Event)>,
}

thread_local! {
	static CLOSURE_MAP: RefCell<HashMap<NodeId, Vec<Published>>> = RefCell::new(HashMap::new());
}

/// Registers `callback` as `event_name` listener on `node`. The closure stays alive until [`release`] is called for `node`.
pub(crate) fn publish(node: &Node, event_name: &str, callback: Callback) -> Result<(), JsValue> {
	let current_target = node.clone();
	let handler = callback.clone();
	let name = event_name.to_owned();
	let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
		let span = trace_span!("listener", event = name.as_str(), current_target = %current_target.id());
		let _enter = span.enter();
		handler.call(&Event::new(event, current_target.clone()))
	}) as Box<dyn Fn(web_sys::Event)>);

	node.raw().add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref())?;
	CLOSURE_MAP.with(|closure_map| {
		closure_map.borrow_mut().entry(node.id()).or_default().push(Published {
			event_name: event_name.to_owned(),
			callback,
			closure,
		})
	});
	trace!("Published {:?} listener for {}.", event_name, node.id());
	Ok(())
}

/// The listeners published for `node`, in registration order.
pub(crate) fn listeners(node: NodeId) -> Vec<(String, Callback)> {
	CLOSURE_MAP.with(|closure_map| {
		closure_map
			.borrow()
			.get(&node)
			.map(|published| published.iter().map(|p| (p.event_name.clone(), p.callback.clone())).collect())
			.unwrap_or_default()
	})
}

/// Removes the listeners published for `node` from it and drops their closures.
///
/// Returns how many were released.
pub fn release(node: &Node) -> usize {
	let published = CLOSURE_MAP.with(|closure_map| closure_map.borrow_mut().remove(&node.id())).unwrap_or_default();
	for Published { event_name, closure, .. } in &published {
		if let Err(error) = node.raw().remove_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref()) {
			error!("Failed to remove {:?} listener from {:?}: {:?}", event_name, node, error)
		}
	}
	if !published.is_empty() {
		trace!("Released {} closure(s) for {}.", published.len(), node.id());
	}
	published.len()
}

/// The number of closures currently kept alive.
#[must_use]
pub fn published_count() -> usize {
	CLOSURE_MAP.with(|closure_map| closure_map.borrow().values().map(Vec::len).sum())
}
