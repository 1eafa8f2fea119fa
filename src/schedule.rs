//! A thread-local microtask queue.
//!
//! Callbacks queued here run in order.
//! On `wasm32`, queueing the first one schedules a drain on the browser's microtask queue via
//! [`wasm_bindgen_futures::spawn_local`], so renders happen at the end of the current synchronous turn without further setup.
//! Elsewhere, the embedder calls [`run_microtasks`] to stand in for that point.
//!
//! [`run_microtasks`] may also be called directly in the browser to flush synchronously.

#[cfg(target_arch = "wasm32")]
use core::cell::Cell;
use core::cell::RefCell;
use std::collections::VecDeque;
use tracing::trace;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
	static QUEUE: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

#[cfg(target_arch = "wasm32")]
thread_local! {
	static DRAIN_SCHEDULED: Cell<bool> = Cell::new(false);
}

/// Defers `task` until the next [`run_microtasks`] on this thread.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
	QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
	#[cfg(target_arch = "wasm32")]
	schedule_drain();
}

#[cfg(target_arch = "wasm32")]
fn schedule_drain() {
	if DRAIN_SCHEDULED.with(|scheduled| scheduled.replace(true)) {
		return;
	}
	wasm_bindgen_futures::spawn_local(async {
		DRAIN_SCHEDULED.with(|scheduled| scheduled.set(false));
		run_microtasks();
	});
}

/// Runs queued microtasks until the queue is empty, including ones queued while running.
///
/// Returns how many ran.
pub fn run_microtasks() -> usize {
	let mut count = 0;
	// The queue isn't borrowed while a task runs, so tasks can queue more.
	while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
		task();
		count += 1;
	}
	if count > 0 {
		trace!("Ran {} microtask(s).", count);
	}
	count
}

#[must_use]
pub fn pending_microtasks() -> usize {
	QUEUE.with(|queue| queue.borrow().len())
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
	use super::*;
	use std::rc::Rc;

	#[test]
	fn runs_in_order_until_quiescent() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let inner = Rc::clone(&log);
		queue_microtask(move || {
			inner.borrow_mut().push(1);
			let nested = Rc::clone(&inner);
			queue_microtask(move || nested.borrow_mut().push(3));
		});
		let second = Rc::clone(&log);
		queue_microtask(move || second.borrow_mut().push(2));

		assert_eq!(pending_microtasks(), 2);
		assert_eq!(run_microtasks(), 3);
		assert_eq!(*log.borrow(), [1, 2, 3]);
		assert_eq!(pending_microtasks(), 0);
	}
}
