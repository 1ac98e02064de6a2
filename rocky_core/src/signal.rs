//! Observer callbacks with UID-based removal.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

type Entry<A> = (u32, Box<dyn Fn(&A) + Send + Sync>);

/// A set of subscriber closures keyed by UID.
///
/// `fire` is guarded by a CAS flag: a fire that arrives while another fire is
/// running on the same instance is silently dropped, so subscribers must not
/// assume exactly one callback per event under contention.
///
/// # Examples
///
/// ```
/// use rocky_core::Signal;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let on_changed: Signal<u32> = Signal::new();
/// static SEEN: AtomicU32 = AtomicU32::new(0);
///
/// let uid = on_changed.add(|v| { SEEN.store(*v, Ordering::SeqCst); });
/// on_changed.fire(&7);
/// assert_eq!(SEEN.load(Ordering::SeqCst), 7);
///
/// on_changed.remove(uid);
/// on_changed.fire(&9);
/// assert_eq!(SEEN.load(Ordering::SeqCst), 7);
/// ```
pub struct Signal<A> {
	entries: Mutex<Vec<Entry<A>>>,
	next_uid: AtomicU32,
	firing: AtomicBool,
}

impl<A> Signal<A> {
	#[must_use]
	pub fn new() -> Signal<A> {
		Signal {
			entries: Mutex::new(Vec::new()),
			next_uid: AtomicU32::new(1),
			firing: AtomicBool::new(false),
		}
	}

	/// Subscribes a callback and returns its removal UID.
	pub fn add(&self, func: impl Fn(&A) + Send + Sync + 'static) -> u32 {
		let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
		self.entries.lock().push((uid, Box::new(func)));
		uid
	}

	/// Removes the callback registered under `uid`. Unknown UIDs are ignored.
	pub fn remove(&self, uid: u32) {
		self.entries.lock().retain(|(id, _)| *id != uid);
	}

	/// Invokes every subscriber with `args`. A reentrant or concurrent fire on
	/// the same instance is dropped.
	pub fn fire(&self, args: &A) {
		if self
			.firing
			.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_ok()
		{
			let entries = self.entries.lock();
			for (_, func) in entries.iter() {
				func(args);
			}
			drop(entries);
			self.firing.store(false, Ordering::Release);
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

impl<A> Default for Signal<A> {
	fn default() -> Self {
		Signal::new()
	}
}

impl<A> std::fmt::Debug for Signal<A> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Signal").field("subscribers", &self.entries.lock().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	};

	#[test]
	fn subscribers_fire_in_order_of_addition() {
		let signal: Signal<u32> = Signal::new();
		let log = Arc::new(Mutex::new(Vec::new()));

		let l1 = log.clone();
		signal.add(move |v| l1.lock().push(*v * 10));
		let l2 = log.clone();
		signal.add(move |v| l2.lock().push(*v * 100));

		signal.fire(&3);
		assert_eq!(*log.lock(), vec![30, 300]);
	}

	#[test]
	fn removal_by_uid() {
		let signal: Signal<()> = Signal::new();
		let count = Arc::new(AtomicU32::new(0));

		let c = count.clone();
		let uid = signal.add(move |()| {
			c.fetch_add(1, Ordering::SeqCst);
		});

		signal.fire(&());
		signal.remove(uid);
		signal.remove(9999); // unknown uid is a no-op
		signal.fire(&());
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn reentrant_fire_is_dropped() {
		let signal: Arc<Signal<u32>> = Arc::new(Signal::new());
		let count = Arc::new(AtomicU32::new(0));

		let inner = signal.clone();
		let c = count.clone();
		signal.add(move |_| {
			c.fetch_add(1, Ordering::SeqCst);
			// the nested fire must be swallowed, not deadlock
			inner.fire(&0);
		});

		signal.fire(&1);
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
