//! Keyed single-flight gate.

use parking_lot::{Condvar, Mutex};
use std::{collections::HashSet, hash::Hash};

/// Serializes work per key: `lock` blocks while another thread holds an equal
/// key and returns an RAII guard; threads holding different keys never
/// contend. This is the primitive that keeps one build in flight per tile key
/// (image pipeline) and per geometry key (geometry pool).
///
/// # Examples
///
/// ```
/// use rocky_core::KeyedGate;
///
/// let gate: KeyedGate<u32> = KeyedGate::new();
/// let a = gate.lock(1);
/// let b = gate.lock(2); // different key: no contention
/// drop(a);
/// let c = gate.lock(1); // free again
/// # drop((b, c));
/// ```
pub struct KeyedGate<K: Eq + Hash + Clone> {
	held: Mutex<HashSet<K>>,
	released: Condvar,
}

impl<K: Eq + Hash + Clone> KeyedGate<K> {
	#[must_use]
	pub fn new() -> KeyedGate<K> {
		KeyedGate {
			held: Mutex::new(HashSet::new()),
			released: Condvar::new(),
		}
	}

	/// Acquires the gate for `key`, blocking while any other guard holds an
	/// equal key.
	pub fn lock(&self, key: K) -> KeyedGateGuard<'_, K> {
		let mut held = self.held.lock();
		while held.contains(&key) {
			self.released.wait(&mut held);
		}
		held.insert(key.clone());
		KeyedGateGuard { gate: self, key }
	}

	/// Number of keys currently held. Diagnostic only.
	#[must_use]
	pub fn len(&self) -> usize {
		self.held.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.held.lock().is_empty()
	}
}

impl<K: Eq + Hash + Clone> Default for KeyedGate<K> {
	fn default() -> Self {
		KeyedGate::new()
	}
}

/// Releases the key and wakes waiters on drop.
pub struct KeyedGateGuard<'a, K: Eq + Hash + Clone> {
	gate: &'a KeyedGate<K>,
	key: K,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGateGuard<'_, K> {
	fn drop(&mut self) {
		let mut held = self.gate.held.lock();
		held.remove(&self.key);
		self.gate.released.notify_all();
	}
}
