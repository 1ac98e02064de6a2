//! The ordered layer collection.

use crate::{ImageLayer, Revision, next_uid};
use parking_lot::RwLock;
use rocky_core::{IoControl, Profile, Signal};
use std::{collections::BTreeSet, sync::Arc};

/// The main data model: an ordered collection of layers under a read/write
/// lock, with a revision that moves on every mutation.
///
/// Mutations take the write lock, edit the vector, bump the revision under
/// the lock, release it, and only then fire the matching signal, so callbacks
/// never run while the collection is locked. Readers snapshot the vector and
/// report the revision they observed.
pub struct Map {
	uid: u32,
	profile: Profile,
	state: RwLock<MapState>,
	/// Fired with `(layer, index, revision)` after an add or insert.
	pub on_layer_added: Signal<(Arc<ImageLayer>, usize, Revision)>,
	/// Fired with `(layer, revision)` after a removal.
	pub on_layer_removed: Signal<(Arc<ImageLayer>, Revision)>,
	/// Fired with `(layer, old_index, new_index, revision)` after a move.
	pub on_layer_moved: Signal<(Arc<ImageLayer>, usize, usize, Revision)>,
}

struct MapState {
	layers: Vec<Arc<ImageLayer>>,
	revision: Revision,
}

impl Map {
	#[must_use]
	pub fn new(profile: Profile) -> Map {
		Map {
			uid: next_uid(),
			profile,
			state: RwLock::new(MapState {
				layers: Vec::new(),
				revision: 1,
			}),
			on_layer_added: Signal::new(),
			on_layer_removed: Signal::new(),
			on_layer_moved: Signal::new(),
		}
	}

	#[must_use]
	pub fn uid(&self) -> u32 {
		self.uid
	}

	/// The map's master tiling profile.
	#[must_use]
	pub fn profile(&self) -> &Profile {
		&self.profile
	}

	/// The current data-model revision.
	#[must_use]
	pub fn revision(&self) -> Revision {
		self.state.read().revision
	}

	/// Appends a layer, opening it first when it asks for that. Re-adding a
	/// layer already present (by UID) is a no-op.
	pub fn add_layer(&self, layer: Arc<ImageLayer>, io: &IoControl) {
		if layer.open_automatically() {
			let _ = layer.open(io);
		}

		let (index, revision) = {
			let mut state = self.state.write();
			if state.layers.iter().any(|l| l.uid() == layer.uid()) {
				return;
			}
			state.layers.push(layer.clone());
			state.revision += 1;
			(state.layers.len() - 1, state.revision)
		};

		self.on_layer_added.fire(&(layer, index, revision));
	}

	/// Adds a collection of layers in order.
	pub fn add_layers(&self, layers: impl IntoIterator<Item = Arc<ImageLayer>>, io: &IoControl) {
		for layer in layers {
			self.add_layer(layer, io);
		}
	}

	/// Inserts a layer at `index` (clamped to the vector).
	pub fn insert_layer(&self, layer: Arc<ImageLayer>, index: usize, io: &IoControl) {
		if layer.open_automatically() {
			let _ = layer.open(io);
		}

		let (index, revision) = {
			let mut state = self.state.write();
			if state.layers.iter().any(|l| l.uid() == layer.uid()) {
				return;
			}
			let index = index.min(state.layers.len());
			state.layers.insert(index, layer.clone());
			state.revision += 1;
			(index, state.revision)
		};

		self.on_layer_added.fire(&(layer, index, revision));
	}

	/// Removes a layer. Removing a non-member is a no-op.
	pub fn remove_layer(&self, layer: &Arc<ImageLayer>) {
		let revision = {
			let mut state = self.state.write();
			let Some(position) = state.layers.iter().position(|l| l.uid() == layer.uid()) else {
				return;
			};
			state.layers.remove(position);
			state.revision += 1;
			state.revision
		};

		self.on_layer_removed.fire(&(layer.clone(), revision));
	}

	/// Moves a layer to `new_index`, clamped to `[0, len - 1]`. Moving a
	/// non-member is a no-op.
	pub fn move_layer(&self, layer: &Arc<ImageLayer>, new_index: usize) {
		let (old_index, new_index, revision) = {
			let mut state = self.state.write();
			let Some(old_index) = state.layers.iter().position(|l| l.uid() == layer.uid()) else {
				return;
			};
			let new_index = new_index.min(state.layers.len() - 1);
			let moved = state.layers.remove(old_index);
			state.layers.insert(new_index, moved);
			state.revision += 1;
			(old_index, new_index, state.revision)
		};

		self.on_layer_moved.fire(&(layer.clone(), old_index, new_index, revision));
	}

	/// Removes every layer.
	pub fn clear(&self) {
		let (removed, revision) = {
			let mut state = self.state.write();
			let removed: Vec<Arc<ImageLayer>> = state.layers.drain(..).collect();
			state.revision += 1;
			(removed, state.revision)
		};

		for layer in removed {
			self.on_layer_removed.fire(&(layer, revision));
		}
	}

	/// Number of layers.
	#[must_use]
	pub fn len(&self) -> usize {
		self.state.read().layers.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.state.read().layers.is_empty()
	}

	/// Index of the layer, or `len()` when it is not a member.
	#[must_use]
	pub fn index_of(&self, layer: &Arc<ImageLayer>) -> usize {
		let state = self.state.read();
		state
			.layers
			.iter()
			.position(|l| l.uid() == layer.uid())
			.unwrap_or(state.layers.len())
	}

	/// Snapshots the layers satisfying `accept`, returning the revision the
	/// snapshot was taken at.
	#[must_use]
	pub fn layers(&self, accept: impl Fn(&ImageLayer) -> bool) -> (Vec<Arc<ImageLayer>>, Revision) {
		let state = self.state.read();
		let out = state.layers.iter().filter(|l| accept(l)).cloned().collect();
		(out, state.revision)
	}

	/// Snapshots every layer.
	#[must_use]
	pub fn all_layers(&self) -> (Vec<Arc<ImageLayer>>, Revision) {
		self.layers(|_| true)
	}

	/// Snapshots the open layers.
	#[must_use]
	pub fn open_layers(&self) -> (Vec<Arc<ImageLayer>>, Revision) {
		self.layers(ImageLayer::is_open)
	}

	#[must_use]
	pub fn layer_by_name(&self, name: &str) -> Option<Arc<ImageLayer>> {
		self.state.read().layers.iter().find(|l| l.core().name() == name).cloned()
	}

	#[must_use]
	pub fn layer_by_uid(&self, uid: u32) -> Option<Arc<ImageLayer>> {
		self.state.read().layers.iter().find(|l| l.uid() == uid).cloned()
	}

	#[must_use]
	pub fn layer_at(&self, index: usize) -> Option<Arc<ImageLayer>> {
		self.state.read().layers.get(index).cloned()
	}

	/// Attribution strings of the open layers, for display.
	#[must_use]
	pub fn attributions(&self) -> BTreeSet<String> {
		self.state
			.read()
			.layers
			.iter()
			.filter(|l| l.is_open())
			.map(|l| l.core().attribution())
			.filter(|a| !a.is_empty())
			.collect()
	}
}

impl std::fmt::Debug for Map {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Map")
			.field("uid", &self.uid)
			.field("layers", &self.len())
			.field("revision", &self.revision())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ImageLayerOptions, ImageSource};
	use parking_lot::Mutex;
	use rocky_core::{Error, IoResult, TileKey};
	use rocky_image::GeoImage;
	use std::thread;

	struct NullSource;

	impl ImageSource for NullSource {
		fn open(&mut self, _io: &IoControl) -> Result<Profile, Error> {
			Ok(Profile::global_geodetic())
		}

		fn fetch_image(&self, _key: &TileKey, _io: &IoControl) -> IoResult<GeoImage> {
			IoResult::not_found()
		}
	}

	fn layer(name: &str) -> Arc<ImageLayer> {
		let options = ImageLayerOptions {
			name: name.into(),
			attribution: format!("(c) {name}"),
			..ImageLayerOptions::default()
		};
		Arc::new(ImageLayer::new(options, Box::new(NullSource)))
	}

	fn map() -> Map {
		Map::new(Profile::global_geodetic())
	}

	#[test]
	fn add_opens_automatically_and_bumps_revision() {
		let map = map();
		let before = map.revision();
		let a = layer("a");
		map.add_layer(a.clone(), &IoControl::new());

		assert!(a.is_open());
		assert_eq!(map.len(), 1);
		assert!(map.revision() > before);
	}

	#[test]
	fn duplicate_add_is_a_no_op() {
		let map = map();
		let a = layer("a");
		map.add_layer(a.clone(), &IoControl::new());
		let revision = map.revision();
		map.add_layer(a, &IoControl::new());
		assert_eq!(map.len(), 1);
		assert_eq!(map.revision(), revision);
	}

	#[test]
	fn remove_non_member_is_a_no_op() {
		let map = map();
		let a = layer("a");
		let revision = map.revision();
		map.remove_layer(&a);
		assert_eq!(map.revision(), revision);
	}

	#[test]
	fn moves_clamp_to_the_vector() {
		let map = map();
		let io = IoControl::new();
		let a = layer("a");
		let b = layer("b");
		map.add_layer(a.clone(), &io);
		map.add_layer(b.clone(), &io);

		map.move_layer(&a, 99);
		assert_eq!(map.index_of(&a), 1);
		map.move_layer(&a, 0);
		assert_eq!(map.index_of(&a), 0);
		assert_eq!(map.index_of(&b), 1);
	}

	#[test]
	fn snapshot_returns_the_observed_revision() {
		let map = map();
		let io = IoControl::new();
		map.add_layer(layer("a"), &io);
		map.add_layer(layer("b"), &io);

		let (layers, revision) = map.all_layers();
		assert_eq!(layers.len(), 2);
		assert_eq!(revision, map.revision());

		let (named, _) = map.layers(|l| l.core().name() == "b");
		assert_eq!(named.len(), 1);
	}

	#[test]
	fn lookup_by_name_uid_and_index() {
		let map = map();
		let io = IoControl::new();
		let a = layer("a");
		map.add_layer(a.clone(), &io);

		assert_eq!(map.layer_by_name("a").unwrap().uid(), a.uid());
		assert_eq!(map.layer_by_uid(a.uid()).unwrap().uid(), a.uid());
		assert_eq!(map.layer_at(0).unwrap().uid(), a.uid());
		assert!(map.layer_at(1).is_none());
		assert!(map.layer_by_name("zzz").is_none());
	}

	#[test]
	fn callbacks_carry_the_produced_revision() {
		let map = map();
		let io = IoControl::new();
		let seen: Arc<Mutex<Vec<Revision>>> = Arc::new(Mutex::new(Vec::new()));

		let s = seen.clone();
		map.on_layer_added.add(move |(_, _, rev)| s.lock().push(*rev));
		let s = seen.clone();
		map.on_layer_moved.add(move |(_, _, _, rev)| s.lock().push(*rev));
		let s = seen.clone();
		map.on_layer_removed.add(move |(_, rev)| s.lock().push(*rev));

		let a = layer("a");
		map.add_layer(a.clone(), &io);
		map.move_layer(&a, 0);
		map.remove_layer(&a);

		let seen = seen.lock();
		assert_eq!(seen.len(), 3);
		assert!(seen[0] < seen[1] && seen[1] < seen[2]);
	}

	#[test]
	fn observed_revisions_are_strictly_increasing_across_threads() {
		let map = Arc::new(map());
		let seen: Arc<Mutex<Vec<Revision>>> = Arc::new(Mutex::new(Vec::new()));
		let s = seen.clone();
		map.on_layer_added.add(move |(_, _, rev)| s.lock().push(*rev));

		let mut handles = Vec::new();
		for i in 0..8 {
			let map = map.clone();
			handles.push(thread::spawn(move || {
				map.add_layer(layer(&format!("l{i}")), &IoControl::new());
			}));
		}
		for h in handles {
			h.join().unwrap();
		}

		// revisions are totally ordered: every observed value is unique, and
		// the map lands on the revision its eight mutations produced. Fires
		// that collide on the CAS guard may be dropped, never duplicated.
		let seen = seen.lock();
		let mut sorted = seen.clone();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(sorted.len(), seen.len());
		assert!(seen.len() <= 8);
		assert_eq!(map.revision(), 9);
	}

	#[test]
	fn clear_empties_and_notifies() {
		let map = map();
		let io = IoControl::new();
		map.add_layer(layer("a"), &io);
		map.add_layer(layer("b"), &io);

		let count = Arc::new(Mutex::new(0));
		let c = count.clone();
		map.on_layer_removed.add(move |_| *c.lock() += 1);

		map.clear();
		assert!(map.is_empty());
		assert_eq!(*count.lock(), 2);
	}

	#[test]
	fn attributions_come_from_open_layers() {
		let map = map();
		let io = IoControl::new();
		let a = layer("a");
		let b = layer("b");
		map.add_layer(a, &io);
		map.add_layer(b.clone(), &io);
		b.close();

		let attributions = map.attributions();
		assert!(attributions.contains("(c) a"));
		assert!(!attributions.contains("(c) b"));
	}
}
