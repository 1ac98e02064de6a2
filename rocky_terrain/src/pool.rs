//! The shared tile-geometry pool.

use crate::{GeometryKey, SharedGeometry, TerrainSettings, build_geometry, create_indices};
use parking_lot::Mutex;
use rocky_core::{KeyedGate, TileKey};
use std::{collections::HashMap, sync::Arc};

/// Deduplicates tile surface meshes by shape.
///
/// Two locks protect a build: a global mutex over the shape-keyed map, and a
/// keyed gate that serializes concurrent builds of the same shape while
/// letting unrelated shapes build in parallel. The index buffer is built once
/// and shared by every pooled geometry.
pub struct GeometryPool {
	enabled: bool,
	debug: bool,
	shared: Mutex<HashMap<GeometryKey, Arc<SharedGeometry>>>,
	keygate: KeyedGate<GeometryKey>,
	default_indices: Mutex<Option<Arc<Vec<u16>>>>,
}

impl GeometryPool {
	#[must_use]
	pub fn new(settings: &TerrainSettings) -> GeometryPool {
		if !settings.pool_enabled {
			log::info!("geometry pool disabled");
		}
		GeometryPool {
			enabled: settings.pool_enabled,
			debug: settings.pool_debug,
			shared: Mutex::new(HashMap::new()),
			keygate: KeyedGate::new(),
			default_indices: Mutex::new(None),
		}
	}

	/// The shared mesh for a tile's shape, building it on first use.
	///
	/// Callers racing on the same shape serialize on the keyed gate; the
	/// loser finds the winner's entry in the map. Tiles that differ only in X
	/// (or in anything but latitude row in a geographic profile) receive the
	/// same `Arc`.
	#[must_use]
	pub fn pooled_geometry(&self, tile_key: &TileKey, settings: &TerrainSettings) -> Arc<SharedGeometry> {
		let geom_key = GeometryKey::for_tile_key(tile_key, settings.tile_size);

		// the globally shared index buffer
		let indices = {
			let mut default_indices = self.default_indices.lock();
			default_indices
				.get_or_insert_with(|| Arc::new(create_indices(settings)))
				.clone()
		};

		if !self.enabled {
			return Arc::new(build_geometry(tile_key, settings, indices));
		}

		// serialize same-shape builds; unrelated shapes proceed concurrently
		let _gate = self.keygate.lock(geom_key);

		if let Some(found) = self.shared.lock().get(&geom_key) {
			return found.clone();
		}

		if self.debug {
			log::debug!("building geometry for {geom_key:?}");
		}
		let built = Arc::new(build_geometry(tile_key, settings, indices));
		self.shared.lock().insert(geom_key, built.clone());
		built
	}

	/// Number of distinct shapes currently pooled.
	#[must_use]
	pub fn len(&self) -> usize {
		self.shared.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.shared.lock().is_empty()
	}

	/// Drops every pooled geometry.
	pub fn clear(&self) {
		self.shared.lock().clear();
	}

	/// Drops pooled geometries no tile references anymore, returning how many
	/// were released. Run from the update pass.
	pub fn release_unused(&self) -> usize {
		let mut shared = self.shared.lock();
		let before = shared.len();
		shared.retain(|_, geometry| Arc::strong_count(geometry) > 1);
		before - shared.len()
	}
}
