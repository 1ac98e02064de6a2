//! The per-layer L2 memory cache for decoded tiles.

use lru::LruCache;
use rocky_image::GeoImage;
use std::{num::NonZeroUsize, time::SystemTime};

/// Rough footprint of one decoded 256×256 RGBA tile, used to turn a byte
/// budget into an entry count.
const BYTES_PER_TILE_ESTIMATE: usize = 256 * 256 * 4;

/// An LRU cache of decoded tiles keyed by the pipeline's cache-key string
/// `<layer-revision>/<tile-key>/<profile-horiz-signature>`. Each record keeps
/// its insertion timestamp so cache policies can expire it.
pub struct MemoryCache {
	cache: LruCache<String, (GeoImage, SystemTime)>,
}

impl MemoryCache {
	/// Creates a cache sized to roughly `max_bytes` of decoded tile data.
	/// Always holds at least one entry.
	#[must_use]
	pub fn with_byte_budget(max_bytes: usize) -> MemoryCache {
		let entries = (max_bytes / BYTES_PER_TILE_ESTIMATE).max(1);
		MemoryCache {
			cache: LruCache::new(NonZeroUsize::new(entries).unwrap()),
		}
	}

	/// Looks up a record, marking it most recently used.
	#[must_use]
	pub fn get(&mut self, key: &str) -> Option<(GeoImage, SystemTime)> {
		self.cache.get(key).cloned()
	}

	pub fn put(&mut self, key: String, image: GeoImage, stamp: SystemTime) {
		self.cache.put(key, (image, stamp));
	}

	pub fn clear(&mut self) {
		self.cache.clear();
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.cache.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.cache.cap().get()
	}
}

impl std::fmt::Debug for MemoryCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryCache")
			.field("length", &self.len())
			.field("capacity", &self.capacity())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rocky_core::{GeoExtent, Srs};
	use rocky_image::{Image, PixelFormat};

	fn tile(tag: f64) -> GeoImage {
		let img = Image::r32f_from_fn(2, 2, move |_, _| tag);
		GeoImage::new(img, GeoExtent::new(Srs::geographic(), 0.0, 0.0, 1.0, 1.0).unwrap()).unwrap()
	}

	#[test]
	fn byte_budget_derives_capacity() {
		let cache = MemoryCache::with_byte_budget(10 * BYTES_PER_TILE_ESTIMATE);
		assert_eq!(cache.capacity(), 10);
		// tiny budgets still hold one entry
		assert_eq!(MemoryCache::with_byte_budget(1).capacity(), 1);
	}

	#[test]
	fn lru_eviction() {
		let mut cache = MemoryCache::with_byte_budget(2 * BYTES_PER_TILE_ESTIMATE);
		let now = SystemTime::now();
		cache.put("a".into(), tile(1.0), now);
		cache.put("b".into(), tile(2.0), now);

		// touch "a" so "b" is evicted next
		let _ = cache.get("a");
		cache.put("c".into(), tile(3.0), now);

		assert!(cache.get("a").is_some());
		assert!(cache.get("b").is_none());
		assert!(cache.get("c").is_some());
	}

	#[test]
	fn records_keep_their_stamp() {
		let mut cache = MemoryCache::with_byte_budget(BYTES_PER_TILE_ESTIMATE);
		let stamp = SystemTime::UNIX_EPOCH;
		cache.put("k".into(), tile(4.0), stamp);
		let (_, got) = cache.get("k").unwrap();
		assert_eq!(got, stamp);
	}
}
