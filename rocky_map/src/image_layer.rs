//! The image layer and its tile read pipeline.
//!
//! `create_image` is the public contract: per-key single-flight, L2 cache,
//! an in-profile fast path with optional fractal upsampling, and a
//! cross-profile assembly path built on mosaic + crop + reproject.

use crate::{ImageSource, LayerCore, MemoryCache, Revision};
use glam::{DVec2, DVec4};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rocky_core::{CachePolicy, Config, ErrorKind, GeoExtent, IoControl, IoResult, KeyedGate, Profile, Status, TileKey};
use rocky_image::{GeoImage, Image, ImageMosaic};
use std::{
	cell::RefCell,
	collections::HashMap,
	sync::atomic::{AtomicBool, Ordering},
	time::{Instant, SystemTime},
};

/// Serialized options of an [`ImageLayer`].
#[derive(Clone, Debug)]
pub struct ImageLayerOptions {
	pub name: String,
	/// Whether the layer's texture is shared with other rendering passes.
	pub shared: bool,
	/// Coverage layers carry categorical data and are never blended.
	pub coverage: bool,
	/// Renders the layer at this altitude in meters, raising tile bounds.
	pub altitude: Option<f64>,
	pub accept_draping: bool,
	/// Pixels of exactly this color become fully transparent.
	pub transparent_color: Option<DVec4>,
	pub texture_compression: String,
	/// Loads tiles asynchronously on the consumer side.
	pub async_loading: bool,
	/// Reference image marking "no data" regions at the source.
	pub nodata_image_uri: Option<String>,
	pub attribution: String,
	pub open_automatically: bool,
	pub cache_policy: CachePolicy,
	/// L2 cache budget in bytes; 0 disables the cache.
	pub l2_cache_size: usize,
	/// Legal LOD range of requests.
	pub min_level: u32,
	pub max_level: u32,
	/// Deepest LOD at which the source has real data.
	pub max_data_level: u32,
	/// Synthesize detail past `max_data_level` by fractal upsampling.
	pub upsample: bool,
	/// Pixel size of produced tiles.
	pub tile_size: u32,
}

impl Default for ImageLayerOptions {
	fn default() -> Self {
		ImageLayerOptions {
			name: String::new(),
			shared: false,
			coverage: false,
			altitude: None,
			accept_draping: true,
			transparent_color: None,
			texture_compression: String::new(),
			async_loading: false,
			nodata_image_uri: None,
			attribution: String::new(),
			open_automatically: true,
			cache_policy: CachePolicy::default(),
			l2_cache_size: 16 * 1024 * 1024,
			min_level: 0,
			max_level: 23,
			max_data_level: 23,
			upsample: false,
			tile_size: 256,
		}
	}
}

impl ImageLayerOptions {
	#[must_use]
	pub fn from_config(conf: &Config) -> ImageLayerOptions {
		let defaults = ImageLayerOptions::default();
		ImageLayerOptions {
			name: conf.value_of("name", defaults.name),
			shared: conf.value_of("shared", defaults.shared),
			coverage: conf.value_of("coverage", defaults.coverage),
			altitude: conf.get("altitude"),
			accept_draping: conf.value_of("accept_draping", defaults.accept_draping),
			transparent_color: None,
			texture_compression: conf.value_of("texture_compression", defaults.texture_compression),
			async_loading: conf.value_of("async", defaults.async_loading),
			nodata_image_uri: conf.get("nodata_image"),
			attribution: conf.value_of("attribution", defaults.attribution),
			open_automatically: conf.value_of("open", defaults.open_automatically),
			cache_policy: conf
				.child("cache_policy")
				.map_or(defaults.cache_policy, CachePolicy::from_config),
			l2_cache_size: conf.value_of("l2_cache_size", defaults.l2_cache_size),
			min_level: conf.value_of("min_level", defaults.min_level),
			max_level: conf.value_of("max_level", defaults.max_level),
			max_data_level: conf.value_of("max_data_level", defaults.max_data_level),
			upsample: conf.value_of("upsample", defaults.upsample),
			tile_size: conf.value_of("tile_size", defaults.tile_size),
		}
	}

	#[must_use]
	pub fn to_config(&self) -> Config {
		let mut conf = Config::new("image_layer");
		conf.set("name", &self.name);
		conf.set("shared", self.shared);
		conf.set("coverage", self.coverage);
		if let Some(altitude) = self.altitude {
			conf.set("altitude", altitude);
		}
		conf.set("accept_draping", self.accept_draping);
		conf.set("texture_compression", &self.texture_compression);
		conf.set("async", self.async_loading);
		if let Some(uri) = &self.nodata_image_uri {
			conf.set("nodata_image", uri);
		}
		conf.set("attribution", &self.attribution);
		conf.set("open", self.open_automatically);
		conf.add_child(self.cache_policy.to_config());
		conf.set("l2_cache_size", self.l2_cache_size);
		conf.set("min_level", self.min_level);
		conf.set("max_level", self.max_level);
		conf.set("max_data_level", self.max_data_level);
		conf.set("upsample", self.upsample);
		conf.set("tile_size", self.tile_size);
		conf
	}
}

/// A layer producing raster tiles keyed by [`TileKey`].
pub struct ImageLayer {
	core: LayerCore,
	options: RwLock<ImageLayerOptions>,
	profile: RwLock<Option<Profile>>,
	source: RwLock<Box<dyn ImageSource>>,
	gate: KeyedGate<TileKey>,
	cache: Mutex<MemoryCache>,
	open_automatically: AtomicBool,
}

impl ImageLayer {
	#[must_use]
	pub fn new(options: ImageLayerOptions, source: Box<dyn ImageSource>) -> ImageLayer {
		let core = LayerCore::new(options.name.clone());
		core.set_attribution(options.attribution.clone());
		let cache = MemoryCache::with_byte_budget(options.l2_cache_size.max(1));
		let open_automatically = options.open_automatically;
		ImageLayer {
			core,
			options: RwLock::new(options),
			profile: RwLock::new(None),
			source: RwLock::new(source),
			gate: KeyedGate::new(),
			cache: Mutex::new(cache),
			open_automatically: AtomicBool::new(open_automatically),
		}
	}

	#[must_use]
	pub fn core(&self) -> &LayerCore {
		&self.core
	}

	#[must_use]
	pub fn uid(&self) -> u32 {
		self.core.uid()
	}

	#[must_use]
	pub fn name(&self) -> String {
		self.core.name().to_string()
	}

	#[must_use]
	pub fn revision(&self) -> Revision {
		self.core.revision()
	}

	#[must_use]
	pub fn status(&self) -> Status {
		self.core.status()
	}

	#[must_use]
	pub fn is_open(&self) -> bool {
		self.core.is_open()
	}

	#[must_use]
	pub fn open_automatically(&self) -> bool {
		self.open_automatically.load(Ordering::Relaxed)
	}

	pub fn set_open_automatically(&self, value: bool) {
		self.open_automatically.store(value, Ordering::Relaxed);
	}

	/// The authoritative tiling pyramid, available once the layer is open.
	#[must_use]
	pub fn profile(&self) -> Option<Profile> {
		self.profile.read().clone()
	}

	#[must_use]
	pub fn options(&self) -> ImageLayerOptions {
		self.options.read().clone()
	}

	#[must_use]
	pub fn tile_size(&self) -> u32 {
		self.options.read().tile_size
	}

	#[must_use]
	pub fn is_coverage(&self) -> bool {
		self.options.read().coverage
	}

	/// Coverage data must never be recompressed.
	#[must_use]
	pub fn compression_method(&self) -> String {
		let options = self.options.read();
		if options.coverage {
			"none".to_string()
		} else {
			options.texture_compression.clone()
		}
	}

	/// Raises `z_max` when the layer renders at altitude.
	pub fn modify_tile_bounding_box(&self, _key: &TileKey, z_max: &mut f64) {
		if let Some(altitude) = self.options.read().altitude {
			if altitude > *z_max {
				*z_max = altitude;
			}
		}
	}

	/// Opens the layer. Idempotent: an open layer reports its current status.
	pub fn open(&self, io: &IoControl) -> Status {
		if self.is_open() {
			return self.status();
		}

		let mut source = self.source.write();
		self.open_locked(&mut source, io);
		drop(source);

		if self.is_open() {
			self.core.on_opened.fire(&self.core.uid());
		}
		self.status()
	}

	fn open_locked(&self, source: &mut Box<dyn ImageSource>, io: &IoControl) {
		self.core.set_opening(true);
		match source.open(io) {
			Ok(profile) => {
				log::debug!("layer \"{}\" opened with profile {:?}", self.core.name(), profile);
				*self.profile.write() = Some(profile);
				self.core.set_status(Status::ok());
			}
			Err(e) => {
				log::warn!("layer \"{}\" failed to open: {e}", self.core.name());
				self.core.set_status(e.into());
			}
		}
		self.core.set_opening(false);
	}

	/// Closes the layer. Closing while the layer is opening is disallowed.
	pub fn close(&self) -> Status {
		if self.core.is_opening() {
			return Status::error(ErrorKind::ServiceUnavailable, "cannot close a layer that is opening");
		}
		if self.is_open() {
			let mut source = self.source.write();
			self.core.set_closing(true);
			source.close();
			self.core.set_status(Status::error(ErrorKind::ResourceUnavailable, "Layer closed"));
			self.core.set_closing(false);
			drop(source);

			self.core.on_closed.fire(&self.core.uid());
		}
		self.status()
	}

	/// Mutates the shared flag; closes, mutates, and reopens atomically.
	pub fn set_shared(&self, value: bool) -> Status {
		if self.options.read().shared == value {
			return self.status();
		}
		self.set_option_that_requires_reopen(|options| options.shared = value)
	}

	/// Mutates the coverage flag; closes, mutates, and reopens atomically.
	pub fn set_coverage(&self, value: bool) -> Status {
		if self.options.read().coverage == value {
			return self.status();
		}
		self.set_option_that_requires_reopen(|options| options.coverage = value)
	}

	pub fn set_async_loading(&self, value: bool) {
		self.options.write().async_loading = value;
	}

	pub fn set_accept_draping(&self, value: bool) {
		self.options.write().accept_draping = value;
	}

	fn set_option_that_requires_reopen(&self, mutate: impl FnOnce(&mut ImageLayerOptions)) -> Status {
		let mut source = self.source.write();
		let was_open = self.is_open();

		if was_open {
			self.core.set_closing(true);
			source.close();
			self.core.set_status(Status::error(ErrorKind::ResourceUnavailable, "Layer closed"));
			self.core.set_closing(false);
		}

		mutate(&mut self.options.write());
		self.core.bump_revision();
		self.cache.lock().clear();

		if was_open {
			self.open_locked(&mut source, &IoControl::new());
		}
		self.status()
	}

	/// Whether `key` falls inside the layer's legal LOD range.
	#[must_use]
	pub fn is_key_in_legal_range(&self, key: &TileKey) -> bool {
		let options = self.options.read();
		key.lod() >= options.min_level && key.lod() <= options.max_level
	}

	/// The deepest key along `key`'s ancestry the layer can actually produce:
	/// real data up to `max_data_level`, or any legal level when upsampling is
	/// allowed to synthesize the rest.
	#[must_use]
	pub fn best_available_key(&self, key: &TileKey, allow_upsample: bool) -> Option<TileKey> {
		if !self.is_key_in_legal_range(key) {
			return None;
		}
		let options = self.options.read();
		let ceiling = if allow_upsample && options.upsample {
			options.max_level
		} else {
			options.max_data_level
		};
		if key.lod() <= ceiling {
			Some(key.clone())
		} else {
			key.ancestor(ceiling)
		}
	}

	/// Writes a tile back to the source under the shared source lock.
	pub fn write_image(&self, key: &TileKey, image: &GeoImage, io: &IoControl) -> Status {
		if self.status().failed() {
			return self.status();
		}
		let source = self.source.read();
		source.write_image(key, image, io)
	}

	/// Produces the tile image for `key`, in `key`'s profile.
	///
	/// Guarantees: one in-flight build per key (duplicates block on the first
	/// and then observe its cached result); cancellation is honored at every
	/// suspension point; a returned image covers exactly `key`'s extent.
	#[must_use]
	pub fn create_image(&self, key: &TileKey, io: &IoControl) -> IoResult<GeoImage> {
		if !self.is_open() {
			return IoResult::not_found();
		}
		self.create_image_in_key_profile(key, io)
	}

	fn create_image_in_key_profile(&self, key: &TileKey, io: &IoControl) -> IoResult<GeoImage> {
		if !self.is_open() || !self.is_key_in_legal_range(key) {
			return IoResult::not_found();
		}
		let Some(layer_profile) = self.profile() else {
			return IoResult::error(ErrorKind::AssertionFailure, "open layer without a profile");
		};

		// one build in flight per key; latecomers block here and then hit
		// the cache entry the winner wrote
		let _gate = self.gate.lock(key.clone());

		let started = Instant::now();
		let policy = self.options.read().cache_policy;
		let cache_key = format!(
			"{}/{}/{:x}",
			self.revision(),
			key,
			key.profile().srs().horiz_signature()
		);

		if policy.is_readable() && self.options.read().l2_cache_size > 0 {
			if let Some((image, stamp)) = self.cache.lock().get(&cache_key) {
				if !policy.is_expired(stamp) {
					log::trace!("cache hit for {key}");
					return IoResult::ok(image)
						.with_last_modified(stamp)
						.with_from_cache()
						.with_duration(started.elapsed());
				}
			}
		}
		if policy.is_cache_only() {
			return IoResult::not_found();
		}

		let result = if key.profile().is_horiz_equivalent_to(&layer_profile) {
			if self.wants_fractal_upsample(key) {
				self.create_fractal_upsampled_image(key, io)
			} else {
				let fetched = {
					let source = self.source.read();
					source.fetch_image(key, io)
				};
				self.apply_transparent_color(fetched)
			}
		} else {
			self.assemble_image(key, io)
		};

		if io.is_canceled() {
			return IoResult::canceled();
		}

		if policy.is_writeable() && self.options.read().l2_cache_size > 0 {
			if let Some(image) = result.value() {
				self.cache.lock().put(cache_key, image.clone(), SystemTime::now());
			}
		}

		result.with_duration(started.elapsed())
	}

	/// Upsampling applies when the request is deeper than the real data and a
	/// synthesized result would beat the best real ancestor.
	fn wants_fractal_upsample(&self, key: &TileKey) -> bool {
		let options = self.options.read();
		if !options.upsample || key.lod() <= options.max_data_level {
			return false;
		}
		drop(options);
		match (self.best_available_key(key, false), self.best_available_key(key, true)) {
			(Some(best), Some(best_upsampled)) => best.lod() < best_upsampled.lod(),
			_ => false,
		}
	}

	fn apply_transparent_color(&self, mut result: IoResult<GeoImage>) -> IoResult<GeoImage> {
		let Some(color) = self.options.read().transparent_color else {
			return result;
		};
		if let Some(geo_image) = result.value.take() {
			let extent = geo_image.extent().clone();
			let mut image = geo_image.into_image();
			for row in 0..image.height() {
				for col in 0..image.width() {
					let p = image.read(col, row);
					if (p.truncate() - color.truncate()).abs().max_element() < 0.5 / 255.0 {
						image.write(col, row, DVec4::new(p.x, p.y, p.z, 0.0));
					}
				}
			}
			match GeoImage::new(image, extent) {
				Ok(out) => result.value = Some(out),
				Err(e) => return IoResult::error(ErrorKind::GeneralError, e.to_string()),
			}
		}
		result
	}

	/// Builds a tile one level past the available data by fractal enhancement
	/// of the parent: seed from a parent-centered meta-tile, then diamond and
	/// square passes that extend local patterns, falling back to a PRNG seeded
	/// by the key hash.
	fn create_fractal_upsampled_image(&self, key: &TileKey, io: &IoControl) -> IoResult<GeoImage> {
		let Some(parent_key) = key.parent() else {
			return IoResult::not_found();
		};

		let parent = self.create_image(&parent_key, io);
		if parent.is_canceled() {
			return parent;
		}
		let Some(center) = parent.into_value() else {
			return IoResult::not_found();
		};

		let size = center.image().width();
		let format = center.image().format();
		let meta = MetaTile::new(self, io, parent_key, center, &key.extent());

		let ws = size + 3;
		let mut workspace = Image::new(format, ws, ws);

		// pass 1: populate even-numbered pixels from the ancestor data
		let mut t = 0;
		while t < ws {
			let mut s = 0;
			while s < ws {
				workspace.write(s, t, meta.read(i64::from(s) - 2, i64::from(t) - 2));
				s += 2;
			}
			if io.is_canceled() {
				return IoResult::canceled();
			}
			t += 2;
		}

		let mut rng = StdRng::seed_from_u64(key.hash_value());

		// pass 2: diamond, over the odd/odd cells
		let mut t = 1;
		while t < ws - 1 {
			let mut s = 1;
			while s < ws - 1 {
				let r = rng.random_range(0..4u32);
				let picks = [
					workspace.read(s - 1, t - 1),
					workspace.read(s + 1, t - 1),
					workspace.read(s + 1, t + 1),
					workspace.read(s - 1, t + 1),
				];
				workspace.write(s, t, continue_pattern(&picks, r));
				s += 2;
			}
			t += 2;
		}

		// pass 3: square, where exactly one of (s, t) is odd
		for t in 2..ws - 1 {
			for s in 2..ws - 1 {
				if (s & 1 == 1) != (t & 1 == 1) {
					let r = rng.random_range(0..4u32);
					let picks = [
						workspace.read(s - 1, t),
						workspace.read(s, t - 1),
						workspace.read(s + 1, t),
						workspace.read(s, t + 1),
					];
					workspace.write(s, t, continue_pattern(&picks, r));
				}
			}
		}

		// blit the interior out
		let mut out = Image::new(format, size, size);
		for t in 0..size {
			for s in 0..size {
				out.write(s, t, workspace.read(s + 2, t + 2));
			}
		}

		if io.is_canceled() {
			return IoResult::canceled();
		}

		match GeoImage::new(out, key.extent()) {
			Ok(image) => IoResult::ok(image),
			Err(e) => IoResult::error(ErrorKind::GeneralError, e.to_string()),
		}
	}

	/// Cross-profile path: gather the intersecting source-profile tiles
	/// (falling back to cropped ancestors where a tile fails), mosaic them,
	/// and reproject the mosaic onto the request key.
	fn assemble_image(&self, key: &TileKey, io: &IoControl) -> IoResult<GeoImage> {
		let Some(layer_profile) = self.profile() else {
			return IoResult::error(ErrorKind::AssertionFailure, "assemble with an undefined profile");
		};

		let intersecting = match key.intersecting_keys(&layer_profile) {
			Ok(keys) => keys,
			Err(e) => return IoResult::error(e.kind, e.message),
		};

		if intersecting.is_empty() {
			log::debug!("assemble: no intersections for {key}");
			return IoResult::not_found();
		}

		let mut mosaic = ImageMosaic::new();
		let mut failed_keys: Vec<TileKey> = Vec::new();
		let mut canceled_mid_loop = false;

		for k in &intersecting {
			let piece = self.create_image_in_key_profile(k, io);
			if let Some(image) = piece.into_value() {
				mosaic.add(image.into_image(), k.clone());
			} else {
				failed_keys.push(k.clone());
				if io.is_canceled() {
					canceled_mid_loop = true;
					break;
				}
			}
		}

		// fail when there is no data above the root level, or on cancellation
		if canceled_mid_loop {
			return IoResult::canceled();
		}
		if mosaic.is_empty() && key.lod() > 0 {
			log::debug!("assemble: no source data for {key}");
			return IoResult::not_found();
		}

		// walk ancestors to patch the holes; a cell that still fails stays
		// transparent in the mosaic
		let coverage = self.is_coverage();
		for k in &failed_keys {
			let mut patched = false;
			let mut ancestor = k.parent();
			while let Some(a) = ancestor {
				let fetched = {
					let source = self.source.read();
					source.fetch_image(&a, io)
				};
				if let Some(image) = fetched.into_value() {
					let (w, h) = (image.image().width(), image.image().height());
					if let Some(cropped) = image.crop(&k.extent(), w, h, !coverage) {
						mosaic.add(cropped.into_image(), k.clone());
						patched = true;
					}
					break;
				}
				ancestor = a.parent();
			}
			if !patched {
				log::debug!("assemble: no fallback for {k}; leaving the cell empty");
			}
		}

		let Some(mosaicked) = mosaic.assemble() else {
			return IoResult::not_found();
		};

		if io.is_canceled() {
			return IoResult::canceled();
		}

		let tile_size = self.tile_size();
		match mosaicked.reproject(key.profile().srs(), &key.extent(), tile_size, tile_size, !coverage) {
			Ok(image) => IoResult::ok(image),
			Err(e) => IoResult::error(ErrorKind::GeneralError, e.to_string()),
		}
	}
}

impl std::fmt::Debug for ImageLayer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ImageLayer")
			.field("uid", &self.uid())
			.field("name", &self.core.name())
			.field("open", &self.is_open())
			.field("revision", &self.revision())
			.finish()
	}
}

/// Picks the neighbor value that continues a local pattern: three-of-a-kind
/// wins, then an opposite-pair continuation; otherwise the PRNG decides.
/// Patterns compare the first channel, which carries the full value for both
/// coverage and imagery rasters.
fn continue_pattern(p: &[DVec4; 4], r: u32) -> DVec4 {
	let k = [p[0].x, p[1].x, p[2].x, p[3].x];

	if k[0] == k[1] && k[1] == k[2] && k[2] != k[3] {
		p[0]
	} else if k[1] == k[2] && k[2] == k[3] && k[3] != k[0] {
		p[1]
	} else if k[2] == k[3] && k[3] == k[0] && k[0] != k[1] {
		p[2]
	} else if k[3] == k[0] && k[0] == k[1] && k[1] != k[2] {
		p[3]
	} else if k[0] == k[2] && k[0] != k[1] && k[0] != k[3] {
		p[0]
	} else if k[1] == k[3] && k[1] != k[2] && k[1] != k[0] {
		p[1]
	} else {
		p[r as usize]
	}
}

/// A window over the parent tile and, lazily, its neighbors, addressed in the
/// child tile's pixel space. Border reads past the parent's edge resolve
/// through the neighbor keys; tiles with no data read as zero.
struct MetaTile<'a> {
	layer: &'a ImageLayer,
	io: &'a IoControl,
	center_key: TileKey,
	center: GeoImage,
	size: i64,
	scale: DVec2,
	bias: DVec2,
	neighbors: RefCell<HashMap<(i64, i64), Option<GeoImage>>>,
}

impl<'a> MetaTile<'a> {
	fn new(layer: &'a ImageLayer, io: &'a IoControl, center_key: TileKey, center: GeoImage, child_extent: &GeoExtent) -> MetaTile<'a> {
		let scale_bias = child_extent.scale_bias_to(&center_key.extent());
		let size = i64::from(center.image().width());
		MetaTile {
			layer,
			io,
			center_key,
			center,
			size,
			scale: DVec2::new(scale_bias.x_axis.x, scale_bias.y_axis.y),
			bias: DVec2::new(scale_bias.w_axis.x, scale_bias.w_axis.y),
			neighbors: RefCell::new(HashMap::new()),
		}
	}

	/// Reads the pixel at child-space coordinates, which may run past the
	/// tile border in any direction.
	fn read(&self, child_col: i64, child_row: i64) -> DVec4 {
		let size = self.size as f64;

		// child pixel center -> parent pixel, via the unit-square scale/bias
		// (u from the west edge, v from the south edge)
		let u_child = (child_col as f64 + 0.5) / size;
		let v_child = 1.0 - (child_row as f64 + 0.5) / size;
		let u_parent = u_child * self.scale.x + self.bias.x;
		let v_parent = v_child * self.scale.y + self.bias.y;

		let parent_col = (u_parent * size - 0.5).round() as i64;
		let parent_row = ((1.0 - v_parent) * size - 0.5).round() as i64;

		let dx = parent_col.div_euclid(self.size);
		let dy = parent_row.div_euclid(self.size);
		let col = parent_col.rem_euclid(self.size) as u32;
		let row = parent_row.rem_euclid(self.size) as u32;

		if dx == 0 && dy == 0 {
			return self.center.image().read(col, row);
		}

		let mut neighbors = self.neighbors.borrow_mut();
		let entry = neighbors.entry((dx, dy)).or_insert_with(|| {
			let neighbor_key = self.center_key.neighbor(dx, dy);
			self.layer.create_image(&neighbor_key, self.io).into_value()
		});
		entry.as_ref().map_or(DVec4::ZERO, |image| image.image().read(col, row))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use rocky_core::{Error, Srs};
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering as AtomicOrdering},
	};
	use std::{thread, time::Duration};

	/// Rasterizes `value = longitude°` over its profile, with configurable
	/// latency, per-key failures, and a fetch counter.
	struct GradientSource {
		profile: Profile,
		tile_size: u32,
		fetches: Arc<AtomicUsize>,
		delay: Duration,
		fail_keys: Vec<(u32, u32, u32)>,
	}

	impl GradientSource {
		fn geographic(tile_size: u32) -> GradientSource {
			GradientSource {
				profile: Profile::global_geodetic(),
				tile_size,
				fetches: Arc::new(AtomicUsize::new(0)),
				delay: Duration::ZERO,
				fail_keys: Vec::new(),
			}
		}

		fn mercator(tile_size: u32) -> GradientSource {
			GradientSource {
				profile: Profile::spherical_mercator(),
				tile_size,
				fetches: Arc::new(AtomicUsize::new(0)),
				delay: Duration::ZERO,
				fail_keys: Vec::new(),
			}
		}
	}

	impl ImageSource for GradientSource {
		fn open(&mut self, _io: &IoControl) -> Result<Profile, Error> {
			Ok(self.profile.clone())
		}

		fn fetch_image(&self, key: &TileKey, _io: &IoControl) -> IoResult<GeoImage> {
			self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
			if !self.delay.is_zero() {
				thread::sleep(self.delay);
			}
			if self.fail_keys.contains(&(key.lod(), key.x(), key.y())) {
				return IoResult::not_found();
			}

			let extent = key.extent();
			let geographic = Srs::geographic();
			let e = extent.clone();
			let size = self.tile_size;
			let srs = extent.srs().clone();
			let img = Image::r32f_from_fn(size, size, move |col, row| {
				let x = e.x_min + (f64::from(col) + 0.5) / f64::from(size) * e.width();
				let y = e.y_max - (f64::from(row) + 0.5) / f64::from(size) * e.height();
				srs.transform(&geographic, glam::DVec3::new(x, y, 0.0)).map_or(0.0, |p| p.x)
			});
			IoResult::ok(GeoImage::new(img, extent).unwrap())
		}
	}

	fn open_layer(source: GradientSource, options: ImageLayerOptions) -> ImageLayer {
		let layer = ImageLayer::new(options, Box::new(source));
		assert!(layer.open(&IoControl::new()).is_ok());
		layer
	}

	#[test]
	fn closed_layer_returns_not_found() {
		let layer = ImageLayer::new(ImageLayerOptions::default(), Box::new(GradientSource::geographic(8)));
		let key = TileKey::new(1, 0, 0, Profile::global_geodetic()).unwrap();
		let r = layer.create_image(&key, &IoControl::new());
		assert!(!r.is_ok());
	}

	#[test]
	fn open_is_idempotent_and_fires_once() {
		let layer = ImageLayer::new(ImageLayerOptions::default(), Box::new(GradientSource::geographic(8)));
		let opened = Arc::new(AtomicUsize::new(0));
		let o = opened.clone();
		layer.core().on_opened.add(move |_| {
			o.fetch_add(1, AtomicOrdering::SeqCst);
		});

		assert!(layer.open(&IoControl::new()).is_ok());
		assert!(layer.open(&IoControl::new()).is_ok());
		assert_eq!(opened.load(AtomicOrdering::SeqCst), 1);
		assert!(layer.profile().is_some());
	}

	#[test]
	fn in_profile_fast_path_returns_the_key_extent() {
		let layer = open_layer(GradientSource::geographic(16), ImageLayerOptions::default());
		let key = TileKey::new(2, 4, 0, Profile::global_geodetic()).unwrap();
		let r = layer.create_image(&key, &IoControl::new());
		let image = r.value().unwrap();
		assert_eq!(*image.extent(), key.extent());
		// center pixel carries the center longitude
		let c = image.extent().center();
		assert_abs_diff_eq!(image.sample(c.x, c.y, true).unwrap().x, 22.5, epsilon = 2.0);
	}

	#[test]
	fn out_of_range_keys_are_refused() {
		let options = ImageLayerOptions {
			min_level: 2,
			max_level: 4,
			..ImageLayerOptions::default()
		};
		let layer = open_layer(GradientSource::geographic(8), options);
		let low = TileKey::new(1, 0, 0, Profile::global_geodetic()).unwrap();
		let high = TileKey::new(5, 0, 0, Profile::global_geodetic()).unwrap();
		assert!(!layer.create_image(&low, &IoControl::new()).is_ok());
		assert!(!layer.create_image(&high, &IoControl::new()).is_ok());
	}

	#[test]
	fn second_read_comes_from_cache() {
		let source = GradientSource::geographic(8);
		let fetches = source.fetches.clone();
		let layer = open_layer(source, ImageLayerOptions::default());
		let key = TileKey::new(1, 1, 0, Profile::global_geodetic()).unwrap();

		let first = layer.create_image(&key, &IoControl::new());
		assert!(first.is_ok());
		assert!(!first.from_cache);

		let second = layer.create_image(&key, &IoControl::new());
		assert!(second.is_ok());
		assert!(second.from_cache);
		assert_eq!(fetches.load(AtomicOrdering::SeqCst), 1);
	}

	#[test]
	fn revision_bump_invalidates_the_cache_key() {
		let source = GradientSource::geographic(8);
		let fetches = source.fetches.clone();
		let layer = open_layer(source, ImageLayerOptions::default());
		let key = TileKey::new(1, 1, 0, Profile::global_geodetic()).unwrap();

		assert!(layer.create_image(&key, &IoControl::new()).is_ok());
		layer.set_coverage(true);
		assert!(layer.create_image(&key, &IoControl::new()).is_ok());
		assert_eq!(fetches.load(AtomicOrdering::SeqCst), 2);
	}

	#[test]
	fn single_flight_dedup() {
		let source = GradientSource {
			delay: Duration::from_millis(30),
			..GradientSource::geographic(8)
		};
		let fetches = source.fetches.clone();
		let layer = Arc::new(open_layer(source, ImageLayerOptions::default()));
		let key = TileKey::new(3, 5, 2, Profile::global_geodetic()).unwrap();

		let mut handles = Vec::new();
		for _ in 0..8 {
			let layer = layer.clone();
			let key = key.clone();
			handles.push(thread::spawn(move || {
				let r = layer.create_image(&key, &IoControl::new());
				assert!(r.is_ok());
				r.value().unwrap().image().data().to_vec()
			}));
		}
		let results: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

		// the source was consulted exactly once; all callers observed it
		assert_eq!(fetches.load(AtomicOrdering::SeqCst), 1);
		for r in &results[1..] {
			assert_eq!(r, &results[0]);
		}
	}

	#[test]
	fn cancellation_is_observed() {
		let layer = open_layer(GradientSource::geographic(8), ImageLayerOptions::default());
		let key = TileKey::new(2, 0, 0, Profile::global_geodetic()).unwrap();
		let io = IoControl::new();
		io.cancel();
		let r = layer.create_image(&key, &io);
		assert!(r.is_canceled());
		assert!(r.status.is_ok());
	}

	#[test]
	fn assemble_reproduces_the_direct_rasterization() {
		// mercator source, geographic request: mosaic + reproject must agree
		// with rasterizing the gradient directly in the request SRS
		let options = ImageLayerOptions {
			tile_size: 32,
			..ImageLayerOptions::default()
		};
		let layer = open_layer(GradientSource::mercator(32), options);

		let key = TileKey::new(2, 4, 1, Profile::global_geodetic()).unwrap();
		let r = layer.create_image(&key, &IoControl::new());
		let image = r.value().expect("assembled image");

		assert_eq!(*image.extent(), key.extent());
		assert_eq!(image.image().width(), 32);

		// probe pixel centers away from the tile border
		let e = image.extent();
		for (u, v) in [(0.3, 0.4), (0.5, 0.5), (0.7, 0.6)] {
			let x = e.x_min + u * e.width();
			let y = e.y_min + v * e.height();
			let got = image.sample(x, y, true).unwrap().x;
			assert_abs_diff_eq!(got, x, epsilon = 1.5);
		}
	}

	#[test]
	fn assemble_falls_back_to_cropped_ancestors() {
		// geographic (2,4,0) assembles from mercator (2,2,0) and (2,2,1);
		// fail the first so it must be patched with a crop of its parent
		let source = GradientSource {
			fail_keys: vec![(2, 2, 0)],
			..GradientSource::mercator(32)
		};
		let options = ImageLayerOptions {
			tile_size: 32,
			..ImageLayerOptions::default()
		};
		let layer = open_layer(source, options);

		let key = TileKey::new(2, 4, 0, Profile::global_geodetic()).unwrap();
		let r = layer.create_image(&key, &IoControl::new());
		let image = r.value().expect("patched image");
		assert_eq!(*image.extent(), key.extent());

		// lat 75° lies in the failed cell; it still carries gradient data,
		// sourced from the cropped parent
		let probe = image.sample(22.5, 75.0, true).unwrap().x;
		assert_abs_diff_eq!(probe, 22.5, epsilon = 6.0);
	}

	#[test]
	fn assemble_with_no_data_above_root_fails() {
		let source = GradientSource {
			fail_keys: vec![(2, 2, 0), (2, 2, 1), (1, 1, 0), (0, 0, 0)],
			..GradientSource::mercator(16)
		};
		let options = ImageLayerOptions {
			tile_size: 16,
			..ImageLayerOptions::default()
		};
		let layer = open_layer(source, options);

		let key = TileKey::new(2, 4, 0, Profile::global_geodetic()).unwrap();
		assert!(!layer.create_image(&key, &IoControl::new()).is_ok());
	}

	#[test]
	fn fractal_upsample_is_deterministic() {
		let make = || {
			let options = ImageLayerOptions {
				tile_size: 17,
				max_data_level: 2,
				upsample: true,
				..ImageLayerOptions::default()
			};
			open_layer(GradientSource::geographic(17), options)
		};
		let key = TileKey::new(3, 9, 3, Profile::global_geodetic()).unwrap();

		let a = make().create_image(&key, &IoControl::new());
		let b = make().create_image(&key, &IoControl::new());

		let a = a.value().expect("upsampled image");
		let b = b.value().expect("upsampled image");
		assert_eq!(a.image().data(), b.image().data());
		assert_eq!(*a.extent(), key.extent());
	}

	#[test]
	fn upsample_only_applies_past_the_data_level() {
		let source = GradientSource::geographic(9);
		let fetches = source.fetches.clone();
		let options = ImageLayerOptions {
			tile_size: 9,
			max_data_level: 4,
			upsample: true,
			l2_cache_size: 0,
			..ImageLayerOptions::default()
		};
		let layer = open_layer(source, options);

		let shallow = TileKey::new(3, 1, 1, Profile::global_geodetic()).unwrap();
		assert!(!layer.wants_fractal_upsample(&shallow));
		assert!(layer.create_image(&shallow, &IoControl::new()).is_ok());
		assert_eq!(fetches.load(AtomicOrdering::SeqCst), 1);

		let deep = TileKey::new(5, 4, 4, Profile::global_geodetic()).unwrap();
		assert!(layer.wants_fractal_upsample(&deep));
	}

	#[test]
	fn coverage_layers_use_nearest_sampling() {
		let layer = open_layer(GradientSource::mercator(8), ImageLayerOptions::default());
		layer.set_coverage(true);
		assert!(layer.is_open());
		assert!(layer.is_coverage());
		assert_eq!(layer.compression_method(), "none");

		let key = TileKey::new(2, 4, 1, Profile::global_geodetic()).unwrap();
		// the pipeline still produces a full tile with nearest resampling
		assert!(layer.create_image(&key, &IoControl::new()).is_ok());
	}

	#[test]
	fn close_sets_resource_unavailable() {
		let layer = open_layer(GradientSource::geographic(8), ImageLayerOptions::default());
		assert!(layer.is_open());
		layer.close();
		assert!(!layer.is_open());
		assert_eq!(layer.status().error_ref().unwrap().kind, ErrorKind::ResourceUnavailable);
	}

	#[test]
	fn options_config_round_trip() {
		let options = ImageLayerOptions {
			name: "imagery".into(),
			coverage: true,
			upsample: true,
			max_data_level: 12,
			tile_size: 17,
			..ImageLayerOptions::default()
		};
		let back = ImageLayerOptions::from_config(&options.to_config());
		assert_eq!(back.name, "imagery");
		assert!(back.coverage);
		assert!(back.upsample);
		assert_eq!(back.max_data_level, 12);
		assert_eq!(back.tile_size, 17);
	}
}
