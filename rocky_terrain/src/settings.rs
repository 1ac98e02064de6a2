//! Terrain engine tuning knobs.

use rocky_core::Config;

/// Settings controlling tile subdivision, mesh construction, and unloading.
///
/// The feature toggles the original build read from environment variables
/// (pool enable/debug) live here as plain fields, carried by the engine value
/// instead of process-global state.
#[derive(Clone, Debug)]
pub struct TerrainSettings {
	/// Vertices per tile edge; odd, typically 17.
	pub tile_size: u32,
	/// Multiplier on a tile's bounding radius that sets its visibility range.
	pub min_tile_range_factor: f64,
	pub first_lod: u32,
	pub min_lod: u32,
	pub max_lod: u32,
	/// Downward skirt depth as a fraction of the tile bounding radius;
	/// 0 disables skirts.
	pub skirt_ratio: f32,
	/// Build the per-vertex morph arrays used to hide LOD transitions.
	pub morph_terrain: bool,
	pub morph_imagery: bool,
	/// Pixel size of reprojected tile textures.
	pub tile_pixel_size: u32,
	/// Worker threads feeding the tile pipeline.
	pub concurrency: u32,
	/// Limit subdivision at high latitudes in geographic profiles.
	pub restrict_polar_subdivision: bool,
	/// Share tile meshes through the geometry pool.
	pub pool_enabled: bool,
	pub pool_debug: bool,
}

impl Default for TerrainSettings {
	fn default() -> Self {
		TerrainSettings {
			tile_size: 17,
			min_tile_range_factor: 7.0,
			first_lod: 0,
			min_lod: 0,
			max_lod: 19,
			skirt_ratio: 0.0,
			morph_terrain: true,
			morph_imagery: true,
			tile_pixel_size: 256,
			concurrency: 4,
			restrict_polar_subdivision: true,
			pool_enabled: true,
			pool_debug: false,
		}
	}
}

impl TerrainSettings {
	#[must_use]
	pub fn from_config(conf: &Config) -> TerrainSettings {
		let defaults = TerrainSettings::default();
		TerrainSettings {
			tile_size: conf.value_of("tile_size", defaults.tile_size),
			min_tile_range_factor: conf.value_of("min_tile_range_factor", defaults.min_tile_range_factor),
			first_lod: conf.value_of("first_lod", defaults.first_lod),
			min_lod: conf.value_of("min_lod", defaults.min_lod),
			max_lod: conf.value_of("max_lod", defaults.max_lod),
			skirt_ratio: conf.value_of("skirt_ratio", defaults.skirt_ratio),
			morph_terrain: conf.value_of("morph_terrain", defaults.morph_terrain),
			morph_imagery: conf.value_of("morph_imagery", defaults.morph_imagery),
			tile_pixel_size: conf.value_of("tile_pixel_size", defaults.tile_pixel_size),
			concurrency: conf.value_of("concurrency", defaults.concurrency),
			restrict_polar_subdivision: conf.value_of("restrict_polar", defaults.restrict_polar_subdivision),
			pool_enabled: conf.value_of("pool_enabled", defaults.pool_enabled),
			pool_debug: conf.value_of("pool_debug", defaults.pool_debug),
		}
	}
}
