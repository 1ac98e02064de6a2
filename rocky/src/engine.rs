//! The engine value tying the data model to the terrain machinery.

use anyhow::Result;
use rocky_map::Map;
use rocky_terrain::{GeometryPool, SelectionInfo, TerrainSettings};

/// Explicit owner of the state that would otherwise live in process-wide
/// singletons: the terrain settings, the shared geometry pool, and the
/// selection ladder built for the map's profile. Pass it by reference to
/// whatever drives tile residency.
pub struct Engine {
	pub settings: TerrainSettings,
	pub geometry_pool: GeometryPool,
	pub selection_info: SelectionInfo,
}

impl Engine {
	pub fn new(map: &Map, settings: TerrainSettings) -> Result<Engine> {
		let geometry_pool = GeometryPool::new(&settings);
		let selection_info = SelectionInfo::new(
			settings.first_lod,
			settings.max_lod,
			map.profile(),
			settings.min_tile_range_factor,
			settings.restrict_polar_subdivision,
		)?;
		Ok(Engine {
			settings,
			geometry_pool,
			selection_info,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rocky_core::Profile;

	#[test]
	fn engine_builds_for_the_map_profile() {
		let map = Map::new(Profile::global_geodetic());
		let engine = Engine::new(&map, TerrainSettings::default()).unwrap();
		assert_eq!(engine.selection_info.num_lods(), engine.settings.max_lod + 1);
		assert!(engine.geometry_pool.is_empty());
	}

	#[test]
	fn bad_settings_are_rejected() {
		let map = Map::new(Profile::global_geodetic());
		let settings = TerrainSettings {
			first_lod: 10,
			max_lod: 5,
			..TerrainSettings::default()
		};
		assert!(Engine::new(&map, settings).is_err());
	}
}
