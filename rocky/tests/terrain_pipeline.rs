//! End-to-end scenarios across the map and terrain crates: a layered map
//! serving a mercator source to a geographic globe, driven by the selection
//! ladder and the geometry pool.

use approx::assert_abs_diff_eq;
use glam::DVec3;
use rocky::Engine;
use rocky::core::{Error, IoControl, IoResult, Profile, Srs, TileKey};
use rocky::image::{GeoImage, Image};
use rocky::map::{ImageLayer, ImageLayerOptions, ImageSource, Map};
use rocky::terrain::{SurfaceNode, TerrainSettings};
use std::sync::Arc;

/// A source serving `value = longitude°` tiles in the mercator pyramid.
struct MercatorGradient {
	tile_size: u32,
}

impl ImageSource for MercatorGradient {
	fn open(&mut self, _io: &IoControl) -> Result<Profile, Error> {
		Ok(Profile::spherical_mercator())
	}

	fn fetch_image(&self, key: &TileKey, _io: &IoControl) -> IoResult<GeoImage> {
		let extent = key.extent();
		let geographic = Srs::geographic();
		let e = extent.clone();
		let srs = extent.srs().clone();
		let size = self.tile_size;
		let img = Image::r32f_from_fn(size, size, move |col, row| {
			let x = e.x_min + (f64::from(col) + 0.5) / f64::from(size) * e.width();
			let y = e.y_max - (f64::from(row) + 0.5) / f64::from(size) * e.height();
			srs.transform(&geographic, DVec3::new(x, y, 0.0)).map_or(0.0, |p| p.x)
		});
		IoResult::ok(GeoImage::new(img, extent).unwrap())
	}
}

fn gradient_map(tile_size: u32) -> (Map, Arc<ImageLayer>) {
	let map = Map::new(Profile::global_geodetic());
	let layer = Arc::new(ImageLayer::new(
		ImageLayerOptions {
			name: "gradient".into(),
			tile_size,
			..ImageLayerOptions::default()
		},
		Box::new(MercatorGradient { tile_size }),
	));
	map.add_layer(layer.clone(), &IoControl::new());
	(map, layer)
}

#[test]
fn geographic_tile_assembled_from_a_mercator_layer() {
	let _ = env_logger::builder().is_test(true).try_init();

	let (map, layer) = gradient_map(64);
	assert!(layer.is_open());

	// the map profile drives the request keys; the layer profile differs
	let key = TileKey::new(2, 4, 0, map.profile().clone()).unwrap();
	let result = layer.create_image(&key, &IoControl::new());
	let tile = result.value().expect("assembled tile");

	// the output extent equals the request key's extent, at the layer's size
	assert_eq!(*tile.extent(), key.extent());
	assert_eq!(tile.image().width(), 64);
	assert_eq!(tile.image().height(), 64);

	// pixel centers carry the source function's value (lon 0..45, lat 45..90;
	// stay below the mercator latitude limit and off the border)
	for (lon, lat) in [(11.25, 50.0), (22.5, 67.5), (33.75, 80.0)] {
		let got = tile.sample(lon, lat, true).expect("inside the tile").x;
		assert_abs_diff_eq!(got, lon, epsilon = 1.5);
	}
}

#[test]
fn layer_enumeration_respects_revisions() {
	let (map, layer) = gradient_map(16);
	let (layers, revision_a) = map.open_layers();
	assert_eq!(layers.len(), 1);

	map.remove_layer(&layer);
	let (layers, revision_b) = map.open_layers();
	assert!(layers.is_empty());
	assert!(revision_b > revision_a);
}

#[test]
fn selection_drives_pool_and_surface() {
	let map = Map::new(Profile::global_geodetic());
	let settings = TerrainSettings {
		max_lod: 10,
		skirt_ratio: 0.02,
		..TerrainSettings::default()
	};
	let engine = Engine::new(&map, settings).unwrap();

	// an eye above the equator at 1000 km
	let ellipsoid = map.profile().srs().ellipsoid().clone();
	let eye = ellipsoid.geodetic_to_geocentric(DVec3::new(20.0, 0.0, 1_000_000.0));

	// walk the quadtree from the root, subdividing where the selection
	// ladder keeps a tile's children in range
	let mut frontier = vec![
		TileKey::new(0, 0, 0, map.profile().clone()).unwrap(),
		TileKey::new(0, 1, 0, map.profile().clone()).unwrap(),
	];
	let mut resident = Vec::new();

	while let Some(key) = frontier.pop() {
		let geometry = engine.geometry_pool.pooled_geometry(&key, &engine.settings);
		let node = SurfaceNode::new(key.clone(), geometry);

		let (range, _, _) = engine.selection_info.get(&key.child(0));
		let subdivide = range > 0.0 && key.lod() < 4 && node.any_child_box_within_range(eye, range);
		if subdivide {
			for q in 0..4 {
				frontier.push(key.child(q));
			}
		} else {
			resident.push(node);
		}
	}

	// the walk terminates with a mixed-LOD frontier that includes
	// subdivision near the eye
	assert!(resident.len() > 2);
	let deepest = resident.iter().map(|n| n.tile_key().lod()).max().unwrap();
	assert_eq!(deepest, 4);

	// geometry sharing held across the resident set: distinct shapes only
	let shapes = engine.geometry_pool.len();
	assert!(shapes < resident.len(), "pool must deduplicate {} tiles", resident.len());

	// tiles facing the eye pass the horizon test; the antipodal root fails
	let near = resident
		.iter()
		.find(|n| n.tile_key().extent().contains(20.0, -1.0))
		.expect("a tile under the eye");
	assert!(near.is_visible_from(eye));

	let antipode = ellipsoid.geodetic_to_geocentric(DVec3::new(-160.0, 0.0, 1_000_000.0));
	assert!(!near.is_visible_from(antipode));
}

#[test]
fn polar_rows_are_not_selected_for_subdivision() {
	let map = Map::new(Profile::global_geodetic());
	let engine = Engine::new(&map, TerrainSettings::default()).unwrap();

	let polar = TileKey::new(10, 0, 0, map.profile().clone()).unwrap();
	assert_eq!(engine.selection_info.get(&polar), (0.0, 0.0, 0.0));

	let (_, ty) = map.profile().num_tiles(10);
	let equatorial = TileKey::new(10, 0, ty / 2, map.profile().clone()).unwrap();
	let (range, _, _) = engine.selection_info.get(&equatorial);
	assert!(range > 0.0);
}
