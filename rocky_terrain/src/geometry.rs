//! Tile surface mesh construction.
//!
//! A tile mesh depends only on its shape: LOD, tile size, and (in a
//! geographic profile) the latitude row. Meshes are built in the tile's local
//! frame so tiles across a row can share one geometry.

use crate::TerrainSettings;
use glam::{DMat4, DVec3, Vec3};
use rocky_core::{GeoExtent, TileKey};
use std::sync::Arc;

/// Marker bits carried in the Z component of each UV.
pub const VERTEX_VISIBLE: u32 = 1;
/// The vertex belongs to the skirt ring.
pub const VERTEX_SKIRT: u32 = 2;
/// The vertex has a baked elevation that must not be overwritten.
pub const VERTEX_HAS_ELEVATION: u32 = 4;

/// Identity of a shareable tile mesh.
///
/// `tile_y` participates only for geographic profiles, where the mesh varies
/// with latitude; in a projected profile every tile of an LOD has the same
/// local-space shape. Tile X never participates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryKey {
	pub lod: u32,
	pub tile_y: u32,
	pub size: u32,
}

impl GeometryKey {
	#[must_use]
	pub fn for_tile_key(key: &TileKey, tile_size: u32) -> GeometryKey {
		GeometryKey {
			lod: key.lod(),
			tile_y: if key.profile().srs().is_geographic() { key.y() } else { 0 },
			size: tile_size,
		}
	}
}

/// A deduplicated tile surface mesh in tile-local space.
///
/// The vertex arrays include the optional morph-neighbor data and keep CPU
/// copies alive for computing per-tile bounding volumes after elevation is
/// applied. The index buffer is shape-independent and shared across all
/// geometries built with the same settings.
pub struct SharedGeometry {
	pub verts: Vec<Vec3>,
	pub normals: Vec<Vec3>,
	/// UV in x/y; marker bits in z.
	pub uvs: Vec<Vec3>,
	pub neighbors: Option<Vec<Vec3>>,
	pub neighbor_normals: Option<Vec<Vec3>>,
	pub indices: Arc<Vec<u16>>,
	/// Bounding radius of the un-displaced surface, in local units.
	pub bound_radius: f32,
}

impl SharedGeometry {
	#[must_use]
	pub fn vertex_count(&self) -> usize {
		self.verts.len()
	}

	#[must_use]
	pub fn triangle_count(&self) -> usize {
		self.indices.len() / 3
	}

	#[must_use]
	pub fn marker(&self, index: usize) -> u32 {
		self.uvs[index].z as u32
	}
}

/// Vertices in the surface grid, excluding skirts.
fn surface_vertex_count(tile_size: u32) -> u32 {
	tile_size * tile_size
}

/// Vertices added by the skirt ring: two per perimeter step.
fn skirt_vertex_count(tile_size: u32, skirt_ratio: f32) -> u32 {
	if skirt_ratio > 0.0 { (tile_size - 1) * 2 * 4 } else { 0 }
}

fn skirt_index_count(tile_size: u32, skirt_ratio: f32) -> u32 {
	if skirt_ratio > 0.0 { (tile_size - 1) * 4 * 6 } else { 0 }
}

/// Morph neighbor rule: each vertex morphs toward the previously emitted
/// vertex of the next-coarser grid parity.
fn morph_neighbor_index_offset(col: u32, row: u32, tile_size: u32) -> usize {
	if col & 1 == 1 && row & 1 == 1 {
		tile_size as usize + 2
	} else if row & 1 == 1 {
		tile_size as usize + 1
	} else if col & 1 == 1 {
		2
	} else {
		1
	}
}

/// Builds the shared index buffer for the given settings. Shape-independent:
/// it depends only on the tile size and whether skirts exist.
#[must_use]
pub fn create_indices(settings: &TerrainSettings) -> Vec<u16> {
	let tile_size = settings.tile_size;
	assert!(tile_size > 1, "tile size must be at least 2");

	let surface_verts = surface_vertex_count(tile_size);
	let skirt_verts = skirt_vertex_count(tile_size, settings.skirt_ratio);
	let surface_indices = (tile_size - 1) * (tile_size - 1) * 6;
	let skirt_indices = skirt_index_count(tile_size, settings.skirt_ratio);

	let mut indices = Vec::with_capacity((surface_indices + skirt_indices) as usize);

	for j in 0..tile_size - 1 {
		for i in 0..tile_size - 1 {
			let i00 = (j * tile_size + i) as u16;
			let i01 = i00 + tile_size as u16;
			let i10 = i00 + 1;
			let i11 = i01 + 1;

			indices.extend_from_slice(&[i01, i00, i11]);
			indices.extend_from_slice(&[i00, i10, i11]);
		}
	}

	if skirt_verts > 0 {
		let skirt_begin = surface_verts as u16;
		let skirt_end = skirt_begin + skirt_verts as u16;

		let mut quad = |i0: u16, i1: u16, out: &mut Vec<u16>| {
			out.extend_from_slice(&[i0, i0 + 1, i1, i1, i0 + 1, i1 + 1]);
		};

		let mut i = skirt_begin;
		while i < skirt_end - 3 {
			quad(i, i + 2, &mut indices);
			i += 2;
		}
		// close the ring back to the first pair
		quad(i, skirt_begin, &mut indices);
	}

	indices
}

/// Maps tile-unit coordinates into world space: a projected extent is a plain
/// scale and translate; a geographic extent additionally geodeticises
/// through the ellipsoid.
struct Locator {
	extent: GeoExtent,
	geographic: bool,
}

impl Locator {
	fn new(extent: GeoExtent) -> Locator {
		let geographic = extent.srs().is_geographic();
		Locator { extent, geographic }
	}

	fn unit_to_world(&self, unit: DVec3) -> DVec3 {
		let mapped = DVec3::new(
			self.extent.x_min + unit.x * self.extent.width(),
			self.extent.y_min + unit.y * self.extent.height(),
			unit.z,
		);
		if self.geographic {
			self.extent.srs().ellipsoid().geodetic_to_geocentric(mapped)
		} else {
			mapped
		}
	}
}

/// The tile-local reference frame: local-to-world at the extent centroid.
#[must_use]
pub fn local_frame(extent: &GeoExtent) -> DMat4 {
	let center = extent.center();
	if extent.srs().is_geographic() {
		let ellipsoid = extent.srs().ellipsoid();
		let world = ellipsoid.geodetic_to_geocentric(DVec3::new(center.x, center.y, 0.0));
		ellipsoid.geocentric_to_local_to_world(world)
	} else {
		DMat4::from_translation(DVec3::new(center.x, center.y, 0.0))
	}
}

/// Builds the surface mesh for a tile's shape.
///
/// Vertices lie on an `N`×`N` grid mapped through the profile locator and
/// into the local frame at the tile centroid. Each vertex carries an outward
/// normal and a marked UV; when morphing is on, the position and normal of
/// its next-even neighbor ride along. A positive skirt ratio extrudes the
/// perimeter downward, south → east → north → west.
#[must_use]
pub fn build_geometry(key: &TileKey, settings: &TerrainSettings, indices: Arc<Vec<u16>>) -> SharedGeometry {
	let tile_size = settings.tile_size;
	let needs_skirt = settings.skirt_ratio > 0.0;

	let num_surface = surface_vertex_count(tile_size) as usize;
	let num_verts = num_surface + skirt_vertex_count(tile_size, settings.skirt_ratio) as usize;

	let extent = key.extent();
	let locator = Locator::new(extent.clone());
	let world_to_local = local_frame(&extent).inverse();

	let mut verts: Vec<Vec3> = Vec::with_capacity(num_verts);
	let mut normals: Vec<Vec3> = Vec::with_capacity(num_verts);
	let mut uvs: Vec<Vec3> = Vec::with_capacity(num_verts);
	let mut neighbors: Option<Vec<Vec3>> = settings.morph_terrain.then(|| Vec::with_capacity(num_verts));
	let mut neighbor_normals: Option<Vec<Vec3>> = settings.morph_terrain.then(|| Vec::with_capacity(num_verts));

	let mut bound_min = DVec3::splat(f64::MAX);
	let mut bound_max = DVec3::splat(f64::MIN);

	for row in 0..tile_size {
		let ny = f64::from(row) / f64::from(tile_size - 1);
		for col in 0..tile_size {
			let nx = f64::from(col) / f64::from(tile_size - 1);

			let world = locator.unit_to_world(DVec3::new(nx, ny, 0.0));
			let local = world_to_local.transform_point3(world);
			verts.push(local.as_vec3());

			bound_min = bound_min.min(local);
			bound_max = bound_max.max(local);

			uvs.push(Vec3::new(nx as f32, ny as f32, VERTEX_VISIBLE as f32));

			let world_plus_one = locator.unit_to_world(DVec3::new(nx, ny, 1.0));
			let normal = (world_to_local.transform_point3(world_plus_one) - local).normalize();
			normals.push(normal.as_vec3());

			if let Some(neighbors) = &mut neighbors {
				let offset = morph_neighbor_index_offset(col, row, tile_size);
				neighbors.push(verts[verts.len() - offset]);
			}
			if let Some(neighbor_normals) = &mut neighbor_normals {
				let offset = morph_neighbor_index_offset(col, row, tile_size);
				neighbor_normals.push(normals[normals.len() - offset]);
			}
		}
	}

	let bound_center = (bound_min + bound_max) * 0.5;
	let mut bound_radius = 0.0f64;
	for v in &verts {
		bound_radius = bound_radius.max((v.as_dvec3() - bound_center).length());
	}

	if needs_skirt {
		let height = bound_radius as f32 * settings.skirt_ratio;

		let mut add_skirt_pair = |index: usize| {
			let base = verts[index];
			let normal = normals[index];
			let mut uv = uvs[index];
			uv.z = ((uv.z as u32) | VERTEX_SKIRT) as f32;

			let neighbor = neighbors.as_ref().map(|n| n[index]);
			let neighbor_normal = neighbor_normals.as_ref().map(|n| n[index]);

			verts.push(base);
			normals.push(normal);
			uvs.push(uv);
			verts.push(base - normal * height);
			normals.push(normal);
			uvs.push(uv);

			if let Some(neighbors) = &mut neighbors {
				let n = neighbor.unwrap_or(base);
				neighbors.push(n);
				neighbors.push(n - normal * height);
			}
			if let Some(neighbor_normals) = &mut neighbor_normals {
				let n = neighbor_normal.unwrap_or(normal);
				neighbor_normals.push(n);
				neighbor_normals.push(n);
			}
		};

		let n = tile_size as usize;
		for c in 0..n - 1 {
			add_skirt_pair(c); // south
		}
		for r in 0..n - 1 {
			add_skirt_pair(r * n + (n - 1)); // east
		}
		for c in (1..n).rev() {
			add_skirt_pair((n - 1) * n + c); // north
		}
		for r in (1..n).rev() {
			add_skirt_pair(r * n); // west
		}
	}

	SharedGeometry {
		verts,
		normals,
		uvs,
		neighbors,
		neighbor_normals,
		indices,
		bound_radius: bound_radius as f32,
	}
}
