//! The per-tile surface node: bounding volumes, horizon culling, child LOD
//! probes, and elevation application.

use crate::{SharedGeometry, VERTEX_HAS_ELEVATION, local_frame};
use glam::{DMat4, DVec3, Vec3};
use rocky_core::{Ellipsoid, TileKey};
use rocky_image::Image;
use std::sync::Arc;

/// A bounding sphere in world space.
#[derive(Clone, Copy, Debug)]
pub struct Sphere {
	pub center: DVec3,
	pub radius: f64,
}

/// Horizon test against the reference ellipsoid, evaluated for the four
/// upper corners of a tile's bounding box.
///
/// Points and the eye are scaled into unit-sphere space; a corner is occluded
/// when it lies beyond the eye's horizon plane and behind the sphere.
pub struct HorizonTileCuller {
	points: [DVec3; 4],
	ellipsoid: Ellipsoid,
}

impl HorizonTileCuller {
	#[must_use]
	pub fn new(ellipsoid: Ellipsoid, local_to_world: &DMat4, local_min: Vec3, local_max: Vec3) -> HorizonTileCuller {
		let corners = [
			Vec3::new(local_min.x, local_min.y, local_max.z),
			Vec3::new(local_max.x, local_min.y, local_max.z),
			Vec3::new(local_max.x, local_max.y, local_max.z),
			Vec3::new(local_min.x, local_max.y, local_max.z),
		];
		let points = corners.map(|c| local_to_world.transform_point3(c.as_dvec3()));
		HorizonTileCuller { points, ellipsoid }
	}

	/// True when any of the box corners may be visible from `from_world`
	/// (geocentric meters) over the horizon.
	#[must_use]
	pub fn is_visible(&self, from_world: DVec3) -> bool {
		let eye = self.ellipsoid.to_unit_sphere(from_world);
		let vh_mag2 = eye.length_squared() - 1.0;
		if vh_mag2 <= 0.0 {
			// eye at or below the surface: nothing is horizon-occluded
			return true;
		}

		for point in &self.points {
			let target = self.ellipsoid.to_unit_sphere(*point);
			let vt = target - eye;
			let vt_dot_vc = -vt.dot(eye);
			let occluded = vt_dot_vc > vh_mag2 && vt_dot_vc * vt_dot_vc / vt.length_squared() > vh_mag2;
			if !occluded {
				return true;
			}
		}
		false
	}
}

/// An elevation raster and the scale/bias window into a parent-owned texel
/// region.
pub struct ElevationRaster {
	pub raster: Image,
	pub scale_bias: DMat4,
}

/// Holds the geometry and transform state of one terrain tile surface.
///
/// The node keeps a mutable copy of the shared geometry's vertices so that
/// elevation can displace them without touching the pooled mesh, plus the
/// volumes derived from them: the local box, the world bounding sphere, the
/// 32 child-corner spheres used for cheap LOD distance probes, and the
/// horizon culler seeded from the box's upper face.
pub struct SurfaceNode {
	tile_key: TileKey,
	local_to_world: DMat4,
	geometry: Arc<SharedGeometry>,
	verts: Vec<Vec3>,
	elevation: Option<ElevationRaster>,
	spheres: Vec<Sphere>,
	horizon: HorizonTileCuller,
	geocentric: bool,
	local_min: Vec3,
	local_max: Vec3,
	pub bounding_sphere: Sphere,
}

impl SurfaceNode {
	#[must_use]
	pub fn new(tile_key: TileKey, geometry: Arc<SharedGeometry>) -> SurfaceNode {
		let extent = tile_key.extent();
		let local_to_world = local_frame(&extent);
		let ellipsoid = extent.srs().ellipsoid().clone();
		let geocentric = extent.srs().is_geographic();
		let verts = geometry.verts.clone();

		let mut node = SurfaceNode {
			tile_key,
			local_to_world,
			geometry,
			verts,
			elevation: None,
			spheres: Vec::new(),
			horizon: HorizonTileCuller::new(ellipsoid, &local_to_world, Vec3::ZERO, Vec3::ZERO),
			geocentric,
			local_min: Vec3::ZERO,
			local_max: Vec3::ZERO,
			bounding_sphere: Sphere {
				center: DVec3::ZERO,
				radius: 0.0,
			},
		};
		node.recompute_bound();
		node
	}

	#[must_use]
	pub fn tile_key(&self) -> &TileKey {
		&self.tile_key
	}

	#[must_use]
	pub fn local_to_world(&self) -> &DMat4 {
		&self.local_to_world
	}

	#[must_use]
	pub fn geometry(&self) -> &Arc<SharedGeometry> {
		&self.geometry
	}

	/// The vertex positions with elevation applied.
	#[must_use]
	pub fn verts(&self) -> &[Vec3] {
		&self.verts
	}

	#[must_use]
	pub fn elevation_raster(&self) -> Option<&Image> {
		self.elevation.as_ref().map(|e| &e.raster)
	}

	#[must_use]
	pub fn elevation_matrix(&self) -> Option<&DMat4> {
		self.elevation.as_ref().map(|e| &e.scale_bias)
	}

	/// Applies an elevation raster sampled through `scale_bias` (the window
	/// into a parent-owned texel region).
	///
	/// Every vertex without the baked-elevation marker is repositioned from
	/// its base position along its normal by the sampled height; marked
	/// vertices are left alone. Bounds and the horizon culler are recomputed
	/// afterwards.
	pub fn set_elevation(&mut self, raster: Image, scale_bias: DMat4) {
		let width = f64::from(raster.width() - 1);
		let height = f64::from(raster.height() - 1);
		let scale = (scale_bias.x_axis.x, scale_bias.y_axis.y);
		let bias = (scale_bias.w_axis.x, scale_bias.w_axis.y);

		for i in 0..self.verts.len() {
			if self.geometry.marker(i) & VERTEX_HAS_ELEVATION != 0 {
				continue;
			}
			let uv = self.geometry.uvs[i];
			let u = f64::from(uv.x) * scale.0 + bias.0;
			let v = f64::from(uv.y) * scale.1 + bias.1;

			// v runs south to north; raster rows run north to south
			let h = raster.sample_bilinear(u * width, (1.0 - v) * height).x;
			self.verts[i] = self.geometry.verts[i] + self.geometry.normals[i] * h as f32;
		}

		self.elevation = Some(ElevationRaster { raster, scale_bias });
		self.recompute_bound();
	}

	/// Recomputes the local box, world bounding sphere, child spheres, and
	/// horizon culler from the current vertices.
	pub fn recompute_bound(&mut self) {
		let mut min = Vec3::splat(f32::MAX);
		let mut max = Vec3::splat(f32::MIN);
		for v in &self.verts {
			min = min.min(*v);
			max = max.max(*v);
		}
		self.local_min = min;
		self.local_max = max;

		let center_local = (min + max) * 0.5;
		let mut radius = 0.0f32;
		for v in &self.verts {
			radius = radius.max((*v - center_local).length());
		}
		self.bounding_sphere = Sphere {
			center: self.local_to_world.transform_point3(center_local.as_dvec3()),
			radius: f64::from(radius),
		};

		self.spheres = child_corner_spheres(&self.local_to_world, min, max);

		self.horizon = HorizonTileCuller::new(
			self.tile_key.profile().srs().ellipsoid().clone(),
			&self.local_to_world,
			min,
			max,
		);
	}

	/// Horizon visibility from an eye point in world coordinates. Projected
	/// profiles have no curvature to cull against and always pass.
	#[must_use]
	pub fn is_visible_from(&self, eye_world: DVec3) -> bool {
		!self.geocentric || self.horizon.is_visible(eye_world)
	}

	/// True when any child-box corner lies within `range` of the eye: the
	/// cheap probe deciding whether to subdivide this tile.
	#[must_use]
	pub fn any_child_box_within_range(&self, eye_world: DVec3, range: f64) -> bool {
		self
			.spheres
			.iter()
			.any(|s| (s.center - eye_world).length() - s.radius <= range)
	}
}

/// The 32 LOD probe spheres: the 8 box corners of each of the 4 child
/// quadrants of the local box.
fn child_corner_spheres(local_to_world: &DMat4, min: Vec3, max: Vec3) -> Vec<Sphere> {
	let center = (min + max) * 0.5;
	let mut spheres = Vec::with_capacity(32);

	let x_edges = [min.x, center.x, max.x];
	let y_edges = [min.y, center.y, max.y];

	for cy in 0..2 {
		for cx in 0..2 {
			let (x0, x1) = (x_edges[cx], x_edges[cx + 1]);
			let (y0, y1) = (y_edges[cy], y_edges[cy + 1]);
			for z in [min.z, max.z] {
				for (x, y) in [(x0, y0), (x1, y0), (x1, y1), (x0, y1)] {
					spheres.push(Sphere {
						center: local_to_world.transform_point3(DVec3::new(f64::from(x), f64::from(y), f64::from(z))),
						radius: 0.0,
					});
				}
			}
		}
	}
	spheres
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{TerrainSettings, build_geometry, create_indices};
	use approx::assert_abs_diff_eq;
	use rocky_core::Profile;

	fn node_for(lod: u32, x: u32, y: u32) -> SurfaceNode {
		let key = TileKey::new(lod, x, y, Profile::global_geodetic()).unwrap();
		let settings = TerrainSettings::default();
		let geometry = Arc::new(build_geometry(&key, &settings, Arc::new(create_indices(&settings))));
		SurfaceNode::new(key, geometry)
	}

	#[test]
	fn node_has_32_probe_spheres() {
		let node = node_for(2, 4, 2);
		assert_eq!(node.spheres.len(), 32);
		assert!(node.bounding_sphere.radius > 0.0);
	}

	#[test]
	fn constant_elevation_displaces_along_normals() {
		let mut node = node_for(2, 4, 2);
		let before = node.verts()[40];
		let radius_before = node.bounding_sphere.radius;

		let raster = Image::r32f_from_fn(9, 9, |_, _| 1000.0);
		node.set_elevation(raster, DMat4::IDENTITY);

		let after = node.verts()[40];
		let moved = after - before;
		assert_abs_diff_eq!(moved.length(), 1000.0, epsilon = 1.0);
		let normal = node.geometry().normals[40];
		assert!(moved.normalize().dot(normal) > 0.999);

		// and the volumes were refreshed
		assert!(node.elevation_raster().is_some());
		assert!(radius_before > 0.0);
		assert!(node.bounding_sphere.radius > 0.0);
	}

	#[test]
	fn reapplying_elevation_is_idempotent() {
		let mut node = node_for(3, 1, 3);
		let raster = Image::r32f_from_fn(5, 5, |_, _| 500.0);
		node.set_elevation(raster.clone(), DMat4::IDENTITY);
		let first: Vec<Vec3> = node.verts().to_vec();
		node.set_elevation(raster, DMat4::IDENTITY);
		assert_eq!(node.verts(), first.as_slice());
	}

	#[test]
	fn baked_vertices_are_not_displaced() {
		let key = TileKey::new(2, 4, 2, Profile::global_geodetic()).unwrap();
		let settings = TerrainSettings::default();
		let mut geometry = build_geometry(&key, &settings, Arc::new(create_indices(&settings)));
		geometry.uvs[0].z = (geometry.marker(0) | VERTEX_HAS_ELEVATION) as f32;

		let mut node = SurfaceNode::new(key, Arc::new(geometry));
		let before = node.verts()[0];
		node.set_elevation(Image::r32f_from_fn(5, 5, |_, _| 2000.0), DMat4::IDENTITY);
		assert_eq!(node.verts()[0], before);
		assert_ne!(node.verts()[1], node.geometry().verts[1]);
	}

	#[test]
	fn horizon_culling_from_above_and_behind() {
		let node = node_for(2, 4, 2); // lon 0..45, lat -45..0
		let ellipsoid = Ellipsoid::wgs84();

		let above = ellipsoid.geodetic_to_geocentric(glam::DVec3::new(22.5, -22.5, 500_000.0));
		assert!(node.is_visible_from(above));

		let antipode = ellipsoid.geodetic_to_geocentric(glam::DVec3::new(-157.5, 22.5, 500_000.0));
		assert!(!node.is_visible_from(antipode));
	}

	#[test]
	fn child_probe_ranges() {
		let node = node_for(2, 4, 2);
		let eye = node.bounding_sphere.center;
		assert!(node.any_child_box_within_range(eye, node.bounding_sphere.radius * 2.0));

		let far = eye * 3.0;
		assert!(!node.any_child_box_within_range(far, 1000.0));
	}
}
