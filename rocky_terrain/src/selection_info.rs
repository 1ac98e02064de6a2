//! The per-LOD selection ladder: visibility ranges, morphing bands, and the
//! polar subdivision clamp.

use anyhow::{Result, ensure};
use rocky_core::{Profile, TileKey};

const MORPH_START_RATIO: f64 = 0.66;

/// First LOD at which the polar clamp starts to apply.
const POLAR_RESTRICTION_START_LOD: u32 = 6;

/// Selection data for one LOD.
#[derive(Clone, Debug)]
pub struct LodInfo {
	/// Camera distance inside which tiles of this LOD are resident.
	pub visibility_range: f64,
	/// Distance band over which vertices morph toward the parent mesh.
	pub morph_start: f64,
	pub morph_end: f64,
	/// Valid tile-Y band; rows outside it are not subdivided.
	pub min_valid_ty: u32,
	pub max_valid_ty: u32,
}

/// Per-LOD table that drives view-dependent subdivision.
///
/// Ranges derive from the bounding radius of a tile near the profile center,
/// scaled by the minimum tile range factor. In a geographic profile the polar
/// rows become progressively thinner; the optional polar restriction walks
/// each LOD's rows and clamps the valid band where the width/height aspect
/// falls under a ramp from 0.1 (LOD 6) to 0.4 (max LOD).
pub struct SelectionInfo {
	first_lod: u32,
	lods: Vec<LodInfo>,
}

impl SelectionInfo {
	pub fn new(
		first_lod: u32,
		max_lod: u32,
		profile: &Profile,
		mtrf: f64,
		restrict_polar_subdivision: bool,
	) -> Result<SelectionInfo> {
		ensure!(first_lod <= max_lod, "first LOD ({first_lod}) must be <= max LOD ({max_lod})");

		let num_lods = max_lod + 1;
		let mut lods = Vec::with_capacity(num_lods as usize);

		for lod in 0..num_lods {
			let (tx, ty) = profile.num_tiles(lod);
			let center = TileKey::new(lod, tx / 2, ty / 2, profile.clone())?;
			let radius = center.extent().bounding_circle_radius_m();
			lods.push(LodInfo {
				visibility_range: radius * mtrf * 2.0 * (1.0 / 1.405),
				morph_start: 0.0,
				morph_end: 0.0,
				min_valid_ty: 0,
				max_valid_ty: u32::MAX,
			});
		}

		let ellipsoid = profile.srs().ellipsoid();
		let meters_per_equatorial_degree = ellipsoid.longitudinal_degrees_to_meters(1.0, 0.0);

		let mut prev_pos = 0.0;
		for lod in (0..num_lods).rev() {
			let info = &mut lods[lod as usize];
			let span = info.visibility_range - prev_pos;
			info.morph_end = info.visibility_range;
			info.morph_start = prev_pos + span * MORPH_START_RATIO;
			prev_pos = info.morph_end;

			// clamp the valid row band near the poles, where geographic tiles
			// become too thin to be worth subdividing
			if restrict_polar_subdivision && lod >= POLAR_RESTRICTION_START_LOD && profile.srs().is_geographic() {
				let start_ar = 0.1;
				let end_ar = 0.4;
				let lod_t = f64::from(lod - POLAR_RESTRICTION_START_LOD) / f64::from(num_lods - 1);
				let min_ar = start_ar + (end_ar - start_ar) * lod_t;

				let (_, ty) = profile.num_tiles(lod);
				let mut y = ty / 2;
				loop {
					let key = TileKey::new(lod, 0, y, profile.clone())?;
					let extent = key.extent();
					let lat = 0.5 * (extent.y_max + extent.y_min);
					let width = extent.width() * meters_per_equatorial_degree * lat.to_radians().cos();
					let height = extent.height() * meters_per_equatorial_degree;
					if width / height < min_ar {
						let info = &mut lods[lod as usize];
						info.min_valid_ty = (y + 1).min(ty - 1);
						info.max_valid_ty = (ty - 1) - info.min_valid_ty;
						log::debug!(
							"lod {lod} ty={ty} minAR={min_ar:.2} valid rows {}..={} (+/-{lat:.1} deg)",
							info.min_valid_ty,
							info.max_valid_ty
						);
						break;
					}
					if y == 0 {
						break;
					}
					y -= 1;
				}
			}
		}

		Ok(SelectionInfo { first_lod, lods })
	}

	#[must_use]
	pub fn first_lod(&self) -> u32 {
		self.first_lod
	}

	#[must_use]
	pub fn num_lods(&self) -> u32 {
		self.lods.len() as u32
	}

	#[must_use]
	pub fn lod(&self, lod: u32) -> Option<&LodInfo> {
		self.lods.get(lod as usize)
	}

	/// Selection values for a key: `(visibility range, morph start, morph
	/// end)`. All zeros when the key's row lies outside its LOD's valid band.
	#[must_use]
	pub fn get(&self, key: &TileKey) -> (f64, f64, f64) {
		let Some(info) = self.lods.get(key.lod() as usize) else {
			return (0.0, 0.0, 0.0);
		};
		if key.y() >= info.min_valid_ty && key.y() <= info.max_valid_ty {
			(info.visibility_range, info.morph_start, info.morph_end)
		} else {
			(0.0, 0.0, 0.0)
		}
	}
}
