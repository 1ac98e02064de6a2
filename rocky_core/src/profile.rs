//! Tiling pyramids: an SRS plus the LOD 0 extent and tile grid.

use crate::{Config, GeoExtent, Srs, SrsKind};
use anyhow::{Result, bail, ensure};
use std::{
	fmt::Debug,
	hash::{DefaultHasher, Hash, Hasher},
	sync::Arc,
};

const MERCATOR_MAX: f64 = 20_037_508.342789244;

/// A tiling pyramid: an SRS, the extent covered at LOD 0, and how many tiles
/// wide and high LOD 0 is. Cheap to clone; tile keys hold one.
///
/// # Examples
///
/// ```
/// use rocky_core::Profile;
///
/// let p = Profile::global_geodetic();
/// assert_eq!(p.num_tiles(0), (2, 1));
/// assert_eq!(p.num_tiles(3), (16, 8));
/// let (w, h) = p.tile_dimensions(0);
/// assert_eq!((w, h), (180.0, 180.0));
/// ```
#[derive(Clone)]
pub struct Profile(Arc<ProfileData>);

struct ProfileData {
	name: String,
	srs: Srs,
	extent: GeoExtent,
	tiles_wide_at_lod0: u32,
	tiles_high_at_lod0: u32,
	hash: u64,
}

impl Profile {
	/// The whole-earth geographic profile: 2×1 tiles of 180° at LOD 0.
	#[must_use]
	pub fn global_geodetic() -> Profile {
		let srs = Srs::geographic();
		let extent = GeoExtent::new(srs.clone(), -180.0, -90.0, 180.0, 90.0).unwrap();
		Profile::build("global-geodetic", srs, extent, 2, 1)
	}

	/// The web-mercator profile: one square world tile at LOD 0.
	#[must_use]
	pub fn spherical_mercator() -> Profile {
		let srs = Srs::spherical_mercator();
		let extent = GeoExtent::new(srs.clone(), -MERCATOR_MAX, -MERCATOR_MAX, MERCATOR_MAX, MERCATOR_MAX)
			.unwrap();
		Profile::build("spherical-mercator", srs, extent, 1, 1)
	}

	/// The equirectangular-meters profile: 2×1 tiles at LOD 0.
	#[must_use]
	pub fn plate_carre() -> Profile {
		let srs = Srs::plate_carre();
		let extent = GeoExtent::new(srs.clone(), -MERCATOR_MAX, -MERCATOR_MAX / 2.0, MERCATOR_MAX, MERCATOR_MAX / 2.0)
			.unwrap();
		Profile::build("plate-carre", srs, extent, 2, 1)
	}

	/// Looks up a well-known profile by its string identifier.
	pub fn named(name: &str) -> Result<Profile> {
		Ok(match name {
			"global-geodetic" => Profile::global_geodetic(),
			"spherical-mercator" => Profile::spherical_mercator(),
			"plate-carre" => Profile::plate_carre(),
			_ => bail!("unknown profile: {name}"),
		})
	}

	/// Creates a custom profile.
	pub fn custom(srs: Srs, extent: GeoExtent, tiles_wide_at_lod0: u32, tiles_high_at_lod0: u32) -> Result<Profile> {
		ensure!(tiles_wide_at_lod0 > 0, "profile must be at least one tile wide");
		ensure!(tiles_high_at_lod0 > 0, "profile must be at least one tile high");
		ensure!(
			extent.srs().is_horiz_equivalent_to(&srs),
			"profile extent SRS must match the profile SRS"
		);
		Ok(Profile::build("custom", srs, extent, tiles_wide_at_lod0, tiles_high_at_lod0))
	}

	fn build(name: &str, srs: Srs, extent: GeoExtent, tiles_wide_at_lod0: u32, tiles_high_at_lod0: u32) -> Profile {
		let mut hasher = DefaultHasher::new();
		srs.horiz_signature().hash(&mut hasher);
		extent.x_min.to_bits().hash(&mut hasher);
		extent.y_min.to_bits().hash(&mut hasher);
		extent.x_max.to_bits().hash(&mut hasher);
		extent.y_max.to_bits().hash(&mut hasher);
		tiles_wide_at_lod0.hash(&mut hasher);
		tiles_high_at_lod0.hash(&mut hasher);

		Profile(Arc::new(ProfileData {
			name: name.to_string(),
			srs,
			extent,
			tiles_wide_at_lod0,
			tiles_high_at_lod0,
			hash: hasher.finish(),
		}))
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.0.name
	}

	#[must_use]
	pub fn srs(&self) -> &Srs {
		&self.0.srs
	}

	#[must_use]
	pub fn extent(&self) -> &GeoExtent {
		&self.0.extent
	}

	#[must_use]
	pub fn hash(&self) -> u64 {
		self.0.hash
	}

	/// Number of tiles across and down at the given LOD.
	#[must_use]
	pub fn num_tiles(&self, lod: u32) -> (u32, u32) {
		(self.0.tiles_wide_at_lod0 << lod, self.0.tiles_high_at_lod0 << lod)
	}

	/// Width and height of one tile at the given LOD, in SRS units.
	#[must_use]
	pub fn tile_dimensions(&self, lod: u32) -> (f64, f64) {
		let (tx, ty) = self.num_tiles(lod);
		(self.0.extent.width() / f64::from(tx), self.0.extent.height() / f64::from(ty))
	}

	/// Extent of the tile at `(lod, x, y)`. Tile Y grows southward from the
	/// profile's top edge.
	#[must_use]
	pub fn tile_extent(&self, lod: u32, x: u32, y: u32) -> GeoExtent {
		let (width, height) = self.tile_dimensions(lod);
		let x_min = self.0.extent.x_min + width * f64::from(x);
		let y_max = self.0.extent.y_max - height * f64::from(y);
		GeoExtent::new(self.0.srs.clone(), x_min, y_max - height, x_min + width, y_max).unwrap()
	}

	/// Horizontal equivalence: same horizontal SRS, LOD 0 extent, and LOD 0
	/// tile counts.
	#[must_use]
	pub fn is_horiz_equivalent_to(&self, other: &Profile) -> bool {
		self.0.tiles_wide_at_lod0 == other.0.tiles_wide_at_lod0
			&& self.0.tiles_high_at_lod0 == other.0.tiles_high_at_lod0
			&& self.0.extent == other.0.extent
			&& self.0.srs.is_horiz_equivalent_to(&other.0.srs)
	}

	/// The LOD in this profile whose tile resolution most closely matches
	/// `source_lod` in `source`. The well-known geodetic and mercator pyramids
	/// match level for level.
	#[must_use]
	pub fn get_equivalent_lod(&self, source: &Profile, source_lod: u32) -> u32 {
		if self.is_horiz_equivalent_to(source) {
			return source_lod;
		}

		// the global geodetic and mercator pyramids line up by construction
		let kinds = (self.srs().kind(), source.srs().kind());
		if matches!(
			kinds,
			(SrsKind::Geographic, SrsKind::SphericalMercator) | (SrsKind::SphericalMercator, SrsKind::Geographic)
		) {
			return source_lod;
		}

		let (_, source_height) = source.tile_dimensions(source_lod);
		let target_height = source_height * source.srs().meters_per_unit() / self.srs().meters_per_unit();

		let mut best_lod = 0;
		let mut best_delta = f64::MAX;
		let mut lod = 0;
		loop {
			let (_, height) = self.tile_dimensions(lod);
			let delta = (height - target_height).abs();
			if delta < best_delta {
				best_delta = delta;
				best_lod = lod;
			} else {
				break;
			}
			lod += 1;
		}
		best_lod
	}

	/// Transforms `input` into this profile's SRS, splitting it across the
	/// antimeridian first when needed, and clips the pieces to the profile
	/// extent. Yields one or two contiguous extents.
	pub fn transform_and_extract_contiguous_extents(&self, input: &GeoExtent) -> Result<Vec<GeoExtent>> {
		let pieces = match input.split_across_antimeridian() {
			Some((west, east)) => vec![west, east],
			None => vec![input.clone()],
		};

		let mut out = Vec::with_capacity(pieces.len());
		for piece in pieces {
			let transformed = piece.transform(self.srs())?;
			if let Some(clipped) = transformed.intersection(self.extent()) {
				out.push(clipped);
			}
		}
		Ok(out)
	}

	pub fn from_config(conf: &Config) -> Result<Profile> {
		if let Some(name) = conf.get::<String>("name") {
			return Profile::named(&name);
		}
		bail!("profile configuration requires a well-known name")
	}

	#[must_use]
	pub fn to_config(&self) -> Config {
		let mut conf = Config::new("profile");
		conf.set("name", &self.0.name);
		conf
	}
}

impl PartialEq for Profile {
	fn eq(&self, other: &Self) -> bool {
		self.is_horiz_equivalent_to(other)
	}
}

impl Debug for Profile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"Profile({}, {}x{})",
			self.0.name, self.0.tiles_wide_at_lod0, self.0.tiles_high_at_lod0
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use rstest::rstest;

	#[test]
	fn geodetic_grid() {
		let p = Profile::global_geodetic();
		assert_eq!(p.num_tiles(0), (2, 1));
		assert_eq!(p.num_tiles(2), (8, 4));
		assert_eq!(p.tile_dimensions(2), (45.0, 45.0));

		let e = p.tile_extent(2, 4, 0);
		assert_eq!((e.x_min, e.y_min, e.x_max, e.y_max), (0.0, 45.0, 45.0, 90.0));
	}

	#[test]
	fn mercator_grid() {
		let p = Profile::spherical_mercator();
		assert_eq!(p.num_tiles(0), (1, 1));
		assert_eq!(p.num_tiles(4), (16, 16));

		let e = p.tile_extent(1, 0, 0);
		assert_abs_diff_eq!(e.x_min, -MERCATOR_MAX);
		assert_abs_diff_eq!(e.y_min, 0.0);
	}

	#[test]
	fn named_lookup() {
		assert!(Profile::named("global-geodetic").is_ok());
		assert!(Profile::named("spherical-mercator").is_ok());
		assert!(Profile::named("plate-carre").is_ok());
		assert!(Profile::named("nope").is_err());
	}

	#[test]
	fn equivalence_distinguishes_pyramids() {
		assert!(Profile::global_geodetic().is_horiz_equivalent_to(&Profile::global_geodetic()));
		assert!(!Profile::global_geodetic().is_horiz_equivalent_to(&Profile::spherical_mercator()));
		assert_ne!(Profile::global_geodetic().hash(), Profile::spherical_mercator().hash());
	}

	#[rstest]
	#[case(0)]
	#[case(3)]
	#[case(9)]
	fn geodetic_and_mercator_match_by_level(#[case] lod: u32) {
		let geo = Profile::global_geodetic();
		let merc = Profile::spherical_mercator();
		assert_eq!(merc.get_equivalent_lod(&geo, lod), lod);
		assert_eq!(geo.get_equivalent_lod(&merc, lod), lod);
	}

	#[test]
	fn plate_carre_matches_geodetic_resolution() {
		let geo = Profile::global_geodetic();
		let pc = Profile::plate_carre();
		// identical grid shape and equatorial scale, so LODs line up
		for lod in 0..6 {
			assert_eq!(pc.get_equivalent_lod(&geo, lod), lod);
		}
	}

	#[test]
	fn contiguous_extents_split_and_clip() {
		let merc = Profile::spherical_mercator();
		let crossing = GeoExtent::new(Srs::geographic(), 170.0, -10.0, -170.0, 10.0).unwrap();
		let pieces = merc.transform_and_extract_contiguous_extents(&crossing).unwrap();
		assert_eq!(pieces.len(), 2);
		assert_abs_diff_eq!(pieces[0].x_max, MERCATOR_MAX, epsilon = 1.0);
		assert_abs_diff_eq!(pieces[1].x_min, -MERCATOR_MAX, epsilon = 1.0);
	}

	#[test]
	fn config_round_trip() {
		let p = Profile::spherical_mercator();
		let back = Profile::from_config(&p.to_config()).unwrap();
		assert!(back.is_horiz_equivalent_to(&p));
	}
}
