//! Quadtree tile addressing.
//!
//! A [`TileKey`] names one tile in a [`Profile`]'s pyramid by `(lod, x, y)`.
//! Keys are always valid by construction; operations that can run off the tree
//! (parent of LOD 0, ancestor above the key) return `Option`.

use crate::{Error, ErrorKind, GeoExtent, Profile};
use anyhow::{Result, ensure};
use std::{
	fmt::{self, Debug, Display},
	hash::{DefaultHasher, Hash, Hasher},
};

/// Address of one tile in a tiling pyramid. The hash combines all four parts
/// and is precomputed at construction.
///
/// # Examples
///
/// ```
/// use rocky_core::{Profile, TileKey};
///
/// let key = TileKey::new(1, 0, 0, Profile::global_geodetic()).unwrap();
/// assert_eq!(key.child(3).to_string(), "2/1/1");
/// assert_eq!(key.child(3).parent().unwrap(), key);
/// ```
#[derive(Clone)]
pub struct TileKey {
	lod: u32,
	x: u32,
	y: u32,
	profile: Profile,
	hash: u64,
}

impl TileKey {
	/// Creates a key, validating the coordinates against the profile's grid at
	/// the given LOD.
	pub fn new(lod: u32, x: u32, y: u32, profile: Profile) -> Result<TileKey> {
		let (tx, ty) = profile.num_tiles(lod);
		ensure!(x < tx, "tile x ({x}) out of range at lod {lod} ({tx} wide)");
		ensure!(y < ty, "tile y ({y}) out of range at lod {lod} ({ty} high)");
		Ok(TileKey::new_unchecked(lod, x, y, profile))
	}

	fn new_unchecked(lod: u32, x: u32, y: u32, profile: Profile) -> TileKey {
		let mut hasher = DefaultHasher::new();
		lod.hash(&mut hasher);
		x.hash(&mut hasher);
		y.hash(&mut hasher);
		profile.hash().hash(&mut hasher);
		let hash = hasher.finish();

		TileKey { lod, x, y, profile, hash }
	}

	/// The key containing the point `(x, y)` (profile SRS units) at `lod`, or
	/// `None` when the point is outside the profile extent.
	#[must_use]
	pub fn containing_point(x: f64, y: f64, lod: u32, profile: &Profile) -> Option<TileKey> {
		let extent = profile.extent();
		if !extent.contains(x, y) {
			return None;
		}
		let (tiles_x, tiles_y) = profile.num_tiles(lod);

		let rx = (x - extent.x_min) / extent.width();
		let tile_x = ((rx * f64::from(tiles_x)) as u32).min(tiles_x - 1);
		let ry = (y - extent.y_min) / extent.height();
		let tile_y = (((1.0 - ry) * f64::from(tiles_y)) as u32).min(tiles_y - 1);

		Some(TileKey::new_unchecked(lod, tile_x, tile_y, profile.clone()))
	}

	#[must_use]
	pub fn lod(&self) -> u32 {
		self.lod
	}

	#[must_use]
	pub fn x(&self) -> u32 {
		self.x
	}

	#[must_use]
	pub fn y(&self) -> u32 {
		self.y
	}

	#[must_use]
	pub fn profile(&self) -> &Profile {
		&self.profile
	}

	/// Precomputed hash over `(lod, x, y, profile)`.
	#[must_use]
	pub fn hash_value(&self) -> u64 {
		self.hash
	}

	/// Geographic extent of this tile.
	#[must_use]
	pub fn extent(&self) -> GeoExtent {
		self.profile.tile_extent(self.lod, self.x, self.y)
	}

	/// Which quadrant of its parent this key occupies (0..4); 0 at LOD 0.
	#[must_use]
	pub fn quadrant(&self) -> u32 {
		if self.lod == 0 {
			return 0;
		}
		let x_even = (self.x & 1) == 0;
		let y_even = (self.y & 1) == 0;
		if x_even && y_even {
			0
		} else if x_even {
			2
		} else if y_even {
			1
		} else {
			3
		}
	}

	/// Map units per pixel for a tile of `tile_size` pixels.
	#[must_use]
	pub fn resolution(&self, tile_size: u32) -> (f64, f64) {
		let (width, height) = self.profile.tile_dimensions(self.lod);
		(width / f64::from(tile_size - 1), height / f64::from(tile_size - 1))
	}

	/// The child key in the given quadrant (0..4).
	#[must_use]
	pub fn child(&self, quadrant: u32) -> TileKey {
		let mut x = self.x * 2;
		let mut y = self.y * 2;
		if quadrant == 1 || quadrant == 3 {
			x += 1;
		}
		if quadrant == 2 || quadrant == 3 {
			y += 1;
		}
		TileKey::new_unchecked(self.lod + 1, x, y, self.profile.clone())
	}

	/// The parent key, or `None` at LOD 0.
	#[must_use]
	pub fn parent(&self) -> Option<TileKey> {
		if self.lod == 0 {
			return None;
		}
		Some(TileKey::new_unchecked(
			self.lod - 1,
			self.x >> 1,
			self.y >> 1,
			self.profile.clone(),
		))
	}

	/// The ancestor at `ancestor_lod`, or `None` when that is deeper than this
	/// key.
	#[must_use]
	pub fn ancestor(&self, ancestor_lod: u32) -> Option<TileKey> {
		if ancestor_lod > self.lod {
			return None;
		}
		let shift = self.lod - ancestor_lod;
		Some(TileKey::new_unchecked(
			ancestor_lod,
			self.x >> shift,
			self.y >> shift,
			self.profile.clone(),
		))
	}

	/// The key offset by `(dx, dy)` tiles at the same LOD, wrapping toroidally
	/// around the grid.
	#[must_use]
	pub fn neighbor(&self, dx: i64, dy: i64) -> TileKey {
		let (tx, ty) = self.profile.num_tiles(self.lod);
		let x = (i64::from(self.x) + dx).rem_euclid(i64::from(tx)) as u32;
		let y = (i64::from(self.y) + dy).rem_euclid(i64::from(ty)) as u32;
		TileKey::new_unchecked(self.lod, x, y, self.profile.clone())
	}

	/// Walks up to the ancestor whose `source_size`-pixel tiles most closely
	/// deliver `target_size` pixels over this key's area. Only meaningful when
	/// falling back (`target_size < source_size`).
	#[must_use]
	pub fn map_resolution(&self, target_size: u32, source_size: u32, minimum_lod: u32) -> TileKey {
		if self.lod == 0 || target_size >= source_size {
			return self.clone();
		}

		let target_size = target_size.max(2);
		let mut lod = self.lod;
		let mut target_pot = target_size.next_power_of_two();

		loop {
			if target_pot >= source_size || lod == minimum_lod {
				return self.ancestor(lod).unwrap_or_else(|| self.clone());
			}
			lod -= 1;
			target_pot *= 2;
		}
	}

	/// Every key in `target` whose extent overlaps this key's extent.
	///
	/// When the profiles are horizontally equivalent this is just `{self}`.
	/// Otherwise the target LOD is chosen by resolution, the source extent is
	/// transformed (splitting across the antimeridian when needed), and the
	/// overlapped grid cells are enumerated.
	pub fn intersecting_keys(&self, target: &Profile) -> std::result::Result<Vec<TileKey>, Error> {
		if self.profile.is_horiz_equivalent_to(target) {
			return Ok(vec![self.clone()]);
		}

		let target_lod = target.get_equivalent_lod(&self.profile, self.lod);

		let pieces = target
			.transform_and_extract_contiguous_extents(&self.extent())
			.map_err(|e| Error::new(ErrorKind::ConfigurationError, e.to_string()))?;

		let mut out = Vec::new();
		for piece in &pieces {
			add_intersecting_keys(piece, target_lod, target, &mut out)?;
		}

		log::trace!("intersecting keys for {self}: {} tiles at target lod {target_lod}", out.len());
		Ok(out)
	}
}

/// Enumerates the target-profile cells overlapped by one contiguous extent.
fn add_intersecting_keys(
	piece: &GeoExtent,
	lod: u32,
	target: &Profile,
	out: &mut Vec<TileKey>,
) -> std::result::Result<(), Error> {
	if piece.crosses_antimeridian() {
		return Err(Error::new(
			ErrorKind::AssertionFailure,
			"cannot enumerate tiles for a date-line crossing extent",
		));
	}

	let (tile_width, tile_height) = target.tile_dimensions(lod);
	let profile_extent = target.extent();

	let west = piece.x_min - profile_extent.x_min;
	let east = piece.x_max - profile_extent.x_min;
	let south = profile_extent.y_max - piece.y_min;
	let north = profile_extent.y_max - piece.y_max;

	let mut tile_min_x = (west / tile_width) as i64;
	let mut tile_max_x = (east / tile_width) as i64;
	let mut tile_min_y = (north / tile_height) as i64;
	let mut tile_max_y = (south / tile_height) as i64;

	// An edge that falls exactly on a tile boundary without consuming that
	// row/column would pull in a spurious strip of tiles; retract it. This
	// shows up when re-gridding geodetic against mercator.
	let quantized_west = tile_width * tile_min_x as f64;
	let quantized_east = tile_width * (tile_max_x + 1) as f64;
	if nearly(west - quantized_west, tile_width) {
		tile_min_x += 1;
	}
	if nearly(quantized_east - east, tile_width) {
		tile_max_x -= 1;
	}
	if tile_max_x < tile_min_x {
		tile_max_x = tile_min_x;
	}

	let quantized_north = tile_height * tile_min_y as f64;
	let quantized_south = tile_height * (tile_max_y + 1) as f64;
	if nearly(north - quantized_north, tile_height) {
		tile_min_y += 1;
	}
	if nearly(quantized_south - south, tile_height) {
		tile_max_y -= 1;
	}
	if tile_max_y < tile_min_y {
		tile_max_y = tile_min_y;
	}

	let (num_wide, num_high) = target.num_tiles(lod);
	let (num_wide, num_high) = (i64::from(num_wide), i64::from(num_high));

	if tile_min_x >= num_wide || tile_min_y >= num_high || tile_max_x < 0 || tile_max_y < 0 {
		return Ok(());
	}

	let tile_min_x = tile_min_x.clamp(0, num_wide - 1);
	let tile_max_x = tile_max_x.clamp(0, num_wide - 1);
	let tile_min_y = tile_min_y.clamp(0, num_high - 1);
	let tile_max_y = tile_max_y.clamp(0, num_high - 1);

	for i in tile_min_x..=tile_max_x {
		for j in tile_min_y..=tile_max_y {
			out.push(TileKey::new_unchecked(lod, i as u32, j as u32, target.clone()));
		}
	}
	Ok(())
}

fn nearly(a: f64, b: f64) -> bool {
	(a - b).abs() < 1e-6 * b.abs().max(1.0)
}

impl PartialEq for TileKey {
	fn eq(&self, other: &Self) -> bool {
		self.lod == other.lod
			&& self.x == other.x
			&& self.y == other.y
			&& self.profile.is_horiz_equivalent_to(&other.profile)
	}
}

impl Eq for TileKey {}

impl Hash for TileKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.hash);
	}
}

impl Display for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.lod, self.x, self.y)
	}
}

impl Debug for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TileKey({} {}/{}/{})", self.profile.name(), self.lod, self.x, self.y)
	}
}
