//! Pastes a set of same-profile tiles into one contiguous raster.

use crate::{GeoImage, Image};
use glam::DVec4;
use rocky_core::{GeoExtent, TileKey};

/// A multiset of `(Image, TileKey)` pieces sharing one profile.
///
/// [`ImageMosaic::assemble`] lays the pieces out on the integer tile grid
/// spanned by their indices and blits each into place; cells with no piece
/// stay transparent-white.
#[derive(Default)]
pub struct ImageMosaic {
	pieces: Vec<(Image, TileKey)>,
}

impl ImageMosaic {
	#[must_use]
	pub fn new() -> ImageMosaic {
		ImageMosaic::default()
	}

	pub fn add(&mut self, image: Image, key: TileKey) {
		self.pieces.push((image, key));
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.pieces.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.pieces.is_empty()
	}

	/// The union of the piece extents.
	#[must_use]
	pub fn extents(&self) -> Option<GeoExtent> {
		let mut iter = self.pieces.iter();
		let mut union = iter.next()?.1.extent();
		for (_, key) in iter {
			union.expand_to_include(&key.extent());
		}
		Some(union)
	}

	/// Composites every piece into one raster.
	///
	/// The output is sized to the integer tile-index bounds of the pieces, in
	/// the first piece's format, cleared to `(1, 1, 1, 0)`. Tile Y and image
	/// rows both grow southward here, so the piece with the smallest tile Y
	/// fills the top rows. The output extent is derived from the profile
	/// origin and the tile-index bounds.
	#[must_use]
	pub fn assemble(&self) -> Option<GeoImage> {
		let (first_image, first_key) = self.pieces.first()?;

		let tile_width = first_image.width();
		let tile_height = first_image.height();

		let mut min_x = first_key.x();
		let mut min_y = first_key.y();
		let mut max_x = first_key.x();
		let mut max_y = first_key.y();
		for (_, key) in &self.pieces {
			min_x = min_x.min(key.x());
			min_y = min_y.min(key.y());
			max_x = max_x.max(key.x());
			max_y = max_y.max(key.y());
		}

		let tiles_wide = max_x - min_x + 1;
		let tiles_high = max_y - min_y + 1;

		let mut out = Image::new(first_image.format(), tiles_wide * tile_width, tiles_high * tile_height);
		out.fill(DVec4::new(1.0, 1.0, 1.0, 0.0));

		for (image, key) in &self.pieces {
			let dst_col = i64::from((key.x() - min_x) * tile_width);
			let dst_row = i64::from((key.y() - min_y) * tile_height);
			if let Err(e) = image.copy_as_sub_image(&mut out, dst_col, dst_row) {
				log::warn!("dropping mosaic piece {key}: {e}");
			}
		}

		let profile = first_key.profile();
		let lod = first_key.lod();
		let (dim_x, dim_y) = profile.tile_dimensions(lod);
		let origin = profile.extent();

		let extent = GeoExtent::new(
			profile.srs().clone(),
			origin.x_min + f64::from(min_x) * dim_x,
			origin.y_max - f64::from(max_y + 1) * dim_y,
			origin.x_min + f64::from(max_x + 1) * dim_x,
			origin.y_max - f64::from(min_y) * dim_y,
		)
		.ok()?;

		GeoImage::new(out, extent).ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::PixelFormat;
	use approx::assert_abs_diff_eq;
	use rocky_core::Profile;

	fn solid(value: f64, size: u32) -> Image {
		Image::rgba8_from_fn(size, size, |_, _| DVec4::new(value, value, value, 1.0))
	}

	#[test]
	fn empty_mosaic_yields_nothing() {
		assert!(ImageMosaic::new().assemble().is_none());
	}

	#[test]
	fn two_tiles_stack_vertically() {
		let profile = Profile::spherical_mercator();
		let mut mosaic = ImageMosaic::new();
		// same column, adjacent rows
		mosaic.add(solid(0.2, 8), TileKey::new(2, 2, 0, profile.clone()).unwrap());
		mosaic.add(solid(0.8, 8), TileKey::new(2, 2, 1, profile.clone()).unwrap());

		let out = mosaic.assemble().unwrap();
		assert_eq!(out.image().width(), 8);
		assert_eq!(out.image().height(), 16);

		// tile y=0 is the northern tile, so it lands in the top rows
		assert_abs_diff_eq!(out.image().read(4, 2).x, 0.2, epsilon = 0.01);
		assert_abs_diff_eq!(out.image().read(4, 12).x, 0.8, epsilon = 0.01);

		// extent covers both tiles
		let e0 = profile.tile_extent(2, 2, 0);
		let e1 = profile.tile_extent(2, 2, 1);
		assert_abs_diff_eq!(out.extent().y_max, e0.y_max, epsilon = 1e-6);
		assert_abs_diff_eq!(out.extent().y_min, e1.y_min, epsilon = 1e-6);
		assert_abs_diff_eq!(out.extent().x_min, e0.x_min, epsilon = 1e-6);
	}

	#[test]
	fn missing_cells_stay_transparent_white() {
		let profile = Profile::spherical_mercator();
		let mut mosaic = ImageMosaic::new();
		// diagonal corners of a 2x2 block leave two cells unfilled
		mosaic.add(solid(1.0, 4), TileKey::new(2, 0, 0, profile.clone()).unwrap());
		mosaic.add(solid(1.0, 4), TileKey::new(2, 1, 1, profile).unwrap());

		let out = mosaic.assemble().unwrap();
		assert_eq!(out.image().width(), 8);

		// unfilled cell: transparent white
		let hole = out.image().read(6, 2);
		assert_eq!(hole.w, 0.0);
		assert_abs_diff_eq!(hole.x, 1.0, epsilon = 0.01);

		// filled cells keep alpha
		assert_eq!(out.image().read(1, 1).w, 1.0);
		assert_eq!(out.image().read(5, 5).w, 1.0);
	}

	#[test]
	fn format_follows_the_first_piece() {
		let profile = Profile::spherical_mercator();
		let mut mosaic = ImageMosaic::new();
		mosaic.add(Image::r32f_from_fn(4, 4, |_, _| 7.0), TileKey::new(1, 0, 0, profile).unwrap());
		let out = mosaic.assemble().unwrap();
		assert_eq!(out.image().format(), PixelFormat::R32f);
		assert_eq!(out.image().read(2, 2).x, 7.0);
	}
}
