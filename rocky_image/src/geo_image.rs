//! A raster bound to a geographic extent.

use crate::Image;
use anyhow::{Result, ensure};
use glam::{DVec3, DVec4};
use rocky_core::{GeoExtent, Srs};

/// An [`Image`] plus the [`GeoExtent`] it covers. Row 0 is the extent's top
/// (maximum y) edge.
#[derive(Clone, Debug)]
pub struct GeoImage {
	image: Image,
	extent: GeoExtent,
}

impl GeoImage {
	pub fn new(image: Image, extent: GeoExtent) -> Result<GeoImage> {
		ensure!(
			!extent.crosses_antimeridian(),
			"a geo-referenced raster cannot cross the antimeridian"
		);
		Ok(GeoImage { image, extent })
	}

	#[must_use]
	pub fn image(&self) -> &Image {
		&self.image
	}

	#[must_use]
	pub fn extent(&self) -> &GeoExtent {
		&self.extent
	}

	#[must_use]
	pub fn into_image(self) -> Image {
		self.image
	}

	/// Samples the raster at a point in its own SRS, or `None` outside the
	/// extent.
	#[must_use]
	pub fn sample(&self, x: f64, y: f64, bilinear: bool) -> Option<DVec4> {
		if !self.extent.contains(x, y) {
			return None;
		}
		let u = (x - self.extent.x_min) / self.extent.width();
		let v = (self.extent.y_max - y) / self.extent.height();
		let px = u * f64::from(self.image.width()) - 0.5;
		let py = v * f64::from(self.image.height()) - 0.5;
		Some(if bilinear {
			self.image.sample_bilinear(px, py)
		} else {
			self.image.sample_nearest(px, py)
		})
	}

	/// Crops to `extent` (clamped against this raster's extent), resampling
	/// into a `width` × `height` output. Coverage rasters should pass
	/// `bilinear = false` so values are never blended.
	#[must_use]
	pub fn crop(&self, extent: &GeoExtent, width: u32, height: u32, bilinear: bool) -> Option<GeoImage> {
		let clamped = self.extent.intersection(extent)?;
		if clamped.width() <= 0.0 || clamped.height() <= 0.0 {
			return None;
		}

		let mut out = Image::new(self.image.format(), width, height);
		for row in 0..height {
			let y = clamped.y_max - (f64::from(row) + 0.5) / f64::from(height) * clamped.height();
			for col in 0..width {
				let x = clamped.x_min + (f64::from(col) + 0.5) / f64::from(width) * clamped.width();
				if let Some(pixel) = self.sample(x, y, bilinear) {
					out.write(col, row, pixel);
				}
			}
		}

		Some(GeoImage {
			image: out,
			extent: clamped,
		})
	}

	/// Reprojects into `to_srs` over `clip_extent` (which must be expressed in
	/// `to_srs`), producing a `width` × `height` raster. Output pixels whose
	/// centers fall outside the source extent stay fully transparent.
	pub fn reproject(
		&self,
		to_srs: &Srs,
		clip_extent: &GeoExtent,
		width: u32,
		height: u32,
		bilinear: bool,
	) -> Result<GeoImage> {
		ensure!(
			clip_extent.srs().is_horiz_equivalent_to(to_srs),
			"reproject clip extent must be expressed in the target SRS"
		);

		let mut out = Image::new(self.image.format(), width, height);
		let mut row_points = vec![DVec3::ZERO; width as usize];

		for row in 0..height {
			let y = clip_extent.y_max - (f64::from(row) + 0.5) / f64::from(height) * clip_extent.height();
			for col in 0..width {
				let x = clip_extent.x_min + (f64::from(col) + 0.5) / f64::from(width) * clip_extent.width();
				row_points[col as usize] = DVec3::new(x, y, 0.0);
			}
			to_srs.transform_points(self.extent.srs(), &mut row_points)?;

			for col in 0..width {
				let p = row_points[col as usize];
				if let Some(pixel) = self.sample(p.x, p.y, bilinear) {
					out.write(col, row, pixel);
				}
			}
		}

		GeoImage::new(out, clip_extent.clone())
	}
}
