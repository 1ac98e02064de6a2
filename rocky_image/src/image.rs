//! The in-memory raster type.
//!
//! Pixels are read and written as `DVec4` regardless of storage format, which
//! keeps the compositing and upsampling code format-agnostic. Row 0 is the top
//! (northernmost) row.

use anyhow::{Result, bail, ensure};
use glam::DVec4;
use rocky_core::Content;

/// Storage format of one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
	/// Four 8-bit channels; the common imagery case.
	Rgba8,
	/// One 32-bit float channel, used for coverage and elevation rasters.
	R32f,
}

impl PixelFormat {
	#[must_use]
	pub fn bytes_per_pixel(&self) -> usize {
		match self {
			PixelFormat::Rgba8 => 4,
			PixelFormat::R32f => 4,
		}
	}
}

/// An owned raster.
///
/// # Examples
///
/// ```
/// use rocky_image::{Image, PixelFormat};
/// use glam::DVec4;
///
/// let mut img = Image::new(PixelFormat::Rgba8, 4, 4);
/// img.write(1, 2, DVec4::new(1.0, 0.5, 0.0, 1.0));
/// let p = img.read(1, 2);
/// assert!((p.x - 1.0).abs() < 1e-2);
/// ```
#[derive(Clone, PartialEq)]
pub struct Image {
	format: PixelFormat,
	width: u32,
	height: u32,
	data: Vec<u8>,
}

impl Image {
	/// Creates a zero-filled raster.
	#[must_use]
	pub fn new(format: PixelFormat, width: u32, height: u32) -> Image {
		Image {
			format,
			width,
			height,
			data: vec![0; width as usize * height as usize * format.bytes_per_pixel()],
		}
	}

	/// Creates an RGBA8 raster from a per-pixel function of `(col, row)`.
	#[must_use]
	pub fn rgba8_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> DVec4) -> Image {
		let mut img = Image::new(PixelFormat::Rgba8, width, height);
		for row in 0..height {
			for col in 0..width {
				img.write(col, row, f(col, row));
			}
		}
		img
	}

	/// Creates a single-channel float raster from a per-pixel function.
	#[must_use]
	pub fn r32f_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f64) -> Image {
		let mut img = Image::new(PixelFormat::R32f, width, height);
		for row in 0..height {
			for col in 0..width {
				img.write(col, row, DVec4::new(f(col, row), 0.0, 0.0, 1.0));
			}
		}
		img
	}

	/// Decodes PNG or JPEG bytes fetched from a URI.
	pub fn decode(content: &Content) -> Result<Image> {
		let decoded = match content.content_type.as_str() {
			"image/png" => image::load_from_memory_with_format(&content.data, image::ImageFormat::Png)?,
			"image/jpeg" | "image/jpg" => image::load_from_memory_with_format(&content.data, image::ImageFormat::Jpeg)?,
			_ => image::load_from_memory(&content.data)?,
		};
		let rgba = decoded.to_rgba8();
		let (width, height) = (rgba.width(), rgba.height());
		Ok(Image {
			format: PixelFormat::Rgba8,
			width,
			height,
			data: rgba.into_raw(),
		})
	}

	#[must_use]
	pub fn format(&self) -> PixelFormat {
		self.format
	}

	#[must_use]
	pub fn width(&self) -> u32 {
		self.width
	}

	#[must_use]
	pub fn height(&self) -> u32 {
		self.height
	}

	#[must_use]
	pub fn data(&self) -> &[u8] {
		&self.data
	}

	fn offset(&self, col: u32, row: u32) -> usize {
		(row as usize * self.width as usize + col as usize) * self.format.bytes_per_pixel()
	}

	/// Reads the pixel at `(col, row)`. RGBA channels are normalized to
	/// `[0, 1]`; float rasters return their value in `x` with `w = 1`.
	#[must_use]
	pub fn read(&self, col: u32, row: u32) -> DVec4 {
		debug_assert!(col < self.width && row < self.height);
		let i = self.offset(col, row);
		match self.format {
			PixelFormat::Rgba8 => DVec4::new(
				f64::from(self.data[i]) / 255.0,
				f64::from(self.data[i + 1]) / 255.0,
				f64::from(self.data[i + 2]) / 255.0,
				f64::from(self.data[i + 3]) / 255.0,
			),
			PixelFormat::R32f => {
				let bytes = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
				DVec4::new(f64::from(f32::from_le_bytes(bytes)), 0.0, 0.0, 1.0)
			}
		}
	}

	/// Writes the pixel at `(col, row)`.
	pub fn write(&mut self, col: u32, row: u32, pixel: DVec4) {
		debug_assert!(col < self.width && row < self.height);
		let i = self.offset(col, row);
		match self.format {
			PixelFormat::Rgba8 => {
				self.data[i] = (pixel.x.clamp(0.0, 1.0) * 255.0).round() as u8;
				self.data[i + 1] = (pixel.y.clamp(0.0, 1.0) * 255.0).round() as u8;
				self.data[i + 2] = (pixel.z.clamp(0.0, 1.0) * 255.0).round() as u8;
				self.data[i + 3] = (pixel.w.clamp(0.0, 1.0) * 255.0).round() as u8;
			}
			PixelFormat::R32f => {
				self.data[i..i + 4].copy_from_slice(&(pixel.x as f32).to_le_bytes());
			}
		}
	}

	/// Fills the whole raster with one pixel value.
	pub fn fill(&mut self, pixel: DVec4) {
		for row in 0..self.height {
			for col in 0..self.width {
				self.write(col, row, pixel);
			}
		}
	}

	/// Blits this raster into `dst` with its top-left corner at
	/// `(dst_col, dst_row)`, clipping at the destination edges.
	pub fn copy_as_sub_image(&self, dst: &mut Image, dst_col: i64, dst_row: i64) -> Result<()> {
		ensure!(self.format == dst.format, "sub-image blit requires matching pixel formats");
		for row in 0..self.height {
			let dr = dst_row + i64::from(row);
			if dr < 0 || dr >= i64::from(dst.height) {
				continue;
			}
			for col in 0..self.width {
				let dc = dst_col + i64::from(col);
				if dc < 0 || dc >= i64::from(dst.width) {
					continue;
				}
				let src = self.offset(col, row);
				let dst_i = dst.offset(dc as u32, dr as u32);
				let n = self.format.bytes_per_pixel();
				let pixel: Vec<u8> = self.data[src..src + n].to_vec();
				dst.data[dst_i..dst_i + n].copy_from_slice(&pixel);
			}
		}
		Ok(())
	}

	/// Samples at continuous pixel coordinates with nearest-neighbor lookup.
	/// Coordinates are clamped to the raster.
	#[must_use]
	pub fn sample_nearest(&self, x: f64, y: f64) -> DVec4 {
		let col = (x.round().max(0.0) as u32).min(self.width - 1);
		let row = (y.round().max(0.0) as u32).min(self.height - 1);
		self.read(col, row)
	}

	/// Samples at continuous pixel coordinates with bilinear filtering.
	/// Coordinates are clamped to the raster.
	#[must_use]
	pub fn sample_bilinear(&self, x: f64, y: f64) -> DVec4 {
		let x = x.clamp(0.0, f64::from(self.width - 1));
		let y = y.clamp(0.0, f64::from(self.height - 1));

		let x0 = x.floor() as u32;
		let y0 = y.floor() as u32;
		let x1 = (x0 + 1).min(self.width - 1);
		let y1 = (y0 + 1).min(self.height - 1);

		let fx = x - f64::from(x0);
		let fy = y - f64::from(y0);

		let top = self.read(x0, y0).lerp(self.read(x1, y0), fx);
		let bottom = self.read(x0, y1).lerp(self.read(x1, y1), fx);
		top.lerp(bottom, fy)
	}
}

impl std::fmt::Debug for Image {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Image({:?}, {}x{})", self.format, self.width, self.height)
	}
}

/// Checks a declared content type against the formats this crate decodes.
pub fn is_supported_content_type(content_type: &str) -> bool {
	matches!(content_type, "image/png" | "image/jpeg" | "image/jpg")
}

/// Encodes a raster as PNG bytes, mainly for writing caches and fixtures.
pub fn encode_png(img: &Image) -> Result<Vec<u8>> {
	if img.format() != PixelFormat::Rgba8 {
		bail!("PNG encoding requires an Rgba8 raster");
	}
	let buffer = image::RgbaImage::from_raw(img.width(), img.height(), img.data().to_vec())
		.ok_or_else(|| anyhow::anyhow!("raster buffer size mismatch"))?;
	let mut out = Vec::new();
	image::DynamicImage::ImageRgba8(buffer).write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)?;
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;

	#[test]
	fn rgba_round_trip() {
		let mut img = Image::new(PixelFormat::Rgba8, 2, 2);
		img.write(0, 0, DVec4::new(1.0, 0.0, 0.5, 1.0));
		let p = img.read(0, 0);
		assert_abs_diff_eq!(p.x, 1.0);
		assert_abs_diff_eq!(p.z, 0.5, epsilon = 1.0 / 255.0);
	}

	#[test]
	fn float_round_trip_is_exact() {
		let mut img = Image::new(PixelFormat::R32f, 2, 2);
		img.write(1, 1, DVec4::new(1234.5, 0.0, 0.0, 1.0));
		assert_eq!(img.read(1, 1).x, 1234.5);
	}

	#[test]
	fn blit_clips_at_destination_edges() {
		let src = Image::rgba8_from_fn(2, 2, |_, _| DVec4::ONE);
		let mut dst = Image::new(PixelFormat::Rgba8, 4, 4);
		src.copy_as_sub_image(&mut dst, 3, 3).unwrap();
		assert_eq!(dst.read(3, 3), DVec4::ONE);
		assert_eq!(dst.read(2, 2), DVec4::ZERO);
	}

	#[test]
	fn blit_rejects_format_mismatch() {
		let src = Image::new(PixelFormat::R32f, 2, 2);
		let mut dst = Image::new(PixelFormat::Rgba8, 4, 4);
		assert!(src.copy_as_sub_image(&mut dst, 0, 0).is_err());
	}

	#[test]
	fn bilinear_blends_neighbors() {
		let img = Image::r32f_from_fn(2, 1, |col, _| if col == 0 { 0.0 } else { 10.0 });
		assert_abs_diff_eq!(img.sample_bilinear(0.5, 0.0).x, 5.0);
		assert_abs_diff_eq!(img.sample_nearest(0.4, 0.0).x, 0.0);
		assert_abs_diff_eq!(img.sample_nearest(0.6, 0.0).x, 10.0);
	}

	#[test]
	fn png_encode_decode_round_trip() {
		let img = Image::rgba8_from_fn(8, 8, |c, r| DVec4::new(f64::from(c) / 7.0, f64::from(r) / 7.0, 0.0, 1.0));
		let bytes = encode_png(&img).unwrap();
		let back = Image::decode(&Content {
			data: bytes,
			content_type: "image/png".to_string(),
		})
		.unwrap();
		assert_eq!(back.width(), 8);
		assert_eq!(img.data(), back.data());
	}
}
