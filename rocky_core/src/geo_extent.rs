//! Axis-aligned rectangles in a spatial reference system.

use crate::Srs;
use anyhow::{Result, ensure};
use glam::{DMat4, DVec2, DVec3, DVec4};
use std::fmt::Debug;

/// A 2D rectangle in an [`Srs`].
///
/// A geographic extent may cross the antimeridian, in which case `x_min` is
/// numerically greater than `x_max` and the width wraps through 180°.
///
/// # Examples
///
/// ```
/// use rocky_core::{GeoExtent, Srs};
///
/// let e = GeoExtent::new(Srs::geographic(), -10.0, -5.0, 10.0, 5.0).unwrap();
/// assert_eq!(e.width(), 20.0);
/// assert!(e.contains(0.0, 0.0));
/// ```
#[derive(Clone, PartialEq)]
pub struct GeoExtent {
	srs: Srs,
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl GeoExtent {
	/// Creates a new extent. For a geographic SRS, `x_min > x_max` denotes an
	/// antimeridian-crossing extent; for all other systems the x range must be
	/// ordered.
	pub fn new(srs: Srs, x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<GeoExtent> {
		ensure!(
			y_min <= y_max,
			"y_min ({y_min}) must be <= y_max ({y_max})"
		);
		ensure!(
			x_min <= x_max || srs.is_geographic(),
			"x_min ({x_min}) must be <= x_max ({x_max}) in a projected SRS"
		);
		Ok(GeoExtent {
			srs,
			x_min,
			y_min,
			x_max,
			y_max,
		})
	}

	#[must_use]
	pub fn srs(&self) -> &Srs {
		&self.srs
	}

	#[must_use]
	pub fn width(&self) -> f64 {
		if self.crosses_antimeridian() {
			self.x_max - self.x_min + 360.0
		} else {
			self.x_max - self.x_min
		}
	}

	#[must_use]
	pub fn height(&self) -> f64 {
		self.y_max - self.y_min
	}

	#[must_use]
	pub fn center(&self) -> DVec2 {
		let mut cx = self.x_min + self.width() / 2.0;
		if self.crosses_antimeridian() && cx > 180.0 {
			cx -= 360.0;
		}
		DVec2::new(cx, (self.y_min + self.y_max) / 2.0)
	}

	#[must_use]
	pub fn contains(&self, x: f64, y: f64) -> bool {
		if y < self.y_min || y > self.y_max {
			return false;
		}
		if self.crosses_antimeridian() {
			x >= self.x_min || x <= self.x_max
		} else {
			x >= self.x_min && x <= self.x_max
		}
	}

	/// True when this geographic extent wraps through the antimeridian.
	#[must_use]
	pub fn crosses_antimeridian(&self) -> bool {
		self.srs.is_geographic() && self.x_min > self.x_max
	}

	/// Splits an antimeridian-crossing extent into its western and eastern
	/// contiguous pieces. Returns `None` for a non-crossing extent.
	#[must_use]
	pub fn split_across_antimeridian(&self) -> Option<(GeoExtent, GeoExtent)> {
		if !self.crosses_antimeridian() {
			return None;
		}
		let west = GeoExtent {
			srs: self.srs.clone(),
			x_min: self.x_min,
			y_min: self.y_min,
			x_max: 180.0,
			y_max: self.y_max,
		};
		let east = GeoExtent {
			srs: self.srs.clone(),
			x_min: -180.0,
			y_min: self.y_min,
			x_max: self.x_max,
			y_max: self.y_max,
		};
		Some((west, east))
	}

	/// True when the two extents overlap. Both must be in the same SRS and
	/// non-crossing.
	#[must_use]
	pub fn intersects(&self, other: &GeoExtent) -> bool {
		self.x_min <= other.x_max && self.x_max >= other.x_min && self.y_min <= other.y_max && self.y_max >= other.y_min
	}

	/// The overlapping region of two non-crossing extents in the same SRS, or
	/// `None` when they are disjoint.
	#[must_use]
	pub fn intersection(&self, other: &GeoExtent) -> Option<GeoExtent> {
		if !self.intersects(other) {
			return None;
		}
		Some(GeoExtent {
			srs: self.srs.clone(),
			x_min: self.x_min.max(other.x_min),
			y_min: self.y_min.max(other.y_min),
			x_max: self.x_max.min(other.x_max),
			y_max: self.y_max.min(other.y_max),
		})
	}

	/// Expands this extent in place to include `other`.
	pub fn expand_to_include(&mut self, other: &GeoExtent) {
		self.x_min = self.x_min.min(other.x_min);
		self.y_min = self.y_min.min(other.y_min);
		self.x_max = self.x_max.max(other.x_max);
		self.y_max = self.y_max.max(other.y_max);
	}

	/// Transforms a non-crossing extent into another SRS by transforming its
	/// corners. Latitudes are clamped by the target projection where required
	/// (spherical mercator).
	pub fn transform(&self, to: &Srs) -> Result<GeoExtent> {
		if self.srs.is_horiz_equivalent_to(to) {
			return Ok(self.clone());
		}
		ensure!(
			!self.crosses_antimeridian(),
			"cannot transform an antimeridian-crossing extent; split it first"
		);
		let mut corners = [
			DVec3::new(self.x_min, self.y_min, 0.0),
			DVec3::new(self.x_max, self.y_max, 0.0),
		];
		self.srs.transform_points(to, &mut corners)?;
		GeoExtent::new(
			to.clone(),
			corners[0].x.min(corners[1].x),
			corners[0].y.min(corners[1].y),
			corners[0].x.max(corners[1].x),
			corners[0].y.max(corners[1].y),
		)
	}

	/// Matrix mapping this extent's unit square into `parent`'s unit square:
	/// the scale/bias used by meta-tiling and elevation texel windows.
	#[must_use]
	pub fn scale_bias_to(&self, parent: &GeoExtent) -> DMat4 {
		let sx = self.width() / parent.width();
		let sy = self.height() / parent.height();
		let bx = (self.x_min - parent.x_min) / parent.width();
		let by = (self.y_min - parent.y_min) / parent.height();

		DMat4::from_cols(
			DVec4::new(sx, 0.0, 0.0, 0.0),
			DVec4::new(0.0, sy, 0.0, 0.0),
			DVec4::new(0.0, 0.0, 1.0, 0.0),
			DVec4::new(bx, by, 0.0, 1.0),
		)
	}

	/// Radius in meters of a circle bounding this extent. Geographic extents
	/// measure the chord from the ECEF center point to the corners; projected
	/// extents use the half diagonal.
	#[must_use]
	pub fn bounding_circle_radius_m(&self) -> f64 {
		if self.srs.is_geographic() {
			let ellipsoid = self.srs.ellipsoid();
			let center = self.center();
			let center_ecef = ellipsoid.geodetic_to_geocentric(DVec3::new(center.x, center.y, 0.0));
			let mut radius: f64 = 0.0;
			for (x, y) in [
				(self.x_min, self.y_min),
				(self.x_max, self.y_min),
				(self.x_max, self.y_max),
				(self.x_min, self.y_max),
			] {
				let corner = ellipsoid.geodetic_to_geocentric(DVec3::new(x, y, 0.0));
				radius = radius.max((corner - center_ecef).length());
			}
			radius
		} else {
			DVec2::new(self.width() / 2.0, self.height() / 2.0).length()
		}
	}
}

impl Debug for GeoExtent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"GeoExtent[{}]({}, {}, {}, {})",
			self.srs.definition(),
			self.x_min,
			self.y_min,
			self.x_max,
			self.y_max
		)
	}
}
