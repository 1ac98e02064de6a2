//! Reference ellipsoid math: geodetic/geocentric conversion, local tangent
//! frames, geodesic distance and interpolation, and line intersection.

use anyhow::{Result, ensure};
use glam::{DMat3, DMat4, DVec2, DVec3, DVec4};
use std::f64::consts::{FRAC_PI_2, PI};

/// WGS84 semi-major axis in meters.
pub const WGS84_RADIUS_EQUATOR: f64 = 6_378_137.0;
/// WGS84 semi-minor axis in meters.
pub const WGS84_RADIUS_POLAR: f64 = 6_356_752.314245;

/// An oblate reference ellipsoid.
///
/// Geodetic coordinates are `(longitude°, latitude°, altitude m)`; geocentric
/// coordinates are ECEF meters. The precomputed scaling between the ellipsoid
/// and a unit sphere backs the geodesic operations.
///
/// # Examples
///
/// ```
/// use rocky_core::Ellipsoid;
/// use glam::DVec3;
///
/// let e = Ellipsoid::wgs84();
/// let ecef = e.geodetic_to_geocentric(DVec3::new(0.0, 0.0, 0.0));
/// assert!((ecef.x - 6_378_137.0).abs() < 1e-6);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Ellipsoid {
	re: f64,
	rp: f64,
	ecc2: f64,
	ellipsoid_to_unit: DMat3,
	unit_to_ellipsoid: DMat3,
}

impl Ellipsoid {
	/// Creates an ellipsoid from equatorial and polar radii (meters).
	pub fn new(re: f64, rp: f64) -> Result<Ellipsoid> {
		ensure!(re > 0.0, "equatorial radius ({re}) must be > 0");
		ensure!(rp > 0.0, "polar radius ({rp}) must be > 0");

		let f = (re - rp) / re;
		let ecc2 = (2.0 * f) - (f * f);

		Ok(Ellipsoid {
			re,
			rp,
			ecc2,
			ellipsoid_to_unit: DMat3::from_diagonal(DVec3::new(1.0 / re, 1.0 / re, 1.0 / rp)),
			unit_to_ellipsoid: DMat3::from_diagonal(DVec3::new(re, re, rp)),
		})
	}

	/// The WGS84 ellipsoid.
	#[must_use]
	pub fn wgs84() -> Ellipsoid {
		Ellipsoid::new(WGS84_RADIUS_EQUATOR, WGS84_RADIUS_POLAR).unwrap()
	}

	#[must_use]
	pub fn radius_equator(&self) -> f64 {
		self.re
	}

	#[must_use]
	pub fn radius_polar(&self) -> f64 {
		self.rp
	}

	#[must_use]
	pub fn eccentricity_squared(&self) -> f64 {
		self.ecc2
	}

	/// Converts `(lon°, lat°, alt m)` to geocentric ECEF meters.
	#[must_use]
	pub fn geodetic_to_geocentric(&self, lla: DVec3) -> DVec3 {
		let lat = lla.y.to_radians();
		let lon = lla.x.to_radians();
		let height = lla.z;

		let sin_lat = lat.sin();
		let cos_lat = lat.cos();
		let n = self.re / (1.0 - self.ecc2 * sin_lat * sin_lat).sqrt();

		DVec3::new(
			(n + height) * cos_lat * lon.cos(),
			(n + height) * cos_lat * lon.sin(),
			(n * (1.0 - self.ecc2) + height) * sin_lat,
		)
	}

	/// Converts geocentric ECEF meters to `(lon°, lat°, alt m)`.
	///
	/// Polar and center-of-earth inputs produce finite outputs: longitude zero,
	/// sign-appropriate latitude, and height measured from the pole. Any NaN
	/// component is flushed to zero.
	#[must_use]
	pub fn geocentric_to_geodetic(&self, xyz: DVec3) -> DVec3 {
		let (lat, lon, height) = self.xyz_to_lat_lon_height(xyz);
		let mut out = DVec3::new(lon.to_degrees(), lat.to_degrees(), height);
		if out.x.is_nan() {
			out.x = 0.0;
		}
		if out.y.is_nan() {
			out.y = 0.0;
		}
		if out.z.is_nan() {
			out.z = 0.0;
		}
		out
	}

	fn xyz_to_lat_lon_height(&self, xyz: DVec3) -> (f64, f64, f64) {
		let (x, y, z) = (xyz.x, xyz.y, xyz.z);

		// handle polar and center-of-earth cases directly
		let lon = if x != 0.0 {
			y.atan2(x)
		} else if y > 0.0 {
			FRAC_PI_2
		} else if y < 0.0 {
			-FRAC_PI_2
		} else {
			return if z > 0.0 {
				(FRAC_PI_2, 0.0, z - self.rp)
			} else if z < 0.0 {
				(-FRAC_PI_2, 0.0, -z - self.rp)
			} else {
				(FRAC_PI_2, 0.0, -self.rp)
			};
		};

		let p = (x * x + y * y).sqrt();
		let theta = (z * self.re).atan2(p * self.rp);
		let e_dash_squared = (self.re * self.re - self.rp * self.rp) / (self.rp * self.rp);

		let sin_theta = theta.sin();
		let cos_theta = theta.cos();

		let lat = ((z + e_dash_squared * self.rp * sin_theta * sin_theta * sin_theta)
			/ (p - self.ecc2 * self.re * cos_theta * cos_theta * cos_theta))
			.atan();

		let sin_lat = lat.sin();
		let n = self.re / (1.0 - self.ecc2 * sin_lat * sin_lat).sqrt();
		let height = p / lat.cos() - n;

		(lat, lon, height)
	}

	/// Local `(east, north, up)` frame at a geodetic position, rotation only.
	#[must_use]
	pub fn geodetic_to_coord_frame(&self, lla: DVec3) -> DMat4 {
		coord_frame(lla.y.to_radians(), lla.x.to_radians(), DVec3::ZERO)
	}

	/// Local-to-world transform at a geocentric position: translation to the
	/// point plus an `(east, north, up)` frame aligned to the surface normal.
	#[must_use]
	pub fn geocentric_to_local_to_world(&self, geoc: DVec3) -> DMat4 {
		let (lat, lon, _) = self.xyz_to_lat_lon_height(geoc);
		coord_frame(lat, lon, geoc)
	}

	/// Outward surface normal at a geocentric position.
	#[must_use]
	pub fn geocentric_to_up_vector(&self, geoc: DVec3) -> DVec3 {
		let (lat, lon, _) = self.xyz_to_lat_lon_height(geoc);
		DVec3::new(lon.cos() * lat.cos(), lon.sin() * lat.cos(), lat.sin())
	}

	/// Scales a geocentric point into the unit-sphere space used by the
	/// geodesic math and horizon tests.
	#[must_use]
	pub fn to_unit_sphere(&self, geoc: DVec3) -> DVec3 {
		self.ellipsoid_to_unit * geoc
	}

	/// Inverse of [`Ellipsoid::to_unit_sphere`].
	#[must_use]
	pub fn from_unit_sphere(&self, unit: DVec3) -> DVec3 {
		self.unit_to_ellipsoid * unit
	}

	/// Meters spanned by `value` degrees of longitude at latitude `lat_deg`.
	#[must_use]
	pub fn longitudinal_degrees_to_meters(&self, value: f64, lat_deg: f64) -> f64 {
		value * (2.0 * PI * self.re / 360.0) * lat_deg.to_radians().cos()
	}

	/// Degrees of longitude spanned by `value` meters at latitude `lat_deg`.
	#[must_use]
	pub fn meters_to_longitudinal_degrees(&self, value: f64, lat_deg: f64) -> f64 {
		value / self.longitudinal_degrees_to_meters(1.0, lat_deg)
	}

	/// Geodesic distance in meters between two `(lon°, lat°)` points, using the
	/// Andoyer-Lambert second approximation.
	#[must_use]
	pub fn geodesic_distance(&self, p1: DVec2, p2: DVec2) -> f64 {
		let lat1 = p1.y.to_radians();
		let lon1 = p1.x.to_radians();
		let lat2 = p2.y.to_radians();
		let lon2 = p2.x.to_radians();

		let f = (self.re - self.rp) / self.re;

		let b1 = ((1.0 - f) * lat1.tan()).atan();
		let b2 = ((1.0 - f) * lat2.tan()).atan();

		let p = (b1 + b2) / 2.0;
		let q = (b2 - b1) / 2.0;

		let g = (b1.sin() * b2.sin() + b1.cos() * b2.cos() * (lon2 - lon1).abs().cos()).acos();

		let (sin_g, cos_g2, sin_g2) = (g.sin(), (g / 2.0).cos(), (g / 2.0).sin());
		let (sin_p, cos_p) = (p.sin(), p.cos());
		let (sin_q, cos_q) = (q.sin(), q.cos());

		let x = (g - sin_g) * ((sin_p * sin_p * cos_q * cos_q) / (cos_g2 * cos_g2));
		let y = (g + sin_g) * ((cos_p * cos_p * sin_q * sin_q) / (sin_g2 * sin_g2));

		let dist = self.re * (g - (f / 2.0) * (x + y));

		// NaN can mean the endpoints coincide
		if dist.is_nan() { 0.0 } else { dist }
	}

	/// Intersects the line through `p0` and `p1` (geocentric meters) with the
	/// ellipsoid, returning the hit nearest to `p0`, or `None` on a miss.
	///
	/// Solved on the unit sphere via the ellipsoid-to-unit-sphere substitution.
	#[must_use]
	pub fn intersect_geocentric_line(&self, p0_world: DVec3, p1_world: DVec3) -> Option<DVec3> {
		let p0 = self.ellipsoid_to_unit * p0_world;
		let p1 = self.ellipsoid_to_unit * p1_world;

		let d = p1 - p0;

		let a = d.dot(d);
		let b = 2.0 * d.dot(p0);
		let c = p0.dot(p0) - 1.0;

		// solve the quadratic a*t^2 + b*t + c = 0
		let disc = b * b - 4.0 * a * c;

		let v = if disc > 0.0 {
			// two roots; pick the closer one
			let sqrt_disc = disc.sqrt();
			let t0 = (-b + sqrt_disc) / (2.0 * a);
			let t1 = (-b - sqrt_disc) / (2.0 * a);
			if t0.abs() < t1.abs() { d * t0 } else { d * t1 }
		} else if disc == 0.0 {
			// tangent line
			d * (-b / (2.0 * a))
		} else {
			return None;
		};

		if v.dot(v) > 0.0 {
			Some(self.unit_to_ellipsoid * (p0 + v))
		} else {
			None
		}
	}

	/// Great-circle interpolation between two geodetic points: SLERP on the
	/// unit sphere with a linear altitude blend.
	#[must_use]
	pub fn geodesic_interpolate(&self, lla1: DVec3, lla2: DVec3, t: f64) -> DVec3 {
		let delta_z = lla2.z - lla1.z;

		let w1 = (self.ellipsoid_to_unit * self.geodetic_to_geocentric(lla1)).normalize();
		let w2 = (self.ellipsoid_to_unit * self.geodetic_to_geocentric(lla2)).normalize();

		let dp = w1.dot(w2);
		if dp >= 1.0 {
			return lla1;
		}

		let angle = dp.acos();
		let s = angle.sin();
		if s == 0.0 {
			return lla1;
		}

		let c1 = ((1.0 - t) * angle).sin() / s;
		let c2 = (t * angle).sin() / s;

		let n = self.unit_to_ellipsoid * (w1 * c1 + w2 * c2);

		let mut out = self.geocentric_to_geodetic(n);
		out.z = lla1.z + t * delta_z;
		out
	}
}

impl Default for Ellipsoid {
	fn default() -> Self {
		Ellipsoid::wgs84()
	}
}

/// Builds a local frame matrix with `(east, north, up)` columns and the given
/// translation.
fn coord_frame(lat: f64, lon: f64, translation: DVec3) -> DMat4 {
	let up = DVec3::new(lon.cos() * lat.cos(), lon.sin() * lat.cos(), lat.sin());
	let east = DVec3::new(-lon.sin(), lon.cos(), 0.0);
	let north = up.cross(east);

	DMat4::from_cols(
		DVec4::new(east.x, east.y, east.z, 0.0),
		DVec4::new(north.x, north.y, north.z, 0.0),
		DVec4::new(up.x, up.y, up.z, 0.0),
		DVec4::new(translation.x, translation.y, translation.z, 1.0),
	)
}
