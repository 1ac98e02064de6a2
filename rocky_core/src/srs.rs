//! Spatial reference systems and pairwise point transforms.
//!
//! An [`Srs`] pairs a coordinate-space kind with its reference ellipsoid and a
//! textual definition used for identity and cache signatures. All transforms
//! route through the geographic hub `(lon°, lat°, alt m)`.

use crate::Ellipsoid;
use anyhow::{Result, bail};
use glam::{DMat4, DVec3};
use std::{
	f64::consts::{FRAC_PI_2, FRAC_PI_4, PI},
	hash::{DefaultHasher, Hash, Hasher},
};

/// Highest latitude representable in the spherical-mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// The coordinate-space variant of an [`Srs`].
#[derive(Clone, Debug)]
pub enum SrsKind {
	/// Geographic lon/lat degrees with meters of altitude.
	Geographic,
	/// Spherical (web) mercator meters, EPSG:3857 style.
	SphericalMercator,
	/// Equirectangular meters (degrees scaled by the equatorial circumference).
	PlateCarre,
	/// Earth-centered, earth-fixed Cartesian meters.
	Geocentric,
	/// Local tangent plane: ENU meters around a geodetic origin.
	TangentPlane {
		origin_lla: DVec3,
		local_to_world: DMat4,
		world_to_local: DMat4,
	},
}

#[derive(Clone, Debug)]
pub struct Srs {
	kind: SrsKind,
	definition: String,
	ellipsoid: Ellipsoid,
}

impl Srs {
	/// Geographic WGS84 lon/lat.
	#[must_use]
	pub fn geographic() -> Srs {
		Srs {
			kind: SrsKind::Geographic,
			definition: "wgs84".to_string(),
			ellipsoid: Ellipsoid::wgs84(),
		}
	}

	/// Spherical mercator on the WGS84 equatorial radius.
	#[must_use]
	pub fn spherical_mercator() -> Srs {
		Srs {
			kind: SrsKind::SphericalMercator,
			definition: "spherical-mercator".to_string(),
			ellipsoid: Ellipsoid::wgs84(),
		}
	}

	/// Equirectangular (plate carrée) meters.
	#[must_use]
	pub fn plate_carre() -> Srs {
		Srs {
			kind: SrsKind::PlateCarre,
			definition: "plate-carre".to_string(),
			ellipsoid: Ellipsoid::wgs84(),
		}
	}

	/// Geocentric ECEF meters.
	#[must_use]
	pub fn geocentric() -> Srs {
		Srs {
			kind: SrsKind::Geocentric,
			definition: "geocentric".to_string(),
			ellipsoid: Ellipsoid::wgs84(),
		}
	}

	/// A local tangent plane at the given geodetic origin. The local-to-world
	/// and world-to-local matrices are computed once and cached.
	#[must_use]
	pub fn tangent_plane(origin_lla: DVec3) -> Srs {
		let ellipsoid = Ellipsoid::wgs84();
		let origin_world = ellipsoid.geodetic_to_geocentric(origin_lla);
		let local_to_world = ellipsoid.geocentric_to_local_to_world(origin_world);
		Srs {
			kind: SrsKind::TangentPlane {
				origin_lla,
				local_to_world,
				world_to_local: local_to_world.inverse(),
			},
			definition: format!("tangent-plane({},{},{})", origin_lla.x, origin_lla.y, origin_lla.z),
			ellipsoid,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &SrsKind {
		&self.kind
	}

	#[must_use]
	pub fn definition(&self) -> &str {
		&self.definition
	}

	#[must_use]
	pub fn ellipsoid(&self) -> &Ellipsoid {
		&self.ellipsoid
	}

	#[must_use]
	pub fn is_geographic(&self) -> bool {
		matches!(self.kind, SrsKind::Geographic)
	}

	#[must_use]
	pub fn is_geocentric(&self) -> bool {
		matches!(self.kind, SrsKind::Geocentric)
	}

	#[must_use]
	pub fn is_tangent_plane(&self) -> bool {
		matches!(self.kind, SrsKind::TangentPlane { .. })
	}

	#[must_use]
	pub fn is_projected(&self) -> bool {
		matches!(
			self.kind,
			SrsKind::SphericalMercator | SrsKind::PlateCarre | SrsKind::TangentPlane { .. }
		)
	}

	/// The geographic SRS sharing this ellipsoid.
	#[must_use]
	pub fn geographic_peer(&self) -> Srs {
		Srs {
			kind: SrsKind::Geographic,
			definition: "wgs84".to_string(),
			ellipsoid: self.ellipsoid.clone(),
		}
	}

	/// Horizontal equivalence: same kind and ellipsoid; tangent planes also
	/// compare origins.
	#[must_use]
	pub fn is_horiz_equivalent_to(&self, other: &Srs) -> bool {
		if self.ellipsoid != other.ellipsoid {
			return false;
		}
		match (&self.kind, &other.kind) {
			(SrsKind::Geographic, SrsKind::Geographic)
			| (SrsKind::SphericalMercator, SrsKind::SphericalMercator)
			| (SrsKind::PlateCarre, SrsKind::PlateCarre)
			| (SrsKind::Geocentric, SrsKind::Geocentric) => true,
			(SrsKind::TangentPlane { origin_lla: a, .. }, SrsKind::TangentPlane { origin_lla: b, .. }) => a == b,
			_ => false,
		}
	}

	/// Full equivalence. The core model carries no vertical datum, so this
	/// matches [`Srs::is_horiz_equivalent_to`].
	#[must_use]
	pub fn is_equivalent_to(&self, other: &Srs) -> bool {
		self.is_horiz_equivalent_to(other)
	}

	/// Stable hash of the horizontal definition, used in cache keys.
	#[must_use]
	pub fn horiz_signature(&self) -> u64 {
		let mut hasher = DefaultHasher::new();
		self.definition.hash(&mut hasher);
		hasher.finish()
	}

	/// Meters per unit of this SRS's horizontal axes, measured at the equator.
	/// Bridges degree- and meter-based resolutions.
	#[must_use]
	pub fn meters_per_unit(&self) -> f64 {
		if self.is_geographic() {
			2.0 * PI * self.ellipsoid.radius_equator() / 360.0
		} else {
			1.0
		}
	}

	/// Transforms `points` in place from this SRS into `to`.
	pub fn transform_points(&self, to: &Srs, points: &mut [DVec3]) -> Result<()> {
		if self.is_horiz_equivalent_to(to) {
			return Ok(());
		}
		for point in points.iter_mut() {
			let geo = self.to_geographic(*point)?;
			*point = to.from_geographic(geo)?;
		}
		Ok(())
	}

	/// Transforms a single point from this SRS into `to`.
	pub fn transform(&self, to: &Srs, point: DVec3) -> Result<DVec3> {
		let mut points = [point];
		self.transform_points(to, &mut points)?;
		Ok(points[0])
	}

	fn to_geographic(&self, p: DVec3) -> Result<DVec3> {
		Ok(match &self.kind {
			SrsKind::Geographic => p,
			SrsKind::SphericalMercator => {
				let r = self.ellipsoid.radius_equator();
				let lon = (p.x / r).to_degrees();
				let lat = (2.0 * (p.y / r).exp().atan() - FRAC_PI_2).to_degrees();
				DVec3::new(lon, lat, p.z)
			}
			SrsKind::PlateCarre => {
				let scale = self.meters_per_equatorial_degree();
				DVec3::new(p.x / scale, p.y / scale, p.z)
			}
			SrsKind::Geocentric => self.ellipsoid.geocentric_to_geodetic(p),
			SrsKind::TangentPlane { local_to_world, .. } => {
				let world = local_to_world.transform_point3(p);
				self.ellipsoid.geocentric_to_geodetic(world)
			}
		})
	}

	fn from_geographic(&self, p: DVec3) -> Result<DVec3> {
		Ok(match &self.kind {
			SrsKind::Geographic => p,
			SrsKind::SphericalMercator => {
				let r = self.ellipsoid.radius_equator();
				let lon = p.x.clamp(-180.0, 180.0);
				let lat = p.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
				let x = r * lon.to_radians();
				let y = r * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
				DVec3::new(x, y, p.z)
			}
			SrsKind::PlateCarre => {
				let scale = self.meters_per_equatorial_degree();
				DVec3::new(p.x * scale, p.y * scale, p.z)
			}
			SrsKind::Geocentric => self.ellipsoid.geodetic_to_geocentric(p),
			SrsKind::TangentPlane { world_to_local, .. } => {
				let world = self.ellipsoid.geodetic_to_geocentric(p);
				world_to_local.transform_point3(world)
			}
		})
	}

	fn meters_per_equatorial_degree(&self) -> f64 {
		2.0 * PI * self.ellipsoid.radius_equator() / 360.0
	}
}

impl PartialEq for Srs {
	fn eq(&self, other: &Self) -> bool {
		self.is_equivalent_to(other)
	}
}

impl std::str::FromStr for Srs {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self> {
		Ok(match s {
			"wgs84" | "epsg:4326" => Srs::geographic(),
			"spherical-mercator" | "epsg:3857" => Srs::spherical_mercator(),
			"plate-carre" => Srs::plate_carre(),
			"geocentric" | "ecef" => Srs::geocentric(),
			_ => bail!("unknown SRS definition: {s}"),
		})
	}
}
