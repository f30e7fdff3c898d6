//! WGS-84 geodesy and the local ENU → ECEF placement transform.

use glam::{DMat4, DVec3, DVec4};

use crate::error::{PackError, Result};

pub mod wgs84 {
    /// Semi-major axis (equatorial radius) in meters.
    pub const A: f64 = 6_378_137.0;

    /// Flattening factor (1 / 298.257223563).
    pub const F: f64 = 1.0 / 298.257_223_563;

    /// First eccentricity squared.
    pub const E2: f64 = F * (2.0 - F);

    /// Semi-minor axis (polar radius) in meters.
    pub const B: f64 = A * (1.0 - F);

    /// Second eccentricity squared.
    pub const E2P: f64 = (A * A - B * B) / (B * B);
}

#[inline]
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, h_m: f64) -> [f64; 3] {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let (sl, cl) = lat.sin_cos();
    let (so, co) = lon.sin_cos();
    let n = wgs84::A / (1.0 - wgs84::E2 * sl * sl).sqrt();
    let x = (n + h_m) * cl * co;
    let y = (n + h_m) * cl * so;
    let z = (n * (1.0 - wgs84::E2) + h_m) * sl;
    [x, y, z]
}

/// Bowring's single-step inverse. Height uses the projection form, which
/// stays finite at the poles where `p / cos(lat)` does not.
#[inline]
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    use wgs84::*;

    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x);
    let theta = (z * A).atan2(p * B);
    let (st, ct) = theta.sin_cos();
    let lat = (z + E2P * B * st * st * st).atan2(p - E2 * A * ct * ct * ct);
    let (sin_lat, cos_lat) = lat.sin_cos();
    let h = p * cos_lat + z * sin_lat - A * (1.0 - E2 * sin_lat * sin_lat).sqrt();

    (lat.to_degrees(), lon.to_degrees(), h)
}

/// Geographic placement of the model's local origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoAnchor {
    longitude: f64,
    latitude: f64,
    height: f64,
}

impl GeoAnchor {
    /// Validates ranges. Height may be negative (below the ellipsoid).
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Result<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PackError::InvalidAnchor(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PackError::InvalidAnchor(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !height.is_finite() {
            return Err(PackError::InvalidAnchor(format!(
                "height {} is not finite",
                height
            )));
        }

        Ok(Self {
            longitude,
            latitude,
            height,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn to_ecef(&self) -> [f64; 3] {
        geodetic_to_ecef(self.latitude, self.longitude, self.height)
    }
}

impl Default for GeoAnchor {
    /// (0, 0, 0): the equator / prime meridian point on the ellipsoid surface.
    fn default() -> Self {
        Self {
            longitude: 0.0,
            latitude: 0.0,
            height: 0.0,
        }
    }
}

/// Local-to-ECEF affine transform. Columns are east, north, up, translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(DMat4);

impl Transform {
    pub const IDENTITY: Transform = Transform(DMat4::IDENTITY);

    pub fn matrix(&self) -> &DMat4 {
        &self.0
    }

    /// Column-major, as 3D Tiles `transform` expects.
    pub fn to_cols_array(&self) -> [f64; 16] {
        self.0.to_cols_array()
    }

    pub fn translation(&self) -> [f64; 3] {
        self.0.w_axis.truncate().to_array()
    }

    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        self.0.transform_point3(DVec3::from_array(p)).to_array()
    }
}

/// Builds the ENU frame at the anchor and places it at the anchor's ECEF
/// position.
pub fn compute_transform(anchor: &GeoAnchor) -> Transform {
    let lat = anchor.latitude.to_radians();
    let lon = anchor.longitude.to_radians();
    let (sφ, cφ) = lat.sin_cos();
    let (sλ, cλ) = lon.sin_cos();

    let east = DVec3::new(-sλ, cλ, 0.0);
    let north = DVec3::new(-sφ * cλ, -sφ * sλ, cφ);
    let up = DVec3::new(cφ * cλ, cφ * sλ, sφ);
    let origin = DVec3::from_array(anchor.to_ecef());

    Transform(DMat4::from_cols(
        east.extend(0.0),
        north.extend(0.0),
        up.extend(0.0),
        DVec4::new(origin.x, origin.y, origin.z, 1.0),
    ))
}
