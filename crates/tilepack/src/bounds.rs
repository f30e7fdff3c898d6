//! Bounding volumes in the tile's local frame.
//!
//! The volume is computed before the placement transform is applied; 3D Tiles
//! clients apply the tile `transform` to it, so it stays valid in ECEF.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PackError, Result};
use crate::mesh::Mesh;

/// Which variant `compute_bounding_volume` should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VolumeKind {
    #[default]
    Box,
    Sphere,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    /// Oriented box: center plus three half-axis vectors.
    Box {
        center: [f64; 3],
        half_axes: [[f64; 3]; 3],
    },
    Sphere {
        center: [f64; 3],
        radius: f64,
    },
}

/// Wire form used in tileset.json: `{"box": [12]}` or `{"sphere": [4]}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VolumeJson {
    Box([f64; 12]),
    Sphere([f64; 4]),
}

impl From<&BoundingVolume> for VolumeJson {
    fn from(v: &BoundingVolume) -> Self {
        match *v {
            BoundingVolume::Box { center, half_axes } => {
                let [x, y, z] = half_axes;
                VolumeJson::Box([
                    center[0], center[1], center[2], x[0], x[1], x[2], y[0], y[1], y[2], z[0],
                    z[1], z[2],
                ])
            }
            BoundingVolume::Sphere { center, radius } => {
                VolumeJson::Sphere([center[0], center[1], center[2], radius])
            }
        }
    }
}

impl From<VolumeJson> for BoundingVolume {
    fn from(v: VolumeJson) -> Self {
        match v {
            VolumeJson::Box(b) => BoundingVolume::Box {
                center: [b[0], b[1], b[2]],
                half_axes: [[b[3], b[4], b[5]], [b[6], b[7], b[8]], [b[9], b[10], b[11]]],
            },
            VolumeJson::Sphere(s) => BoundingVolume::Sphere {
                center: [s[0], s[1], s[2]],
                radius: s[3],
            },
        }
    }
}

impl Serialize for BoundingVolume {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        VolumeJson::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BoundingVolume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        VolumeJson::deserialize(deserializer).map(BoundingVolume::from)
    }
}

impl BoundingVolume {
    /// Longest edge of the box, or the sphere's diameter.
    pub fn largest_extent(&self) -> f64 {
        match self {
            BoundingVolume::Box { half_axes, .. } => {
                2.0 * half_axes.iter().map(|a| length(*a)).fold(0.0, f64::max)
            }
            BoundingVolume::Sphere { radius, .. } => 2.0 * radius,
        }
    }

    /// Inclusive containment test, no tolerance.
    pub fn contains(&self, p: [f64; 3]) -> bool {
        match self {
            BoundingVolume::Box { center, half_axes } => {
                let d = sub(p, *center);
                half_axes.iter().enumerate().all(|(k, axis)| {
                    let len = length(*axis);
                    if len == 0.0 {
                        // Degenerate axis: the canonical direction is the only one we can test.
                        d[k] == 0.0
                    } else {
                        let dir = [axis[0] / len, axis[1] / len, axis[2] / len];
                        dot(d, dir).abs() <= len
                    }
                })
            }
            BoundingVolume::Sphere { center, radius } => length(sub(p, *center)) <= *radius,
        }
    }
}

/// Axis-aligned box (or min/max-centered sphere) enclosing every vertex.
pub fn compute_bounding_volume(mesh: &Mesh, kind: VolumeKind) -> Result<BoundingVolume> {
    let (lo, hi) = mesh.extent().ok_or(PackError::EmptyMesh)?;
    let lo = lo.map(f64::from);
    let hi = hi.map(f64::from);
    let center = [
        0.5 * (lo[0] + hi[0]),
        0.5 * (lo[1] + hi[1]),
        0.5 * (lo[2] + hi[2]),
    ];

    let volume = match kind {
        VolumeKind::Box => {
            let mut half = [0.0f64; 3];
            for k in 0..3 {
                half[k] = cover(center[k], 0.5 * (hi[k] - lo[k]), lo[k], hi[k]);
            }
            BoundingVolume::Box {
                center,
                half_axes: [[half[0], 0.0, 0.0], [0.0, half[1], 0.0], [0.0, 0.0, half[2]]],
            }
        }
        VolumeKind::Sphere => {
            let radius = mesh
                .positions
                .iter()
                .map(|p| length(sub(p.map(f64::from), center)))
                .fold(0.0, f64::max);
            BoundingVolume::Sphere { center, radius }
        }
    };

    Ok(volume)
}

/// Grows `h` until `[c - h, c + h]` holds `lo..=hi` under f64 rounding.
fn cover(c: f64, mut h: f64, lo: f64, hi: f64) -> f64 {
    while hi - c > h || c - lo > h || c + h < hi || c - h > lo {
        h += h.abs().max(f64::MIN_POSITIVE) * f64::EPSILON;
    }
    h
}

#[inline]
fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn length(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
