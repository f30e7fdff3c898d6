//! tilepack: packs one decoded mesh into a geo-referenced 3D Tiles 1.0 tile.
//!
//! - Anchors the mesh's local ENU frame (x east, y north, z up, meters) on the
//!   WGS-84 ellipsoid through a 4x4 local-to-ECEF transform.
//! - Computes a box or sphere bounding volume in the local frame.
//! - Encodes the mesh as binary glTF wrapped in a b3dm container.
//! - Emits the `tileset.json` root document that references the tile.
//!
//! b3dm layout (little-endian):
//!   00  : [u8;4]  magic = b"b3dm"
//!   04  : u32     version = 1
//!   08  : u32     byteLength (whole tile)
//!   0C  : u32     featureTableJSONByteLength
//!   10  : u32     featureTableBinaryByteLength (0)
//!   14  : u32     batchTableJSONByteLength (0)
//!   18  : u32     batchTableBinaryByteLength (0)
//!   1C  : feature table JSON `{"BATCH_LENGTH":0}`, space padded to 8 bytes
//!   ..  : GLB payload (glTF 2.0 binary), 8-byte aligned start and length

pub mod b3dm;
pub mod bounds;
pub mod error;
pub mod geo;
pub mod glb;
pub mod mesh;
pub mod tileset;

pub use b3dm::{encode_tile, B3dmHeader, Tile};
pub use bounds::{compute_bounding_volume, BoundingVolume, VolumeKind};
pub use error::{PackError, Result};
pub use geo::{compute_transform, ecef_to_geodetic, geodetic_to_ecef, wgs84, GeoAnchor, Transform};
pub use glb::IndexWidth;
pub use mesh::Mesh;
pub use tileset::{build_tileset, write_tileset, TilesetDescriptor};
