//! `tileset.json` for a single-tile tree.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::b3dm::Tile;
use crate::bounds::BoundingVolume;
use crate::error::{PackError, Result};

pub const TILES_VERSION: &str = "1.0";

/// Geometry is written in the Z-up ENU frame, so clients must not apply the
/// default glTF Y-up rotation.
pub const GLTF_UP_AXIS: &str = "Z";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub version: String,
    #[serde(rename = "tilesetVersion", default, skip_serializing_if = "Option::is_none")]
    pub tileset_version: Option<String>,
    #[serde(rename = "gltfUpAxis", default, skip_serializing_if = "Option::is_none")]
    pub gltf_up_axis: Option<String>,
}

/// Only additive refinement is produced: the tree never has children that
/// would replace the root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Refine {
    Add,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileNode {
    #[serde(rename = "boundingVolume")]
    pub bounding_volume: BoundingVolume,
    #[serde(rename = "geometricError")]
    pub geometric_error: f64,
    pub refine: Refine,
    /// Column-major local-to-ECEF matrix.
    pub transform: [f64; 16],
    pub content: Content,
    /// The schema requires at least one child when present, so an empty
    /// list is left out of the JSON.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TilesetDescriptor {
    pub asset: Asset,
    #[serde(rename = "geometricError")]
    pub geometric_error: f64,
    pub root: TileNode,
}

impl TilesetDescriptor {
    pub fn with_tileset_version(mut self, version: impl Into<String>) -> Self {
        self.asset.tileset_version = Some(version.into());
        self
    }
}

/// Root descriptor referencing `tile` at `content_uri` (relative to the
/// tileset.json location).
pub fn build_tileset(tile: &Tile, content_uri: &str) -> Result<TilesetDescriptor> {
    if content_uri.trim().is_empty() {
        return Err(PackError::descriptor_write(
            content_uri,
            io::Error::new(io::ErrorKind::InvalidInput, "content uri is empty"),
        ));
    }

    // With no children this only decides when the tile is first loaded.
    let root_error = tile.bounding_volume.largest_extent();

    Ok(TilesetDescriptor {
        asset: Asset {
            version: TILES_VERSION.to_string(),
            tileset_version: None,
            gltf_up_axis: Some(GLTF_UP_AXIS.to_string()),
        },
        geometric_error: 2.0 * root_error,
        root: TileNode {
            bounding_volume: tile.bounding_volume,
            geometric_error: root_error,
            refine: Refine::Add,
            transform: tile.transform.to_cols_array(),
            content: Content {
                uri: content_uri.to_string(),
            },
            children: Vec::new(),
        },
    })
}

/// Pretty-prints `descriptor` to `path`.
pub fn write_tileset(descriptor: &TilesetDescriptor, path: &Path) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(descriptor)?;
    bytes.push(b'\n');
    fs::write(path, &bytes).map_err(|e| PackError::descriptor_write(path, e))?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
