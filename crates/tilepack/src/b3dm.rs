//! Batched 3D Model container around the GLB payload.

use std::io::{self, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde_json::json;

use crate::bounds::BoundingVolume;
use crate::error::{PackError, Result};
use crate::geo::Transform;
use crate::glb::{encode_glb, padding};
use crate::mesh::Mesh;

pub const B3DM_MAGIC: [u8; 4] = *b"b3dm";
pub const B3DM_VERSION: u32 = 1;
pub const B3DM_HEADER_LEN: usize = 28;

/// Fixed 28-byte b3dm header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct B3dmHeader {
    pub byte_length: u32,
    pub feature_table_json_byte_length: u32,
    pub feature_table_binary_byte_length: u32,
    pub batch_table_json_byte_length: u32,
    pub batch_table_binary_byte_length: u32,
}

impl B3dmHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&B3DM_MAGIC)?;
        w.write_u32::<LE>(B3DM_VERSION)?;
        w.write_u32::<LE>(self.byte_length)?;
        w.write_u32::<LE>(self.feature_table_json_byte_length)?;
        w.write_u32::<LE>(self.feature_table_binary_byte_length)?;
        w.write_u32::<LE>(self.batch_table_json_byte_length)?;
        w.write_u32::<LE>(self.batch_table_binary_byte_length)?;
        Ok(())
    }

    /// Parses and checks a header against the buffer it came from.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let bad = |msg: String| PackError::EncodingError(format!("invalid b3dm: {}", msg));

        if data.len() < B3DM_HEADER_LEN {
            return Err(bad(format!("{} bytes is shorter than the header", data.len())));
        }
        if data[0..4] != B3DM_MAGIC {
            return Err(bad(format!("bad magic {:?}", &data[0..4])));
        }

        let mut r = &data[4..B3DM_HEADER_LEN];
        let read = |r: &mut &[u8]| r.read_u32::<LE>().map_err(|e| bad(e.to_string()));
        let version = read(&mut r)?;
        if version != B3DM_VERSION {
            return Err(bad(format!("unsupported version {}", version)));
        }

        let header = Self {
            byte_length: read(&mut r)?,
            feature_table_json_byte_length: read(&mut r)?,
            feature_table_binary_byte_length: read(&mut r)?,
            batch_table_json_byte_length: read(&mut r)?,
            batch_table_binary_byte_length: read(&mut r)?,
        };

        if header.byte_length as usize != data.len() {
            return Err(bad(format!(
                "byteLength {} but buffer holds {}",
                header.byte_length,
                data.len()
            )));
        }
        if header.glb_offset() > data.len() {
            return Err(bad("table lengths overrun the buffer".into()));
        }

        Ok(header)
    }

    /// Offset of the embedded GLB: header plus all four table sections.
    pub fn glb_offset(&self) -> usize {
        B3DM_HEADER_LEN
            + self.feature_table_json_byte_length as usize
            + self.feature_table_binary_byte_length as usize
            + self.batch_table_json_byte_length as usize
            + self.batch_table_binary_byte_length as usize
    }
}

/// One encoded tile together with the placement it was encoded for.
#[derive(Debug, Clone)]
pub struct Tile {
    pub payload: Vec<u8>,
    pub bounding_volume: BoundingVolume,
    pub transform: Transform,
}

impl Tile {
    pub fn header(&self) -> Result<B3dmHeader> {
        B3dmHeader::read_from(&self.payload)
    }

    /// The embedded binary glTF.
    pub fn glb(&self) -> Result<&[u8]> {
        let offset = self.header()?.glb_offset();
        Ok(&self.payload[offset..])
    }
}

/// Feature table JSON, space padded so the section after it starts 8-aligned.
fn feature_table_json() -> Result<Vec<u8>> {
    // No per-feature batching: the whole mesh is one ungrouped model.
    let mut bytes = serde_json::to_vec(&json!({ "BATCH_LENGTH": 0 }))?;
    let pad = padding(B3DM_HEADER_LEN + bytes.len(), 8);
    bytes.resize(bytes.len() + pad, b' ');
    Ok(bytes)
}

/// Encodes `mesh` as a b3dm tile. The transform and bounding volume are not
/// baked into the geometry; they travel with the tile into the tileset.
pub fn encode_tile(
    mesh: &Mesh,
    transform: Transform,
    bounding_volume: BoundingVolume,
) -> Result<Tile> {
    if mesh.positions.is_empty() {
        return Err(PackError::EmptyMesh);
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(PackError::EncodingError(format!(
            "index count {} is not a multiple of 3",
            mesh.indices.len()
        )));
    }
    if mesh.indices.is_empty() {
        return Err(PackError::EncodingError("mesh has no triangles".into()));
    }
    mesh.validate()?;

    let glb = encode_glb(mesh)?;
    let ft_json = feature_table_json()?;

    let total = B3DM_HEADER_LEN + ft_json.len() + glb.len();
    let byte_length = u32::try_from(total)
        .map_err(|_| PackError::EncodingError(format!("tile of {} bytes exceeds u32", total)))?;

    let header = B3dmHeader {
        byte_length,
        feature_table_json_byte_length: ft_json.len() as u32,
        feature_table_binary_byte_length: 0,
        batch_table_json_byte_length: 0,
        batch_table_binary_byte_length: 0,
    };

    let mut payload = Vec::with_capacity(total);
    header
        .write_to(&mut payload)
        .map_err(|e| PackError::EncodingError(e.to_string()))?;
    payload.extend_from_slice(&ft_json);
    payload.extend_from_slice(&glb);
    debug_assert_eq!(payload.len(), total);

    debug!(
        "b3dm: header {} B, feature table {} B, glb {} B at offset {}",
        B3DM_HEADER_LEN,
        ft_json.len(),
        glb.len(),
        header.glb_offset()
    );

    Ok(Tile {
        payload,
        bounding_volume,
        transform,
    })
}
