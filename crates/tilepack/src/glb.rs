//! Binary glTF 2.0 writer for a single triangle-list mesh.
//!
//! GLB layout (little-endian):
//!   00  : [u8;4]  magic = b"glTF"
//!   04  : u32     version = 2
//!   08  : u32     length (whole GLB)
//!   0C  : u32     JSON chunk length, u32 "JSON", JSON text (space padded)
//!   ..  : u32     BIN chunk length,  u32 "BIN\0", buffer bytes (zero padded)
//!
//! Both chunks are padded so the BIN data and the end of the GLB fall on
//! 8-byte boundaries, which keeps the whole b3dm 8-byte aligned.

use std::io::{self, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde_json::{json, Value};

use crate::error::{PackError, Result};
use crate::mesh::Mesh;

pub const GLB_MAGIC: [u8; 4] = *b"glTF";
pub const GLB_VERSION: u32 = 2;
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
pub const CHUNK_BIN: u32 = 0x004E_4942;

const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const COMPONENT_FLOAT: u32 = 5126;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

/// Index component width, the narrowest one that holds the largest index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    pub fn for_max_index(max: u32) -> Self {
        if max < 65_536 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// glTF accessor `componentType`.
    pub fn component_type(self) -> u32 {
        match self {
            IndexWidth::U16 => 5123,
            IndexWidth::U32 => 5125,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

/// Bytes needed to bring `len` up to a multiple of `align`.
#[inline]
pub(crate) fn padding(len: usize, align: usize) -> usize {
    (align - len % align) % align
}

/// Serializes `mesh` as GLB. The mesh must already be validated as a
/// non-empty triangle list.
pub fn encode_glb(mesh: &Mesh) -> Result<Vec<u8>> {
    let (lo, hi) = mesh.extent().ok_or(PackError::EmptyMesh)?;
    let max_index = mesh
        .max_index()
        .ok_or_else(|| PackError::EncodingError("mesh has no triangles".into()))?;
    let width = IndexWidth::for_max_index(max_index);
    let vertex_count = mesh.vertex_count();

    let bin = build_buffer(mesh, width).map_err(encoding)?;

    let mut views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();
    let mut offset = 0usize;

    let mut push_view = |len: usize, target: u32, views: &mut Vec<Value>| -> usize {
        views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": len,
            "target": target,
        }));
        offset += len;
        views.len() - 1
    };

    let view = push_view(vertex_count * 12, TARGET_ARRAY_BUFFER, &mut views);
    accessors.push(json!({
        "bufferView": view,
        "componentType": COMPONENT_FLOAT,
        "count": vertex_count,
        "type": "VEC3",
        "min": lo,
        "max": hi,
    }));
    attributes.insert("POSITION".into(), json!(accessors.len() - 1));

    if mesh.normals.is_some() {
        let view = push_view(vertex_count * 12, TARGET_ARRAY_BUFFER, &mut views);
        accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": vertex_count,
            "type": "VEC3",
        }));
        attributes.insert("NORMAL".into(), json!(accessors.len() - 1));
    }

    if mesh.uvs.is_some() {
        let view = push_view(vertex_count * 8, TARGET_ARRAY_BUFFER, &mut views);
        accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": vertex_count,
            "type": "VEC2",
        }));
        attributes.insert("TEXCOORD_0".into(), json!(accessors.len() - 1));
    }

    let view = push_view(
        mesh.indices.len() * width.byte_size(),
        TARGET_ELEMENT_ARRAY_BUFFER,
        &mut views,
    );
    accessors.push(json!({
        "bufferView": view,
        "componentType": width.component_type(),
        "count": mesh.indices.len(),
        "type": "SCALAR",
    }));
    let indices_accessor = accessors.len() - 1;

    let doc = json!({
        "asset": { "version": "2.0", "generator": concat!("tilepack ", env!("CARGO_PKG_VERSION")) },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": indices_accessor,
                "material": 0,
                "mode": MODE_TRIANGLES,
            }]
        }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 1.0, 1.0, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
            "doubleSided": true,
        }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": views,
        "accessors": accessors,
    });

    let mut json_bytes = serde_json::to_vec(&doc)?;
    // BIN data must start 8-aligned: 12 + 8 + json_len ≡ 0 (mod 8).
    let json_pad = padding(GLB_HEADER_LEN + CHUNK_HEADER_LEN + json_bytes.len(), 8);
    json_bytes.resize(json_bytes.len() + json_pad, b' ');

    let total = GLB_HEADER_LEN + CHUNK_HEADER_LEN + json_bytes.len() + CHUNK_HEADER_LEN + bin.len();
    let total_u32 = u32::try_from(total)
        .map_err(|_| PackError::EncodingError(format!("GLB of {} bytes exceeds u32", total)))?;

    let mut out = Vec::with_capacity(total);
    write_glb(&mut out, total_u32, &json_bytes, &bin).map_err(encoding)?;
    debug_assert_eq!(out.len(), total);

    debug!(
        "GLB: {} vertices, {} triangles, {:?} indices, json {} B, bin {} B, total {} B",
        vertex_count,
        mesh.triangle_count(),
        width,
        json_bytes.len(),
        bin.len(),
        total
    );

    Ok(out)
}

fn build_buffer(mesh: &Mesh, width: IndexWidth) -> io::Result<Vec<u8>> {
    let n = mesh.vertex_count();
    let uv_len = if mesh.uvs.is_some() { n * 8 } else { 0 };
    let normal_len = if mesh.normals.is_some() { n * 12 } else { 0 };
    let mut bin =
        Vec::with_capacity(n * 12 + normal_len + uv_len + mesh.indices.len() * width.byte_size() + 8);

    for p in &mesh.positions {
        for &c in p {
            bin.write_f32::<LE>(c)?;
        }
    }

    if let Some(normals) = &mesh.normals {
        for nrm in normals {
            for &c in nrm {
                bin.write_f32::<LE>(c)?;
            }
        }
    }

    if let Some(uvs) = &mesh.uvs {
        for uv in uvs {
            bin.write_f32::<LE>(uv[0])?;
            bin.write_f32::<LE>(uv[1])?;
        }
    }

    match width {
        IndexWidth::U16 => {
            for &i in &mesh.indices {
                bin.write_u16::<LE>(i as u16)?;
            }
        }
        IndexWidth::U32 => {
            for &i in &mesh.indices {
                bin.write_u32::<LE>(i)?;
            }
        }
    }

    bin.resize(bin.len() + padding(bin.len(), 8), 0);
    Ok(bin)
}

fn write_glb<W: Write>(w: &mut W, total: u32, json: &[u8], bin: &[u8]) -> io::Result<()> {
    w.write_all(&GLB_MAGIC)?;
    w.write_u32::<LE>(GLB_VERSION)?;
    w.write_u32::<LE>(total)?;

    w.write_u32::<LE>(json.len() as u32)?;
    w.write_u32::<LE>(CHUNK_JSON)?;
    w.write_all(json)?;

    w.write_u32::<LE>(bin.len() as u32)?;
    w.write_u32::<LE>(CHUNK_BIN)?;
    w.write_all(bin)?;

    Ok(())
}

fn encoding(e: io::Error) -> PackError {
    PackError::EncodingError(e.to_string())
}

/// Splits a GLB into its parsed JSON document and BIN chunk.
pub fn parse_glb(data: &[u8]) -> Result<(Value, &[u8])> {
    let bad = |msg: &str| PackError::EncodingError(format!("invalid GLB: {}", msg));

    if data.len() < GLB_HEADER_LEN || data[0..4] != GLB_MAGIC {
        return Err(bad("missing glTF magic"));
    }

    let mut r = &data[4..GLB_HEADER_LEN];
    let version = r.read_u32::<LE>().map_err(encoding)?;
    let length = r.read_u32::<LE>().map_err(encoding)? as usize;
    if version != GLB_VERSION {
        return Err(bad("unsupported version"));
    }
    if length != data.len() {
        return Err(bad("declared length does not match buffer"));
    }

    let mut offset = GLB_HEADER_LEN;
    let mut json_doc = None;
    let mut bin: &[u8] = &[];

    while offset + CHUNK_HEADER_LEN <= data.len() {
        let mut r = &data[offset..offset + CHUNK_HEADER_LEN];
        let chunk_len = r.read_u32::<LE>().map_err(encoding)? as usize;
        let chunk_type = r.read_u32::<LE>().map_err(encoding)?;
        offset += CHUNK_HEADER_LEN;

        let end = offset + chunk_len;
        if end > data.len() {
            return Err(bad("chunk overruns buffer"));
        }

        match chunk_type {
            CHUNK_JSON => json_doc = Some(serde_json::from_slice(&data[offset..end])?),
            CHUNK_BIN => bin = &data[offset..end],
            _ => {}
        }
        offset = end;
    }

    let json_doc = json_doc.ok_or_else(|| bad("no JSON chunk"))?;
    Ok((json_doc, bin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::unit_cube;

    #[test]
    fn test_index_width_threshold() {
        assert_eq!(IndexWidth::for_max_index(0), IndexWidth::U16);
        assert_eq!(IndexWidth::for_max_index(65_535), IndexWidth::U16);
        assert_eq!(IndexWidth::for_max_index(65_536), IndexWidth::U32);
        assert_eq!(IndexWidth::U16.component_type(), 5123);
        assert_eq!(IndexWidth::U32.component_type(), 5125);
    }

    #[test]
    fn test_cube_glb_layout() {
        let glb = encode_glb(&unit_cube()).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(glb.len() % 8, 0);

        let json_len = u32::from_le_bytes(glb[12..16].try_into().unwrap()) as usize;
        assert_eq!((GLB_HEADER_LEN + CHUNK_HEADER_LEN + json_len) % 8, 0);

        let (doc, bin) = parse_glb(&glb).unwrap();
        assert_eq!(bin.len() % 8, 0);
        assert_eq!(doc["buffers"][0]["byteLength"].as_u64(), Some(bin.len() as u64));

        let idx = &doc["accessors"][1];
        assert_eq!(idx["componentType"].as_u64(), Some(5123));
        assert_eq!(idx["count"].as_u64(), Some(36));
        assert_eq!(doc["accessors"][0]["min"][0].as_f64(), Some(-0.5));
        assert_eq!(doc["accessors"][0]["max"][2].as_f64(), Some(0.5));

        // Second position, read back from the buffer.
        let x = f32::from_le_bytes(bin[12..16].try_into().unwrap());
        assert_eq!(x, 0.5);
    }

    #[test]
    fn test_optional_attributes() {
        let mut mesh = unit_cube();
        mesh.normals = Some(vec![[0.0, 0.0, 1.0]; 8]);
        mesh.uvs = Some(vec![[0.25, 0.75]; 8]);
        let glb = encode_glb(&mesh).unwrap();
        let (doc, bin) = parse_glb(&glb).unwrap();

        let attrs = &doc["meshes"][0]["primitives"][0]["attributes"];
        assert_eq!(attrs["POSITION"].as_u64(), Some(0));
        assert_eq!(attrs["NORMAL"].as_u64(), Some(1));
        assert_eq!(attrs["TEXCOORD_0"].as_u64(), Some(2));

        let uv_view = &doc["bufferViews"][2];
        assert_eq!(uv_view["byteOffset"].as_u64(), Some(8 * 24));
        let start = 8 * 24;
        assert_eq!(f32::from_le_bytes(bin[start..start + 4].try_into().unwrap()), 0.25);
    }

    #[test]
    fn test_wide_indices() {
        let n = 65_537u32;
        let positions = (0..n).map(|i| [i as f32, 0.0, 0.0]).collect();
        let mut indices: Vec<u32> = (0..n - 2).flat_map(|i| [i, i + 1, i + 2]).collect();
        indices.truncate(indices.len() - indices.len() % 3);
        let mesh = Mesh::new(positions, indices);

        let glb = encode_glb(&mesh).unwrap();
        let (doc, bin) = parse_glb(&glb).unwrap();
        let idx = doc["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(doc["accessors"][idx]["componentType"].as_u64(), Some(5125));

        let view = &doc["bufferViews"][idx];
        let off = view["byteOffset"].as_u64().unwrap() as usize;
        let len = view["byteLength"].as_u64().unwrap() as usize;
        assert_eq!(len, mesh.indices.len() * 4);
        let last = u32::from_le_bytes(bin[off + len - 4..off + len].try_into().unwrap());
        assert_eq!(last, 65_536);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_glb(b"nope").is_err());
        let mut glb = encode_glb(&unit_cube()).unwrap();
        glb.truncate(glb.len() - 8);
        assert!(parse_glb(&glb).is_err());
    }
}
