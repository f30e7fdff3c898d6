//! Wavefront OBJ reader: positions, normals, texture coordinates and polygon
//! faces. Materials, groups and smoothing are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::Vec3;
use log::{info, warn};
use tilepack::Mesh;

use super::{Decoder, UpAxis};

#[derive(Clone, Copy, Debug)]
pub struct ObjDecoder {
    up_axis: UpAxis,
}

impl ObjDecoder {
    pub fn new(up_axis: UpAxis) -> Self {
        Self { up_axis }
    }
}

/// One face corner as `v/vt/vn`, zero-based and already resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Corner {
    v: usize,
    vt: Option<usize>,
    vn: Option<usize>,
}

/// 1-based or negative (relative to the end) OBJ index into a list of `len`.
fn resolve_index(raw: &str, len: usize, what: &str) -> Result<usize> {
    let i: i64 = raw
        .parse()
        .with_context(|| format!("bad {} index '{}'", what, raw))?;
    let resolved = if i > 0 {
        i - 1
    } else if i < 0 {
        len as i64 + i
    } else {
        bail!("{} index 0 is not valid", what);
    };
    if resolved < 0 || resolved as usize >= len {
        bail!("{} index {} out of range (have {})", what, i, len);
    }
    Ok(resolved as usize)
}

fn parse_corner(token: &str, nv: usize, nvt: usize, nvn: usize) -> Result<Corner> {
    let mut parts = token.split('/');
    let v = resolve_index(parts.next().context("Missing vertex index")?, nv, "vertex")?;
    let vt = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, nvt, "texcoord")?),
        _ => None,
    };
    let vn = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, nvn, "normal")?),
        _ => None,
    };
    Ok(Corner { v, vt, vn })
}

fn parse_floats<const N: usize>(parts: &mut std::str::SplitWhitespace<'_>, what: &str) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = parts
            .next()
            .with_context(|| format!("Missing {} component {}", what, k))?
            .parse::<f32>()
            .with_context(|| format!("bad {} component {}", what, k))?;
    }
    Ok(out)
}

/// Reads an OBJ stream into a mesh. Faces are fan-triangulated and corners
/// are de-duplicated, so one output vertex exists per distinct `v/vt/vn`.
pub(crate) fn parse_obj<R: Read>(r: R, up_axis: UpAxis) -> Result<Mesh> {
    let reader = BufReader::new(r);

    let mut positions = Vec::<[f32; 3]>::new();
    let mut normals = Vec::<[f32; 3]>::new();
    let mut texcoords = Vec::<[f32; 2]>::new();

    let mut corners = Vec::<Corner>::new();
    let mut corner_ids = HashMap::<Corner, u32>::new();
    let mut indices = Vec::<u32>::new();
    let mut degenerate_faces = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        let at = || format!("line {}", lineno + 1);

        match parts.next() {
            Some("v") => {
                let p = parse_floats::<3>(&mut parts, "v").with_context(at)?;
                positions.push(up_axis.to_enu(p));
            }
            Some("vn") => {
                let n = parse_floats::<3>(&mut parts, "vn").with_context(at)?;
                normals.push(up_axis.to_enu(n));
            }
            Some("vt") => {
                // v defaults to 0 when absent; an optional w is dropped.
                let [u] = parse_floats::<1>(&mut parts, "vt").with_context(at)?;
                let v = match parts.next() {
                    Some(s) => s
                        .parse::<f32>()
                        .context("bad vt component 1")
                        .with_context(at)?,
                    None => 0.0,
                };
                texcoords.push([u, v]);
            }
            Some("f") => {
                let mut face = Vec::with_capacity(4);
                for token in parts {
                    let corner = parse_corner(token, positions.len(), texcoords.len(), normals.len())
                        .with_context(at)?;
                    let id = match corner_ids.get(&corner) {
                        Some(&id) => id,
                        None => {
                            let id = u32::try_from(corners.len())
                                .context("too many vertices for a single tile")?;
                            corners.push(corner);
                            corner_ids.insert(corner, id);
                            id
                        }
                    };
                    face.push(id);
                }
                if face.len() < 3 {
                    degenerate_faces += 1;
                    continue;
                }
                for k in 1..face.len() - 1 {
                    indices.extend_from_slice(&[face[0], face[k], face[k + 1]]);
                }
            }
            _ => {}
        }
    }

    if degenerate_faces > 0 {
        warn!("Skipped {} face(s) with fewer than 3 corners", degenerate_faces);
    }
    if indices.is_empty() {
        bail!("no faces");
    }

    let mut mesh = Mesh::new(corners.iter().map(|c| positions[c.v]).collect(), indices);

    // Attributes only survive when every corner carries them.
    if corners.iter().all(|c| c.vn.is_some()) {
        let unit: Option<Vec<[f32; 3]>> = corners
            .iter()
            .filter_map(|c| c.vn)
            .map(|i| Vec3::from_array(normals[i]).try_normalize().map(|n| n.to_array()))
            .collect();
        match unit {
            Some(n) => mesh.normals = Some(n),
            None => warn!("Dropping normals: at least one has zero length"),
        }
    }
    if corners.iter().all(|c| c.vt.is_some()) {
        mesh.uvs = Some(
            corners
                .iter()
                .filter_map(|c| c.vt.map(|i| texcoords[i]))
                // OBJ puts v=0 at the bottom, glTF at the top.
                .map(|[u, v]| [u, 1.0 - v])
                .collect(),
        );
    }

    Ok(mesh)
}

impl Decoder for ObjDecoder {
    fn decode(&self, path: &Path) -> Result<Mesh> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mesh = parse_obj(file, self.up_axis).with_context(|| format!("reading OBJ {}", path.display()))?;
        info!(
            "Decoded {} ({} vertices, {} triangles)",
            path.display(),
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    fn name(&self) -> &'static str {
        "obj"
    }
}
