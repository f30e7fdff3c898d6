//! glTF 2.0 / GLB importer: merges every triangle primitive reachable from the
//! default scene into one mesh, with node transforms baked in.
//! Embedded (data URI) and external buffers both go through gltf::import.

use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::{Mat3, Mat4, Vec3};
use log::{debug, info, warn};
use tilepack::Mesh;

use super::{Decoder, UpAxis};

#[derive(Clone, Copy, Debug)]
pub struct GltfDecoder {
    up_axis: UpAxis,
}

impl GltfDecoder {
    pub fn new(up_axis: UpAxis) -> Self {
        Self { up_axis }
    }
}

/// Accumulates primitives; an attribute survives only if every primitive has it.
struct MeshBuilder {
    up_axis: UpAxis,
    mesh: Mesh,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    all_normals: bool,
    all_uvs: bool,
    skipped: usize,
}

impl MeshBuilder {
    fn new(up_axis: UpAxis) -> Self {
        Self {
            up_axis,
            mesh: Mesh::default(),
            normals: Vec::new(),
            uvs: Vec::new(),
            all_normals: true,
            all_uvs: true,
            skipped: 0,
        }
    }

    fn add_primitive(
        &mut self,
        prim: &::gltf::Primitive<'_>,
        buffers: &[::gltf::buffer::Data],
        world: Mat4,
    ) -> Result<()> {
        if prim.mode() != ::gltf::mesh::Mode::Triangles {
            self.skipped += 1;
            return Ok(());
        }

        let reader = prim.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

        let Some(positions) = reader.read_positions() else {
            self.skipped += 1;
            return Ok(());
        };

        let base = self.mesh.positions.len();
        let base_u32 = u32::try_from(base).context("too many vertices for a single tile")?;
        let normal_matrix = Mat3::from_mat4(world).inverse().transpose();

        for p in positions {
            let w = world.transform_point3(Vec3::from_array(p));
            self.mesh.positions.push(self.up_axis.to_enu(w.to_array()));
        }
        let count = self.mesh.positions.len() - base;

        match reader.read_normals() {
            Some(normals) if self.all_normals => {
                for n in normals {
                    // A zero or non-finite normal has no direction; the whole
                    // attribute is dropped rather than written non-unit.
                    match (normal_matrix * Vec3::from_array(n)).try_normalize() {
                        Some(n) => self.normals.push(self.up_axis.to_enu(n.to_array())),
                        None => {
                            self.all_normals = false;
                            break;
                        }
                    }
                }
            }
            _ => self.all_normals = false,
        }

        match reader.read_tex_coords(0) {
            Some(uvs) if self.all_uvs => self.uvs.extend(uvs.into_f32()),
            _ => self.all_uvs = false,
        }

        let count_u32 = u32::try_from(count).context("too many vertices for a single tile")?;
        let local: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..count_u32).collect(),
        };
        if local.len() % 3 != 0 {
            bail!("primitive has {} indices, not a triangle list", local.len());
        }
        // Indices are local to the primitive; after offsetting, an out-of-range
        // one would silently land on a neighbouring primitive's vertex.
        if let Some(&bad) = local.iter().find(|&&i| i >= count_u32) {
            bail!("primitive index {} out of range (primitive has {} vertices)", bad, count);
        }
        let offset = |i: u32| {
            i.checked_add(base_u32)
                .context("too many vertices for a single tile")
        };

        // Mirroring node transforms flip the winding order.
        let flip = world.determinant() < 0.0;
        for tri in local.chunks_exact(3) {
            let (a, b, c) = (offset(tri[0])?, offset(tri[1])?, offset(tri[2])?);
            if flip {
                self.mesh.indices.extend_from_slice(&[a, c, b]);
            } else {
                self.mesh.indices.extend_from_slice(&[a, b, c]);
            }
        }

        Ok(())
    }

    fn visit(&mut self, node: ::gltf::Node<'_>, parent: Mat4, buffers: &[::gltf::buffer::Data]) -> Result<()> {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for prim in mesh.primitives() {
                self.add_primitive(&prim, buffers, world)?;
            }
        }
        for child in node.children() {
            self.visit(child, world, buffers)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Mesh {
        if self.skipped > 0 {
            warn!("Skipped {} non-triangle primitive(s)", self.skipped);
        }
        if self.all_normals && self.normals.len() == self.mesh.positions.len() {
            self.mesh.normals = Some(self.normals);
        }
        if self.all_uvs && self.uvs.len() == self.mesh.positions.len() {
            self.mesh.uvs = Some(self.uvs);
        }
        self.mesh
    }
}

impl Decoder for GltfDecoder {
    fn decode(&self, path: &Path) -> Result<Mesh> {
        let (doc, buffers, _images) =
            ::gltf::import(path).with_context(|| format!("reading glTF {}", path.display()))?;

        let mut builder = MeshBuilder::new(self.up_axis);

        match doc.default_scene().or_else(|| doc.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    builder.visit(node, Mat4::IDENTITY, &buffers)?;
                }
            }
            None => {
                // No scene graph: take the meshes as they are.
                debug!("{}: no scenes, using raw meshes", path.display());
                for mesh in doc.meshes() {
                    for prim in mesh.primitives() {
                        builder.add_primitive(&prim, &buffers, Mat4::IDENTITY)?;
                    }
                }
            }
        }

        let mesh = builder.finish();
        if mesh.positions.is_empty() || mesh.indices.is_empty() {
            bail!("{}: no triangle geometry", path.display());
        }

        info!(
            "Decoded {} ({} vertices, {} triangles, normals: {}, uvs: {})",
            path.display(),
            mesh.vertex_count(),
            mesh.triangle_count(),
            mesh.normals.is_some(),
            mesh.uvs.is_some()
        );

        Ok(mesh)
    }

    fn name(&self) -> &'static str {
        "gltf"
    }
}
