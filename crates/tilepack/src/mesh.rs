//! Triangle-list mesh handed over by a decoder.

use crate::error::{PackError, Result};

/// Indexed triangle list in the local ENU frame (meters).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
}

impl Mesh {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            normals: None,
            uvs: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn max_index(&self) -> Option<u32> {
        self.indices.iter().copied().max()
    }

    /// Checks the structural invariants the encoder relies on: vertices
    /// present and finite, attributes aligned with positions, indices in range.
    pub fn validate(&self) -> Result<()> {
        if self.positions.is_empty() {
            return Err(PackError::EmptyMesh);
        }

        if let Some(i) = self
            .positions
            .iter()
            .position(|p| !(p[0].is_finite() && p[1].is_finite() && p[2].is_finite()))
        {
            return Err(PackError::MalformedMesh(format!(
                "vertex {} has a non-finite coordinate",
                i
            )));
        }

        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err(PackError::MalformedMesh(format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    self.positions.len()
                )));
            }
        }

        if let Some(uvs) = &self.uvs {
            if uvs.len() != self.positions.len() {
                return Err(PackError::MalformedMesh(format!(
                    "{} uvs for {} vertices",
                    uvs.len(),
                    self.positions.len()
                )));
            }
        }

        if let Some(max) = self.max_index() {
            if max as usize >= self.positions.len() {
                return Err(PackError::MalformedMesh(format!(
                    "index {} out of range for {} vertices",
                    max,
                    self.positions.len()
                )));
            }
        }

        Ok(())
    }

    /// Axis-aligned min/max over all positions, or `None` for an empty mesh.
    pub fn extent(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(mut lo, mut hi), p| {
            for k in 0..3 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
            (lo, hi)
        }))
    }
}
