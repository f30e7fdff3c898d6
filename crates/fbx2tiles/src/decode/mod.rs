//! Input decoders. Each one turns a model file into a [`Mesh`] in the local
//! ENU frame (x east, y north, z up), which is what the packager expects.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::ValueEnum;
use tilepack::Mesh;

mod fbx;
mod gltf_read;
mod obj;

pub use self::fbx::{locate_converter_output, Fbx2GltfDecoder};
pub use self::gltf_read::GltfDecoder;
pub use self::obj::ObjDecoder;

/// Capability to produce a mesh from a file on disk.
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Mesh>;

    /// Short label for log lines.
    fn name(&self) -> &'static str;
}

/// Up axis of the source coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UpAxis {
    /// +Y is up (glTF convention, also the usual OBJ/FBX export).
    #[default]
    Y,
    /// +Z is up; coordinates are already east/north/up.
    Z,
}

impl std::fmt::Display for UpAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UpAxis::Y => "y",
            UpAxis::Z => "z",
        })
    }
}

impl UpAxis {
    /// Rotates a source vector into the Z-up frame: +90° about X for Y-up.
    #[inline]
    pub fn to_enu(self, v: [f32; 3]) -> [f32; 3] {
        match self {
            UpAxis::Y => [v[0], -v[2], v[1]],
            UpAxis::Z => v,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Fbx,
    Gltf,
    Obj,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        Ok(match ext.as_str() {
            "fbx" => InputFormat::Fbx,
            "gltf" | "glb" => InputFormat::Gltf,
            "obj" => InputFormat::Obj,
            "" => bail!("{}: no file extension, cannot pick a decoder", path.display()),
            other => bail!(
                "{}: unsupported input format '.{}' (expected .fbx, .gltf, .glb or .obj)",
                path.display(),
                other
            ),
        })
    }
}

/// Settings shared by the decoders.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub up_axis: UpAxis,
    /// FBX2glTF executable (name on PATH or full path).
    pub fbx2gltf: PathBuf,
    /// Where FBX2glTF scratch directories are created; system temp if unset.
    pub temp_root: Option<PathBuf>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            up_axis: UpAxis::Y,
            fbx2gltf: PathBuf::from("FBX2glTF"),
            temp_root: None,
        }
    }
}

/// Picks the decoder for `path` by extension.
pub fn decoder_for(path: &Path, opts: &DecodeOptions) -> Result<Box<dyn Decoder>> {
    Ok(match InputFormat::from_path(path)? {
        InputFormat::Fbx => Box::new(Fbx2GltfDecoder::new(
            opts.fbx2gltf.clone(),
            opts.temp_root.clone(),
            GltfDecoder::new(opts.up_axis),
        )),
        InputFormat::Gltf => Box::new(GltfDecoder::new(opts.up_axis)),
        InputFormat::Obj => Box::new(ObjDecoder::new(opts.up_axis)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a/b/Model.FBX")).unwrap(), InputFormat::Fbx);
        assert_eq!(InputFormat::from_path(Path::new("m.glb")).unwrap(), InputFormat::Gltf);
        assert_eq!(InputFormat::from_path(Path::new("m.gltf")).unwrap(), InputFormat::Gltf);
        assert_eq!(InputFormat::from_path(Path::new("m.obj")).unwrap(), InputFormat::Obj);
        assert!(InputFormat::from_path(Path::new("m.3ds")).is_err());
        assert!(InputFormat::from_path(Path::new("model")).is_err());
    }

    #[test]
    fn test_decoder_selection() {
        let opts = DecodeOptions::default();
        assert_eq!(decoder_for(Path::new("x.fbx"), &opts).unwrap().name(), "fbx2gltf");
        assert_eq!(decoder_for(Path::new("x.glb"), &opts).unwrap().name(), "gltf");
        assert_eq!(decoder_for(Path::new("x.obj"), &opts).unwrap().name(), "obj");
    }

    #[test]
    fn test_y_up_rotation() {
        // Source up (+Y) becomes ENU up (+Z); source forward (+Z) becomes south.
        assert_eq!(UpAxis::Y.to_enu([0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(UpAxis::Y.to_enu([0.0, 0.0, 1.0]), [0.0, -1.0, 0.0]);
        assert_eq!(UpAxis::Y.to_enu([1.0, 0.0, 0.0]), [1.0, 0.0, 0.0]);
        assert_eq!(UpAxis::Z.to_enu([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }
}
