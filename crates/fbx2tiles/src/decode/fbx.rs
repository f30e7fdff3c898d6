//! FBX goes through the external FBX2glTF converter into a scratch directory,
//! then through the glTF importer. The scratch directory is removed on every
//! exit path, including errors.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tilepack::Mesh;
use walkdir::WalkDir;

use super::{Decoder, GltfDecoder};

/// Basename FBX2glTF is told to write; it appends `_out/` itself.
const CONVERTED_STEM: &str = "model";

pub struct Fbx2GltfDecoder {
    binary: PathBuf,
    temp_root: Option<PathBuf>,
    gltf: GltfDecoder,
}

impl Fbx2GltfDecoder {
    pub fn new(binary: PathBuf, temp_root: Option<PathBuf>, gltf: GltfDecoder) -> Self {
        Self {
            binary,
            temp_root,
            gltf,
        }
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fbx2tiles-");
        match &self.temp_root {
            Some(root) => builder
                .tempdir_in(root)
                .with_context(|| format!("creating scratch dir in {}", root.display())),
            None => builder.tempdir().context("creating scratch dir"),
        }
    }

    fn run_converter(&self, input: &Path, out_base: &Path) -> Result<()> {
        debug!(
            "Running {} --input {} --output {}",
            self.binary.display(),
            input.display(),
            out_base.display()
        );

        let output = Command::new(&self.binary)
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(out_base)
            .output()
            .with_context(|| {
                format!(
                    "could not run '{}'; install FBX2glTF (https://github.com/facebookincubator/FBX2glTF) \
                     or point --fbx2gltf at it",
                    self.binary.display()
                )
            })?;

        if !output.status.success() {
            bail!(
                "FBX2glTF failed on {} ({}): {}",
                input.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Finds the glTF written by FBX2glTF under `dir`. The usual location is
/// `<dir>/model_out/model.gltf`; anything else found is accepted with a warning.
pub fn locate_converter_output(dir: &Path) -> Result<PathBuf> {
    let expected = dir
        .join(format!("{}_out", CONVERTED_STEM))
        .join(format!("{}.gltf", CONVERTED_STEM));
    if expected.is_file() {
        return Ok(expected);
    }

    let found = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case("gltf") || s.eq_ignore_ascii_case("glb"))
                .unwrap_or(false)
        });

    match found {
        Some(p) => {
            warn!("Converter output not at {}; using {}", expected.display(), p.display());
            Ok(p)
        }
        None => bail!("FBX2glTF produced no .gltf or .glb under {}", dir.display()),
    }
}

impl Decoder for Fbx2GltfDecoder {
    fn decode(&self, path: &Path) -> Result<Mesh> {
        if !path.is_file() {
            bail!("{}: no such file", path.display());
        }

        let scratch = self.scratch_dir()?;
        let out_base = scratch.path().join(CONVERTED_STEM);

        self.run_converter(path, &out_base)?;
        let converted = locate_converter_output(scratch.path())?;
        info!("FBX2glTF: {} -> {}", path.display(), converted.display());

        let mesh = self.gltf.decode(&converted)?;
        // TempDir's Drop ignores errors; closing explicitly surfaces them.
        if let Err(e) = scratch.close() {
            warn!("Could not remove FBX2glTF scratch dir: {}", e);
        }
        Ok(mesh)
    }

    fn name(&self) -> &'static str {
        "fbx2gltf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::UpAxis;
    use std::fs;

    #[test]
    fn test_locate_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("model_out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("model.gltf"), b"{}").unwrap();
        fs::write(out.join("aaa.glb"), b"").unwrap();
        assert_eq!(locate_converter_output(dir.path()).unwrap(), out.join("model.gltf"));
    }

    #[test]
    fn test_locate_fallback_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate_converter_output(dir.path()).is_err());

        let nested = dir.path().join("elsewhere");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Thing.GLB"), b"").unwrap();
        fs::write(nested.join("notes.txt"), b"").unwrap();
        assert_eq!(locate_converter_output(dir.path()).unwrap(), nested.join("Thing.GLB"));
    }

    #[test]
    fn test_missing_converter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.fbx");
        fs::write(&input, b"not really fbx").unwrap();

        let scratch_root = dir.path().join("scratch");
        fs::create_dir_all(&scratch_root).unwrap();
        let decoder = Fbx2GltfDecoder::new(
            dir.path().join("no-such-fbx2gltf"),
            Some(scratch_root.clone()),
            GltfDecoder::new(UpAxis::Y),
        );
        let err = decoder.decode(&input).unwrap_err();
        assert!(format!("{:#}", err).contains("--fbx2gltf"));
        assert_eq!(fs::read_dir(&scratch_root).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_converter_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();

        // Stands in for FBX2glTF: drops a prepared GLB where the real tool
        // would put its output. Arguments are --input IN --output BASE.
        let fixture = dir.path().join("fixture.glb");
        let source = Mesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        );
        fs::write(&fixture, tilepack::glb::encode_glb(&source).unwrap()).unwrap();

        let script = dir.path().join("fake-fbx2gltf.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\nmkdir -p \"$4_out\"\ncp '{}' \"$4_out/model.glb\"\n",
                fixture.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("in.fbx");
        fs::write(&input, b"fbx").unwrap();

        let scratch_root = dir.path().join("scratch");
        fs::create_dir_all(&scratch_root).unwrap();
        let decoder =
            Fbx2GltfDecoder::new(script, Some(scratch_root.clone()), GltfDecoder::new(UpAxis::Z));
        let mesh = decoder.decode(&input).unwrap();

        assert_eq!(mesh.positions, source.positions);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(fs::read_dir(&scratch_root).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_converter_failure_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sh");
        fs::write(&script, "#!/bin/sh\necho 'unsupported FBX version' >&2\nexit 3\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("in.fbx");
        fs::write(&input, b"fbx").unwrap();

        let decoder = Fbx2GltfDecoder::new(script, None, GltfDecoder::new(UpAxis::Y));
        let err = decoder.decode(&input).unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported FBX version"));
    }
}
