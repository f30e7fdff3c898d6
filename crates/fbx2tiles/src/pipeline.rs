//! Decode, place, bound, encode and describe one model.
//!
//! Output layout under the chosen directory:
//!   tileset.json
//!   tiles/model.b3dm

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use tilepack::{
    build_tileset, compute_bounding_volume, compute_transform, encode_tile, write_tileset,
    BoundingVolume, GeoAnchor, IndexWidth, PackError, VolumeKind,
};

use crate::decode::Decoder;

pub const TILESET_FILE: &str = "tileset.json";

/// Tile path relative to tileset.json, forward slashes on every platform.
pub const CONTENT_URI: &str = "tiles/model.b3dm";

#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    pub anchor: GeoAnchor,
    pub volume: VolumeKind,
    pub tileset_version: Option<String>,
    /// Replace an existing tileset.json instead of refusing.
    pub overwrite: bool,
}

/// What one conversion produced.
#[derive(Clone, Debug)]
pub struct ConvertReport {
    pub tileset_path: PathBuf,
    pub tile_path: PathBuf,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub index_width: IndexWidth,
    pub bounding_volume: BoundingVolume,
    pub tile_bytes: usize,
}

/// Runs the whole conversion of `input` into `output_dir`.
pub fn convert(
    input: &Path,
    output_dir: &Path,
    decoder: &dyn Decoder,
    opts: &ConvertOptions,
) -> Result<ConvertReport> {
    let started = Instant::now();

    if !input.is_file() {
        bail!("input {} does not exist or is not a file", input.display());
    }

    let tileset_path = output_dir.join(TILESET_FILE);
    if tileset_path.exists() && !opts.overwrite {
        bail!(
            "{} already exists (pass --overwrite to replace it)",
            tileset_path.display()
        );
    }

    info!("Decoding {} with {}", input.display(), decoder.name());
    let mesh = decoder
        .decode(input)
        .with_context(|| format!("decoding {}", input.display()))?;

    // Placement and bounds only read the mesh, so they run side by side.
    let (transform, bounding_volume) = rayon::join(
        || compute_transform(&opts.anchor),
        || compute_bounding_volume(&mesh, opts.volume),
    );
    let bounding_volume = bounding_volume?;
    debug!(
        "Anchor ({}, {}, {}) -> ECEF {:?}",
        opts.anchor.longitude(),
        opts.anchor.latitude(),
        opts.anchor.height(),
        transform.translation()
    );

    let tile = encode_tile(&mesh, transform, bounding_volume)?;

    let tile_path = output_dir.join(CONTENT_URI);
    if let Some(dir) = tile_path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&tile_path, &tile.payload)
        .with_context(|| format!("writing {}", tile_path.display()))?;
    info!("Wrote {} ({} bytes)", tile_path.display(), tile.payload.len());

    let mut descriptor = build_tileset(&tile, CONTENT_URI)?;
    if let Some(version) = &opts.tileset_version {
        descriptor = descriptor.with_tileset_version(version.clone());
    }
    write_tileset(&descriptor, &tileset_path)?;

    let index_width = IndexWidth::for_max_index(mesh.max_index().unwrap_or(0));
    info!(
        "Done in {:.2?}: {} vertices, {} triangles, {:?} indices",
        started.elapsed(),
        mesh.vertex_count(),
        mesh.triangle_count(),
        index_width
    );

    Ok(ConvertReport {
        tileset_path,
        tile_path,
        vertex_count: mesh.vertex_count(),
        triangle_count: mesh.triangle_count(),
        index_width,
        bounding_volume,
        tile_bytes: tile.payload.len(),
    })
}

/// Short error name for the CLI: the packaging error kind when one is in the
/// chain, else `ConversionError`.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|e| e.downcast_ref::<PackError>())
        .map(PackError::kind)
        .unwrap_or("ConversionError")
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian as LE, ReadBytesExt};
    use tilepack::Mesh;

    /// Hands back a prepared mesh regardless of the path.
    struct Fixed(Mesh);

    impl Decoder for Fixed {
        fn decode(&self, _path: &Path) -> Result<Mesh> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn unit_cube() -> Mesh {
        let mut positions = Vec::new();
        for &z in &[-0.5f32, 0.5] {
            for &(x, y) in &[(-0.5f32, -0.5f32), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                positions.push([x, y, z]);
            }
        }
        let indices = vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 2, 3, 7, 2, 7, 6, 1, 2, 6, 1,
            6, 5, 3, 0, 4, 3, 4, 7,
        ];
        Mesh::new(positions, indices)
    }

    /// `n` vertices on a line, stitched into triangles that touch every index.
    fn strip(n: u32) -> Mesh {
        let positions = (0..n).map(|i| [i as f32 * 0.01, (i % 7) as f32, 0.0]).collect();
        let mut indices = Vec::new();
        let mut i = 0;
        while i + 2 < n {
            indices.extend_from_slice(&[i, i + 1, i + 2]);
            i += 3;
        }
        indices.extend_from_slice(&[0, n - 2, n - 1]);
        Mesh::new(positions, indices)
    }

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("model.fbx");
        fs::write(&input, b"placeholder").unwrap();
        (dir, input)
    }

    fn glb_json(tile: &[u8]) -> serde_json::Value {
        let mut r = &tile[12..16];
        let ft_len = r.read_u32::<LE>().unwrap() as usize;
        let glb = &tile[28 + ft_len..];
        let mut r = &glb[12..16];
        let json_len = r.read_u32::<LE>().unwrap() as usize;
        serde_json::from_slice(&glb[20..20 + json_len]).unwrap()
    }

    #[test]
    fn test_unit_cube_end_to_end() {
        let (dir, input) = setup();
        let out = dir.path().join("out");
        let opts = ConvertOptions {
            anchor: GeoAnchor::new(120.0, 39.0, 0.0).unwrap(),
            ..Default::default()
        };

        let report = convert(&input, &out, &Fixed(unit_cube()), &opts).unwrap();
        assert_eq!(report.vertex_count, 8);
        assert_eq!(report.triangle_count, 12);
        assert_eq!(report.index_width, IndexWidth::U16);

        let tile = fs::read(out.join("tiles/model.b3dm")).unwrap();
        assert_eq!(&tile[0..4], b"b3dm");
        assert_eq!(tile.len(), report.tile_bytes);

        let ts: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(TILESET_FILE)).unwrap()).unwrap();
        assert_eq!(ts["asset"]["version"], "1.0");
        assert_eq!(ts["root"]["refine"], "ADD");
        assert_eq!(ts["root"]["content"]["uri"], CONTENT_URI);
        let bx: Vec<f64> = ts["root"]["boundingVolume"]["box"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        for (k, expected) in [(3, 0.5), (7, 0.5), (11, 0.5)] {
            assert!((bx[k] - expected).abs() < 1e-9, "box[{}] = {}", k, bx[k]);
        }

        let expected = tilepack::geodetic_to_ecef(39.0, 120.0, 0.0);
        let t = ts["root"]["transform"].as_array().unwrap();
        for k in 0..3 {
            assert!((t[12 + k].as_f64().unwrap() - expected[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_anchor_sits_on_equator() {
        let (dir, input) = setup();
        let out = dir.path().join("out");
        convert(&input, &out, &Fixed(unit_cube()), &ConvertOptions::default()).unwrap();

        let ts: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(TILESET_FILE)).unwrap()).unwrap();
        let t: Vec<f64> = ts["root"]["transform"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert!((t[12] - 6_378_137.0).abs() < 1e-6);
        assert!(t[13].abs() < 1e-6);
        assert!(t[14].abs() < 1e-6);
    }

    #[test]
    fn test_index_width_threshold() {
        let (dir, input) = setup();

        let report = convert(&input, &dir.path().join("wide"), &Fixed(strip(65_537)), &Default::default())
            .unwrap();
        assert_eq!(report.index_width, IndexWidth::U32);
        let doc = glb_json(&fs::read(&report.tile_path).unwrap());
        let idx = doc["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(doc["accessors"][idx]["componentType"], 5125);

        let report = convert(&input, &dir.path().join("narrow"), &Fixed(strip(65_536)), &Default::default())
            .unwrap();
        assert_eq!(report.index_width, IndexWidth::U16);
        let doc = glb_json(&fs::read(&report.tile_path).unwrap());
        let idx = doc["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(doc["accessors"][idx]["componentType"], 5123);
    }

    #[test]
    fn test_sphere_and_tileset_version() {
        let (dir, input) = setup();
        let out = dir.path().join("out");
        let opts = ConvertOptions {
            volume: VolumeKind::Sphere,
            tileset_version: Some("build-7".into()),
            ..Default::default()
        };
        let report = convert(&input, &out, &Fixed(unit_cube()), &opts).unwrap();
        assert!(matches!(report.bounding_volume, BoundingVolume::Sphere { .. }));

        let ts: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report.tileset_path).unwrap()).unwrap();
        assert_eq!(ts["asset"]["tilesetVersion"], "build-7");
        assert_eq!(ts["root"]["boundingVolume"]["sphere"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_existing_output_needs_overwrite() {
        let (dir, input) = setup();
        let out = dir.path().join("out");
        convert(&input, &out, &Fixed(unit_cube()), &Default::default()).unwrap();

        let err = convert(&input, &out, &Fixed(unit_cube()), &Default::default()).unwrap_err();
        assert!(err.to_string().contains("--overwrite"));
        assert_eq!(error_kind(&err), "ConversionError");

        let opts = ConvertOptions {
            overwrite: true,
            ..Default::default()
        };
        convert(&input, &out, &Fixed(unit_cube()), &opts).unwrap();
    }

    #[test]
    fn test_failures_report_their_kind() {
        let (dir, input) = setup();

        let bad = Mesh::new(vec![[0.0; 3]; 3], vec![0, 1, 7]);
        let err = convert(&input, &dir.path().join("a"), &Fixed(bad), &Default::default()).unwrap_err();
        assert_eq!(error_kind(&err), "MalformedMesh");

        let err = convert(&input, &dir.path().join("b"), &Fixed(Mesh::default()), &Default::default())
            .unwrap_err();
        assert_eq!(error_kind(&err), "EmptyMesh");
        assert!(!dir.path().join("b").exists());

        let err = convert(
            &dir.path().join("missing.obj"),
            &dir.path().join("c"),
            &Fixed(unit_cube()),
            &Default::default(),
        )
        .unwrap_err();
        assert_eq!(error_kind(&err), "ConversionError");
    }
}
