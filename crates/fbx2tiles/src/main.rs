use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use fbx2tiles::{convert, decoder_for, error_kind, ConvertOptions, DecodeOptions, UpAxis};
use tilepack::{GeoAnchor, VolumeKind};

/// Bounding volume written into tileset.json.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BoundingVolumeArg {
    /// Axis-aligned box in the local ENU frame.
    Box,
    /// Sphere around the box center.
    Sphere,
}

impl std::fmt::Display for BoundingVolumeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BoundingVolumeArg::Box => "box",
            BoundingVolumeArg::Sphere => "sphere",
        })
    }
}

impl From<BoundingVolumeArg> for VolumeKind {
    fn from(arg: BoundingVolumeArg) -> Self {
        match arg {
            BoundingVolumeArg::Box => VolumeKind::Box,
            BoundingVolumeArg::Sphere => VolumeKind::Sphere,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "fbx2tiles", version, about = "Package a 3D model as a geo-referenced 3D Tiles tileset")]
struct Args {
    /// Model to convert (.fbx, .gltf, .glb or .obj).
    input: PathBuf,

    /// Directory that receives tileset.json and tiles/model.b3dm.
    output_dir: PathBuf,

    /// Longitude of the model origin, degrees east.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    longitude: f64,

    /// Latitude of the model origin, degrees north.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    latitude: f64,

    /// Ellipsoidal height of the model origin, meters.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    height: f64,

    #[arg(long, value_enum, default_value_t = BoundingVolumeArg::Box)]
    bounding_volume: BoundingVolumeArg,

    /// Up axis of the source model.
    #[arg(long, value_enum, default_value_t = UpAxis::Y)]
    up_axis: UpAxis,

    /// Optional asset.tilesetVersion string.
    #[arg(long)]
    tileset_version: Option<String>,

    /// FBX2glTF executable used for .fbx input.
    #[arg(long, env = "FBX2GLTF_BIN", default_value = "FBX2glTF")]
    fbx2gltf: PathBuf,

    /// Replace an existing tileset.json.
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Log progress (info level) unless RUST_LOG says otherwise.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    let anchor = GeoAnchor::new(args.longitude, args.latitude, args.height)?;

    // Scratch space next to the output keeps converter files on the same disk.
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let decode_opts = DecodeOptions {
        up_axis: args.up_axis,
        fbx2gltf: args.fbx2gltf.clone(),
        temp_root: Some(args.output_dir.clone()),
    };
    let decoder = decoder_for(&args.input, &decode_opts)?;

    let opts = ConvertOptions {
        anchor,
        volume: args.bounding_volume.into(),
        tileset_version: args.tileset_version.clone(),
        overwrite: args.overwrite,
    };

    info!(
        "Converting {} -> {} (bounding volume: {}, up axis: {})",
        args.input.display(),
        args.output_dir.display(),
        args.bounding_volume,
        args.up_axis
    );
    let report = convert(&args.input, &args.output_dir, decoder.as_ref(), &opts)?;
    info!(
        "OK {} ({} triangles, {} bytes)",
        report.tileset_path.display(),
        report.triangle_count,
        report.tile_bytes
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "info" } else { "warn" }),
    )
    .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {:#}", error_kind(&e), e);
            ExitCode::FAILURE
        }
    }
}
