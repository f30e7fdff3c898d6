//! Error type shared by every packaging stage.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PackError>;

/// Failures of the packaging core. All of them are deterministic for a given
/// input, so none is retried.
#[derive(thiserror::Error, Debug)]
pub enum PackError {
    #[error("invalid geographic anchor: {0}")]
    InvalidAnchor(String),

    #[error("mesh has no vertices")]
    EmptyMesh,

    #[error("malformed mesh: {0}")]
    MalformedMesh(String),

    #[error("cannot encode tile: {0}")]
    EncodingError(String),

    #[error("cannot write tileset descriptor {}: {source}", path.display())]
    DescriptorWriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackError {
    /// Stable short name of the error kind, printed by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            PackError::InvalidAnchor(_) => "InvalidAnchor",
            PackError::EmptyMesh => "EmptyMesh",
            PackError::MalformedMesh(_) => "MalformedMesh",
            PackError::EncodingError(_) => "EncodingError",
            PackError::DescriptorWriteError { .. } => "DescriptorWriteError",
            PackError::Json(_) => "Json",
        }
    }

    pub(crate) fn descriptor_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PackError::DescriptorWriteError {
            path: path.into(),
            source,
        }
    }
}
