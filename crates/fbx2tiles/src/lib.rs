//! Model-to-3D-Tiles conversion: decoders for the supported input formats and
//! the pipeline that drives `tilepack` over a decoded mesh.

pub mod decode;
pub mod pipeline;

pub use decode::{decoder_for, DecodeOptions, Decoder, InputFormat, UpAxis};
pub use pipeline::{convert, error_kind, ConvertOptions, ConvertReport, CONTENT_URI, TILESET_FILE};
