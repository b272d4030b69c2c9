//! JPEG 2000 header reader with a JNI bridge.
//!
//! Detects the container format of a JPEG 2000 input (JP2 box file, raw
//! codestream, JPIP stream) and reads the main header only, reporting width,
//! height, bits per sample and samples per pixel of the first component.
//!
//! The input is an in-memory buffer, a whole file, or a file whose JPEG 2000
//! data is split over segments. Every resource acquired during a read is
//! released exactly once, whatever the outcome.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod input;
#[cfg(feature = "jni")]
pub mod java;
pub mod messages;
pub mod segments;

pub use bridge::{CallerObject, HeaderCall, read_header, read_header_status};
pub use codec::{Codec, NativeCodec};
pub use config::BridgeConfig;
pub use error::HeaderError;
pub use format::{CodecFormat, detect_format, sniff_extension, sniff_magic};

/// Header values copied back to the caller after a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u32,
    pub samples_per_pixel: u32,
}
