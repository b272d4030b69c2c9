//! The JPEG 2000 codec collaborator behind the bridge.
//!
//! The bridge only needs a small slice of a codec: open a stream, create a
//! decoder for a format, wire up message handlers, and read the main header.
//! Handles are released by dropping them.
//!
//! - `native`: pure Rust main-header reader (JP2 boxes and codestream markers).
//! - `openjpeg`: the same operations on top of `openjpeg-sys` (feature `openjpeg`).

pub mod native;
#[cfg(feature = "openjpeg")]
pub mod openjpeg;

use crate::HeaderInfo;
use crate::error::HeaderError;
use crate::format::CodecFormat;
use crate::input::BufferInfo;
use crate::messages::Messenger;
use crate::segments::SegmentTable;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::path::Path;

pub use native::NativeCodec;
#[cfg(feature = "openjpeg")]
pub use openjpeg::OpenJpegCodec;

/// Codec used by the JNI entry point and the CLI.
#[cfg(feature = "openjpeg")]
pub type DefaultCodec = OpenJpegCodec;
#[cfg(not(feature = "openjpeg"))]
pub type DefaultCodec = NativeCodec;

/// Image color space. Discriminants match `OPJ_COLOR_SPACE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ColorSpace {
    Unknown = -1,
    #[default]
    Unspecified = 0,
    Srgb = 1,
    Gray = 2,
    Sycc = 3,
    Eycc = 4,
    Cmyk = 5,
}

impl ColorSpace {
    /// Maps a JP2 `colr` box enumerated color space (EnumCS).
    pub fn from_enumcs(enumcs: u32) -> Self {
        match enumcs {
            16 => ColorSpace::Srgb,
            17 => ColorSpace::Gray,
            18 => ColorSpace::Sycc,
            24 => ColorSpace::Eycc,
            12 => ColorSpace::Cmyk,
            _ => ColorSpace::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Unknown => "unknown",
            ColorSpace::Unspecified => "unspecified",
            ColorSpace::Srgb => "sRGB",
            ColorSpace::Gray => "gray",
            ColorSpace::Sycc => "sYCC",
            ColorSpace::Eycc => "e-YCC",
            ColorSpace::Cmyk => "CMYK",
        }
    }
}

/// Per-component header fields, as the codec reports them after a header read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentHeader {
    /// Horizontal subsampling factor
    pub dx: u32,
    /// Vertical subsampling factor
    pub dy: u32,
    /// Component width on its own sampling grid
    pub w: u32,
    /// Component height on its own sampling grid
    pub h: u32,
    pub x0: u32,
    pub y0: u32,
    /// Bit precision
    pub prec: u32,
    pub bpp: u32,
    pub sgnd: bool,
}

/// Image descriptor produced by a header-only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageHeader {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub color_space: ColorSpace,
    pub components: Vec<ComponentHeader>,
    pub icc_profile: Option<Vec<u8>>,
}

impl ImageHeader {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// The four values handed back to the caller: component 0 dimensions and
    /// precision, plus the component count.
    pub fn header_info(&self) -> Result<HeaderInfo, HeaderError> {
        let first = self.components.first().ok_or(HeaderError::NoComponents)?;
        Ok(HeaderInfo {
            width: first.w,
            height: first.h,
            bits_per_sample: first.prec,
            samples_per_pixel: self.components.len() as u32,
        })
    }
}

/// Read access to the image handle a codec returns from a header read.
pub trait ImageDescriptor {
    fn describe(&self) -> ImageHeader;
}

impl ImageDescriptor for ImageHeader {
    fn describe(&self) -> ImageHeader {
        self.clone()
    }
}

/// Decoder parameters applied before the header read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderParameters {
    /// Number of highest resolution levels to discard.
    pub reduce: u32,
    /// Maximum number of quality layers to decode, 0 for all.
    pub layers: u32,
}

/// The operations the bridge performs against a JPEG 2000 codec.
pub trait Codec {
    type Stream;
    type Decoder;
    type Image: ImageDescriptor;

    fn stream_from_file(&self, path: &Path) -> Result<Self::Stream, HeaderError>;

    fn stream_from_segments(
        &self,
        path: &Path,
        segments: &SegmentTable,
    ) -> Result<Self::Stream, HeaderError>;

    fn stream_from_buffer(&self, buffer: BufferInfo) -> Result<Self::Stream, HeaderError>;

    fn create_decoder(&self, format: CodecFormat) -> Result<Self::Decoder, HeaderError>;

    /// Routes info and warning text to `messenger` as messages and error text as errors.
    fn set_message_handlers(
        &self,
        decoder: &mut Self::Decoder,
        messenger: &Messenger,
    ) -> Result<(), HeaderError>;

    fn setup_decoder(
        &self,
        decoder: &mut Self::Decoder,
        parameters: &DecoderParameters,
    ) -> Result<(), HeaderError>;

    /// Parses container and codestream headers without decoding pixel data.
    fn read_header(
        &self,
        stream: &mut Self::Stream,
        decoder: &mut Self::Decoder,
    ) -> Result<Self::Image, HeaderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_info_from_first_component() {
        let header = ImageHeader {
            x1: 640,
            y1: 480,
            components: vec![
                ComponentHeader {
                    w: 640,
                    h: 480,
                    prec: 12,
                    ..Default::default()
                },
                ComponentHeader {
                    w: 320,
                    h: 240,
                    prec: 8,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let info = header.header_info().unwrap();
        assert_eq!(info.width, 640);
        assert_eq!(info.height, 480);
        assert_eq!(info.bits_per_sample, 12);
        assert_eq!(info.samples_per_pixel, 2);
    }

    #[test]
    fn test_header_info_without_components() {
        assert_eq!(
            ImageHeader::default().header_info(),
            Err(HeaderError::NoComponents)
        );
    }

    #[test]
    fn test_color_space_from_enumcs() {
        assert_eq!(ColorSpace::from_enumcs(16), ColorSpace::Srgb);
        assert_eq!(ColorSpace::from_enumcs(17), ColorSpace::Gray);
        assert_eq!(ColorSpace::from_enumcs(99), ColorSpace::Unknown);
        assert_eq!(i32::from(ColorSpace::Cmyk), 5);
    }
}
