//! Pure Rust header reader.
//!
//! Covers the part of a JPEG 2000 decoder a header-only read needs:
//!
//! - `jp2`: JP2 box walk (signature, ftyp, jp2h/ihdr/colr, jp2c).
//! - `parser`: codestream main header (SOC to the first SOT).
//! - `reader`: big-endian reads and seeks over any `Read + Seek` source.
//! - `marker`: marker and box codes.
//!
//! JPT (JPIP) streams are recognised but no decoder exists for them.

pub mod jp2;
pub mod marker;
pub mod parser;
pub mod reader;

use self::jp2::Jp2Reader;
use self::parser::{J2kMainHeader, J2kParser};
use self::reader::MarkerReader;
use super::{Codec, DecoderParameters, ImageDescriptor, ImageHeader};
use crate::error::HeaderError;
use crate::format::CodecFormat;
use crate::input::BufferInfo;
use crate::messages::Messenger;
use crate::segments::{SegmentReader, SegmentTable};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Seekable byte source handed to the header reader.
pub struct NativeStream {
    source: Box<dyn ReadSeek>,
}

impl NativeStream {
    pub fn new(source: impl Read + Seek + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for NativeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStream").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct NativeDecoder {
    format: CodecFormat,
    messenger: Messenger,
    parameters: Option<DecoderParameters>,
}

/// Image handle returned by [`NativeCodec::read_header`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeImage {
    pub header: ImageHeader,
    pub main_header: J2kMainHeader,
}

impl ImageDescriptor for NativeImage {
    fn describe(&self) -> ImageHeader {
        self.header.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl NativeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for NativeCodec {
    type Stream = NativeStream;
    type Decoder = NativeDecoder;
    type Image = NativeImage;

    fn stream_from_file(&self, path: &Path) -> Result<NativeStream, HeaderError> {
        let file = File::open(path).map_err(|_| HeaderError::StreamCreationFailed)?;
        Ok(NativeStream::new(BufReader::new(file)))
    }

    fn stream_from_segments(
        &self,
        path: &Path,
        segments: &SegmentTable,
    ) -> Result<NativeStream, HeaderError> {
        let file = File::open(path).map_err(|_| HeaderError::StreamCreationFailed)?;
        Ok(NativeStream::new(SegmentReader::new(file, segments)))
    }

    fn stream_from_buffer(&self, buffer: BufferInfo) -> Result<NativeStream, HeaderError> {
        Ok(NativeStream::new(buffer))
    }

    fn create_decoder(&self, format: CodecFormat) -> Result<NativeDecoder, HeaderError> {
        match format {
            CodecFormat::Codestream | CodecFormat::Jp2 => Ok(NativeDecoder {
                format,
                messenger: Messenger::silent(),
                parameters: None,
            }),
            CodecFormat::Jpip => Err(HeaderError::DecoderCreationFailed),
        }
    }

    fn set_message_handlers(
        &self,
        decoder: &mut NativeDecoder,
        messenger: &Messenger,
    ) -> Result<(), HeaderError> {
        decoder.messenger = messenger.clone();
        Ok(())
    }

    fn setup_decoder(
        &self,
        decoder: &mut NativeDecoder,
        parameters: &DecoderParameters,
    ) -> Result<(), HeaderError> {
        decoder.parameters = Some(*parameters);
        Ok(())
    }

    fn read_header(
        &self,
        stream: &mut NativeStream,
        decoder: &mut NativeDecoder,
    ) -> Result<NativeImage, HeaderError> {
        let parameters = decoder.parameters.ok_or(HeaderError::DecoderSetupFailed)?;
        let messenger = &decoder.messenger;
        let reader = MarkerReader::new(&mut stream.source)?;

        let image = match decoder.format {
            CodecFormat::Jp2 => {
                let (jp2, reader) = Jp2Reader::new(reader, messenger).read_header()?;
                let main_header = J2kParser::new(reader, messenger)
                    .with_parameters(parameters)
                    .parse_main_header()?;
                let mut header = main_header.image_header();
                header.color_space = jp2.color_space;
                header.icc_profile = jp2.icc_profile.clone();

                let ihdr = jp2.image_header;
                if usize::from(ihdr.component_count) != header.component_count() {
                    messenger.warning(&format!(
                        "JP2 IHDR box announces {} components, codestream has {}",
                        ihdr.component_count,
                        header.component_count()
                    ));
                }
                NativeImage {
                    header,
                    main_header,
                }
            }
            CodecFormat::Codestream => {
                let main_header = J2kParser::new(reader, messenger)
                    .with_parameters(parameters)
                    .parse_main_header()?;
                NativeImage {
                    header: main_header.image_header(),
                    main_header,
                }
            }
            CodecFormat::Jpip => return Err(HeaderError::DecoderCreationFailed),
        };

        debug!(
            format = %decoder.format,
            width = image.header.x1 - image.header.x0,
            height = image.header.y1 - image.header.y0,
            components = image.header.component_count(),
            "read image header"
        );
        Ok(image)
    }
}
