//! JP2 Box structure implementation (ISO/IEC 15444-1 Annex I).

use super::marker::{
    BOX_CODESTREAM, BOX_COLOUR_SPECIFICATION, BOX_FILE_TYPE, BOX_HEADER, BOX_IMAGE_HEADER,
    BOX_SIGNATURE,
};
use super::reader::MarkerReader;
use crate::codec::ColorSpace;
use crate::constants::JP2_MAGIC;
use crate::error::HeaderError;
use crate::messages::Messenger;
use std::io::{Read, Seek};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jp2Box {
    pub box_type: [u8; 4],
    /// Offset of the box contents in the stream.
    pub data_start: u64,
    pub data_length: u64,
}

impl Jp2Box {
    fn type_name(&self) -> String {
        self.box_type.iter().map(|&b| char::from(b)).collect()
    }

    /// Offset just past the box. Box reading rejects lengths where this overflows.
    pub fn end(&self) -> u64 {
        self.data_start + self.data_length
    }
}

/// Image Header (ihdr) box contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Jp2ImageHeader {
    pub height: u32,
    pub width: u32,
    pub component_count: u16,
    pub bits_per_component: u8,
    pub compression_type: u8,
}

/// What the boxes in front of the codestream describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jp2Header {
    pub brand: [u8; 4],
    pub image_header: Jp2ImageHeader,
    pub color_space: ColorSpace,
    pub icc_profile: Option<Vec<u8>>,
    /// Offset of the contiguous codestream (jp2c contents).
    pub codestream_offset: u64,
}

pub struct Jp2Reader<'m, R> {
    reader: MarkerReader<R>,
    messenger: &'m Messenger,
}

impl<'m, R: Read + Seek> Jp2Reader<'m, R> {
    pub fn new(reader: MarkerReader<R>, messenger: &'m Messenger) -> Self {
        Self { reader, messenger }
    }

    /// Walks the boxes up to `jp2c` and leaves the reader positioned on the codestream.
    pub fn read_header(mut self) -> Result<(Jp2Header, MarkerReader<R>), HeaderError> {
        let signature = self.read_box()?.ok_or_else(|| {
            self.fail("Stream too short to hold a JP2 signature box", HeaderError::InvalidData)
        })?;
        if signature.box_type != BOX_SIGNATURE || signature.data_length != 4 {
            return Err(self.fail("Expected JP Marker", HeaderError::InvalidData));
        }
        let mut magic = [0u8; 4];
        for byte in &mut magic {
            *byte = self.reader.read_u8()?;
        }
        if magic != JP2_MAGIC {
            return Err(self.fail("Error with JP Marker", HeaderError::InvalidData));
        }

        let file_type = self
            .read_box()?
            .ok_or_else(|| self.fail("Expected FTYP Marker", HeaderError::InvalidData))?;
        if file_type.box_type != BOX_FILE_TYPE || file_type.data_length < 8 {
            return Err(self.fail("Expected FTYP Marker", HeaderError::InvalidData));
        }
        let mut header = Jp2Header::default();
        header.brand = self.reader.read_u32()?.to_be_bytes();
        self.skip_rest(&file_type)?;

        let mut seen_header = false;
        loop {
            let Some(jp2_box) = self.read_box()? else {
                return Err(self.fail("JP2 file has no codestream box", HeaderError::InvalidData));
            };
            match jp2_box.box_type {
                BOX_HEADER => {
                    self.read_jp2h(&jp2_box, &mut header)?;
                    seen_header = true;
                }
                BOX_CODESTREAM => {
                    if !seen_header {
                        return Err(self.fail("JP2H box missing. Required.", HeaderError::InvalidData));
                    }
                    header.codestream_offset = jp2_box.data_start;
                    return Ok((header, self.reader));
                }
                _ => {
                    tracing::trace!(box_type = %jp2_box.type_name(), "skipping box");
                    self.skip_rest(&jp2_box)?;
                }
            }
        }
    }

    fn read_jp2h(&mut self, jp2h: &Jp2Box, header: &mut Jp2Header) -> Result<(), HeaderError> {
        let end = jp2h.end();
        let mut seen_ihdr = false;
        let mut seen_colr = false;

        while self.reader.position() < end {
            let child = self
                .read_box()?
                .ok_or_else(|| self.fail("Box length is inconsistent", HeaderError::InvalidData))?;
            if child.end() > end {
                return Err(self.fail("Box length is inconsistent", HeaderError::InvalidData));
            }
            match child.box_type {
                BOX_IMAGE_HEADER => {
                    if child.data_length != 14 {
                        return Err(self.fail("Bad image header box (bad size)", HeaderError::InvalidData));
                    }
                    header.image_header = Jp2ImageHeader {
                        height: self.reader.read_u32()?,
                        width: self.reader.read_u32()?,
                        component_count: self.reader.read_u16()?,
                        bits_per_component: self.reader.read_u8()?,
                        compression_type: self.reader.read_u8()?,
                    };
                    // UnkC and IPR
                    self.reader.skip(2)?;
                    if header.image_header.compression_type != 7 {
                        self.messenger.warning(
                            "JP2 IHDR box: compression type indicate that the file is not a conforming JP2 file",
                        );
                    }
                    seen_ihdr = true;
                }
                BOX_COLOUR_SPECIFICATION if seen_colr => {
                    self.messenger.info(
                        "A conforming JP2 reader shall ignore all Colour Specification boxes after the first",
                    );
                    self.skip_rest(&child)?;
                }
                BOX_COLOUR_SPECIFICATION => {
                    self.read_colr(&child, header)?;
                    seen_colr = true;
                }
                _ => self.skip_rest(&child)?,
            }
        }

        if !seen_ihdr {
            return Err(self.fail("Missing IHDR box in JP2H box", HeaderError::InvalidData));
        }
        Ok(())
    }

    fn read_colr(&mut self, colr: &Jp2Box, header: &mut Jp2Header) -> Result<(), HeaderError> {
        if colr.data_length < 3 {
            return Err(self.fail("Bad COLR header box (bad size)", HeaderError::InvalidData));
        }
        let method = self.reader.read_u8()?;
        let _precedence = self.reader.read_u8()?;
        let _approximation = self.reader.read_u8()?;
        match method {
            1 => {
                if colr.data_length < 7 {
                    return Err(self.fail("Bad COLR header box (bad size)", HeaderError::InvalidData));
                }
                let enumcs = self.reader.read_u32()?;
                header.color_space = ColorSpace::from_enumcs(enumcs);
                self.reader.skip(colr.data_length - 7)?;
            }
            2 => {
                let profile_length = usize::try_from(colr.data_length - 3)
                    .map_err(|_| HeaderError::NotEnoughMemory)?;
                header.icc_profile = Some(self.reader.read_bytes(profile_length)?);
                header.color_space = ColorSpace::Unknown;
            }
            _ => {
                self.messenger.warning(&format!(
                    "COLR BOX meth value is not a regular value ({method}), so we will ignore the entire Colour Specification box."
                ));
                self.reader.skip(colr.data_length - 3)?;
            }
        }
        Ok(())
    }

    /// Reads a box header. Returns `None` at the end of the stream.
    fn read_box(&mut self) -> Result<Option<Jp2Box>, HeaderError> {
        let start = self.reader.position();
        let Some(high) = self.reader.try_read_u16()? else {
            return Ok(None);
        };
        let low = self.reader.read_u16()?;
        let mut length = (u64::from(high) << 16) | u64::from(low);
        let box_type = self.reader.read_u32()?.to_be_bytes();
        let mut header_size = 8u64;

        if length == 1 {
            length = self.reader.read_u64()?;
            header_size += 8;
        } else if length == 0 {
            length = self.reader.stream_length()?.saturating_sub(start);
        }

        if length < header_size || start.checked_add(length).is_none() {
            return Err(self.fail("Box length is inconsistent", HeaderError::InvalidData));
        }

        Ok(Some(Jp2Box {
            box_type,
            data_start: start + header_size,
            data_length: length - header_size,
        }))
    }

    fn skip_rest(&mut self, jp2_box: &Jp2Box) -> Result<(), HeaderError> {
        self.reader.seek_to(jp2_box.end())
    }

    fn fail(&self, message: &str, err: HeaderError) -> HeaderError {
        self.messenger.error(message);
        err
    }
}
