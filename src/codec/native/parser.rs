//! JPEG 2000 codestream main header parser.
//!
//! Handles the marker segments between SOC and the first SOT (SIZ, COD, QCD,
//! CAP, COM). Everything else in the main header is skipped by length.

use super::marker::{J2K_MARKER_START_BYTE, J2kMarker};
use super::reader::MarkerReader;
use crate::codec::{ComponentHeader, DecoderParameters, ImageHeader};
use crate::constants::{MAXIMUM_COMPONENT_COUNT, MAXIMUM_PRECISION, MINIMUM_COMPONENT_COUNT};
use crate::error::HeaderError;
use crate::messages::Messenger;
use std::io::{Read, Seek};

/// Metadata for a single component from the SIZ marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct J2kComponentInfo {
    /// bit depth (1..=38)
    pub depth: u8,
    pub is_signed: bool,
    /// Horizontal subsampling factor
    pub dx: u8,
    /// Vertical subsampling factor
    pub dy: u8,
}

/// Image and tile size (SIZ) marker information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kSiz {
    pub capabilities: u16,
    /// Xsiz: right edge of the image area on the reference grid.
    pub width: u32,
    /// Ysiz: bottom edge of the image area on the reference grid.
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<J2kComponentInfo>,
}

/// Coding Style Default (COD) marker information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kCod {
    pub coding_style: u8,
    pub progression_order: u8,
    pub number_of_layers: u16,
    /// Layers a decode would use: `number_of_layers` capped by the requested limit.
    pub layers_to_decode: u16,
    pub mct: u8,
    pub decomposition_levels: u8,
    pub codeblock_width_exp: u8,
    pub codeblock_height_exp: u8,
    pub codeblock_style: u8,
    pub transformation: u8,
    /// One byte per resolution level (PPx + PPy<<4), present when Scod bit 0 is set.
    pub precinct_sizes: Vec<u8>,
}

/// Quantization Default (QCD) marker information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kQcd {
    pub quant_style: u8,
    pub step_sizes: Vec<u16>,
}

/// Capability (CAP) marker information (Part 15)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kCap {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

/// Everything the main header tells about the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kMainHeader {
    pub siz: J2kSiz,
    pub cod: Option<J2kCod>,
    pub qcd: Option<J2kQcd>,
    pub cap: Option<J2kCap>,
    pub comments: Vec<String>,
}

impl J2kMainHeader {
    /// True when the CAP marker announces HTJ2K (Part 15) block coding.
    pub fn is_htj2k(&self) -> bool {
        self.cap.as_ref().is_some_and(|c| (c.pcap & (1 << 14)) != 0)
    }

    /// Builds the image descriptor the way the reference grid defines it:
    /// each component covers `ceil(X1/dx) - ceil(X0/dx)` samples horizontally.
    pub fn image_header(&self) -> ImageHeader {
        let siz = &self.siz;
        let components = siz
            .components
            .iter()
            .map(|c| {
                let dx = u32::from(c.dx);
                let dy = u32::from(c.dy);
                let x0 = siz.x_origin.div_ceil(dx);
                let y0 = siz.y_origin.div_ceil(dy);
                ComponentHeader {
                    dx,
                    dy,
                    w: siz.width.div_ceil(dx) - x0,
                    h: siz.height.div_ceil(dy) - y0,
                    x0,
                    y0,
                    prec: u32::from(c.depth),
                    bpp: u32::from(c.depth),
                    sgnd: c.is_signed,
                }
            })
            .collect();
        ImageHeader {
            x0: siz.x_origin,
            y0: siz.y_origin,
            x1: siz.width,
            y1: siz.height,
            components,
            ..Default::default()
        }
    }
}

/// A parser that transforms raw J2K marker segments into structured metadata.
pub struct J2kParser<'m, R> {
    reader: MarkerReader<R>,
    messenger: &'m Messenger,
    parameters: DecoderParameters,
    header: J2kMainHeader,
    seen_siz: bool,
}

impl<'m, R: Read + Seek> J2kParser<'m, R> {
    pub fn new(reader: MarkerReader<R>, messenger: &'m Messenger) -> Self {
        Self {
            reader,
            messenger,
            parameters: DecoderParameters::default(),
            header: J2kMainHeader::default(),
            seen_siz: false,
        }
    }

    pub fn with_parameters(mut self, parameters: DecoderParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Reads from SOC up to (and including) the first SOT marker.
    pub fn parse_main_header(mut self) -> Result<J2kMainHeader, HeaderError> {
        self.messenger.info("Start to read j2k main header");

        let soc = self.reader.read_u16()?;
        if soc != u16::from(J2kMarker::StartOfCodestream) {
            return Err(self.fail("Expected a SOC marker", HeaderError::InvalidData));
        }

        loop {
            let code = match self.reader.try_read_u16()? {
                Some(code) => code,
                None => {
                    return Err(self.fail(
                        "Stream too short, expected SOT",
                        HeaderError::InvalidData,
                    ));
                }
            };
            if (code >> 8) as u8 != J2K_MARKER_START_BYTE {
                let message = format!("A marker ID was expected (0xff--) instead of {code:04x}");
                return Err(self.fail(&message, HeaderError::InvalidData));
            }

            let marker = match J2kMarker::try_from(code) {
                Ok(marker) => marker,
                Err(_) => {
                    self.messenger
                        .warning(&format!("Unknown marker 0x{code:04x} detected, skipping it"));
                    self.skip_segment()?;
                    continue;
                }
            };

            if marker == J2kMarker::StartOfTile {
                break;
            }
            if !marker.allowed_in_main_header() {
                let message = format!(
                    "Marker {} is not compliant with its position",
                    marker.mnemonic()
                );
                return Err(self.fail(&message, HeaderError::InvalidData));
            }
            if !self.seen_siz && marker != J2kMarker::ImageAndTileSize {
                return Err(self.fail(
                    "The SIZ marker must directly follow SOC",
                    HeaderError::InvalidData,
                ));
            }

            match marker {
                J2kMarker::ImageAndTileSize => self.parse_siz()?,
                J2kMarker::CodingStyleDefault => self.parse_cod()?,
                J2kMarker::QuantizationDefault => self.parse_qcd()?,
                J2kMarker::Capability => self.parse_cap()?,
                J2kMarker::Comment => self.parse_com()?,
                _ => self.skip_segment()?,
            }
        }

        if self.header.cod.is_none() {
            return Err(self.fail("required COD marker not found in main header", HeaderError::InvalidData));
        }
        if self.header.qcd.is_none() {
            return Err(self.fail("required QCD marker not found in main header", HeaderError::InvalidData));
        }

        self.messenger.info("Main header has been correctly decoded.");
        Ok(self.header)
    }

    fn parse_siz(&mut self) -> Result<(), HeaderError> {
        if self.seen_siz {
            return Err(self.fail("Duplicate SIZ marker", HeaderError::InvalidData));
        }
        self.seen_siz = true;

        let len = self.reader.read_u16()?;
        if len < 41 || (len - 38) % 3 != 0 {
            return Err(self.fail("Error with SIZ marker size", HeaderError::InvalidData));
        }

        let siz = &mut self.header.siz;
        siz.capabilities = self.reader.read_u16()?;
        siz.width = self.reader.read_u32()?;
        siz.height = self.reader.read_u32()?;
        siz.x_origin = self.reader.read_u32()?;
        siz.y_origin = self.reader.read_u32()?;
        siz.tile_width = self.reader.read_u32()?;
        siz.tile_height = self.reader.read_u32()?;
        siz.tile_x_origin = self.reader.read_u32()?;
        siz.tile_y_origin = self.reader.read_u32()?;
        let comps = self.reader.read_u16()?;

        let (width, height, x_origin, y_origin) = (siz.width, siz.height, siz.x_origin, siz.y_origin);
        let (tile_width, tile_height) = (siz.tile_width, siz.tile_height);

        if !(MINIMUM_COMPONENT_COUNT..=MAXIMUM_COMPONENT_COUNT).contains(&comps) {
            let message = format!("Error with SIZ marker: number of component is illegal -> {comps}");
            return Err(self.fail(&message, HeaderError::InvalidData));
        }
        if u32::from(comps) != u32::from(len - 38) / 3 {
            let message = format!(
                "Error with SIZ marker: number of component is not compatible with the remaining number of parameters ( {} vs {})",
                comps,
                (len - 38) / 3
            );
            return Err(self.fail(&message, HeaderError::InvalidData));
        }
        if x_origin >= width || y_origin >= height {
            let message = format!(
                "Error with SIZ marker: negative or zero image size ({} x {})",
                i64::from(width) - i64::from(x_origin),
                i64::from(height) - i64::from(y_origin)
            );
            return Err(self.fail(&message, HeaderError::InvalidData));
        }
        if tile_width == 0 || tile_height == 0 {
            let message = format!(
                "Error with SIZ marker: invalid tile size (tdx: {tile_width}, tdy: {tile_height})"
            );
            return Err(self.fail(&message, HeaderError::InvalidData));
        }

        let mut components = Vec::with_capacity(comps as usize);
        for index in 0..comps {
            let depth_byte = self.reader.read_u8()?;
            let depth = (depth_byte & 0x7F) + 1;
            let is_signed = (depth_byte & 0x80) != 0;
            let dx = self.reader.read_u8()?;
            let dy = self.reader.read_u8()?;
            if depth > MAXIMUM_PRECISION {
                let message = format!(
                    "Invalid values for comp = {index} : prec={depth} (should be between 1 and 38 according to the JPEG2000 norm)"
                );
                return Err(self.fail(&message, HeaderError::InvalidData));
            }
            if dx == 0 || dy == 0 {
                let message = format!(
                    "Invalid values for comp = {index} : dx={dx} dy={dy} (should be between 1 and 255 according to the JPEG2000 norm)"
                );
                return Err(self.fail(&message, HeaderError::InvalidData));
            }
            components.push(J2kComponentInfo {
                depth,
                is_signed,
                dx,
                dy,
            });
        }
        self.header.siz.components = components;
        Ok(())
    }

    fn parse_cod(&mut self) -> Result<(), HeaderError> {
        // Lcod(2) Scod(1) SGcod(4) SPcod(5) = 12 bytes minimum.
        let len = self.reader.read_u16()?;
        if len < 12 {
            return Err(self.fail("Error reading COD marker", HeaderError::InvalidData));
        }
        let coding_style = self.reader.read_u8()?;
        let progression_order = self.reader.read_u8()?;
        let number_of_layers = self.reader.read_u16()?;
        let mct = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        let codeblock_width_exp = self.reader.read_u8()?;
        let codeblock_height_exp = self.reader.read_u8()?;
        let codeblock_style = self.reader.read_u8()?;
        let transformation = self.reader.read_u8()?;

        if progression_order > 4 {
            let message = format!("Unknown progression order in COD marker ({progression_order})");
            return Err(self.fail(&message, HeaderError::InvalidData));
        }
        if number_of_layers == 0 {
            return Err(self.fail(
                "Invalid number of layers in COD marker : 0 not in range [1-65535]",
                HeaderError::InvalidData,
            ));
        }
        if decomposition_levels > 32 {
            let message = format!(
                "Invalid number of decomposition levels in COD marker: {decomposition_levels}"
            );
            return Err(self.fail(&message, HeaderError::InvalidData));
        }

        let resolutions = u32::from(decomposition_levels) + 1;
        if self.parameters.reduce >= resolutions {
            let message = format!(
                "The number of resolutions to remove ({}) is greater or equal than the number of resolutions of this component ({})",
                self.parameters.reduce, resolutions
            );
            return Err(self.fail(&message, HeaderError::InvalidData));
        }

        let layers_to_decode = match u16::try_from(self.parameters.layers) {
            Ok(0) | Err(_) => number_of_layers,
            Ok(limit) => limit.min(number_of_layers),
        };

        let mut precinct_sizes = Vec::new();
        if (coding_style & 0x01) != 0 {
            for _ in 0..resolutions {
                precinct_sizes.push(self.reader.read_u8()?);
            }
        }

        let parsed_bytes = 12 + precinct_sizes.len();
        let remaining = (len as usize)
            .checked_sub(parsed_bytes)
            .ok_or_else(|| self.fail("Error reading COD marker", HeaderError::InvalidData))?;
        self.reader.skip(remaining as u64)?;

        self.header.cod = Some(J2kCod {
            coding_style,
            progression_order,
            number_of_layers,
            layers_to_decode,
            mct,
            decomposition_levels,
            codeblock_width_exp,
            codeblock_height_exp,
            codeblock_style,
            transformation,
            precinct_sizes,
        });
        Ok(())
    }

    fn parse_qcd(&mut self) -> Result<(), HeaderError> {
        let len = self.reader.read_u16()?;
        if len < 3 {
            return Err(self.fail("Error reading QCD marker", HeaderError::InvalidData));
        }
        let sqcd = self.reader.read_u8()?;
        let mut bytes_left = (len as usize) - 3;

        // Scalar expounded uses 16-bit step sizes, the other styles 8-bit exponents.
        let is_16bit = (sqcd & 0x1F) == 0x02;
        let step_size_len = if is_16bit { 2 } else { 1 };

        let mut step_sizes = Vec::new();
        while bytes_left >= step_size_len {
            let step = if is_16bit {
                self.reader.read_u16()?
            } else {
                u16::from(self.reader.read_u8()?) << 8
            };
            step_sizes.push(step);
            bytes_left -= step_size_len;
        }
        self.reader.skip(bytes_left as u64)?;

        self.header.qcd = Some(J2kQcd {
            quant_style: sqcd,
            step_sizes,
        });
        Ok(())
    }

    fn parse_cap(&mut self) -> Result<(), HeaderError> {
        let len = self.reader.read_u16()?;
        if len < 6 {
            return Err(self.fail("Error reading CAP marker", HeaderError::InvalidData));
        }
        let pcap = self.reader.read_u32()?;
        let mut bytes_left = (len as usize) - 6;

        let mut ccap = Vec::new();
        while bytes_left >= 2 {
            ccap.push(self.reader.read_u16()?);
            bytes_left -= 2;
        }
        self.reader.skip(bytes_left as u64)?;

        self.header.cap = Some(J2kCap { pcap, ccap });
        Ok(())
    }

    fn parse_com(&mut self) -> Result<(), HeaderError> {
        let len = self.reader.read_u16()?;
        if len < 4 {
            return Err(self.fail("Error reading COM marker", HeaderError::InvalidData));
        }
        let registration = self.reader.read_u16()?;
        let text = self.reader.read_bytes((len - 4) as usize)?;
        // Rcom 1 is Latin-1 text, 0 is binary.
        if registration == 1 {
            self.header
                .comments
                .push(text.iter().map(|&b| char::from(b)).collect());
        }
        Ok(())
    }

    fn skip_segment(&mut self) -> Result<(), HeaderError> {
        let len = self.reader.read_u16()?;
        if len < 2 {
            return Err(self.fail("Marker segment length is invalid", HeaderError::InvalidData));
        }
        self.reader.skip(u64::from(len - 2))
    }

    fn fail(&self, message: &str, err: HeaderError) -> HeaderError {
        self.messenger.error(message);
        err
    }
}
