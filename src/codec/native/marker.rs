use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Marker codes of the JPEG 2000 codestream syntax (ISO/IEC 15444-1, Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum J2kMarker {
    /// SOC: Start of codestream.
    StartOfCodestream = 0xFF4F,
    /// CAP: Extended capabilities (Part 15).
    Capability = 0xFF50,
    /// SIZ: Image and tile size.
    ImageAndTileSize = 0xFF51,
    /// COD: Coding style default.
    CodingStyleDefault = 0xFF52,
    /// COC: Coding style component.
    CodingStyleComponent = 0xFF53,
    /// TLM: Tile-part lengths.
    TilePartLengths = 0xFF55,
    /// PLM: Packet length, main header.
    PacketLengthMain = 0xFF57,
    /// PLT: Packet length, tile-part header.
    PacketLengthTile = 0xFF58,
    /// QCD: Quantization default.
    QuantizationDefault = 0xFF5C,
    /// QCC: Quantization component.
    QuantizationComponent = 0xFF5D,
    /// RGN: Region of interest.
    RegionOfInterest = 0xFF5E,
    /// POC: Progression order change.
    ProgressionOrderChange = 0xFF5F,
    /// PPM: Packed packet headers, main header.
    PackedPacketHeadersMain = 0xFF60,
    /// PPT: Packed packet headers, tile-part header.
    PackedPacketHeadersTile = 0xFF61,
    /// CRG: Component registration.
    ComponentRegistration = 0xFF63,
    /// COM: Comment.
    Comment = 0xFF64,
    /// SOT: Start of tile-part. Ends the main header.
    StartOfTile = 0xFF90,
    /// SOP: Start of packet.
    StartOfPacket = 0xFF91,
    /// EPH: End of packet header.
    EndOfPacketHeader = 0xFF92,
    /// SOD: Start of data.
    StartOfData = 0xFF93,
    /// EOC: End of codestream.
    EndOfCodestream = 0xFFD9,
}

impl J2kMarker {
    /// Short mnemonic used in messages.
    pub fn mnemonic(self) -> &'static str {
        match self {
            J2kMarker::StartOfCodestream => "SOC",
            J2kMarker::Capability => "CAP",
            J2kMarker::ImageAndTileSize => "SIZ",
            J2kMarker::CodingStyleDefault => "COD",
            J2kMarker::CodingStyleComponent => "COC",
            J2kMarker::TilePartLengths => "TLM",
            J2kMarker::PacketLengthMain => "PLM",
            J2kMarker::PacketLengthTile => "PLT",
            J2kMarker::QuantizationDefault => "QCD",
            J2kMarker::QuantizationComponent => "QCC",
            J2kMarker::RegionOfInterest => "RGN",
            J2kMarker::ProgressionOrderChange => "POC",
            J2kMarker::PackedPacketHeadersMain => "PPM",
            J2kMarker::PackedPacketHeadersTile => "PPT",
            J2kMarker::ComponentRegistration => "CRG",
            J2kMarker::Comment => "COM",
            J2kMarker::StartOfTile => "SOT",
            J2kMarker::StartOfPacket => "SOP",
            J2kMarker::EndOfPacketHeader => "EPH",
            J2kMarker::StartOfData => "SOD",
            J2kMarker::EndOfCodestream => "EOC",
        }
    }

    /// True for markers that may appear in the main header.
    pub fn allowed_in_main_header(self) -> bool {
        !matches!(
            self,
            J2kMarker::StartOfCodestream
                | J2kMarker::PacketLengthTile
                | J2kMarker::PackedPacketHeadersTile
                | J2kMarker::StartOfPacket
                | J2kMarker::EndOfPacketHeader
                | J2kMarker::StartOfData
                | J2kMarker::EndOfCodestream
        )
    }
}

pub const J2K_MARKER_START_BYTE: u8 = 0xFF;

// JP2 box types, ISO/IEC 15444-1 Annex I.
pub const BOX_SIGNATURE: [u8; 4] = *b"jP  ";
pub const BOX_FILE_TYPE: [u8; 4] = *b"ftyp";
pub const BOX_HEADER: [u8; 4] = *b"jp2h";
pub const BOX_IMAGE_HEADER: [u8; 4] = *b"ihdr";
pub const BOX_COLOUR_SPECIFICATION: [u8; 4] = *b"colr";
pub const BOX_CODESTREAM: [u8; 4] = *b"jp2c";
