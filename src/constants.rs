// JP2 signature box as defined in ISO/IEC 15444-1, Annex I.5.1 (RFC 3745 magic).
pub const JP2_RFC3745_MAGIC: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

// Trailing four bytes of the signature box, accepted on their own.
pub const JP2_MAGIC: [u8; 4] = [0x0D, 0x0A, 0x87, 0x0A];

// SOC followed by SIZ, the mandatory start of every codestream.
pub const J2K_CODESTREAM_MAGIC: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

// Signature box followed by the start of a File Type box with brand "jp2".
pub const JP2_FILE_PREFIX: [u8; 23] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A, 0x00, 0x00, 0x00, 0x14,
    0x66, 0x74, 0x79, 0x70, 0x6A, 0x70, 0x32,
];

// Number of leading bytes needed to identify a format from its magic.
pub const MAGIC_SNIFF_LENGTH: usize = 12;

// Same limit as OPJ_PATH_LEN.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 4096;

pub const SUCCESS_RETURN_CODE: i32 = 0;
pub const FAILURE_RETURN_CODE: i32 = -1;

// SIZ limits, ISO/IEC 15444-1 table A.9.
pub const MINIMUM_COMPONENT_COUNT: u16 = 1;
pub const MAXIMUM_COMPONENT_COUNT: u16 = 16384;
pub const MAXIMUM_PRECISION: u8 = 38;
