//! Container format detection from magic bytes and file extensions.

use crate::constants::{
    J2K_CODESTREAM_MAGIC, JP2_FILE_PREFIX, JP2_MAGIC, JP2_RFC3745_MAGIC, MAGIC_SNIFF_LENGTH,
};
use crate::error::HeaderError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::path::Path;
use tracing::debug;

/// JPEG 2000 container formats the decoder can be created for.
///
/// Discriminants match `OPJ_CODEC_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum CodecFormat {
    /// Raw codestream (.j2k, .j2c, .jpc)
    Codestream = 0,
    /// JPIP stream (.jpt)
    Jpip = 1,
    /// JP2 box container (.jp2)
    Jp2 = 2,
}

impl CodecFormat {
    pub fn name(self) -> &'static str {
        match self {
            CodecFormat::Codestream => "J2K codestream",
            CodecFormat::Jpip => "JPT (JPIP)",
            CodecFormat::Jp2 => "JP2",
        }
    }
}

impl std::fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const EXTENSIONS: [(&str, CodecFormat); 5] = [
    ("j2k", CodecFormat::Codestream),
    ("jp2", CodecFormat::Jp2),
    ("jpt", CodecFormat::Jpip),
    ("j2c", CodecFormat::Codestream),
    ("jpc", CodecFormat::Codestream),
];

/// Identifies the format from the first bytes of a buffer.
///
/// Buffers shorter than 12 bytes are never identified.
pub fn sniff_magic(data: &[u8]) -> Option<CodecFormat> {
    if data.len() < MAGIC_SNIFF_LENGTH {
        return None;
    }
    if data[..12] == JP2_RFC3745_MAGIC || data[..4] == JP2_MAGIC {
        Some(CodecFormat::Jp2)
    } else if data[..4] == J2K_CODESTREAM_MAGIC {
        Some(CodecFormat::Codestream)
    } else {
        None
    }
}

/// Identifies the format from a file name extension.
///
/// Only the first three characters of the extension are compared, ignoring case.
pub fn sniff_extension(path: impl AsRef<Path>) -> Option<CodecFormat> {
    let ext = path.as_ref().extension()?.to_str()?;
    let prefix = ext.get(..3)?;
    EXTENSIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(prefix))
        .map(|&(_, format)| format)
}

/// Combines magic and extension detection. Magic bytes win over the extension.
pub fn detect_format(
    leading: Option<&[u8]>,
    path: Option<&Path>,
) -> Result<CodecFormat, HeaderError> {
    let magic = leading.and_then(sniff_magic);
    let by_extension = path.and_then(sniff_extension);

    match (magic, by_extension) {
        (Some(magic), Some(ext)) if magic != ext => {
            debug!(%magic, extension = %ext, "file extension does not match magic bytes, using magic");
            Ok(magic)
        }
        (Some(magic), _) => Ok(magic),
        (None, Some(ext)) => Ok(ext),
        (None, None) => Err(HeaderError::UndeterminedFormat),
    }
}

/// True when `data` starts with a JP2 signature box followed by a `jp2` File Type box.
pub fn is_jp2_file(data: &[u8]) -> bool {
    data.starts_with(&JP2_FILE_PREFIX)
}
