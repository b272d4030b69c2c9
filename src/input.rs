//! Input sources for a header read: an in-memory buffer or a (possibly segmented) file.

use crate::constants::MAGIC_SNIFF_LENGTH;
use crate::error::HeaderError;
use crate::segments::{SegmentReader, SegmentTable};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Compressed bytes plus a read cursor. Never resized once created.
#[derive(Debug, Clone, Default)]
pub struct BufferInfo {
    buf: Vec<u8>,
    cur: usize,
}

impl BufferInfo {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, cur: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes not yet consumed.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.cur..]
    }

    pub fn position(&self) -> usize {
        self.cur
    }

    pub fn set_position(&mut self, position: usize) -> usize {
        self.cur = position.min(self.buf.len());
        self.cur
    }

    pub fn advance(&mut self, count: usize) -> usize {
        self.set_position(self.cur.saturating_add(count))
    }

    /// Leading bytes used for format detection.
    pub fn leading(&self) -> &[u8] {
        &self.buf[..self.buf.len().min(MAGIC_SNIFF_LENGTH)]
    }
}

impl Read for BufferInfo {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.remaining();
        let count = remaining.len().min(out.len());
        out[..count].copy_from_slice(&remaining[..count]);
        self.cur += count;
        Ok(count)
    }
}

impl Seek for BufferInfo {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => (self.cur as u64).checked_add_signed(delta),
            SeekFrom::End(delta) => (self.buf.len() as u64).checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek before start of buffer")
        })?;
        let clamped = usize::try_from(target).unwrap_or(usize::MAX);
        Ok(self.set_position(clamped) as u64)
    }
}

/// A file to read, with the segments holding its JPEG 2000 data.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub segments: Option<SegmentTable>,
    /// Number of JPEG 2000 bytes: the segment total, or the file size.
    pub data_length: u64,
}

impl FileInfo {
    pub fn new(
        path: impl Into<PathBuf>,
        segments: Option<SegmentTable>,
        max_path_length: usize,
    ) -> Result<Self, HeaderError> {
        let path = path.into();
        if path.as_os_str().len() >= max_path_length {
            return Err(HeaderError::PathTooLong);
        }

        let file_length = std::fs::metadata(&path)
            .map_err(|_| HeaderError::UnreadableFile)?
            .len();

        let data_length = match &segments {
            Some(table) => {
                table.check_bounds(file_length)?;
                table.data_length()
            }
            None => file_length,
        };

        Ok(Self {
            path,
            segments,
            data_length,
        })
    }

    /// Reads the first bytes of the JPEG 2000 data once, for format detection.
    ///
    /// Segmented files are read through [`SegmentReader`], so the bytes are the
    /// same ones the codec sees first.
    pub fn read_leading(&self) -> Result<Vec<u8>, HeaderError> {
        if self.data_length < MAGIC_SNIFF_LENGTH as u64 {
            return Err(HeaderError::InputTooShort);
        }
        let file = File::open(&self.path).map_err(|_| HeaderError::UnreadableFile)?;
        let mut leading = vec![0u8; MAGIC_SNIFF_LENGTH];
        match &self.segments {
            Some(table) => SegmentReader::new(file, table).read_exact(&mut leading)?,
            None => BufReader::new(file).read_exact(&mut leading)?,
        }
        Ok(leading)
    }
}

/// Where the compressed data of one header read comes from.
#[derive(Debug, Clone)]
pub enum InputSource {
    Buffer(BufferInfo),
    File(FileInfo),
}

impl InputSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputSource::Buffer(_) => None,
            InputSource::File(info) => Some(&info.path),
        }
    }

    pub fn read_leading(&self) -> Result<Vec<u8>, HeaderError> {
        match self {
            InputSource::Buffer(buffer) => {
                if buffer.len() < MAGIC_SNIFF_LENGTH {
                    return Err(HeaderError::InputTooShort);
                }
                Ok(buffer.leading().to_vec())
            }
            InputSource::File(info) => info.read_leading(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_buffer_info_cursor() {
        let mut buffer = BufferInfo::new(vec![1, 2, 3, 4, 5]);
        let mut two = [0u8; 2];
        buffer.read_exact(&mut two).unwrap();
        assert_eq!(two, [1, 2]);
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.advance(10), 5);
        assert!(buffer.remaining().is_empty());
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_file_info_reads_leading_from_first_segment() {
        let mut file = NamedTempFile::new().unwrap();
        let mut content = vec![0xAAu8; 8];
        content.extend_from_slice(&[0xFF, 0x4F, 0xFF, 0x51]);
        content.extend_from_slice(&[0u8; 20]);
        file.write_all(&content).unwrap();

        let table = SegmentTable::from_arrays(&[8], &[24]).unwrap();
        let info = FileInfo::new(file.path(), Some(table), 4096).unwrap();
        assert_eq!(info.data_length, 24);
        assert_eq!(&info.read_leading().unwrap()[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
    }

    #[test]
    fn test_leading_bytes_span_short_segments() {
        let mut file = NamedTempFile::new().unwrap();
        let mut content = vec![0x00, 0x00, 0x00, 0x0C];
        content.extend_from_slice(&[0x11; 6]);
        content.extend_from_slice(b"jP  ");
        content.extend_from_slice(&[0x0D, 0x0A, 0x87, 0x0A, 0x00, 0x00]);
        file.write_all(&content).unwrap();

        // empty segment first, then 4 bytes, then the rest after a gap
        let table = SegmentTable::from_arrays(&[2, 0, 10], &[0, 4, 10]).unwrap();
        let info = FileInfo::new(file.path(), Some(table), 4096).unwrap();
        assert_eq!(info.data_length, 14);
        assert_eq!(
            info.read_leading().unwrap(),
            vec![0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A]
        );
    }

    #[test]
    fn test_path_limit_counts_the_terminator() {
        let path = "p".repeat(16);
        assert_eq!(
            FileInfo::new(&path, None, 16).unwrap_err(),
            HeaderError::PathTooLong
        );
        assert_eq!(
            FileInfo::new(&path[..15], None, 16).unwrap_err(),
            HeaderError::UnreadableFile
        );
    }

    #[test]
    fn test_file_info_rejects_long_path_and_missing_file() {
        let long = "x".repeat(40);
        assert_eq!(
            FileInfo::new(&long, None, 16).unwrap_err(),
            HeaderError::PathTooLong
        );
        assert_eq!(
            FileInfo::new("/nonexistent/input.j2k", None, 4096).unwrap_err(),
            HeaderError::UnreadableFile
        );
    }

    #[test]
    fn test_short_input_is_rejected() {
        let source = InputSource::Buffer(BufferInfo::new(vec![0xFF, 0x4F, 0xFF, 0x51]));
        assert_eq!(source.read_leading(), Err(HeaderError::InputTooShort));
    }
}
