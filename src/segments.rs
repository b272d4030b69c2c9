//! Byte-range segment tables for codestreams embedded in other containers.
//!
//! A segment table lists `(offset, length)` ranges of a file. Concatenated in
//! order they form the JPEG 2000 data the codec sees.

use crate::error::HeaderError;
use std::io::{self, Read, Seek, SeekFrom};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTable {
    segments: Vec<Segment>,
}

impl SegmentTable {
    /// Builds a table from the parallel position/length arrays handed over by the caller.
    pub fn from_arrays(positions: &[i64], lengths: &[i64]) -> Result<Self, HeaderError> {
        if positions.is_empty() || positions.len() != lengths.len() {
            return Err(HeaderError::SegmentArrayMismatch);
        }

        let mut segments = Vec::new();
        segments
            .try_reserve_exact(positions.len())
            .map_err(|_| HeaderError::NotEnoughMemory)?;

        for (&offset, &length) in positions.iter().zip(lengths) {
            let offset = u64::try_from(offset).map_err(|_| HeaderError::InvalidSegment)?;
            let length = u64::try_from(length).map_err(|_| HeaderError::InvalidSegment)?;
            segments.push(Segment { offset, length });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Sum of all segment lengths.
    pub fn data_length(&self) -> u64 {
        self.segments.iter().map(|s| s.length).sum()
    }

    /// Fails when any segment extends past `file_length`.
    pub fn check_bounds(&self, file_length: u64) -> Result<(), HeaderError> {
        for segment in &self.segments {
            let end = segment
                .offset
                .checked_add(segment.length)
                .ok_or(HeaderError::SegmentOutOfRange)?;
            if end > file_length {
                return Err(HeaderError::SegmentOutOfRange);
            }
        }
        Ok(())
    }
}

/// Presents the segments of an underlying reader as one contiguous stream.
pub struct SegmentReader<R> {
    inner: R,
    segments: Vec<Segment>,
    // Logical start of each segment in the concatenated stream.
    starts: Vec<u64>,
    total: u64,
    position: u64,
}

impl<R: Read + Seek> SegmentReader<R> {
    pub fn new(inner: R, table: &SegmentTable) -> Self {
        let segments: Vec<Segment> = table
            .segments()
            .iter()
            .copied()
            .filter(|s| s.length > 0)
            .collect();
        let mut starts = Vec::with_capacity(segments.len());
        let mut total = 0u64;
        for segment in &segments {
            starts.push(total);
            total += segment.length;
        }
        Self {
            inner,
            segments,
            starts,
            total,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl<R: Read + Seek> Read for SegmentReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.total {
            return Ok(0);
        }

        let index = self.starts.partition_point(|&start| start <= self.position) - 1;
        let segment = self.segments[index];
        let within = self.position - self.starts[index];
        let available = segment.length - within;
        let wanted = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));

        self.inner.seek(SeekFrom::Start(segment.offset + within))?;
        let read = self.inner.read(&mut buf[..wanted])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "segment extends past the end of the file",
            ));
        }
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for SegmentReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.total.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the segmented stream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_arrays_rejects_mismatch() {
        assert_eq!(
            SegmentTable::from_arrays(&[0, 10], &[5]),
            Err(HeaderError::SegmentArrayMismatch)
        );
        assert_eq!(
            SegmentTable::from_arrays(&[], &[]),
            Err(HeaderError::SegmentArrayMismatch)
        );
        assert_eq!(
            SegmentTable::from_arrays(&[-1], &[4]),
            Err(HeaderError::InvalidSegment)
        );
    }

    #[test]
    fn test_data_length_and_bounds() {
        let table = SegmentTable::from_arrays(&[100, 300, 50], &[10, 20, 5]).unwrap();
        assert_eq!(table.data_length(), 35);
        assert!(table.check_bounds(320).is_ok());
        assert_eq!(table.check_bounds(319), Err(HeaderError::SegmentOutOfRange));
    }

    #[test]
    fn test_reader_concatenates_segments() {
        let file: Vec<u8> = (0u8..64).collect();
        let table = SegmentTable::from_arrays(&[10, 40, 2], &[4, 3, 2]).unwrap();
        let mut reader = SegmentReader::new(Cursor::new(file), &table);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13, 40, 41, 42, 2, 3]);
    }

    #[test]
    fn test_reader_seek_across_segments() {
        let file: Vec<u8> = (0u8..64).collect();
        let table = SegmentTable::from_arrays(&[10, 40], &[4, 4]).unwrap();
        let mut reader = SegmentReader::new(Cursor::new(file), &table);

        assert_eq!(reader.seek(SeekFrom::Start(3)).unwrap(), 3);
        let mut two = [0u8; 2];
        reader.read_exact(&mut two).unwrap();
        assert_eq!(two, [13, 40]);

        assert_eq!(reader.seek(SeekFrom::End(-1)).unwrap(), 7);
        let mut last = [0u8; 1];
        reader.read_exact(&mut last).unwrap();
        assert_eq!(last, [43]);
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_reader_reports_truncated_file() {
        let file = vec![0u8; 8];
        let table = SegmentTable::from_arrays(&[4], &[10]).unwrap();
        let mut reader = SegmentReader::new(Cursor::new(file), &table);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
