use crate::error::HeaderError;
use std::io::{Read, Seek, SeekFrom};

/// Big-endian reader over a seekable stream. Skipping seeks instead of reading,
/// so payloads the header parser does not need are never loaded.
pub struct MarkerReader<R> {
    source: R,
    position: u64,
}

impl<R: Read + Seek> MarkerReader<R> {
    pub fn new(mut source: R) -> Result<Self, HeaderError> {
        let position = source.stream_position()?;
        Ok(Self { source, position })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn read_u8(&mut self) -> Result<u8, HeaderError> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, HeaderError> {
        let mut bytes = [0u8; 2];
        self.read_exact(&mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32, HeaderError> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, HeaderError> {
        let mut bytes = [0u8; 8];
        self.read_exact(&mut bytes)?;
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, HeaderError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(count)
            .map_err(|_| HeaderError::NotEnoughMemory)?;
        bytes.resize(count, 0);
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Returns `None` at a clean end of stream.
    pub fn try_read_u16(&mut self) -> Result<Option<u16>, HeaderError> {
        let mut bytes = [0u8; 2];
        let first = self.source.read(&mut bytes[..1])?;
        if first == 0 {
            return Ok(None);
        }
        self.position += 1;
        self.read_exact(&mut bytes[1..])?;
        Ok(Some(u16::from_be_bytes(bytes)))
    }

    pub fn skip(&mut self, count: u64) -> Result<(), HeaderError> {
        if count == 0 {
            return Ok(());
        }
        let delta = i64::try_from(count).map_err(|_| HeaderError::InvalidData)?;
        self.position = self.source.seek(SeekFrom::Current(delta))?;
        Ok(())
    }

    pub fn seek_to(&mut self, position: u64) -> Result<(), HeaderError> {
        self.position = self.source.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Total length of the underlying stream. Leaves the position unchanged.
    pub fn stream_length(&mut self) -> Result<u64, HeaderError> {
        let end = self.source.seek(SeekFrom::End(0))?;
        self.source.seek(SeekFrom::Start(self.position))?;
        Ok(end)
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), HeaderError> {
        self.source.read_exact(out).map_err(|err| match err.kind() {
            std::io::ErrorKind::UnexpectedEof => HeaderError::InvalidData,
            _ => HeaderError::from(err),
        })?;
        self.position += out.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_big_endian_reads_and_skip() {
        let data = vec![0xFF, 0x4F, 0x00, 0x00, 0x01, 0x00, 0xAA, 0xBB, 0xCC];
        let mut reader = MarkerReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 0xFF4F);
        assert_eq!(reader.read_u32().unwrap(), 256);
        reader.skip(2).unwrap();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_u8().unwrap(), 0xCC);
        assert_eq!(reader.try_read_u16().unwrap(), None);
        assert_eq!(reader.read_u8(), Err(HeaderError::InvalidData));
    }

    #[test]
    fn test_stream_length_keeps_position() {
        let mut reader = MarkerReader::new(Cursor::new(vec![0u8; 10])).unwrap();
        reader.skip(3).unwrap();
        assert_eq!(reader.stream_length().unwrap(), 10);
        assert_eq!(reader.position(), 3);
        reader.read_u8().unwrap();
        assert_eq!(reader.position(), 4);
    }
}
