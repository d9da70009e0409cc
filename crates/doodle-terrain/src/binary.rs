//! Little-endian binary reader/writer shared by the save format and the
//! replication messages.
//!
//! Strings are UTF-8 prefixed with their byte length as a 7-bit varint
//! (low bits first, high bit set on every byte except the last).

/// Errors produced while reading binary data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BinaryError {
    /// The buffer ended before the value was complete.
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    EndOfStream {
        /// Bytes required by the read.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// A string payload was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// A length prefix or count was negative or did not terminate.
    #[error("invalid length prefix")]
    InvalidLength,
}

/// Growable little-endian byte writer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a varint byte length followed by the UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) {
        let mut len = value.len() as u32;
        while len >= 0x80 {
            self.buf.push((len as u8) | 0x80);
            len >>= 7;
        }
        self.buf.push(len as u8);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], BinaryError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(BinaryError::EndOfStream { needed, remaining });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], BinaryError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryError> {
        Ok(self.take(1)?[0])
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool, BinaryError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, BinaryError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, BinaryError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BinaryError> {
        self.take(len)
    }

    /// Reads an `i32` element count, rejecting negative values.
    pub fn read_count(&mut self) -> Result<usize, BinaryError> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| BinaryError::InvalidLength)
    }

    pub fn read_str(&mut self) -> Result<String, BinaryError> {
        let mut len: u32 = 0;
        let mut shift = 0;
        loop {
            if shift > 28 {
                return Err(BinaryError::InvalidLength);
            }
            let byte = self.read_u8()?;
            len |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BinaryError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string_layout() {
        let mut w = BinaryWriter::new();
        w.write_str("0.0.6");
        assert_eq!(w.as_slice(), &[5, b'0', b'.', b'0', b'.', b'6']);
    }

    #[test]
    fn test_long_string_uses_varint_prefix() {
        let text = "x".repeat(300);
        let mut w = BinaryWriter::new();
        w.write_str(&text);
        // 300 = 0b1_0010_1100 -> 0xAC 0x02
        assert_eq!(&w.as_slice()[..2], &[0xAC, 0x02]);
        assert_eq!(w.len(), 302);

        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_str().unwrap(), text);
        assert!(r.is_empty());
    }

    #[test]
    fn test_little_endian_integers() {
        let mut w = BinaryWriter::new();
        w.write_i16(-2);
        w.write_i32(800);
        assert_eq!(w.as_slice(), &[0xFE, 0xFF, 0x20, 0x03, 0x00, 0x00]);

        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_i32().unwrap(), 800);
    }

    #[test]
    fn test_truncated_read_reports_end_of_stream() {
        let mut r = BinaryReader::new(&[1, 2]);
        assert_eq!(
            r.read_i32(),
            Err(BinaryError::EndOfStream {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut w = BinaryWriter::new();
        w.write_i32(-1);
        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_count(), Err(BinaryError::InvalidLength));
    }

    #[test]
    fn test_unterminated_varint_rejected() {
        let mut r = BinaryReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert_eq!(r.read_str(), Err(BinaryError::InvalidLength));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut r = BinaryReader::new(&[2, 0xC3, 0x28]);
        assert_eq!(r.read_str(), Err(BinaryError::InvalidUtf8));
    }

    #[test]
    fn test_bool_reads_any_nonzero() {
        let mut r = BinaryReader::new(&[0, 1, 7]);
        assert!(!r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
    }
}
