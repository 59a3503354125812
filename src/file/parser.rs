//! Cursor-based reader for blob heap entries and custom attribute values.
//!
//! Provides bounds-checked sequential access plus the ECMA-335 compressed integer and
//! `SerString` encodings (II.23.2 and II.23.3), together with their encoders.

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A simple cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Current position of the cursor.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns true if unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Read a little-endian primitive and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data is left.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `len` raw bytes and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data is left.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let Some(end) = self.position.checked_add(len) else {
            return Err(OutOfBounds);
        };
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a compressed unsigned integer (1, 2 or 4 bytes).
    ///
    /// # Errors
    /// Returns an error for truncated data or an invalid leading byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            let value = ((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte);
            return Ok(value);
        }

        // 4-byte encoding: 11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            let value = ((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3;
            return Ok(value);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a `SerString`: a compressed length followed by UTF-8 bytes, or `0xFF` for null.
    ///
    /// # Errors
    /// Returns an error for truncated data or invalid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.data.get(self.position) == Some(&0xFF) {
            self.position += 1;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;

        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(Some(value.to_string())),
            Err(error) => Err(malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                error
            )),
        }
    }
}

/// Append `value` as a compressed unsigned integer.
///
/// # Errors
/// Returns an error if `value` exceeds the encodable range (`0x1FFF_FFFF`).
#[allow(clippy::cast_possible_truncation)]
pub fn write_compressed_uint(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => buffer.push(value as u8),
        0x80..=0x3FFF => {
            buffer.push(0x80 | (value >> 8) as u8);
            buffer.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            buffer.push(0xC0 | (value >> 24) as u8);
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
        _ => return Err(malformed_error!("Value too large to compress - {}", value)),
    }

    Ok(())
}

/// Append `value` as a `SerString`.
///
/// # Errors
/// Returns an error if the string is longer than a compressed length can describe.
pub fn write_ser_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    let Ok(length) = u32::try_from(value.len()) else {
        return Err(malformed_error!("String too long - {}", value.len()));
    };

    write_compressed_uint(buffer, length)?;
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_uint_samples() {
        // Samples from ECMA-335 II.23.2
        let cases: [(u32, &[u8]); 6] = [
            (0x03, &[0x03]),
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x2E57, &[0xAE, 0x57]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x00, 0x40, 0x00]),
        ];

        for (value, encoded) in cases {
            let mut buffer = Vec::new();
            write_compressed_uint(&mut buffer, value).unwrap();
            assert_eq!(buffer, encoded, "encoding of {value:#x}");

            let mut parser = Parser::new(encoded);
            assert_eq!(parser.read_compressed_uint().unwrap(), value);
            assert!(!parser.has_more_data());
        }

        assert!(write_compressed_uint(&mut Vec::new(), 0x2000_0000).is_err());
    }

    #[test]
    fn compressed_uint_invalid() {
        let mut parser = Parser::new(&[0xE0, 0x00, 0x00, 0x00]);
        assert!(parser.read_compressed_uint().is_err());

        let mut parser = Parser::new(&[0x80]);
        assert!(parser.read_compressed_uint().is_err());
    }

    #[test]
    fn ser_string() {
        let mut buffer = Vec::new();
        write_ser_string(&mut buffer, "Friend").unwrap();
        assert_eq!(buffer, b"\x06Friend");

        buffer.push(0xFF);
        let mut parser = Parser::new(&buffer);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("Friend"));
        assert_eq!(parser.read_ser_string().unwrap(), None);
        assert_eq!(parser.pos(), 8);

        let mut parser = Parser::new(&[0x05, b'a']);
        assert!(parser.read_ser_string().is_err());
    }
}
