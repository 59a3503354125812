use crate::{
    file::io::{push_le, read_le},
    Error::OutOfBounds,
    Result,
};

/// Stream names a metadata root may declare
pub const STREAM_NAMES: [&str; 6] = ["#~", "#-", "#Strings", "#US", "#Blob", "#GUID"];

/// A stream header of the metadata root (ECMA-335 II.24.2.2).
///
/// The name is a null-terminated ASCII string of at most 32 bytes, padded to a multiple of 4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header from the start of `data`.
    ///
    /// # Errors
    /// Returns an error if the data is too short or the stream name is unknown.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(end) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated stream header name"));
        };

        let name: String = name_bytes[..end].iter().map(|byte| char::from(*byte)).collect();
        if !STREAM_NAMES.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Bytes this header occupies in the metadata root.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + ((self.name.len() + 1 + 3) & !3)
    }

    /// Append the encoded header to `buffer`.
    pub fn write(&self, buffer: &mut Vec<u8>) {
        push_le::<u32>(buffer, self.offset);
        push_le::<u32>(buffer, self.size);

        let start = buffer.len();
        buffer.extend_from_slice(self.name.as_bytes());
        buffer.push(0);
        while (buffer.len() - start) % 4 != 0 {
            buffer.push(0);
        }
    }
}
