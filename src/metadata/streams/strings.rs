use std::str;

use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: null-terminated UTF-8 identifiers addressed by byte offset.
///
/// Index 0 is always the empty string.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap the raw heap.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the mandatory empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Provided #Strings heap is invalid"));
        }

        Ok(Strings { data })
    }

    /// The string starting at `index`.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index, a missing terminator, or invalid UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        let Some(tail) = self.data.get(index..) else {
            return Err(OutOfBounds);
        };

        let Some(end) = tail.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated string at {}", index));
        };

        str::from_utf8(&tail[..end])
            .map_err(|error| malformed_error!("Invalid UTF-8 string at {} - {}", index, error))
    }

    /// Raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
