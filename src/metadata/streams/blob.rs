use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The `#Blob` heap: length-prefixed binary values addressed by byte offset.
///
/// Every entry starts with a compressed length (ECMA-335 II.24.2.4). Index 0 is the empty blob.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap the raw heap.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the mandatory empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Provided #Blob heap is invalid"));
        }

        Ok(Blob { data })
    }

    /// The blob starting at `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns an error if the index or the declared length exceed the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        let Some(tail) = self.data.get(index..) else {
            return Err(OutOfBounds);
        };

        let mut parser = Parser::new(tail);
        let length = parser.read_compressed_uint()? as usize;
        parser.read_bytes(length)
    }

    /// Raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x01, 0x02, 0x03,
            0x08, 0xB0, 0x3F, 0x5F, 0x7F, 0x11, 0xD5, 0x0A, 0x3A,
            0x05, 0xAA,
        ];
        let blob = Blob::from(&data).unwrap();

        assert_eq!(blob.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blob.get(1).unwrap(), &[1, 2, 3]);
        assert_eq!(
            blob.get(5).unwrap(),
            &[0xB0, 0x3F, 0x5F, 0x7F, 0x11, 0xD5, 0x0A, 0x3A]
        );
        assert!(blob.get(14).is_err());
        assert!(blob.get(16).is_err());
    }
}
