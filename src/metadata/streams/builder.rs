//! Append-only builders for the `#Strings` and `#Blob` heaps.
//!
//! Existing heap content is kept byte for byte so every index already stored in the tables
//! stays valid; new entries are appended behind it. Values appended more than once are stored
//! once.

use std::collections::HashMap;

use crate::{file::parser::write_compressed_uint, Result};

/// Heaps at or above this size need 4-byte indices.
pub const LARGE_HEAP_THRESHOLD: usize = 0x1_0000;

/// Which encoding entries of a heap use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    /// Null-terminated UTF-8 (`#Strings`)
    Strings,
    /// Compressed length prefix (`#Blob`)
    Blob,
}

/// An append-only heap.
#[derive(Debug, Clone)]
pub struct HeapBuilder {
    kind: HeapKind,
    data: Vec<u8>,
    appended: HashMap<Vec<u8>, u32>,
}

impl HeapBuilder {
    /// Start from the content of an existing heap.
    ///
    /// Alignment padding is kept, since a zero byte of it may be referenced as an empty entry.
    #[must_use]
    pub fn new(kind: HeapKind, existing: &[u8]) -> Self {
        let mut data = existing.to_vec();
        if data.is_empty() {
            data.push(0);
        }

        HeapBuilder {
            kind,
            data,
            appended: HashMap::new(),
        }
    }

    /// Append a string and return its index.
    ///
    /// # Errors
    /// Returns an error if the heap would exceed the 32-bit index range.
    pub fn add_string(&mut self, value: &str) -> Result<u32> {
        self.add(value.as_bytes())
    }

    /// Append a value and return its index.
    ///
    /// # Errors
    /// Returns an error if the heap would exceed the 32-bit index range or a blob is too long
    /// for a compressed length.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if let Some(index) = self.appended.get(value) {
            return Ok(*index);
        }

        let Ok(index) = u32::try_from(self.data.len()) else {
            return Err(malformed_error!("Heap exceeds the addressable size"));
        };

        match self.kind {
            HeapKind::Strings => {
                self.data.extend_from_slice(value);
                self.data.push(0);
            }
            HeapKind::Blob => {
                let Ok(length) = u32::try_from(value.len()) else {
                    return Err(malformed_error!("Blob too large - {}", value.len()));
                };
                write_compressed_uint(&mut self.data, length)?;
                self.data.extend_from_slice(value);
            }
        }

        self.appended.insert(value.to_vec(), index);
        Ok(index)
    }

    /// True if indices into the heap need 4 bytes.
    #[must_use]
    pub fn is_large(&self) -> bool {
        self.data.len() >= LARGE_HEAP_THRESHOLD
    }

    /// The heap content padded to a 4-byte boundary.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::streams::{Blob, Strings};

    #[test]
    fn strings_append() {
        let mut builder = HeapBuilder::new(HeapKind::Strings, b"\0Foo\0\0\0\0");
        let index = builder.add_string("Foo.1.0.0.0").unwrap();
        assert_eq!(index, 8);
        assert_eq!(builder.add_string("Foo.1.0.0.0").unwrap(), 8);
        assert!(!builder.is_large());

        let heap = builder.finish();
        assert_eq!(heap.len() % 4, 0);
        let strings = Strings::from(&heap).unwrap();
        assert_eq!(strings.get(1).unwrap(), "Foo");
        assert_eq!(strings.get(8).unwrap(), "Foo.1.0.0.0");
    }

    #[test]
    fn blob_append() {
        let mut builder = HeapBuilder::new(HeapKind::Blob, &[0x00, 0x02, 0xAA, 0xBB]);
        let token = [0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89];
        let index = builder.add(&token).unwrap();
        assert_eq!(index, 4);

        let long = vec![0x11; 200];
        let long_index = builder.add(&long).unwrap();
        assert_eq!(long_index, 13);

        let heap = builder.finish();
        let blob = Blob::from(&heap).unwrap();
        assert_eq!(blob.get(1).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(blob.get(4).unwrap(), &token);
        assert_eq!(blob.get(13).unwrap(), long.as_slice());
    }

    #[test]
    fn large_threshold() {
        let mut builder = HeapBuilder::new(HeapKind::Strings, &[0; 1]);
        builder.add_string(&"x".repeat(LARGE_HEAP_THRESHOLD - 3)).unwrap();
        assert!(!builder.is_large());
        builder.add_string("y").unwrap();
        assert!(builder.is_large());
    }
}
