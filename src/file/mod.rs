//! PE image access for managed assemblies.
//!
//! [`File`] owns the raw bytes of an image (memory-mapped from disk or held in memory) together
//! with the [`goblin`] view parsed from them. Only images that carry a CLR runtime header are
//! accepted, since nothing else can be shaded.
//!
//! [`layout`] contains the header arithmetic needed to append a section to an existing image
//! and to patch header fields in place.

pub mod io;
pub mod layout;
pub mod parser;

pub use parser::Parser;

use std::{fs, path::Path};

use goblin::pe::{section_table::SectionTable, PE};
use memmap2::Mmap;
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, FileError, GoblinErr},
    Result,
};

/// Storage behind a loaded image.
pub enum Backend {
    /// A read-only mapping of a file on disk
    Mapped(Mmap),
    /// An owned buffer
    Owned(Vec<u8>),
}

impl Backend {
    fn data(&self) -> &[u8] {
        match self {
            Backend::Mapped(mmap) => mmap.as_ref(),
            Backend::Owned(data) => data.as_slice(),
        }
    }
}

/// A parsed managed PE image.
#[self_referencing]
pub struct File {
    data: Backend,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Map and parse the image at `path`.
    ///
    /// # Errors
    /// Returns an error if the file can not be read, is empty, is not a PE image, or carries
    /// no CLR runtime header.
    pub fn from_file(path: &Path) -> Result<File> {
        let file = fs::File::open(path).map_err(FileError)?;
        // The mapping is read-only and the file handle is not shared with writers in this process
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;
        Self::load(Backend::Mapped(mmap))
    }

    /// Parse an image held in memory.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty, is not a PE image, or carries no CLR runtime
    /// header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Backend::Owned(data))
    }

    fn load(data: Backend) -> Result<File> {
        if data.data().is_empty() {
            return Err(Empty);
        }

        File::try_new(data, |data| match PE::parse(data.data()) {
            Ok(pe) => match pe.header.optional_header {
                Some(optional_header) => {
                    match optional_header.data_directories.get_clr_runtime_header() {
                        Some(clr) if clr.virtual_address != 0 && clr.size != 0 => Ok(pe),
                        _ => Err(malformed_error!(
                            "File does not have a CLR runtime header directory"
                        )),
                    }
                }
                None => Err(malformed_error!("File does not have an OptionalHeader")),
            },
            Err(error) => Err(GoblinErr(error)),
        })
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns true if the image has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Bounds-checked slice of the raw image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        let Some(end) = offset.checked_add(len) else {
            return Err(crate::Error::OutOfBounds);
        };
        data.get(offset..end).ok_or(crate::Error::OutOfBounds)
    }

    /// RVA and size of the CLR runtime header.
    #[must_use]
    pub fn clr(&self) -> (u32, u32) {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .and_then(|optional_header| {
                    optional_header
                        .data_directories
                        .get_clr_runtime_header()
                        .map(|clr| (clr.virtual_address, clr.size))
                })
                .unwrap_or((0, 0))
        })
    }

    /// The section table of the image.
    #[must_use]
    pub fn sections(&self) -> Vec<SectionTable> {
        self.with_pe(|pe| pe.sections.clone())
    }

    /// Translate a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns an error if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.with_pe(|pe| {
            for section in &pe.sections {
                let Some(section_max) = section
                    .virtual_address
                    .checked_add(section.virtual_size.max(section.size_of_raw_data))
                else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        section.virtual_size
                    ));
                };

                if section.virtual_address <= rva && section_max > rva {
                    return Ok((rva - section.virtual_address) as usize
                        + section.pointer_to_raw_data as usize);
                }
            }

            Err(malformed_error!(
                "RVA could not be converted to offset - {}",
                rva
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ImageBuilder;

    #[test]
    fn load_synthetic_image() {
        let image = ImageBuilder::new("Sample").build();
        let file = File::from_mem(image).unwrap();

        let (clr_rva, clr_size) = file.clr();
        assert_eq!(clr_size, 72);
        assert_eq!(file.sections().len(), 1);

        let offset = file.rva_to_offset(clr_rva).unwrap();
        assert_eq!(file.data_slice(offset, 4).unwrap(), &[72, 0, 0, 0]);
        assert!(file.rva_to_offset(0x10).is_err());
        assert!(file.data_slice(file.len() - 2, 4).is_err());
    }

    #[test]
    fn reject_invalid_input() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
        assert!(File::from_mem(vec![0xCC; 512]).is_err());
        assert!(File::from_file(Path::new("/nonexistent/path/to/file.dll")).is_err());
    }
}
