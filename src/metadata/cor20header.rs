//! CLR 2.0 (Cor20) runtime header of a managed image.
//!
//! The header lives at the RVA of the `IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR` data directory and
//! locates the metadata root and the strong-name signature slot. The writer patches it in place,
//! so the byte offsets of the patched fields are exported as constants.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Size of the CLI header in bytes
pub const COR20_HEADER_SIZE: usize = 72;
/// Offset of the metadata data directory
pub const COR20_METADATA_OFFSET: usize = 8;
/// Offset of the runtime flags
pub const COR20_FLAGS_OFFSET: usize = 16;
/// Offset of the strong-name signature data directory
pub const COR20_STRONG_NAME_OFFSET: usize = 32;

bitflags! {
    /// Runtime flags of the CLI header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ComImageFlags: u32 {
        /// Image contains only IL
        const IL_ONLY = 0x0000_0001;
        /// Image requires a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// Image carries a strong-name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Entry point is a native function
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug data is tracked
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Image prefers a 32-bit process
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

/// The CLI header of a managed image.
#[derive(Clone, Debug, PartialEq)]
pub struct Cor20Header {
    /// Size of the header, always 72
    pub cb: u32,
    /// Major runtime version
    pub major_runtime_version: u16,
    /// Minor runtime version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Runtime flags
    pub flags: ComImageFlags,
    /// Entry point token or RVA
    pub entry_point_token: u32,
    /// RVA of managed resources
    pub resource_rva: u32,
    /// Size of managed resources
    pub resource_size: u32,
    /// RVA of the strong-name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong-name signature
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Parse the CLI header from `data`.
    ///
    /// # Errors
    /// Returns an error if the data is too short, the size field is not 72, or the metadata
    /// directory is empty.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory cannot be empty"));
        }

        let flags = ComImageFlags::from_bits_retain(parser.read_le::<u32>()?);
        let entry_point_token = parser.read_le::<u32>()?;
        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;

        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;
        if (strong_name_signature_rva == 0) != (strong_name_signature_size == 0) {
            return Err(malformed_error!("Strong name values are invalid"));
        }

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
        })
    }
}
