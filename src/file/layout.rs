//! PE header arithmetic used when writing a shaded image.
//!
//! A shaded image keeps every original section untouched and receives one additional section
//! holding the rebuilt metadata and the strong-name signature. [`PeLayout`] locates the header
//! fields that have to follow that change (section count, image size, checksum, data
//! directories) directly in the raw bytes, so the same code serves both the writer and the
//! strong-name hasher.

use crate::{
    file::io::{read_le, read_le_at, write_le},
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Index of the certificate table in the data directory array
pub const DIRECTORY_SECURITY: usize = 4;
/// Index of the CLR runtime header in the data directory array
pub const DIRECTORY_CLR: usize = 14;

/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
pub const SECTION_READONLY_DATA: u32 = 0x4000_0040;

const SECTION_HEADER_SIZE: usize = 40;

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    /// Raw, zero padded section name
    pub name: [u8; 8],
    /// Size of the section once loaded
    pub virtual_size: u32,
    /// RVA of the section once loaded
    pub virtual_address: u32,
    /// Size of the section data in the file
    pub size_of_raw_data: u32,
    /// File offset of the section data
    pub pointer_to_raw_data: u32,
    /// Section flags
    pub characteristics: u32,
}

impl SectionEntry {
    /// Section name with trailing padding removed.
    #[must_use]
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name)
            .trim_end_matches('\0')
            .to_string()
    }

    fn raw_end(&self) -> usize {
        self.pointer_to_raw_data as usize + self.size_of_raw_data as usize
    }
}

/// Header offsets of a PE image.
#[derive(Debug, Clone)]
pub struct PeLayout {
    /// Offset of the COFF file header
    pub coff_offset: usize,
    /// Offset of the optional header
    pub optional_offset: usize,
    /// True for PE32+ images
    pub is_pe32_plus: bool,
    /// Offset of the first section header
    pub section_table_offset: usize,
    /// Size of all headers as declared by the optional header
    pub size_of_headers: u32,
    /// Alignment of section data in the file
    pub file_alignment: u32,
    /// Alignment of sections once loaded
    pub section_alignment: u32,
    /// Number of data directories present
    pub directory_count: u32,
    /// The section table
    pub sections: Vec<SectionEntry>,
}

impl PeLayout {
    /// Locate the headers of the image in `data`.
    ///
    /// # Errors
    /// Returns an error if the DOS or PE signature is missing or any header is truncated.
    pub fn parse(data: &[u8]) -> Result<PeLayout> {
        if read_le::<u16>(data)? != 0x5A4D {
            return Err(malformed_error!("Missing DOS signature"));
        }

        let pe_offset = read_le::<u32>(data.get(0x3C..).ok_or(OutOfBounds)?)? as usize;
        if read_le::<u32>(data.get(pe_offset..).ok_or(OutOfBounds)?)? != 0x0000_4550 {
            return Err(malformed_error!("Missing PE signature at {:#x}", pe_offset));
        }

        let coff_offset = pe_offset + 4;
        let mut offset = coff_offset + 2;
        let number_of_sections = read_le_at::<u16>(data, &mut offset)?;
        offset = coff_offset + 16;
        let size_of_optional_header = read_le_at::<u16>(data, &mut offset)? as usize;

        let optional_offset = coff_offset + 20;
        let magic = read_le::<u16>(data.get(optional_offset..).ok_or(OutOfBounds)?)?;
        let is_pe32_plus = match magic {
            0x10B => false,
            0x20B => true,
            _ => return Err(malformed_error!("Invalid optional header magic - {:#x}", magic)),
        };

        let mut offset = optional_offset + 32;
        let section_alignment = read_le_at::<u32>(data, &mut offset)?;
        let file_alignment = read_le_at::<u32>(data, &mut offset)?;
        offset = optional_offset + 60;
        let size_of_headers = read_le_at::<u32>(data, &mut offset)?;
        offset = optional_offset + if is_pe32_plus { 108 } else { 92 };
        let directory_count = read_le_at::<u32>(data, &mut offset)?;

        if file_alignment == 0 || section_alignment == 0 {
            return Err(malformed_error!("Section or file alignment is zero"));
        }

        let section_table_offset = optional_offset + size_of_optional_header;
        let mut sections = Vec::with_capacity(number_of_sections as usize);
        for index in 0..number_of_sections as usize {
            let mut offset = section_table_offset + index * SECTION_HEADER_SIZE;
            let name: [u8; 8] = data
                .get(offset..offset + 8)
                .ok_or(OutOfBounds)?
                .try_into()
                .map_err(|_| OutOfBounds)?;
            offset += 8;

            let virtual_size = read_le_at::<u32>(data, &mut offset)?;
            let virtual_address = read_le_at::<u32>(data, &mut offset)?;
            let size_of_raw_data = read_le_at::<u32>(data, &mut offset)?;
            let pointer_to_raw_data = read_le_at::<u32>(data, &mut offset)?;
            offset += 12;
            let characteristics = read_le_at::<u32>(data, &mut offset)?;

            sections.push(SectionEntry {
                name,
                virtual_size,
                virtual_address,
                size_of_raw_data,
                pointer_to_raw_data,
                characteristics,
            });
        }

        Ok(PeLayout {
            coff_offset,
            optional_offset,
            is_pe32_plus,
            section_table_offset,
            size_of_headers,
            file_alignment,
            section_alignment,
            directory_count,
            sections,
        })
    }

    /// File offset of the optional header checksum.
    #[must_use]
    pub fn checksum_offset(&self) -> usize {
        self.optional_offset + 64
    }

    /// File offset of data directory `index`.
    ///
    /// # Errors
    /// Returns an error if the image declares fewer directories.
    pub fn directory_offset(&self, index: usize) -> Result<usize> {
        if index >= self.directory_count as usize {
            return Err(malformed_error!("Data directory {} is not present", index));
        }

        let base = self.optional_offset + if self.is_pe32_plus { 112 } else { 96 };
        Ok(base + index * 8)
    }

    /// RVA and size stored in data directory `index`.
    ///
    /// # Errors
    /// Returns an error if the directory is not present or truncated.
    pub fn directory(&self, data: &[u8], index: usize) -> Result<(u32, u32)> {
        let mut offset = self.directory_offset(index)?;
        let rva = read_le_at::<u32>(data, &mut offset)?;
        let size = read_le_at::<u32>(data, &mut offset)?;
        Ok((rva, size))
    }

    /// First byte after the section table.
    #[must_use]
    pub fn section_table_end(&self) -> usize {
        self.section_table_offset + self.sections.len() * SECTION_HEADER_SIZE
    }

    /// Translate an RVA into a file offset.
    ///
    /// # Errors
    /// Returns an error if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        for section in &self.sections {
            let size = section.virtual_size.max(section.size_of_raw_data);
            if rva >= section.virtual_address && rva - section.virtual_address < size {
                return Ok((rva - section.virtual_address) as usize
                    + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!("RVA could not be converted to offset - {}", rva))
    }

    /// Append a new section carrying `payload` to the image in `data`.
    ///
    /// Data past the last section (certificates, debug overlays) is not carried over and the
    /// certificate directory and checksum are cleared, since both become invalid once the image
    /// changes. Returns the new image and the RVA of the payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if there is no room for another section header.
    pub fn append_section(
        &self,
        data: &[u8],
        name: &[u8; 8],
        payload: &[u8],
    ) -> Result<(Vec<u8>, u32)> {
        let header_offset = self.section_table_end();
        let header_limit = self
            .sections
            .iter()
            .filter(|section| section.pointer_to_raw_data != 0)
            .map(|section| section.pointer_to_raw_data as usize)
            .min()
            .unwrap_or(self.size_of_headers as usize)
            .min(self.size_of_headers as usize);

        let header_space = data
            .get(header_offset..header_offset + SECTION_HEADER_SIZE)
            .ok_or(OutOfBounds)?;
        if header_offset + SECTION_HEADER_SIZE > header_limit
            || header_space.iter().any(|byte| *byte != 0)
        {
            return Err(NotSupported(
                "no room for an additional section header".to_string(),
            ));
        }

        let image_end = self
            .sections
            .iter()
            .map(SectionEntry::raw_end)
            .max()
            .unwrap_or(self.size_of_headers as usize);
        let mut output = data.get(..image_end).ok_or(OutOfBounds)?.to_vec();
        output.resize(align(output.len(), self.file_alignment as usize), 0);

        let virtual_end = self
            .sections
            .iter()
            .map(|section| {
                section.virtual_address as usize
                    + section.virtual_size.max(section.size_of_raw_data) as usize
            })
            .max()
            .unwrap_or(self.size_of_headers as usize);

        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| malformed_error!("Image too large - {}", value))
        };

        let virtual_address = to_u32(align(virtual_end, self.section_alignment as usize))?;
        let pointer_to_raw_data = to_u32(output.len())?;
        let virtual_size = to_u32(payload.len())?;
        let size_of_raw_data = to_u32(align(payload.len(), self.file_alignment as usize))?;

        output.extend_from_slice(payload);
        output.resize(pointer_to_raw_data as usize + size_of_raw_data as usize, 0);

        let mut header = Vec::with_capacity(SECTION_HEADER_SIZE);
        header.extend_from_slice(name);
        for value in [
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            0,
            0,
        ] {
            header.extend_from_slice(&value.to_le_bytes());
        }
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.extend_from_slice(&SECTION_READONLY_DATA.to_le_bytes());
        output[header_offset..header_offset + SECTION_HEADER_SIZE].copy_from_slice(&header);

        let section_count = u16::try_from(self.sections.len() + 1)
            .map_err(|_| NotSupported("too many sections".to_string()))?;
        write_le(&mut output, self.coff_offset + 2, section_count)?;

        let size_of_image = to_u32(align(
            virtual_address as usize + payload.len(),
            self.section_alignment as usize,
        ))?;
        write_le(&mut output, self.optional_offset + 56, size_of_image)?;

        let initialized_offset = self.optional_offset + 8;
        let initialized = read_le::<u32>(output.get(initialized_offset..).ok_or(OutOfBounds)?)?;
        write_le(
            &mut output,
            initialized_offset,
            initialized.saturating_add(size_of_raw_data),
        )?;

        write_le(&mut output, self.checksum_offset(), 0_u32)?;
        if self.directory_count as usize > DIRECTORY_SECURITY {
            let security = self.directory_offset(DIRECTORY_SECURITY)?;
            write_le(&mut output, security, 0_u64)?;
        }

        Ok((output, virtual_address))
    }
}

/// Round `value` up to a multiple of `alignment`.
#[must_use]
pub fn align(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }

    value.div_ceil(alignment) * alignment
}
