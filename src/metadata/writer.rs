//! Writing an edited, re-signed copy of an assembly.
//!
//! The original image is never modified in place. Edits are applied to decoded copies of the
//! tables and to append-only copies of `#Strings` and `#Blob`; the metadata is then rebuilt and
//! placed, together with a fresh strong-name signature slot, into a new `.shade` section. The
//! old metadata stays behind unreferenced. Finally the CLI header is pointed at the new
//! metadata and the image is signed.
//!
//! ```text
//! original sections ... | .shade: metadata root, streams, padding | signature slot |
//! ```

use std::{fs, path::Path};

use crate::{
    file::{
        io::write_le,
        layout::{align, PeLayout, DIRECTORY_CLR},
    },
    metadata::{
        assemblyview::AssemblyView,
        cor20header::{
            ComImageFlags, COR20_FLAGS_OFFSET, COR20_METADATA_OFFSET, COR20_STRONG_NAME_OFFSET,
        },
        customattributes::encode_string_argument,
        streams::{HeapBuilder, HeapKind},
        tables::{
            AssemblyFlags, AssemblyRaw, AssemblyRefRaw, CustomAttributeRaw, TableId,
            HEAP_LARGE_BLOB, HEAP_LARGE_STRINGS,
        },
    },
    strongname::{sign_image, StrongNameKey},
    Error::OutOfBounds,
    Result,
};

/// Name of the section receiving the rebuilt metadata
pub const SHADE_SECTION_NAME: [u8; 8] = *b".shade\0\0";

/// Repoint one `AssemblyRef` row at a renamed assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEdit {
    /// 1-based row in the `AssemblyRef` table
    pub row: u32,
    /// New simple name
    pub name: String,
    /// New public key token
    pub public_key_token: [u8; 8],
}

/// Replace the value of one `InternalsVisibleToAttribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEdit {
    /// 1-based row in the `CustomAttribute` table
    pub row: u32,
    /// New attribute argument
    pub value: String,
}

/// All changes applied to one assembly.
///
/// The assembly always receives the public key of the signing key; `name` additionally renames
/// it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyEdits {
    /// New simple name of the assembly, `None` keeps the name
    pub name: Option<String>,
    /// References to repoint
    pub references: Vec<ReferenceEdit>,
    /// Friend declarations to replace
    pub attributes: Vec<AttributeEdit>,
}

impl AssemblyView {
    /// Apply `edits` and produce a new image signed with `key`.
    ///
    /// # Errors
    /// Returns an error if an edited row does not exist, the metadata can not be re-encoded, the
    /// image has no room for another section header ([`crate::Error::NotSupported`]), or signing
    /// fails.
    pub fn write(&self, edits: &AssemblyEdits, key: &StrongNameKey) -> Result<Vec<u8>> {
        let metadata = self.build_metadata(edits, key)?;

        let metadata_len = align(metadata.len(), 4);
        let signature_size = key.signature_size();
        let mut payload = metadata;
        payload.resize(metadata_len + signature_size, 0);

        let layout = PeLayout::parse(self.data())?;
        let (mut image, rva) = layout.append_section(self.data(), &SHADE_SECTION_NAME, &payload)?;

        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| malformed_error!("Value too large - {}", value))
        };

        let layout = PeLayout::parse(&image)?;
        let (clr_rva, _) = layout.directory(&image, DIRECTORY_CLR)?;
        let cor20 = layout.rva_to_offset(clr_rva)?;

        write_le(&mut image, cor20 + COR20_METADATA_OFFSET, rva)?;
        write_le(&mut image, cor20 + COR20_METADATA_OFFSET + 4, to_u32(metadata_len)?)?;

        let flags = self.cor20header().flags - ComImageFlags::STRONG_NAME_SIGNED;
        write_le(&mut image, cor20 + COR20_FLAGS_OFFSET, flags.bits())?;

        write_le(
            &mut image,
            cor20 + COR20_STRONG_NAME_OFFSET,
            rva + to_u32(metadata_len)?,
        )?;
        write_le(
            &mut image,
            cor20 + COR20_STRONG_NAME_OFFSET + 4,
            to_u32(signature_size)?,
        )?;

        sign_image(&mut image, key)?;
        Ok(image)
    }

    /// Apply `edits`, sign with `key` and write the image to `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    /// Returns an error if writing the image fails, see [`AssemblyView::write`].
    pub fn write_to_file(
        &self,
        path: &Path,
        edits: &AssemblyEdits,
        key: &StrongNameKey,
    ) -> Result<()> {
        let image = self.write(edits, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, image)?;
        Ok(())
    }

    fn build_metadata(&self, edits: &AssemblyEdits, key: &StrongNameKey) -> Result<Vec<u8>> {
        let mut tables = self.tables().clone();
        let mut strings = HeapBuilder::new(HeapKind::Strings, self.strings().data());
        let mut blobs = HeapBuilder::new(
            HeapKind::Blob,
            self.blobs().map(|blobs| blobs.data()).unwrap_or_default(),
        );

        let Some(row) = tables
            .table_mut(TableId::Assembly)
            .and_then(|rows| rows.row_mut(0))
        else {
            return Err(malformed_error!("Image has no Assembly row"));
        };

        let mut assembly = AssemblyRaw::read(row)?;
        if let Some(name) = &edits.name {
            assembly.name = strings.add_string(name)?;
        }
        assembly.public_key = blobs.add(key.public_key_blob())?;
        assembly.flags |= AssemblyFlags::PUBLIC_KEY;
        assembly.write(row)?;

        for edit in &edits.references {
            let Some(row) = tables
                .table_mut(TableId::AssemblyRef)
                .and_then(|rows| rows.row_mut((edit.row as usize).wrapping_sub(1)))
            else {
                return Err(OutOfBounds);
            };

            let mut reference = AssemblyRefRaw::read(row)?;
            reference.name = strings.add_string(&edit.name)?;
            reference.public_key_or_token = blobs.add(&edit.public_key_token)?;
            reference.flags.remove(AssemblyFlags::PUBLIC_KEY);
            reference.write(row)?;
        }

        for edit in &edits.attributes {
            let Some(row) = tables
                .table_mut(TableId::CustomAttribute)
                .and_then(|rows| rows.row_mut((edit.row as usize).wrapping_sub(1)))
            else {
                return Err(OutOfBounds);
            };

            let value = row
                .get_mut(CustomAttributeRaw::VALUE_COLUMN)
                .ok_or(OutOfBounds)?;
            *value = blobs.add(&encode_string_argument(&edit.value)?)?;
        }

        let mut heap_sizes = tables.heap_sizes;
        if strings.is_large() {
            heap_sizes |= HEAP_LARGE_STRINGS;
        }
        if blobs.is_large() {
            heap_sizes |= HEAP_LARGE_BLOB;
        }

        let tables_data = tables.write(heap_sizes)?;
        let strings_data = strings.finish();
        let blobs_data = blobs.finish();

        let root = self.metadata_root();
        let mut streams: Vec<(&str, &[u8])> = Vec::with_capacity(root.stream_headers.len() + 1);
        for header in &root.stream_headers {
            let data: &[u8] = match header.name.as_str() {
                "#~" | "#-" => &tables_data,
                "#Strings" => &strings_data,
                "#Blob" => &blobs_data,
                name => self.stream_data(name).ok_or(OutOfBounds)?,
            };
            streams.push((header.name.as_str(), data));
        }

        if root.stream("#Blob").is_none() {
            streams.push(("#Blob", &blobs_data));
        }

        root.write(&streams)
    }
}
