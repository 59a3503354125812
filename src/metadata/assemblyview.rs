//! Read access to the metadata of a single managed image.
//!
//! [`AssemblyView`] owns the loaded [`File`] and the metadata structures parsed from it, and
//! answers the three questions the shading engine asks of every binary: who is it, what does it
//! reference, and whom does it trust with its internals.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotshade::metadata::assemblyview::AssemblyView;
//! use std::path::Path;
//!
//! let view = AssemblyView::from_file(Path::new("Newtonsoft.Json.dll"))?;
//! println!("{}", view.identity()?);
//! for reference in view.references()? {
//!     println!("  -> {}", reference);
//! }
//! # Ok::<(), dotshade::Error>(())
//! ```

use std::{path::Path, sync::Arc};

use ouroboros::self_referencing;

use crate::{
    file::File,
    metadata::{
        cor20header::Cor20Header,
        customattributes::{
            parse_string_argument, INTERNALS_VISIBLE_TO_NAME, INTERNALS_VISIBLE_TO_NAMESPACE,
        },
        identity::{AssemblyIdentity, AssemblyVersion, Identity},
        root::Root,
        streams::{Blob, Strings},
        tables::{
            AssemblyFlags, AssemblyRaw, AssemblyRefRaw, CustomAttributeRaw, MemberRefRaw,
            TableId, TablesHeader, TypeRefRaw,
        },
    },
    Error::OutOfBounds,
    Result,
};

/// An `InternalsVisibleToAttribute` declared by an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalsVisibleTo {
    /// 1-based row of the attribute in the `CustomAttribute` table
    pub row: u32,
    /// The declared friend assembly name
    pub value: String,
}

/// Parsed metadata borrowed from the image bytes.
pub struct AssemblyViewData<'a> {
    /// Raw bytes of the whole image
    pub data: &'a [u8],
    /// The CLI header
    pub cor20header: Cor20Header,
    /// File offset of the metadata root
    pub metadata_offset: usize,
    /// The metadata root
    pub metadata_root: Root,
    /// All metadata tables
    pub tables: TablesHeader,
    /// The `#Strings` heap
    pub strings: Strings<'a>,
    /// The `#Blob` heap, absent in images without blob values
    pub blobs: Option<Blob<'a>>,
}

impl<'a> AssemblyViewData<'a> {
    /// Parse the metadata of the image `file`, whose bytes are `data`.
    ///
    /// # Errors
    /// Returns an error if the CLI header, the metadata root or a required stream is invalid.
    pub fn from_file(file: &File, data: &'a [u8]) -> Result<Self> {
        let (clr_rva, clr_size) = file.clr();
        let clr_offset = file.rva_to_offset(clr_rva)?;
        let clr_end = clr_offset
            .checked_add(clr_size as usize)
            .ok_or(OutOfBounds)?;
        let cor20header = Cor20Header::read(data.get(clr_offset..clr_end).ok_or(OutOfBounds)?)?;

        let metadata_offset = file.rva_to_offset(cor20header.meta_data_rva)?;
        let metadata_end = metadata_offset
            .checked_add(cor20header.meta_data_size as usize)
            .ok_or(OutOfBounds)?;
        let metadata = data
            .get(metadata_offset..metadata_end)
            .ok_or(OutOfBounds)?;
        let metadata_root = Root::read(metadata)?;

        let mut tables = None;
        let mut strings = None;
        let mut blobs = None;
        for stream in &metadata_root.stream_headers {
            let start = stream.offset as usize;
            let stream_data = &metadata[start..start + stream.size as usize];

            match stream.name.as_str() {
                "#~" | "#-" => tables = Some(TablesHeader::read(stream_data)?),
                "#Strings" => strings = Some(Strings::from(stream_data)?),
                "#Blob" => blobs = Some(Blob::from(stream_data)?),
                _ => {}
            }
        }

        let Some(tables) = tables else {
            return Err(malformed_error!("Metadata has no tables stream"));
        };
        let Some(strings) = strings else {
            return Err(malformed_error!("Metadata has no #Strings heap"));
        };

        Ok(AssemblyViewData {
            data,
            cor20header,
            metadata_offset,
            metadata_root,
            tables,
            strings,
            blobs,
        })
    }
}

/// A loaded assembly with its parsed metadata.
#[self_referencing]
pub struct AssemblyView {
    file: Arc<File>,
    #[borrows(file)]
    #[not_covariant]
    data: AssemblyViewData<'this>,
}

impl AssemblyView {
    /// Load and parse the assembly at `file`.
    ///
    /// # Errors
    /// Returns an error if the file can not be read or is not a managed image.
    pub fn from_file(file: &Path) -> Result<Self> {
        let input = Arc::new(File::from_file(file)?);
        Self::load(input)
    }

    /// Parse an assembly held in memory.
    ///
    /// # Errors
    /// Returns an error if the data is not a managed image.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        let input = Arc::new(File::from_mem(data)?);
        Self::load(input)
    }

    fn load(file: Arc<File>) -> Result<Self> {
        AssemblyView::try_new(file, |file| AssemblyViewData::from_file(file, file.data()))
    }

    /// The CLI header.
    #[must_use]
    pub fn cor20header(&self) -> &Cor20Header {
        self.with_data(|data| &data.cor20header)
    }

    /// The metadata root.
    #[must_use]
    pub fn metadata_root(&self) -> &Root {
        self.with_data(|data| &data.metadata_root)
    }

    /// All metadata tables.
    #[must_use]
    pub fn tables(&self) -> &TablesHeader {
        self.with_data(|data| &data.tables)
    }

    /// The `#Strings` heap.
    #[must_use]
    pub fn strings(&self) -> &Strings {
        self.with_data(|data| &data.strings)
    }

    /// The `#Blob` heap.
    #[must_use]
    pub fn blobs(&self) -> Option<&Blob> {
        self.with_data(|data| data.blobs.as_ref())
    }

    /// The underlying image.
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        self.borrow_file()
    }

    /// Raw bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data)
    }

    /// Raw content of the stream called `name`.
    #[must_use]
    pub fn stream_data(&self, name: &str) -> Option<&[u8]> {
        self.with_data(|data| {
            let stream = data.metadata_root.stream(name)?;
            let start = data.metadata_offset + stream.offset as usize;
            data.data.get(start..start + stream.size as usize)
        })
    }

    fn string(&self, index: u32) -> Result<&str> {
        self.strings().get(index as usize)
    }

    fn blob(&self, index: u32) -> Result<&[u8]> {
        match self.blobs() {
            Some(blobs) => blobs.get(index as usize),
            None if index == 0 => Ok(&[]),
            None => Err(OutOfBounds),
        }
    }

    fn culture(&self, index: u32) -> Result<Option<String>> {
        let culture = self.string(index)?;
        Ok((!culture.is_empty()).then(|| culture.to_string()))
    }

    /// The identity declared by the `Assembly` table.
    ///
    /// # Errors
    /// Returns an error if the image is a module without an `Assembly` row or the row is invalid.
    pub fn identity(&self) -> Result<AssemblyIdentity> {
        let Some(row) = self
            .tables()
            .table(TableId::Assembly)
            .and_then(|rows| rows.rid(1))
        else {
            return Err(malformed_error!("Image has no Assembly row"));
        };

        let assembly = AssemblyRaw::read(row)?;
        let public_key = self.blob(assembly.public_key)?;

        Ok(AssemblyIdentity::new(
            self.string(assembly.name)?,
            AssemblyVersion::new(
                assembly.major_version,
                assembly.minor_version,
                assembly.build_number,
                assembly.revision_number,
            ),
            self.culture(assembly.culture)?,
            (!public_key.is_empty()).then(|| Identity::PubKey(public_key.to_vec())),
        ))
    }

    /// Identity of the reference in `AssemblyRef` row `rid`.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is invalid.
    pub fn reference(&self, rid: u32) -> Result<AssemblyIdentity> {
        let Some(row) = self
            .tables()
            .table(TableId::AssemblyRef)
            .and_then(|rows| rows.rid(rid))
        else {
            return Err(OutOfBounds);
        };

        let reference = AssemblyRefRaw::read(row)?;
        let key_or_token = self.blob(reference.public_key_or_token)?;
        let strong_name = if key_or_token.is_empty() {
            None
        } else {
            Some(Identity::from(
                key_or_token,
                reference.flags.contains(AssemblyFlags::PUBLIC_KEY),
            )?)
        };

        Ok(AssemblyIdentity::new(
            self.string(reference.name)?,
            AssemblyVersion::new(
                reference.major_version,
                reference.minor_version,
                reference.build_number,
                reference.revision_number,
            ),
            self.culture(reference.culture)?,
            strong_name,
        ))
    }

    /// All assembly references, in `AssemblyRef` row order.
    ///
    /// # Errors
    /// Returns an error if any row is invalid.
    pub fn references(&self) -> Result<Vec<AssemblyIdentity>> {
        (1..=self.tables().rows(TableId::AssemblyRef))
            .map(|rid| self.reference(rid))
            .collect()
    }

    /// All `InternalsVisibleToAttribute` declarations.
    ///
    /// Attributes are recognized by their constructor: a `MemberRef` on the `TypeRef`
    /// `System.Runtime.CompilerServices.InternalsVisibleToAttribute`.
    ///
    /// # Errors
    /// Returns an error if a referenced row or heap entry is invalid.
    pub fn internals_visible_to(&self) -> Result<Vec<InternalsVisibleTo>> {
        let tables = self.tables();
        let Some(attributes) = tables.table(TableId::CustomAttribute) else {
            return Ok(Vec::new());
        };

        let mut declarations = Vec::new();
        for (index, row) in attributes.iter().enumerate() {
            let attribute = CustomAttributeRaw::read(row)?;
            if attribute.constructor.tag != TableId::MemberRef
                || !self.is_internals_visible_to_ctor(attribute.constructor.row)?
            {
                continue;
            }

            let Some(value) = parse_string_argument(self.blob(attribute.value)?)? else {
                continue;
            };

            declarations.push(InternalsVisibleTo {
                row: u32::try_from(index + 1).map_err(|_| OutOfBounds)?,
                value,
            });
        }

        Ok(declarations)
    }

    fn is_internals_visible_to_ctor(&self, member_ref: u32) -> Result<bool> {
        let tables = self.tables();
        let Some(row) = tables
            .table(TableId::MemberRef)
            .and_then(|rows| rows.rid(member_ref))
        else {
            return Err(OutOfBounds);
        };

        let member = MemberRefRaw::read(row)?;
        if member.class.tag != TableId::TypeRef {
            return Ok(false);
        }

        let Some(row) = tables
            .table(TableId::TypeRef)
            .and_then(|rows| rows.rid(member.class.row))
        else {
            return Err(OutOfBounds);
        };

        let type_ref = TypeRefRaw::read(row)?;
        Ok(self.string(type_ref.type_name)? == INTERNALS_VISIBLE_TO_NAME
            && self.string(type_ref.type_namespace)? == INTERNALS_VISIBLE_TO_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ImageBuilder;

    #[test]
    fn read_identity() {
        let image = ImageBuilder::new("Sample.Library")
            .version(2, 1, 0, 0)
            .build();
        let view = AssemblyView::from_mem(image).unwrap();

        let identity = view.identity().unwrap();
        assert_eq!(identity.name, "Sample.Library");
        assert_eq!(identity.version, AssemblyVersion::new(2, 1, 0, 0));
        assert!(identity.culture.is_none());
        assert!(identity.strong_name.is_none());
        assert_eq!(view.metadata_root().version, "v4.0.30319");
        assert!(view.stream_data("#GUID").is_some());
    }

    #[test]
    fn read_satellite_identity() {
        let image = ImageBuilder::new("Sample.Library.resources")
            .culture("de")
            .build();
        let view = AssemblyView::from_mem(image).unwrap();

        assert_eq!(view.identity().unwrap().culture.as_deref(), Some("de"));
    }

    #[test]
    fn read_references() {
        let token = [0xb0, 0x3f, 0x5f, 0x7f, 0x11, 0xd5, 0x0a, 0x3a];
        let image = ImageBuilder::new("Consumer")
            .reference("System.Runtime", (6, 0, 0, 0), Some(token))
            .reference("Dependency", (1, 2, 0, 0), None)
            .build();
        let view = AssemblyView::from_mem(image).unwrap();

        let references = view.references().unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(
            references[0].display_name(),
            "System.Runtime, Version=6.0.0.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a"
        );
        assert_eq!(references[1].name, "Dependency");
        assert!(references[1].strong_name.is_none());
        assert!(view.reference(3).is_err());
    }

    #[test]
    fn read_internals_visible_to() {
        let image = ImageBuilder::new("Library")
            .internals_visible_to("Library.Tests")
            .internals_visible_to("Library.Benchmarks, PublicKey=0024")
            .build();
        let view = AssemblyView::from_mem(image).unwrap();

        let declarations = view.internals_visible_to().unwrap();
        assert_eq!(
            declarations,
            vec![
                InternalsVisibleTo {
                    row: 1,
                    value: "Library.Tests".to_string()
                },
                InternalsVisibleTo {
                    row: 2,
                    value: "Library.Benchmarks, PublicKey=0024".to_string()
                },
            ]
        );
    }

    #[test]
    fn no_declarations() {
        let view = AssemblyView::from_mem(ImageBuilder::new("Plain").build()).unwrap();
        assert!(view.internals_visible_to().unwrap().is_empty());
        assert!(view.references().unwrap().is_empty());
    }
}
