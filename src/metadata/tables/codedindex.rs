//! Coded indices (ECMA-335 II.24.2.6).
//!
//! A coded index stores a table tag in its low bits and a row number in the remaining bits,
//! which lets one column reference rows of several tables.

use strum::{EnumCount, EnumIter};

use crate::{metadata::tables::TableId, Error::OutOfBounds, Result};

/// All coded index kinds used by the metadata tables.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Tables addressed by this coded index, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are reserved; only MethodDef (2) and MemberRef (3) are in use.
            // The reserved slots are listed so the tag width comes out as 3 bits.
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits used for the table tag.
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len();
        // Safe: at most 22 tables, so the result is at most 5
        #[allow(clippy::cast_possible_truncation)]
        let bits = (usize::BITS - (count - 1).leading_zeros()) as u8;
        bits
    }
}

/// A decoded coded index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The referenced table
    pub tag: TableId,
    /// The 1-based row in `tag`, 0 for a null reference
    pub row: u32,
}

impl CodedIndex {
    /// Split a raw column value into table and row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a tag outside the coded index's table list.
    pub fn decode(value: u32, kind: CodedIndexType) -> Result<Self> {
        let tables = kind.tables();
        let tag_bits = kind.tag_bits();
        let tag = (value & ((1 << tag_bits) - 1)) as usize;

        match tables.get(tag) {
            Some(table) => Ok(CodedIndex {
                tag: *table,
                row: value >> tag_bits,
            }),
            None => Err(OutOfBounds),
        }
    }

    /// Tag of `table` within `kind`, used when encoding a coded index.
    #[must_use]
    pub fn tag_of(kind: CodedIndexType, table: TableId) -> Option<u32> {
        match (kind, table) {
            (CodedIndexType::CustomAttributeType, TableId::MethodDef) => Some(2),
            (CodedIndexType::CustomAttributeType, TableId::MemberRef) => Some(3),
            (CodedIndexType::CustomAttributeType, _) => None,
            _ => kind
                .tables()
                .iter()
                .position(|candidate| *candidate == table)
                .and_then(|position| u32::try_from(position).ok()),
        }
    }

    /// Encode this index for a column of type `kind`.
    ///
    /// # Errors
    /// Returns an error if `kind` can not reference the table of this index.
    pub fn encode(&self, kind: CodedIndexType) -> Result<u32> {
        let Some(tag) = Self::tag_of(kind, self.tag) else {
            return Err(malformed_error!("{:?} can not reference {:?}", kind, self.tag));
        };

        Ok((self.row << kind.tag_bits()) | tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_widths() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::MethodDefOrRef.tag_bits(), 1);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
    }

    #[test]
    fn decode_custom_attribute_type() {
        // MemberRef row 5: (5 << 3) | 3
        let index = CodedIndex::decode(0x2B, CodedIndexType::CustomAttributeType).unwrap();
        assert_eq!(index.tag, TableId::MemberRef);
        assert_eq!(index.row, 5);

        let index = CodedIndex::decode(0x0A, CodedIndexType::CustomAttributeType).unwrap();
        assert_eq!(index.tag, TableId::MethodDef);
        assert_eq!(index.row, 1);

        assert!(CodedIndex::decode(0x07, CodedIndexType::CustomAttributeType).is_err());
        assert_eq!(
            CodedIndex::tag_of(CodedIndexType::CustomAttributeType, TableId::MemberRef),
            Some(3)
        );
        assert_eq!(
            CodedIndex { tag: TableId::MemberRef, row: 5 }
                .encode(CodedIndexType::CustomAttributeType)
                .unwrap(),
            0x2B
        );
    }

    #[test]
    fn decode_member_ref_parent() {
        // TypeRef row 2: (2 << 3) | 1
        let index = CodedIndex::decode(0x11, CodedIndexType::MemberRefParent).unwrap();
        assert_eq!(index, CodedIndex { tag: TableId::TypeRef, row: 2 });
    }
}
