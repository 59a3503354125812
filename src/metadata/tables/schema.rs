//! Column layout of every metadata table (ECMA-335 II.22).
//!
//! Rows are handled generically as one `u32` per column. The layout below is enough to decode
//! and re-encode any table, which is what allows the writer to widen heap indices without
//! understanding the meaning of each table.

use crate::metadata::tables::{CodedIndexType, TableId, TableInfo};

/// The storage kind of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    /// A 2-byte constant
    Fixed2,
    /// A 4-byte constant
    Fixed4,
    /// An index into the `#Strings` heap
    String,
    /// An index into the `#GUID` heap
    Guid,
    /// An index into the `#Blob` heap
    Blob,
    /// A simple index into another table
    Table(TableId),
    /// A coded index
    Coded(CodedIndexType),
}

impl Column {
    /// Size of the column in bytes under the given index widths.
    #[must_use]
    pub fn size(&self, info: &TableInfo) -> u8 {
        match self {
            Column::Fixed2 => 2,
            Column::Fixed4 => 4,
            Column::String => info.str_bytes(),
            Column::Guid => info.guid_bytes(),
            Column::Blob => info.blob_bytes(),
            Column::Table(table) => info.table_index_bytes(*table),
            Column::Coded(kind) => info.coded_index_bytes(*kind),
        }
    }
}

use Column::{Blob, Coded, Fixed2, Fixed4, Guid, String, Table};
use CodedIndexType as C;

/// Column layout of `table`.
#[must_use]
pub fn columns(table: TableId) -> &'static [Column] {
    match table {
        // Generation, Name, Mvid, EncId, EncBaseId
        TableId::Module => &[Fixed2, String, Guid, Guid, Guid],
        // ResolutionScope, TypeName, TypeNamespace
        TableId::TypeRef => &[Coded(C::ResolutionScope), String, String],
        // Flags, TypeName, TypeNamespace, Extends, FieldList, MethodList
        TableId::TypeDef => &[
            Fixed4,
            String,
            String,
            Coded(C::TypeDefOrRef),
            Table(TableId::Field),
            Table(TableId::MethodDef),
        ],
        TableId::FieldPtr => &[Table(TableId::Field)],
        // Flags, Name, Signature
        TableId::Field => &[Fixed2, String, Blob],
        TableId::MethodPtr => &[Table(TableId::MethodDef)],
        // RVA, ImplFlags, Flags, Name, Signature, ParamList
        TableId::MethodDef => &[Fixed4, Fixed2, Fixed2, String, Blob, Table(TableId::Param)],
        TableId::ParamPtr => &[Table(TableId::Param)],
        // Flags, Sequence, Name
        TableId::Param => &[Fixed2, Fixed2, String],
        // Class, Interface
        TableId::InterfaceImpl => &[Table(TableId::TypeDef), Coded(C::TypeDefOrRef)],
        // Class, Name, Signature
        TableId::MemberRef => &[Coded(C::MemberRefParent), String, Blob],
        // Type (1 byte) plus padding, Parent, Value
        TableId::Constant => &[Fixed2, Coded(C::HasConstant), Blob],
        // Parent, Type, Value
        TableId::CustomAttribute => &[
            Coded(C::HasCustomAttribute),
            Coded(C::CustomAttributeType),
            Blob,
        ],
        // Parent, NativeType
        TableId::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
        // Action, Parent, PermissionSet
        TableId::DeclSecurity => &[Fixed2, Coded(C::HasDeclSecurity), Blob],
        // PackingSize, ClassSize, Parent
        TableId::ClassLayout => &[Fixed2, Fixed4, Table(TableId::TypeDef)],
        // Offset, Field
        TableId::FieldLayout => &[Fixed4, Table(TableId::Field)],
        TableId::StandAloneSig => &[Blob],
        // Parent, EventList
        TableId::EventMap => &[Table(TableId::TypeDef), Table(TableId::Event)],
        TableId::EventPtr => &[Table(TableId::Event)],
        // EventFlags, Name, EventType
        TableId::Event => &[Fixed2, String, Coded(C::TypeDefOrRef)],
        // Parent, PropertyList
        TableId::PropertyMap => &[Table(TableId::TypeDef), Table(TableId::Property)],
        TableId::PropertyPtr => &[Table(TableId::Property)],
        // Flags, Name, Type
        TableId::Property => &[Fixed2, String, Blob],
        // Semantics, Method, Association
        TableId::MethodSemantics => &[
            Fixed2,
            Table(TableId::MethodDef),
            Coded(C::HasSemantics),
        ],
        // Class, MethodBody, MethodDeclaration
        TableId::MethodImpl => &[
            Table(TableId::TypeDef),
            Coded(C::MethodDefOrRef),
            Coded(C::MethodDefOrRef),
        ],
        TableId::ModuleRef => &[String],
        TableId::TypeSpec => &[Blob],
        // MappingFlags, MemberForwarded, ImportName, ImportScope
        TableId::ImplMap => &[
            Fixed2,
            Coded(C::MemberForwarded),
            String,
            Table(TableId::ModuleRef),
        ],
        // RVA, Field
        TableId::FieldRVA => &[Fixed4, Table(TableId::Field)],
        // Token, FuncCode
        TableId::EncLog => &[Fixed4, Fixed4],
        TableId::EncMap => &[Fixed4],
        // HashAlgId, MajorVersion, MinorVersion, BuildNumber, RevisionNumber, Flags, PublicKey,
        // Name, Culture
        TableId::Assembly => &[
            Fixed4, Fixed2, Fixed2, Fixed2, Fixed2, Fixed4, Blob, String, String,
        ],
        TableId::AssemblyProcessor => &[Fixed4],
        // OSPlatformID, OSMajorVersion, OSMinorVersion
        TableId::AssemblyOS => &[Fixed4, Fixed4, Fixed4],
        // MajorVersion, MinorVersion, BuildNumber, RevisionNumber, Flags, PublicKeyOrToken,
        // Name, Culture, HashValue
        TableId::AssemblyRef => &[
            Fixed2, Fixed2, Fixed2, Fixed2, Fixed4, Blob, String, String, Blob,
        ],
        // Processor, AssemblyRef
        TableId::AssemblyRefProcessor => &[Fixed4, Table(TableId::AssemblyRef)],
        // OSPlatformId, OSMajorVersion, OSMinorVersion, AssemblyRef
        TableId::AssemblyRefOS => &[Fixed4, Fixed4, Fixed4, Table(TableId::AssemblyRef)],
        // Flags, Name, HashValue
        TableId::File => &[Fixed4, String, Blob],
        // Flags, TypeDefId, TypeName, TypeNamespace, Implementation
        TableId::ExportedType => &[Fixed4, Fixed4, String, String, Coded(C::Implementation)],
        // Offset, Flags, Name, Implementation
        TableId::ManifestResource => &[Fixed4, Fixed4, String, Coded(C::Implementation)],
        // NestedClass, EnclosingClass
        TableId::NestedClass => &[Table(TableId::TypeDef), Table(TableId::TypeDef)],
        // Number, Flags, Owner, Name
        TableId::GenericParam => &[Fixed2, Fixed2, Coded(C::TypeOrMethodDef), String],
        // Method, Instantiation
        TableId::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
        // Owner, Constraint
        TableId::GenericParamConstraint => &[
            Table(TableId::GenericParam),
            Coded(C::TypeDefOrRef),
        ],
    }
}

/// Size in bytes of one row of `table`.
#[must_use]
pub fn row_size(table: TableId, info: &TableInfo) -> usize {
    columns(table)
        .iter()
        .map(|column| column.size(info) as usize)
        .sum()
}

#[cfg(test)]
mod tests {
    use strum::EnumCount;

    use super::*;

    #[test]
    fn row_sizes_small() {
        let info = TableInfo::new(&[], 0);

        assert_eq!(row_size(TableId::Module, &info), 10);
        assert_eq!(row_size(TableId::Assembly, &info), 22);
        assert_eq!(row_size(TableId::AssemblyRef, &info), 20);
        assert_eq!(row_size(TableId::CustomAttribute, &info), 6);
        assert_eq!(row_size(TableId::MethodDef, &info), 14);
    }

    #[test]
    fn row_sizes_large_heaps() {
        let mut counts = vec![0; TableId::COUNT];
        counts[TableId::AssemblyRef as usize] = 0x1_0000;
        let info = TableInfo::new(&counts, 0x07);

        assert_eq!(row_size(TableId::Assembly, &info), 16 + 12);
        assert_eq!(row_size(TableId::AssemblyRef, &info), 12 + 16);
        assert_eq!(row_size(TableId::AssemblyRefOS, &info), 16);
    }
}
