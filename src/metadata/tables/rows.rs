//! Typed views over the generic rows of the tables the shading engine reads or patches.

use bitflags::bitflags;

use crate::{
    metadata::tables::{CodedIndex, CodedIndexType},
    Error::OutOfBounds,
    Result,
};

bitflags! {
    /// Flags of the `Assembly` and `AssemblyRef` tables (ECMA-335 II.23.1.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AssemblyFlags: u32 {
        /// The blob holds the full public key instead of the token
        const PUBLIC_KEY = 0x0001;
        /// The assembly is side-by-side compatible
        const RETARGETABLE = 0x0100;
        /// JIT optimizations are disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// JIT tracking is enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

fn column(row: &[u32], index: usize) -> Result<u32> {
    row.get(index).copied().ok_or(OutOfBounds)
}

#[allow(clippy::cast_possible_truncation)]
fn column_u16(row: &[u32], index: usize) -> Result<u16> {
    // Fixed2 columns are decoded from two bytes
    Ok(column(row, index)? as u16)
}

/// A row of the `Assembly` table (0x20).
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRaw {
    /// Hash algorithm used for file hashes
    pub hash_alg_id: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// Assembly flags
    pub flags: AssemblyFlags,
    /// `#Blob` index of the public key
    pub public_key: u32,
    /// `#Strings` index of the simple name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
}

impl AssemblyRaw {
    /// Read the typed view of an `Assembly` row.
    ///
    /// # Errors
    /// Returns an error if the row has fewer columns than expected.
    pub fn read(row: &[u32]) -> Result<Self> {
        Ok(AssemblyRaw {
            hash_alg_id: column(row, 0)?,
            major_version: column_u16(row, 1)?,
            minor_version: column_u16(row, 2)?,
            build_number: column_u16(row, 3)?,
            revision_number: column_u16(row, 4)?,
            flags: AssemblyFlags::from_bits_retain(column(row, 5)?),
            public_key: column(row, 6)?,
            name: column(row, 7)?,
            culture: column(row, 8)?,
        })
    }

    /// Store the view back into the generic row.
    ///
    /// # Errors
    /// Returns an error if the row has fewer columns than expected.
    pub fn write(&self, row: &mut [u32]) -> Result<()> {
        let values = [
            self.hash_alg_id,
            u32::from(self.major_version),
            u32::from(self.minor_version),
            u32::from(self.build_number),
            u32::from(self.revision_number),
            self.flags.bits(),
            self.public_key,
            self.name,
            self.culture,
        ];
        row.get_mut(..values.len())
            .ok_or(OutOfBounds)?
            .copy_from_slice(&values);
        Ok(())
    }
}

/// A row of the `AssemblyRef` table (0x23).
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRefRaw {
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// Reference flags
    pub flags: AssemblyFlags,
    /// `#Blob` index of the public key or token
    pub public_key_or_token: u32,
    /// `#Strings` index of the simple name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

impl AssemblyRefRaw {
    /// Read the typed view of an `AssemblyRef` row.
    ///
    /// # Errors
    /// Returns an error if the row has fewer columns than expected.
    pub fn read(row: &[u32]) -> Result<Self> {
        Ok(AssemblyRefRaw {
            major_version: column_u16(row, 0)?,
            minor_version: column_u16(row, 1)?,
            build_number: column_u16(row, 2)?,
            revision_number: column_u16(row, 3)?,
            flags: AssemblyFlags::from_bits_retain(column(row, 4)?),
            public_key_or_token: column(row, 5)?,
            name: column(row, 6)?,
            culture: column(row, 7)?,
            hash_value: column(row, 8)?,
        })
    }

    /// Store the view back into the generic row.
    ///
    /// # Errors
    /// Returns an error if the row has fewer columns than expected.
    pub fn write(&self, row: &mut [u32]) -> Result<()> {
        let values = [
            u32::from(self.major_version),
            u32::from(self.minor_version),
            u32::from(self.build_number),
            u32::from(self.revision_number),
            self.flags.bits(),
            self.public_key_or_token,
            self.name,
            self.culture,
            self.hash_value,
        ];
        row.get_mut(..values.len())
            .ok_or(OutOfBounds)?
            .copy_from_slice(&values);
        Ok(())
    }
}

/// A row of the `CustomAttribute` table (0x0C).
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeRaw {
    /// Owner of the attribute
    pub parent: CodedIndex,
    /// Constructor of the attribute type
    pub constructor: CodedIndex,
    /// `#Blob` index of the encoded arguments
    pub value: u32,
}

impl CustomAttributeRaw {
    /// Column holding the value blob index
    pub const VALUE_COLUMN: usize = 2;

    /// Read the typed view of a `CustomAttribute` row.
    ///
    /// # Errors
    /// Returns an error for short rows or invalid coded indices.
    pub fn read(row: &[u32]) -> Result<Self> {
        Ok(CustomAttributeRaw {
            parent: CodedIndex::decode(column(row, 0)?, CodedIndexType::HasCustomAttribute)?,
            constructor: CodedIndex::decode(
                column(row, 1)?,
                CodedIndexType::CustomAttributeType,
            )?,
            value: column(row, Self::VALUE_COLUMN)?,
        })
    }
}

/// A row of the `MemberRef` table (0x0A).
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRefRaw {
    /// Declaring type or module of the member
    pub class: CodedIndex,
    /// `#Strings` index of the member name
    pub name: u32,
    /// `#Blob` index of the signature
    pub signature: u32,
}

impl MemberRefRaw {
    /// Read the typed view of a `MemberRef` row.
    ///
    /// # Errors
    /// Returns an error for short rows or invalid coded indices.
    pub fn read(row: &[u32]) -> Result<Self> {
        Ok(MemberRefRaw {
            class: CodedIndex::decode(column(row, 0)?, CodedIndexType::MemberRefParent)?,
            name: column(row, 1)?,
            signature: column(row, 2)?,
        })
    }
}

/// A row of the `TypeRef` table (0x01).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRefRaw {
    /// Scope the type is resolved in
    pub resolution_scope: u32,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
}

impl TypeRefRaw {
    /// Read the typed view of a `TypeRef` row.
    ///
    /// # Errors
    /// Returns an error if the row has fewer columns than expected.
    pub fn read(row: &[u32]) -> Result<Self> {
        Ok(TypeRefRaw {
            resolution_scope: column(row, 0)?,
            type_name: column(row, 1)?,
            type_namespace: column(row, 2)?,
        })
    }
}
