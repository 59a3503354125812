//! ECMA-335 metadata tables.
//!
//! The `#~` stream is decoded generically ([`TablesHeader`], [`TableRows`]) using the column
//! layout in [`schema`], so every table survives a rewrite unchanged even though only a few of
//! them are interpreted. [`rows`] provides typed views of the tables that carry an assembly's
//! identity, its references and its custom attributes.

mod codedindex;
mod header;
pub mod rows;
pub mod schema;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use header::{TableRows, TablesHeader, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS};
pub use rows::{AssemblyFlags, AssemblyRaw, AssemblyRefRaw, CustomAttributeRaw, MemberRefRaw, TypeRefRaw};
pub use tableid::TableId;
pub use tableinfo::{TableInfo, TableRowInfo};
