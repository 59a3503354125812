//! Metadata streams and heaps.
//!
//! Only the heaps the shading engine touches get dedicated readers:
//!
//! - [`Strings`] for identifiers (`#Strings`)
//! - [`Blob`] for public keys, tokens and custom attribute values (`#Blob`)
//!
//! `#GUID` and `#US` are carried over untouched by the writer. [`HeapBuilder`] appends new
//! entries to `#Strings` and `#Blob` while keeping every existing index valid.

mod blob;
mod builder;
mod streamheader;
mod strings;

pub use blob::Blob;
pub use builder::{HeapBuilder, HeapKind, LARGE_HEAP_THRESHOLD};
pub use streamheader::{StreamHeader, STREAM_NAMES};
pub use strings::Strings;
