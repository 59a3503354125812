//! ECMA-335 metadata of managed assemblies.
//!
//! This module reads the parts of an assembly the shading engine cares about and writes edited,
//! re-signed copies. Tables are decoded generically so that an image survives a rewrite even
//! when it uses tables that are never interpreted here.
//!
//! # Key Components
//!
//! - [`assemblyview::AssemblyView`] - a loaded assembly with identity, references and friend
//!   declarations
//! - [`writer::AssemblyEdits`] - the renames, reference patches and attribute replacements
//!   applied by [`assemblyview::AssemblyView::write`]
//! - [`identity`] - assembly identities, versions, public keys and friend grants
//! - [`tables`] / [`streams`] - table schema and heap access
//!
//! # Reference
//! - [ECMA-335 Partition II](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

pub mod assemblyview;
pub mod cor20header;
pub mod customattributes;
pub mod identity;
pub mod root;
pub mod streams;
pub mod tables;
pub mod writer;
