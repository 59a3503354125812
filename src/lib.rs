// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dotshade
//!
//! Shading of .NET package dependencies in pure Rust.
//!
//! When a project depends on a package that in turn pulls in a dependency the project (or
//! another package) needs in a different version, only one of the two copies can be loaded.
//! `dotshade` resolves the conflict by *shading*: the conflicting assemblies are renamed, re-keyed
//! with a strong-name key, and every assembly that references them is patched to point at the
//! renamed copy.
//!
//! ## Pipeline
//!
//! 1. [`assets`] loads the NuGet lock file (`project.assets.json`) into a per-framework package
//!    graph and computes its transitive closure.
//! 2. [`shading`] selects the packages to shade, resolves their binaries through [`framework`],
//!    and expands the set with dependents, friend assemblies and satellite resources.
//! 3. [`rewrite`] applies the plan: renames identities, patches references and
//!    `InternalsVisibleTo` declarations, and signs every output with a [`strongname`] key.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotshade::prelude::*;
//! use std::path::Path;
//!
//! let cache = ShadingCache::new();
//! let config = ShadeConfig::new("net6.0")
//!     .with_package_root("/home/user/.nuget/packages")
//!     .with_intermediate_output("obj/Debug/net6.0");
//!
//! let assets = cache.assets(Path::new("obj/project.assets.json"), &JsonGraphLoader::new())?;
//! let requests = vec![ShadeRequest::dependencies("Contoso.Client", "2.1.0", "Newtonsoft.Json")];
//! let key = cache.key(None, None)?;
//!
//! let resolver = FileSystemResolver::new(config.package_root());
//! let planner = Planner::new(&config, &resolver, &MetadataReader).with_cache(&cache);
//! let plan = planner.plan(&assets, &requests, &[], &key)?;
//!
//! let report = Rewriter::new(&key).rewrite(&plan);
//! println!("{} assemblies shaded, {} failed", report.written.len(), report.errors.len());
//! # Ok::<(), dotshade::Error>(())
//! ```
//!
//! ## Strong names
//!
//! Identity tokens follow the ECMA-335 convention: the last eight bytes of the SHA-1 of the
//! public key blob, in reverse order.
//!
//! ```rust
//! use dotshade::strongname::public_key_token;
//!
//! // The ECMA standard key
//! let ecma = [0_u8, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
//! assert_eq!(hex::encode(public_key_token(&ecma)), "b77a5c561934e089");
//! ```

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dotshade::prelude::*;
///
/// let key = StrongNameKey::generate()?;
/// println!("token: {}", hex::encode(key.public_key_token()));
/// # Ok::<(), dotshade::Error>(())
/// ```
pub mod prelude;

/// ECMA-335 metadata: reading the identity, references and friend declarations of an assembly,
/// and writing a patched, re-signed image.
///
/// # Key Components
///
/// - [`metadata::assemblyview::AssemblyView`] - Loaded assembly with decoded tables and heaps
/// - [`metadata::writer::AssemblyEdits`] - Changes applied when writing a shaded copy
/// - [`metadata::identity`] - Assembly identities, versions and friend grants
/// - [`metadata::tables`] - Generic table decoding and re-encoding
/// - [`metadata::streams`] - `#Strings`, `#Blob` heaps and the heap builder
pub mod metadata;

/// Strong-name keys, identity tokens, and PE image signing.
///
/// Keys are generated, or loaded from `.snk` and PKCS#8 files. Identity tokens follow the
/// ECMA-335 convention.
pub mod strongname;

/// The NuGet lock file (`project.assets.json`): package identities, versions and the
/// per-framework dependency graph with its transitive closure.
pub mod assets;

/// Target frameworks: parsing of folder names and monikers, compatibility, nearest selection,
/// and the resolver locating a package's binaries.
pub mod framework;

/// Planning which assemblies to shade: requests, descriptors, the reference index, the
/// compute-once cache service and the host outputs.
pub mod shading;

/// Applying a shading plan to disk.
pub mod rewrite;

/// `dotshade` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use dotshade::{Result, metadata::assemblyview::AssemblyView};
///
/// fn name_of(path: &str) -> Result<String> {
///     Ok(AssemblyView::from_file(std::path::Path::new(path))?.identity()?.name)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotshade` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use dotshade::{Error, metadata::assemblyview::AssemblyView};
///
/// match AssemblyView::from_file(std::path::Path::new("Contoso.dll")) {
///     Ok(view) => println!("Loaded successfully"),
///     Err(Error::NotSupported(reason)) => println!("Not supported: {}", reason),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Low-level access to the raw bytes of a PE image.
pub use file::{File, Parser};
