//! The NuGet lock file and the package dependency graph.
//!
//! # Architecture
//!
//! - [`PackageIdentity`] - Case-insensitive `id/version` pair, the vertex of the graph
//! - [`NuGetVersion`], [`VersionRange`] - Version normalization and range minimums
//! - [`PackageGraphSection`] - The closed dependency graph of one target framework
//! - [`AssetsFile`] - All sections of a lock file and its [`ProjectReferenceIndex`]
//! - [`GraphLoader`] - Loading seam, implemented by [`JsonGraphLoader`] and [`MemoryGraphLoader`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotshade::assets::{GraphLoader, JsonGraphLoader, PackageIdentity};
//! use std::path::Path;
//!
//! let assets = JsonGraphLoader::new().load(Path::new("obj/project.assets.json"))?;
//! if let Some(section) = assets.section("net6.0") {
//!     let sdk = PackageIdentity::new("Microsoft.NET.Test.Sdk", "17.3.0")?;
//!     for dependency in section.dependencies(&sdk).into_iter().flatten() {
//!         println!("{}", dependency);
//!     }
//! }
//! # Ok::<(), dotshade::Error>(())
//! ```

mod graph;
mod identity;
mod loader;
mod version;

pub use graph::PackageGraphSection;
pub use identity::PackageIdentity;
pub use loader::{AssetsFile, GraphLoader, JsonGraphLoader, MemoryGraphLoader, ProjectReferenceIndex};
pub use version::{NuGetVersion, VersionRange};

pub(crate) use loader::normalize_path;
