//! Planning which binaries to shade.
//!
//! Planning runs in three phases over immutable inputs:
//!
//! 1. [`select_packages`] picks the packages named by the [`ShadeRequest`]s from the closed
//!    package graph and closes the selection over their dependencies.
//! 2. [`Planner::resolve_binaries`] asks a [`crate::framework::PackageResolver`] for the
//!    binaries of each selected package and plans them under the name `<Name>.<Version>`.
//! 3. [`Planner::expand`] adds every referenced assembly that links against a planned one, the
//!    friends named by `InternalsVisibleToAttribute`s of planned assemblies, and the satellite
//!    resource assemblies of all of them.
//!
//! The result is a [`ShadingPlan`] of [`BinaryDescriptor`]s, which [`crate::rewrite`] applies and
//! [`HostOutputs`] turns into reference changes for the consuming project. [`ShadingCache`]
//! shares lock files, friend grants and keys between concurrent runs.

mod cache;
mod config;
mod descriptor;
mod outputs;
mod plan;
mod references;
mod request;

pub use cache::{OnceMap, ShadingCache};
pub use config::{ShadeConfig, SHADED_FOLDER};
pub use descriptor::{shaded_name, BinaryDescriptor, BinaryKind};
pub use outputs::{AssemblyToShade, HostOutputs, ReferenceItem};
pub use plan::{select_packages, Planner, ShadingPlan};
pub use references::{
    is_satellite, AssemblyInfo, AssemblyReader, MemoryAssemblyReader, MetadataReader,
    ReferenceIndex,
};
pub use request::{RequestDocument, ResolvedReference, ShadeRequest, WILDCARD};
