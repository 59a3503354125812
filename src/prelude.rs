//! # dotshade Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotshade library. Import this module to get quick access to everything a shading
//! run needs, from the lock file to the signed output.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotshade operations
pub use crate::Error;

/// The result type used throughout dotshade
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Package Graph
// ================================================================================================

/// Lock file model and loaders
pub use crate::assets::{
    AssetsFile, GraphLoader, JsonGraphLoader, MemoryGraphLoader, PackageGraphSection,
    PackageIdentity, ProjectReferenceIndex,
};

/// NuGet versions and ranges
pub use crate::assets::{NuGetVersion, VersionRange};

// ================================================================================================
// Frameworks
// ================================================================================================

/// Target frameworks and package binary resolution
pub use crate::framework::{
    FileSystemResolver, Framework, FrameworkFamily, MemoryResolver, PackageBinary,
    PackageResolver,
};

// ================================================================================================
// Metadata
// ================================================================================================

/// Loaded assemblies and the edits applied when writing them
pub use crate::metadata::assemblyview::AssemblyView;

/// Assembly identities and friend grants
pub use crate::metadata::identity::{AssemblyIdentity, AssemblyVersion, FriendGrant, Identity};

// ================================================================================================
// Strong Names
// ================================================================================================

/// Signing keys and identity tokens
pub use crate::strongname::{public_key_token, StrongNameKey};

// ================================================================================================
// Shading
// ================================================================================================

/// Requests, configuration and the planner
pub use crate::shading::{
    BinaryDescriptor, BinaryKind, HostOutputs, Planner, RequestDocument, ResolvedReference,
    ShadeConfig, ShadeRequest, ShadingCache, ShadingPlan,
};

/// Assembly reading used while planning
pub use crate::shading::{AssemblyInfo, AssemblyReader, MemoryAssemblyReader, MetadataReader};

/// Writing the shaded binaries
pub use crate::rewrite::{RewriteReport, Rewriter};
