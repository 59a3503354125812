use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{NuGetVersion, PackageGraphSection, PackageIdentity, ProjectReferenceIndex},
    shading::ShadeConfig,
    Error, Result,
};

/// Selects everything below a package in `shadeDependencies`
pub const WILDCARD: &str = "*";

/// A package or project reference of the consuming project, with its shading directives.
///
/// Deserializes from the item shape used by project files:
///
/// ```json
/// { "id": "Contoso.Client", "version": "2.1.0", "shadeDependencies": "Newtonsoft.Json;Polly" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShadeRequest {
    /// Package id
    pub id: String,
    /// Requested version
    pub version: Option<String>,
    /// Version overriding the central package version
    pub version_override: Option<String>,
    /// Shade the package itself and everything below it
    pub shade: bool,
    /// `;` or `,` separated ids of dependencies to shade, `*` for all
    pub shade_dependencies: Option<String>,
    /// Path of a referenced project, which the lock file lists as a library
    pub project_path: Option<PathBuf>,
}

impl ShadeRequest {
    /// Shade the package `id` itself.
    pub fn package(id: impl Into<String>, version: impl Into<String>) -> Self {
        ShadeRequest {
            id: id.into(),
            version: Some(version.into()),
            shade: true,
            ..Self::default()
        }
    }

    /// Shade the dependencies `names` of package `id`.
    pub fn dependencies(
        id: impl Into<String>,
        version: impl Into<String>,
        names: impl Into<String>,
    ) -> Self {
        ShadeRequest {
            id: id.into(),
            version: Some(version.into()),
            shade_dependencies: Some(names.into()),
            ..Self::default()
        }
    }

    /// Shade the dependencies `names` of the project at `path`.
    pub fn project(path: impl Into<PathBuf>, names: impl Into<String>) -> Self {
        ShadeRequest {
            project_path: Some(path.into()),
            shade_dependencies: Some(names.into()),
            ..Self::default()
        }
    }

    /// The dependency ids listed in `shade_dependencies`, trimmed, without empty items.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        self.shade_dependencies
            .as_deref()
            .unwrap_or_default()
            .split([';', ','])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Returns true if the request asks for nothing to be shaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.shade && self.dependency_names().is_empty()
    }

    /// The version of this reference: `version`, else `version_override`, else the central
    /// version of the package.
    #[must_use]
    pub fn effective_version<'a>(&'a self, config: &'a ShadeConfig) -> Option<&'a str> {
        let explicit = |value: &'a Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        explicit(&self.version)
            .or_else(|| explicit(&self.version_override))
            .or_else(|| config.central_version(&self.id))
    }

    /// The package of `section` this request refers to.
    ///
    /// Project references are looked up in `projects`. Package references need a version, which
    /// is matched as written and then in its normalized form.
    pub fn resolve(
        &self,
        section: &PackageGraphSection,
        projects: &ProjectReferenceIndex,
        config: &ShadeConfig,
    ) -> Option<PackageIdentity> {
        if let Some(path) = &self.project_path {
            let project = projects.get(path).cloned();
            if project.is_none() {
                warn!("Project {} is not listed in the lock file", path.display());
            }
            return project;
        }

        let Some(version) = self.effective_version(config) else {
            warn!("Package reference {} has no version, skipping", self.id);
            return None;
        };

        let package = PackageIdentity::new(self.id.as_str(), version).ok()?;
        if section.contains(&package) {
            return Some(package);
        }

        let normalized = NuGetVersion::parse(version)
            .ok()
            .map(|version| version.to_normalized_string())
            .and_then(|version| PackageIdentity::new(self.id.as_str(), version).ok())
            .filter(|normalized| section.contains(normalized));
        if normalized.is_none() {
            debug!("{} is not part of the package graph", package);
        }
        normalized
    }
}

/// A binary the consuming project references after restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    /// Path of the referenced binary
    pub path: PathBuf,
    /// The reference originates from a project-to-project reference
    #[serde(default)]
    pub project_reference: bool,
}

impl ResolvedReference {
    /// A reference to the binary at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResolvedReference {
            path: path.into(),
            project_reference: false,
        }
    }

    /// A reference produced by a project-to-project reference.
    pub fn project(path: impl Into<PathBuf>) -> Self {
        ResolvedReference {
            path: path.into(),
            project_reference: true,
        }
    }
}

/// Everything a host passes about the consuming project, as one JSON document.
///
/// ```json
/// {
///   "packageReferences": [{ "id": "Contoso.Client", "shadeDependencies": "*" }],
///   "centralPackageVersions": { "Contoso.Client": "2.1.0" },
///   "references": [{ "path": "/packages/contoso.client/2.1.0/lib/net6.0/Contoso.Client.dll" }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDocument {
    /// Package and project references with shading directives
    pub package_references: Vec<ShadeRequest>,
    /// Central package versions by id
    pub central_package_versions: BTreeMap<String, String>,
    /// Resolved references of the project
    pub references: Vec<ResolvedReference>,
}

impl RequestDocument {
    /// Parse a request document.
    ///
    /// # Errors
    /// Returns [`Error::Json`] for invalid documents.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a request document from `path`.
    ///
    /// # Errors
    /// Returns [`Error::Manifest`] if the file can not be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest_error = |message: String| Error::Manifest {
            path: path.to_path_buf(),
            message,
        };

        let text = fs::read_to_string(path).map_err(|error| manifest_error(error.to_string()))?;
        Self::parse(&text).map_err(|error| manifest_error(error.to_string()))
    }

    /// Add the central package versions to `config`.
    #[must_use]
    pub fn apply_central_versions(&self, mut config: ShadeConfig) -> ShadeConfig {
        for (id, version) in &self.central_package_versions {
            config = config.with_central_version(id, version.as_str());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> PackageGraphSection {
        let mut section = PackageGraphSection::new();
        section.insert(PackageIdentity::new("Contoso.Client", "2.1.0").unwrap());
        section.insert(PackageIdentity::new("Polly", "7.2.4").unwrap());
        section
    }

    #[test]
    fn dependency_names() {
        let request = ShadeRequest::dependencies("A", "1.0.0", " Newtonsoft.Json; Polly,,* ;");
        assert_eq!(request.dependency_names(), vec!["Newtonsoft.Json", "Polly", "*"]);
        assert!(!request.is_empty());

        assert!(ShadeRequest::dependencies("A", "1.0.0", " ; ").is_empty());
        assert!(!ShadeRequest::package("A", "1.0.0").is_empty());
    }

    #[test]
    fn version_precedence() {
        let config = ShadeConfig::new("net6.0").with_central_version("contoso.client", "3.0.0");

        let mut request = ShadeRequest {
            id: "Contoso.Client".to_string(),
            version: Some("1.0.0".to_string()),
            version_override: Some("2.0.0".to_string()),
            ..ShadeRequest::default()
        };
        assert_eq!(request.effective_version(&config), Some("1.0.0"));

        request.version = Some(" ".to_string());
        assert_eq!(request.effective_version(&config), Some("2.0.0"));

        request.version_override = None;
        assert_eq!(request.effective_version(&config), Some("3.0.0"));

        request.id = "Other".to_string();
        assert_eq!(request.effective_version(&config), None);
    }

    #[test]
    fn resolve_packages() {
        let config = ShadeConfig::new("net6.0");
        let projects = ProjectReferenceIndex::default();

        let exact = ShadeRequest::package("contoso.client", "2.1.0");
        assert_eq!(
            exact.resolve(&section(), &projects, &config),
            Some(PackageIdentity::new("Contoso.Client", "2.1.0").unwrap())
        );

        let short = ShadeRequest::package("Polly", "7.2.4.0");
        assert!(short.resolve(&section(), &projects, &config).is_some());

        let unknown = ShadeRequest::package("Polly", "8.0.0");
        assert!(unknown.resolve(&section(), &projects, &config).is_none());

        let versionless = ShadeRequest {
            id: "Polly".to_string(),
            shade: true,
            ..ShadeRequest::default()
        };
        assert!(versionless.resolve(&section(), &projects, &config).is_none());
    }

    #[test]
    fn resolve_projects() {
        let config = ShadeConfig::new("net6.0");
        let shared = PackageIdentity::new("Contoso.Shared", "1.0.0").unwrap();
        let mut projects = ProjectReferenceIndex::default();
        projects.insert(Path::new("/src/Contoso.Shared/Contoso.Shared.csproj"), shared.clone());

        let request = ShadeRequest::project("/src/app/../Contoso.Shared/Contoso.Shared.csproj", "*");
        assert_eq!(request.resolve(&section(), &projects, &config), Some(shared));

        let missing = ShadeRequest::project("/src/Other/Other.csproj", "*");
        assert!(missing.resolve(&section(), &projects, &config).is_none());
    }

    #[test]
    fn request_document() {
        let document = RequestDocument::parse(
            r#"{
                "packageReferences": [
                    { "id": "Contoso.Client", "shadeDependencies": "Polly" },
                    { "id": "Polly", "versionOverride": "7.2.4", "shade": true }
                ],
                "centralPackageVersions": { "Contoso.Client": "2.1.0" },
                "references": [
                    { "path": "/lib/Polly.dll" },
                    { "path": "/src/Shared/bin/Shared.dll", "projectReference": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(document.package_references.len(), 2);
        assert_eq!(document.package_references[1].version_override.as_deref(), Some("7.2.4"));
        assert!(document.package_references[1].shade);
        assert_eq!(document.references[1], ResolvedReference::project("/src/Shared/bin/Shared.dll"));

        let config = document.apply_central_versions(ShadeConfig::new("net6.0"));
        assert_eq!(
            document.package_references[0].effective_version(&config),
            Some("2.1.0")
        );

        assert!(RequestDocument::parse("[]").is_err());
        assert!(RequestDocument::load(Path::new("/does/not/exist.json")).is_err());
    }
}
