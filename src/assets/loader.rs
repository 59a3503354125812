//! Loading `project.assets.json`.
//!
//! ```text
//! {
//!   "targets": {
//!     "net6.0": {
//!       "Microsoft.NET.Test.Sdk/17.3.0": {
//!         "type": "package",
//!         "dependencies": { "Microsoft.CodeCoverage": "17.3.0" }
//!       }
//!     }
//!   },
//!   "libraries": {
//!     "Contoso.Shared/1.0.0": { "type": "project", "path": "../Contoso.Shared/Contoso.Shared.csproj" }
//!   },
//!   "project": { "restore": { "projectPath": "/src/Contoso.App/Contoso.App.csproj" } }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Component, Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    assets::{NuGetVersion, PackageGraphSection, PackageIdentity, VersionRange},
    framework::Framework,
    Error, Result,
};

/// Maps the absolute path of each referenced project to the package identity the lock file
/// assigns to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectReferenceIndex {
    entries: HashMap<PathBuf, PackageIdentity>,
}

impl ProjectReferenceIndex {
    /// Record `project` under `path`. The path is normalized first.
    pub fn insert(&mut self, path: &Path, project: PackageIdentity) {
        self.entries.insert(normalize_path(path), project);
    }

    /// The identity of the project at `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&PackageIdentity> {
        self.entries.get(&normalize_path(path))
    }

    /// Returns true if `package` is one of the referenced projects.
    #[must_use]
    pub fn is_project(&self, package: &PackageIdentity) -> bool {
        self.entries.values().any(|project| project == package)
    }

    /// Iterate over all project paths and identities.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &PackageIdentity)> {
        self.entries.iter()
    }

    /// Number of referenced projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no project is referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed lock file: one closed [`PackageGraphSection`] per target framework and the index
/// of project references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetsFile {
    sections: BTreeMap<String, PackageGraphSection>,
    project_references: ProjectReferenceIndex,
}

#[derive(Deserialize)]
struct RawAssets {
    targets: Map<String, Value>,
    #[serde(default)]
    libraries: Map<String, Value>,
    #[serde(default)]
    project: Option<RawProject>,
}

#[derive(Deserialize)]
struct RawProject {
    #[serde(default)]
    restore: Option<RawRestore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRestore {
    #[serde(default)]
    project_path: Option<String>,
}

impl AssetsFile {
    /// Parse a lock file document.
    ///
    /// Project library paths are resolved against `project_dir`; when it is `None`, the
    /// directory of `project.restore.projectPath` is used. Trailing commas are accepted.
    /// Entries with a malformed key, version or dependency range are skipped.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if the document is not valid JSON or has no `targets` object.
    pub fn parse(text: &str, project_dir: Option<&Path>) -> Result<Self> {
        let raw: RawAssets = serde_json::from_str(&strip_trailing_commas(text))?;

        let project_dir = project_dir.map(Path::to_path_buf).or_else(|| {
            raw.project
                .and_then(|project| project.restore)
                .and_then(|restore| restore.project_path)
                .and_then(|path| {
                    normalize_path(Path::new(&path))
                        .parent()
                        .map(Path::to_path_buf)
                })
        });

        let mut assets = AssetsFile::default();
        for (name, entries) in &raw.targets {
            let Some(entries) = entries.as_object() else {
                log::debug!("Skipping target '{}': not an object", name);
                continue;
            };

            let mut section = parse_section(entries);
            section.compute_closure();
            assets.sections.insert(name.clone(), section);
        }

        for (key, library) in &raw.libraries {
            let is_project = library.get("type").and_then(Value::as_str) == Some("project");
            let Some(path) = library.get("path").and_then(Value::as_str) else {
                continue;
            };
            if !is_project {
                continue;
            }

            match PackageIdentity::parse(key) {
                Ok(project) => {
                    let relative = Path::new(&path.replace('\\', "/")).to_path_buf();
                    let absolute = match &project_dir {
                        Some(dir) => dir.join(relative),
                        None => relative,
                    };
                    assets.project_references.insert(&absolute, project);
                }
                Err(error) => log::debug!("Skipping library '{}': {}", key, error),
            }
        }

        Ok(assets)
    }

    /// Names of all target sections, in sorted order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// The section for `framework`.
    ///
    /// Names are matched case-insensitively first; otherwise the first section whose name
    /// parses to the same framework is returned, so `net6.0` finds `.NETCoreApp,Version=v6.0`.
    #[must_use]
    pub fn section(&self, framework: &str) -> Option<&PackageGraphSection> {
        if let Some((_, section)) = self
            .sections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(framework))
        {
            return Some(section);
        }

        let wanted = Framework::parse(framework).ok()?;
        self.sections
            .iter()
            .find(|(name, _)| Framework::parse(name).is_ok_and(|parsed| parsed == wanted))
            .map(|(_, section)| section)
    }

    /// The section for the short framework name, falling back to the full moniker.
    #[must_use]
    pub fn section_for(&self, target_framework: &str, moniker: Option<&str>) -> Option<&PackageGraphSection> {
        self.section(target_framework)
            .or_else(|| moniker.and_then(|moniker| self.section(moniker)))
    }

    /// Add or replace a section. The section is taken as is, call
    /// [`PackageGraphSection::compute_closure`] first if it is not closed.
    pub fn insert_section(&mut self, name: impl Into<String>, section: PackageGraphSection) {
        self.sections.insert(name.into(), section);
    }

    /// The project reference index.
    #[must_use]
    pub fn project_references(&self) -> &ProjectReferenceIndex {
        &self.project_references
    }

    /// Mutable access to the project reference index.
    pub fn project_references_mut(&mut self) -> &mut ProjectReferenceIndex {
        &mut self.project_references
    }
}

fn parse_section(entries: &Map<String, Value>) -> PackageGraphSection {
    let mut section = PackageGraphSection::new();

    for (key, entry) in entries {
        let package = match PackageIdentity::parse(key) {
            Ok(package) => package,
            Err(error) => {
                log::debug!("Skipping package entry '{}': {}", key, error);
                continue;
            }
        };
        if let Err(error) = NuGetVersion::parse(&package.version) {
            log::debug!("Skipping package entry '{}': {}", key, error);
            continue;
        }

        let dependencies = section.insert(package);
        let Some(declared) = entry.get("dependencies").and_then(Value::as_object) else {
            continue;
        };

        for (id, range) in declared {
            let range = range
                .as_str()
                .ok_or_else(|| malformed_error!("Range is not a string"))
                .and_then(VersionRange::parse);

            match range.and_then(|range| {
                PackageIdentity::new(id.clone(), range.min_version().to_normalized_string())
            }) {
                Ok(dependency) => {
                    dependencies.insert(dependency);
                }
                Err(error) => log::debug!("Skipping dependency '{}' of '{}': {}", id, key, error),
            }
        }
    }

    section
}

/// Loads a lock file into an [`AssetsFile`].
///
/// The production implementation is [`JsonGraphLoader`]; [`MemoryGraphLoader`] serves prepared
/// graphs.
pub trait GraphLoader: Send + Sync {
    /// Load the lock file at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Manifest`] if the file is missing or can not be parsed.
    fn load(&self, path: &Path) -> Result<AssetsFile>;
}

/// Reads `project.assets.json` from disk.
#[derive(Debug, Clone, Default)]
pub struct JsonGraphLoader {
    project_dir: Option<PathBuf>,
}

impl JsonGraphLoader {
    /// A loader resolving project paths against the directory recorded in the lock file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve project paths against `project_dir` instead.
    #[must_use]
    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(project_dir.into());
        self
    }
}

impl GraphLoader for JsonGraphLoader {
    fn load(&self, path: &Path) -> Result<AssetsFile> {
        let manifest_error = |message: String| Error::Manifest {
            path: path.to_path_buf(),
            message,
        };

        let text = fs::read_to_string(path).map_err(|error| manifest_error(error.to_string()))?;
        AssetsFile::parse(&text, self.project_dir.as_deref())
            .map_err(|error| manifest_error(error.to_string()))
    }
}

/// Serves prepared [`AssetsFile`]s by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphLoader {
    files: HashMap<PathBuf, AssetsFile>,
}

impl MemoryGraphLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `assets` for `path`.
    #[must_use]
    pub fn with(mut self, path: impl Into<PathBuf>, assets: AssetsFile) -> Self {
        self.files.insert(path.into(), assets);
        self
    }
}

impl GraphLoader for MemoryGraphLoader {
    fn load(&self, path: &Path) -> Result<AssetsFile> {
        self.files.get(path).cloned().ok_or_else(|| Error::Manifest {
            path: path.to_path_buf(),
            message: "no such manifest".to_string(),
        })
    }
}

/// Remove commas directly followed (ignoring whitespace) by `}` or `]`, outside of strings.
pub(crate) fn strip_trailing_commas(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            output.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                output.push(c);
            }
            ',' => {
                let next = text[index + 1..].chars().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    output.push(c);
                }
            }
            _ => output.push(c),
        }
    }

    output
}

/// Collapse `.` and `..` components and treat `\` like `/`.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let unified = path.to_string_lossy().replace('\\', "/");

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSETS: &str = r#"{
      "version": 3,
      "targets": {
        "net6.0": {
          "App.Core/2.0.0": {
            "type": "package",
            "dependencies": { "Lib.A": "[1.0, 2.0)", "Lib.B": "1.2.3.0", },
          },
          "Lib.A/1.0.0": { "type": "package", "dependencies": { "Lib.C": "(, 3.0]" } },
          "Lib.B/1.2.3": { "type": "package" },
          "Lib.C/0.0.0": { "type": "package" },
          "NoVersion": { "type": "package" },
          "Broken/not.a.version": { "type": "package" },
          "Partial/1.0.0": { "dependencies": { "Good": "1.0.0", "Bad": "[x, y]", "Weird": 5 } },
        },
        "net48": null,
      },
      "libraries": {
        "App.Core/2.0.0": { "type": "package", "path": "app.core/2.0.0" },
        "Shared/1.0.0": { "type": "project", "path": "..\\Shared\\Shared.csproj" },
        "Other/1.0.0": { "type": "project" },
      },
    }"#;

    fn package(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version).unwrap()
    }

    #[test]
    fn parse_with_trailing_commas() {
        let assets = AssetsFile::parse(ASSETS, Some(Path::new("/src/App"))).unwrap();
        assert_eq!(assets.section_names().collect::<Vec<_>>(), ["net6.0"]);

        let section = assets.section("NET6.0").unwrap();
        assert_eq!(section.len(), 5);
        assert!(!section.contains(&package("Broken", "not.a.version")));

        let core = section.dependencies(&package("App.Core", "2.0.0")).unwrap();
        let expected = [
            package("Lib.A", "1.0.0"),
            package("Lib.B", "1.2.3"),
            package("Lib.C", "0.0.0"),
        ];
        assert_eq!(core.len(), expected.len());
        assert!(expected.iter().all(|dependency| core.contains(dependency)));

        let partial = section.dependencies(&package("Partial", "1.0.0")).unwrap();
        assert_eq!(partial.len(), 1);
        assert!(partial.contains(&package("Good", "1.0.0")));
    }

    #[test]
    fn project_references() {
        let assets = AssetsFile::parse(ASSETS, Some(Path::new("/src/App"))).unwrap();
        let projects = assets.project_references();
        assert_eq!(projects.len(), 1);
        assert_eq!(
            projects.get(Path::new("/src/Shared/Shared.csproj")),
            Some(&package("Shared", "1.0.0"))
        );
        assert!(projects.is_project(&package("shared", "1.0.0")));
        assert!(!projects.is_project(&package("App.Core", "2.0.0")));
    }

    #[test]
    fn project_dir_from_restore() {
        let text = r#"{
          "targets": {},
          "libraries": { "Shared/1.0.0": { "type": "project", "path": "../Shared/Shared.csproj" } },
          "project": { "restore": { "projectPath": "/src/App/App.csproj" } }
        }"#;
        let assets = AssetsFile::parse(text, None).unwrap();
        assert!(assets
            .project_references()
            .get(Path::new("/src/Shared/./Shared.csproj"))
            .is_some());
    }

    #[test]
    fn section_by_framework() {
        let mut assets = AssetsFile::default();
        assets.insert_section(".NETCoreApp,Version=v6.0", PackageGraphSection::new());
        assets.insert_section(".NETFramework,Version=v4.7.2", PackageGraphSection::new());

        assert!(assets.section("net6.0").is_some());
        assert!(assets.section("net472").is_some());
        assert!(assets.section("net48").is_none());
        assert!(assets.section_for("net7.0", Some(".NETCoreApp,Version=v6.0")).is_some());
    }

    #[test]
    fn invalid_documents() {
        assert!(matches!(AssetsFile::parse("{", None), Err(Error::Json(_))));
        assert!(matches!(AssetsFile::parse("{}", None), Err(Error::Json(_))));
        assert!(AssetsFile::parse(r#"{"targets": {}}"#, None).is_ok());
    }

    #[test]
    fn loaders() {
        let missing = JsonGraphLoader::new().load(Path::new("/does/not/exist.json"));
        assert!(matches!(missing, Err(Error::Manifest { .. })));

        let memory = MemoryGraphLoader::new().with("/obj/project.assets.json", AssetsFile::default());
        assert!(memory.load(Path::new("/obj/project.assets.json")).is_ok());
        assert!(matches!(
            memory.load(Path::new("/obj/other.json")),
            Err(Error::Manifest { .. })
        ));
    }

    #[test]
    fn trailing_commas() {
        assert_eq!(strip_trailing_commas(r#"{"a": [1, 2, ], }"#), r#"{"a": [1, 2 ] }"#);
        assert_eq!(strip_trailing_commas(r#"{"a": "x, }"}"#), r#"{"a": "x, }"}"#);
        assert_eq!(strip_trailing_commas(r#"{"a": "\", ]", }"#), r#"{"a": "\", ]" }"#);
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("a\\b\\..\\c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }
}
