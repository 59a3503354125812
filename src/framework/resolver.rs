use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use walkdir::WalkDir;

use crate::{
    assets::PackageIdentity,
    framework::{nearest, Framework},
    metadata::{assemblyview::AssemblyView, identity::AssemblyIdentity},
};

/// A binary shipped by a package for the selected framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBinary {
    /// Full path of the binary
    pub path: PathBuf,
    /// Directory of the binary relative to the framework folder, empty for the folder itself
    pub subdirectory: PathBuf,
    /// Identity read from the binary
    pub identity: AssemblyIdentity,
}

/// Locates the binaries a project targeting a framework consumes from a package.
pub trait PackageResolver: Send + Sync {
    /// The binaries of `package` for the nearest framework compatible with `framework`, trying
    /// each of `fallbacks` in order when `framework` matches nothing.
    ///
    /// Returns `None` if the package ships no compatible binaries. Unreadable binaries are left
    /// out of the result.
    fn nearest(
        &self,
        package: &PackageIdentity,
        framework: &str,
        fallbacks: &[String],
    ) -> Option<Vec<PackageBinary>>;
}

/// Resolves packages from an extracted package folder (`~/.nuget/packages`).
#[derive(Debug, Clone)]
pub struct FileSystemResolver {
    package_root: PathBuf,
}

impl FileSystemResolver {
    /// Create a resolver for the packages below `package_root`.
    pub fn new(package_root: impl Into<PathBuf>) -> Self {
        FileSystemResolver {
            package_root: package_root.into(),
        }
    }

    /// The `lib` folder of `package`: `<root>/<id>/<version>/lib`, lowercased.
    #[must_use]
    pub fn lib_dir(&self, package: &PackageIdentity) -> PathBuf {
        self.package_root
            .join(package.id.to_ascii_lowercase())
            .join(package.version.to_ascii_lowercase())
            .join("lib")
    }

    fn framework_folders(&self, package: &PackageIdentity) -> Option<Vec<(PathBuf, Framework)>> {
        let lib = self.lib_dir(package);
        let entries = match fs::read_dir(&lib) {
            Ok(entries) => entries,
            Err(error) => {
                debug!("No lib folder for {} at {}: {}", package, lib.display(), error);
                return None;
            }
        };

        let mut folders: Vec<(PathBuf, Framework)> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name();
                let framework = Framework::parse(&name.to_string_lossy()).ok()?;
                Some((entry.path(), framework))
            })
            .collect();
        folders.sort_by(|a, b| a.0.cmp(&b.0));

        Some(folders)
    }

    fn binaries(folder: &Path) -> Vec<PackageBinary> {
        WalkDir::new(folder)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file() && has_dll_extension(entry.path()))
            .filter_map(|entry| {
                let path = entry.into_path();
                let identity = match AssemblyView::from_file(&path).and_then(|view| view.identity())
                {
                    Ok(identity) => identity,
                    Err(error) => {
                        debug!("Skipping unreadable binary {}: {}", path.display(), error);
                        return None;
                    }
                };

                let subdirectory = path
                    .parent()
                    .and_then(|parent| parent.strip_prefix(folder).ok())
                    .map(Path::to_path_buf)
                    .unwrap_or_default();

                Some(PackageBinary {
                    path,
                    subdirectory,
                    identity,
                })
            })
            .collect()
    }
}

impl PackageResolver for FileSystemResolver {
    fn nearest(
        &self,
        package: &PackageIdentity,
        framework: &str,
        fallbacks: &[String],
    ) -> Option<Vec<PackageBinary>> {
        let folders = self.framework_folders(package)?;

        for candidate in std::iter::once(framework).chain(fallbacks.iter().map(String::as_str)) {
            let target = match Framework::parse(candidate) {
                Ok(target) => target,
                Err(error) => {
                    debug!("Ignoring framework '{}': {}", candidate, error);
                    continue;
                }
            };

            if let Some((folder, chosen)) =
                nearest(&target, folders.iter(), |(_, framework)| Some(framework.clone()))
            {
                debug!("Selected lib/{} of {} for {}", chosen, package, target);
                return Some(Self::binaries(folder));
            }
        }

        debug!("{} has no binaries compatible with {}", package, framework);
        None
    }
}

pub(crate) fn has_dll_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("dll"))
}

/// A [`PackageResolver`] answering from a fixed table, ignoring the framework.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    packages: HashMap<PackageIdentity, Vec<PackageBinary>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the binaries of `package`.
    #[must_use]
    pub fn with(mut self, package: PackageIdentity, binaries: Vec<PackageBinary>) -> Self {
        self.packages.insert(package, binaries);
        self
    }
}

impl PackageResolver for MemoryResolver {
    fn nearest(
        &self,
        package: &PackageIdentity,
        _framework: &str,
        _fallbacks: &[String],
    ) -> Option<Vec<PackageBinary>> {
        self.packages.get(package).cloned()
    }
}
