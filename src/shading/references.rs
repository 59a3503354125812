//! Reading assemblies for planning, and the reverse reference index.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::debug;
use walkdir::WalkDir;

use crate::{
    assets::normalize_path,
    metadata::{
        assemblyview::AssemblyView,
        identity::{AssemblyIdentity, FriendGrant},
    },
    Error, Result,
};

/// What planning needs to know about one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyInfo {
    /// Path of the binary
    pub path: PathBuf,
    /// Identity from the `Assembly` table, with the full public key if signed
    pub identity: AssemblyIdentity,
    /// Identities from the `AssemblyRef` table
    pub references: Vec<AssemblyIdentity>,
    /// Values of the `InternalsVisibleToAttribute`s on the assembly
    pub friends: Vec<String>,
}

impl AssemblyInfo {
    /// Describe an assembly without references or friends.
    pub fn new(path: impl Into<PathBuf>, identity: AssemblyIdentity) -> Self {
        AssemblyInfo {
            path: path.into(),
            identity,
            references: Vec::new(),
            friends: Vec::new(),
        }
    }

    /// Add a reference.
    #[must_use]
    pub fn with_reference(mut self, reference: AssemblyIdentity) -> Self {
        self.references.push(reference);
        self
    }

    /// Add an `InternalsVisibleTo` value.
    #[must_use]
    pub fn with_friend(mut self, value: impl Into<String>) -> Self {
        self.friends.push(value.into());
        self
    }

    /// The grant value naming this assembly.
    #[must_use]
    pub fn grant(&self) -> FriendGrant {
        FriendGrant::new(self.identity.name.as_str(), self.identity.public_key())
    }
}

/// Reads assemblies and finds their satellite resource assemblies.
pub trait AssemblyReader: Send + Sync {
    /// Read identity, references and friend declarations of the binary at `path`.
    ///
    /// # Errors
    /// Returns an error if the binary can not be read or is not a managed assembly.
    fn read(&self, path: &Path) -> Result<AssemblyInfo>;

    /// Paths of the satellite assemblies of the binary at `path`: files named
    /// `<file stem>.resources.dll` anywhere below its directory.
    fn satellites(&self, path: &Path) -> Vec<PathBuf>;
}

/// The file name satellites of `path` carry, lowercased.
fn satellite_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    Some(format!("{}.resources.dll", stem.to_ascii_lowercase()))
}

fn is_satellite_of(candidate: &Path, file_name: &str) -> bool {
    candidate
        .file_name()
        .is_some_and(|name| name.to_string_lossy().to_ascii_lowercase() == file_name)
}

/// Returns true if `path` names a satellite resource assembly.
pub fn is_satellite(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        name.to_string_lossy()
            .to_ascii_lowercase()
            .ends_with(".resources.dll")
    })
}

/// Reads assemblies from disk through their metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataReader;

impl AssemblyReader for MetadataReader {
    fn read(&self, path: &Path) -> Result<AssemblyInfo> {
        let view = AssemblyView::from_file(path)?;

        Ok(AssemblyInfo {
            path: path.to_path_buf(),
            identity: view.identity()?,
            references: view.references()?,
            friends: view
                .internals_visible_to()?
                .into_iter()
                .map(|attribute| attribute.value)
                .collect(),
        })
    }

    fn satellites(&self, path: &Path) -> Vec<PathBuf> {
        let (Some(directory), Some(file_name)) = (path.parent(), satellite_file_name(path)) else {
            return Vec::new();
        };

        WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_satellite_of(entry.path(), &file_name))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

/// Serves prepared [`AssemblyInfo`]s by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssemblyReader {
    assemblies: HashMap<PathBuf, AssemblyInfo>,
}

impl MemoryAssemblyReader {
    /// Create an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `info` at its path.
    #[must_use]
    pub fn with(mut self, info: AssemblyInfo) -> Self {
        self.assemblies.insert(normalize_path(&info.path), info);
        self
    }
}

impl AssemblyReader for MemoryAssemblyReader {
    fn read(&self, path: &Path) -> Result<AssemblyInfo> {
        self.assemblies
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| Error::Error(format!("No assembly at {}", path.display())))
    }

    fn satellites(&self, path: &Path) -> Vec<PathBuf> {
        let path = normalize_path(path);
        let (Some(directory), Some(file_name)) = (path.parent(), satellite_file_name(&path)) else {
            return Vec::new();
        };

        let mut satellites: Vec<PathBuf> = self
            .assemblies
            .keys()
            .filter(|candidate| candidate.starts_with(directory) && is_satellite_of(candidate, &file_name))
            .cloned()
            .collect();
        satellites.sort();
        satellites
    }
}

/// The assemblies a project references, indexed by what they reference and by friend grant.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    assemblies: Vec<AssemblyInfo>,
    dependents: HashMap<AssemblyIdentity, Vec<usize>>,
    by_path: HashMap<PathBuf, usize>,
}

impl ReferenceIndex {
    /// Read every binary in `paths` with `reader`. Unreadable binaries are skipped.
    pub fn build<'a, I>(reader: &dyn AssemblyReader, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut index = ReferenceIndex::default();
        for path in paths {
            match reader.read(path) {
                Ok(info) => index.insert(info),
                Err(error) => debug!("Skipping reference {}: {}", path.display(), error),
            }
        }
        index
    }

    /// Add an assembly. A path already indexed is ignored.
    pub fn insert(&mut self, info: AssemblyInfo) {
        let path = normalize_path(&info.path);
        if self.by_path.contains_key(&path) {
            return;
        }

        let position = self.assemblies.len();
        for reference in &info.references {
            self.dependents
                .entry(reference.clone())
                .or_default()
                .push(position);
        }
        self.by_path.insert(path, position);
        self.assemblies.push(info);
    }

    /// The indexed assemblies referencing `identity`, in insertion order.
    pub fn dependents_of(&self, identity: &AssemblyIdentity) -> impl Iterator<Item = &AssemblyInfo> {
        self.dependents
            .get(identity)
            .into_iter()
            .flatten()
            .filter_map(|position| self.assemblies.get(*position))
    }

    /// The indexed assembly `grant` names.
    #[must_use]
    pub fn find_by_grant(&self, grant: &FriendGrant) -> Option<&AssemblyInfo> {
        self.assemblies
            .iter()
            .find(|info| info.grant().matches(grant))
    }

    /// The indexed assembly at `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&AssemblyInfo> {
        self.by_path
            .get(&normalize_path(path))
            .and_then(|position| self.assemblies.get(*position))
    }

    /// All indexed assemblies.
    pub fn iter(&self) -> impl Iterator<Item = &AssemblyInfo> {
        self.assemblies.iter()
    }

    /// Number of indexed assemblies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assemblies.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{metadata::identity::Identity, test::ImageBuilder};

    fn identity(name: &str) -> AssemblyIdentity {
        AssemblyIdentity::parse(&format!("{name}, Version=1.0.0.0")).unwrap()
    }

    #[test]
    fn dependents_and_grants() {
        let signed = AssemblyIdentity {
            strong_name: Some(Identity::PubKey(vec![0xab, 0xcd])),
            ..identity("Friend")
        };

        let reader = MemoryAssemblyReader::new()
            .with(AssemblyInfo::new("/bin/A.dll", identity("A")).with_reference(identity("Lib")))
            .with(AssemblyInfo::new("/bin/B.dll", identity("B")).with_reference(identity("A")))
            .with(AssemblyInfo::new("/bin/Friend.dll", signed.clone()).with_reference(identity("Lib")));

        let paths = [
            Path::new("/bin/A.dll"),
            Path::new("/bin/B.dll"),
            Path::new("/bin/Friend.dll"),
            Path::new("/bin/Missing.dll"),
            Path::new("/bin/./A.dll"),
        ];
        let index = ReferenceIndex::build(&reader, paths);
        assert_eq!(index.len(), 3);

        let names: Vec<&str> = index
            .dependents_of(&identity("Lib"))
            .map(|info| info.identity.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "Friend"]);
        assert_eq!(index.dependents_of(&identity("B")).count(), 0);

        let grant = FriendGrant::parse("friend, PublicKey=ABCD").unwrap();
        assert_eq!(index.find_by_grant(&grant).map(|info| &info.identity), Some(&signed));
        assert!(index.find_by_grant(&FriendGrant::new("Friend", None)).is_none());

        assert!(index.get(Path::new("/bin/B.dll")).is_some());
    }

    #[test]
    fn memory_satellites() {
        let reader = MemoryAssemblyReader::new()
            .with(AssemblyInfo::new("/lib/Lib.dll", identity("Lib")))
            .with(AssemblyInfo::new("/lib/de/Lib.resources.dll", identity("Lib.resources")))
            .with(AssemblyInfo::new("/lib/fr/Lib.resources.dll", identity("Lib.resources")))
            .with(AssemblyInfo::new("/other/de/Lib.resources.dll", identity("Lib.resources")))
            .with(AssemblyInfo::new("/lib/de/Other.resources.dll", identity("Other.resources")));

        assert_eq!(
            reader.satellites(Path::new("/lib/Lib.dll")),
            vec![
                PathBuf::from("/lib/de/Lib.resources.dll"),
                PathBuf::from("/lib/fr/Lib.resources.dll")
            ]
        );
        assert!(is_satellite(Path::new("/lib/de/Lib.Resources.DLL")));
        assert!(!is_satellite(Path::new("/lib/Lib.dll")));
    }

    #[test]
    fn metadata_reader() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("Contoso.Lib.dll");
        fs::write(
            &lib,
            ImageBuilder::new("Contoso.Lib")
                .version(2, 0, 0, 0)
                .reference("Newtonsoft.Json", (12, 0, 0, 0), Some([0x30, 0xad, 0x4f, 0xe6, 0xb2, 0xa6, 0xae, 0xed]))
                .internals_visible_to("Contoso.Lib.Tests")
                .build(),
        )
        .unwrap();

        fs::create_dir_all(dir.path().join("de")).unwrap();
        let satellite = dir.path().join("de/Contoso.Lib.resources.dll");
        fs::write(&satellite, ImageBuilder::new("Contoso.Lib.resources").culture("de").build()).unwrap();

        let info = MetadataReader.read(&lib).unwrap();
        assert_eq!(info.identity.name, "Contoso.Lib");
        assert_eq!(info.references.len(), 1);
        assert_eq!(
            info.references[0].display_name(),
            "Newtonsoft.Json, Version=12.0.0.0, Culture=neutral, PublicKeyToken=30ad4fe6b2a6aeed"
        );
        assert_eq!(info.friends, vec!["Contoso.Lib.Tests".to_string()]);

        assert_eq!(MetadataReader.satellites(&lib), vec![satellite]);
        assert!(MetadataReader.read(&dir.path().join("missing.dll")).is_err());
    }
}
