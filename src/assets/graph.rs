use std::collections::{BTreeSet, HashMap, HashSet};

use crate::assets::PackageIdentity;

/// The package dependency graph of one target framework.
///
/// Maps each package to the set of packages it depends on. Sections produced by the loader are
/// closed: every package's set holds its direct *and* transitive dependencies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageGraphSection {
    packages: HashMap<PackageIdentity, HashSet<PackageIdentity>>,
}

impl PackageGraphSection {
    /// Create an empty section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `package` without dependencies, returning its dependency set.
    pub fn insert(&mut self, package: PackageIdentity) -> &mut HashSet<PackageIdentity> {
        self.packages.entry(package).or_default()
    }

    /// Record that `package` depends on `dependency`.
    pub fn add_dependency(&mut self, package: PackageIdentity, dependency: PackageIdentity) {
        self.insert(package).insert(dependency);
    }

    /// The dependency set of `package`.
    #[must_use]
    pub fn dependencies(&self, package: &PackageIdentity) -> Option<&HashSet<PackageIdentity>> {
        self.packages.get(package)
    }

    /// Returns true if the section lists `package`.
    #[must_use]
    pub fn contains(&self, package: &PackageIdentity) -> bool {
        self.packages.contains_key(package)
    }

    /// Find a listed package by id, ignoring case.
    ///
    /// A lock file section lists every id at most once; if a hand-written graph lists several
    /// versions, the lowest one wins.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&PackageIdentity> {
        self.packages.keys().filter(|package| package.has_id(id)).min()
    }

    /// All listed packages in sorted order.
    #[must_use]
    pub fn packages(&self) -> BTreeSet<&PackageIdentity> {
        self.packages.keys().collect()
    }

    /// Iterate over packages and their dependency sets, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageIdentity, &HashSet<PackageIdentity>)> {
        self.packages.iter()
    }

    /// Number of listed packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if no package is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Extend every dependency set with the dependencies of its members until nothing changes.
    ///
    /// Sets only grow and are bounded by the number of distinct packages, so the iteration
    /// terminates, also when the graph has cycles: the members of a cycle end up depending on
    /// each other, including themselves. Dependencies that are not listed in the section
    /// contribute nothing. Returns the number of passes, the last of which added no edge.
    pub fn compute_closure(&mut self) -> usize {
        let listed: Vec<PackageIdentity> = self.packages.keys().cloned().collect();
        let mut passes = 0;

        loop {
            passes += 1;
            let mut added = false;

            for package in &listed {
                let mut reachable = Vec::new();
                if let Some(direct) = self.packages.get(package) {
                    for dependency in direct {
                        if let Some(transitive) = self.packages.get(dependency) {
                            reachable.extend(transitive.iter().cloned());
                        }
                    }
                }

                if let Some(dependencies) = self.packages.get_mut(package) {
                    for dependency in reachable {
                        added |= dependencies.insert(dependency);
                    }
                }
            }

            if !added {
                return passes;
            }
        }
    }

    /// Returns true if every dependency set already contains the dependencies of its members.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.packages.values().all(|dependencies| {
            dependencies.iter().all(|dependency| {
                self.packages
                    .get(dependency)
                    .map_or(true, |transitive| transitive.is_subset(dependencies))
            })
        })
    }
}

impl FromIterator<(PackageIdentity, PackageIdentity)> for PackageGraphSection {
    fn from_iter<T: IntoIterator<Item = (PackageIdentity, PackageIdentity)>>(iter: T) -> Self {
        let mut section = PackageGraphSection::new();
        for (package, dependency) in iter {
            section.add_dependency(package, dependency);
        }
        section
    }
}
