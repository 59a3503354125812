use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    assets::{AssetsFile, PackageGraphSection, PackageIdentity, ProjectReferenceIndex},
    framework::PackageResolver,
    metadata::identity::{AssemblyIdentity, FriendGrant},
    shading::{
        descriptor::shaded_name,
        references::{is_satellite, AssemblyInfo, AssemblyReader, ReferenceIndex},
        request::WILDCARD,
        BinaryDescriptor, BinaryKind, ResolvedReference, ShadeConfig, ShadeRequest, ShadingCache,
    },
    strongname::StrongNameKey,
    Result,
};

/// The binaries to shade, de-duplicated by original identity, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ShadingPlan {
    binaries: Vec<BinaryDescriptor>,
    positions: HashMap<AssemblyIdentity, usize>,
}

impl ShadingPlan {
    /// Create an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `descriptor` unless a binary with the same original identity is planned already.
    /// Returns true if it was added.
    pub fn insert(&mut self, descriptor: BinaryDescriptor) -> bool {
        if self.positions.contains_key(&descriptor.identity) {
            return false;
        }

        self.positions
            .insert(descriptor.identity.clone(), self.binaries.len());
        self.binaries.push(descriptor);
        true
    }

    /// Returns true if a binary with original identity `identity` is planned.
    #[must_use]
    pub fn contains(&self, identity: &AssemblyIdentity) -> bool {
        self.positions.contains_key(identity)
    }

    /// The planned binary with original identity `identity`.
    #[must_use]
    pub fn get(&self, identity: &AssemblyIdentity) -> Option<&BinaryDescriptor> {
        self.positions
            .get(identity)
            .and_then(|position| self.binaries.get(*position))
    }

    /// All planned binaries in discovery order.
    #[must_use]
    pub fn binaries(&self) -> &[BinaryDescriptor] {
        &self.binaries
    }

    /// Iterate over the planned binaries.
    pub fn iter(&self) -> std::slice::Iter<'_, BinaryDescriptor> {
        self.binaries.iter()
    }

    /// Number of planned binaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    /// Returns true if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ShadingPlan {
    type Item = &'a BinaryDescriptor;
    type IntoIter = std::slice::Iter<'a, BinaryDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.binaries.iter()
    }
}

/// Select the packages to shade.
///
/// Every request contributes its package when `shade` is set and the named dependencies (or, for
/// `*`, all dependencies) found in its closure. Names that match nothing are ignored. The
/// selection is then closed over the dependencies of every selected package.
pub fn select_packages(
    section: &PackageGraphSection,
    projects: &ProjectReferenceIndex,
    requests: &[ShadeRequest],
    config: &ShadeConfig,
) -> BTreeSet<PackageIdentity> {
    let mut selected = BTreeSet::new();

    for request in requests.iter().filter(|request| !request.is_empty()) {
        let Some(package) = request.resolve(section, projects, config) else {
            continue;
        };

        if request.shade {
            selected.insert(package.clone());
        }

        let names = request.dependency_names();
        if names.is_empty() {
            continue;
        }

        let Some(dependencies) = section.dependencies(&package) else {
            debug!("{} has no dependency information", package);
            continue;
        };

        for name in names {
            if name == WILDCARD {
                selected.extend(dependencies.iter().cloned());
                continue;
            }

            match dependencies.iter().filter(|dependency| dependency.has_id(name)).min() {
                Some(dependency) => {
                    selected.insert(dependency.clone());
                }
                None => debug!("{} does not depend on {}, ignoring", package, name),
            }
        }
    }

    let mut worklist: Vec<PackageIdentity> = selected.iter().cloned().collect();
    while let Some(package) = worklist.pop() {
        for dependency in section.dependencies(&package).into_iter().flatten() {
            if selected.insert(dependency.clone()) {
                worklist.push(dependency.clone());
            }
        }
    }

    selected
}

/// Plans shading runs.
///
/// # Examples
///
/// ```rust
/// use dotshade::prelude::*;
///
/// let config = ShadeConfig::new("net6.0").with_intermediate_output("obj");
/// let resolver = MemoryResolver::new();
/// let reader = MemoryAssemblyReader::new();
/// let key = StrongNameKey::generate()?;
///
/// let plan = Planner::new(&config, &resolver, &reader).plan(&AssetsFile::default(), &[], &[], &key)?;
/// assert!(plan.is_empty());
/// # Ok::<(), dotshade::Error>(())
/// ```
pub struct Planner<'a> {
    config: &'a ShadeConfig,
    resolver: &'a dyn PackageResolver,
    reader: &'a dyn AssemblyReader,
    cache: Option<&'a ShadingCache>,
}

impl<'a> Planner<'a> {
    /// Create a planner resolving package binaries with `resolver` and reading assemblies with
    /// `reader`.
    pub fn new(
        config: &'a ShadeConfig,
        resolver: &'a dyn PackageResolver,
        reader: &'a dyn AssemblyReader,
    ) -> Self {
        Planner {
            config,
            resolver,
            reader,
            cache: None,
        }
    }

    /// Share friend grants through `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a ShadingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Plan the binaries to shade for `requests`.
    ///
    /// `references` are the binaries the consuming project references; they are searched for
    /// dependents and friends of shaded binaries. A lock file without a section for the target
    /// framework, or requests selecting nothing, produce an empty plan.
    ///
    /// # Errors
    /// Returns an error only if a friend grant computation fails.
    pub fn plan(
        &self,
        assets: &AssetsFile,
        requests: &[ShadeRequest],
        references: &[ResolvedReference],
        key: &StrongNameKey,
    ) -> Result<ShadingPlan> {
        let config = self.config;
        let Some(section) = assets.section_for(
            &config.target_framework,
            config.target_framework_moniker.as_deref(),
        ) else {
            info!("Lock file has no target for {}", config.target_framework);
            return Ok(ShadingPlan::new());
        };

        let packages = select_packages(section, assets.project_references(), requests, config);
        if packages.is_empty() {
            return Ok(ShadingPlan::new());
        }

        let mut plan = self.resolve_binaries(&packages, key)?;
        if plan.is_empty() {
            return Ok(plan);
        }

        let index = ReferenceIndex::build(
            self.reader,
            references.iter().map(|reference| reference.path.as_path()),
        );
        self.expand(&mut plan, &index, key)?;

        Ok(plan)
    }

    /// Plan the binaries of `packages`, renamed to `<Name>.<Version>`.
    ///
    /// Packages without binaries for the target framework are skipped. Satellite assemblies are
    /// left to [`Planner::expand`], which names them after their owner.
    ///
    /// # Errors
    /// Returns an error if a friend grant computation fails.
    pub fn resolve_binaries(
        &self,
        packages: &BTreeSet<PackageIdentity>,
        key: &StrongNameKey,
    ) -> Result<ShadingPlan> {
        let config = self.config;
        let shaded_dir = config.shaded_dir();
        let mut plan = ShadingPlan::new();

        for package in packages {
            let Some(binaries) = self.resolver.nearest(
                package,
                &config.target_framework,
                &config.fallback_frameworks,
            ) else {
                debug!("No binaries of {} for {}", package, config.target_framework);
                continue;
            };

            for binary in binaries {
                if is_satellite(&binary.path) || plan.contains(&binary.identity) {
                    continue;
                }

                let name = shaded_name(&binary.identity);
                let shaded_path = shaded_dir
                    .join(&binary.subdirectory)
                    .join(format!("{name}.dll"));

                let mut descriptor = BinaryDescriptor::new(
                    binary.path,
                    binary.identity,
                    name,
                    shaded_path,
                    binary.subdirectory,
                    BinaryKind::Package,
                    key,
                )
                .with_package(package.clone());
                descriptor.grant_before = self.grant_before(&descriptor)?;

                plan.insert(descriptor);
            }
        }

        Ok(plan)
    }

    /// Extend `plan` with every indexed assembly referencing a planned one, the friends named by
    /// planned assemblies, and finally the satellites of everything planned.
    ///
    /// # Errors
    /// Returns an error if a friend grant computation fails.
    pub fn expand(
        &self,
        plan: &mut ShadingPlan,
        index: &ReferenceIndex,
        key: &StrongNameKey,
    ) -> Result<()> {
        let mut worklist: Vec<(AssemblyIdentity, PathBuf)> = plan
            .iter()
            .map(|descriptor| (descriptor.identity.clone(), descriptor.original_path.clone()))
            .collect();

        while let Some((identity, path)) = worklist.pop() {
            for dependent in index.dependents_of(&identity) {
                if plan.contains(&dependent.identity) {
                    continue;
                }

                let descriptor = self.rekeyed(dependent, BinaryKind::Dependent, key)?;
                debug!("{} references {}, shading it too", dependent.identity.name, identity.name);
                worklist.push((dependent.identity.clone(), dependent.path.clone()));
                plan.insert(descriptor);
            }

            for value in self.friends_of(&path, index) {
                let grant = match FriendGrant::parse(&value) {
                    Ok(grant) => grant,
                    Err(error) => {
                        debug!("Ignoring InternalsVisibleTo '{}' of {}: {}", value, identity.name, error);
                        continue;
                    }
                };

                match index.find_by_grant(&grant) {
                    Some(friend) if !plan.contains(&friend.identity) => {
                        let descriptor = self.rekeyed(friend, BinaryKind::Friend, key)?;
                        worklist.push((friend.identity.clone(), friend.path.clone()));
                        plan.insert(descriptor);
                    }
                    Some(_) => {}
                    None => debug!(
                        "InternalsVisibleTo '{}' of {} names no referenced assembly",
                        value, identity.name
                    ),
                }
            }
        }

        self.add_satellites(plan, key)
    }

    fn friends_of(&self, path: &Path, index: &ReferenceIndex) -> Vec<String> {
        if let Some(info) = index.get(path) {
            return info.friends.clone();
        }

        match self.reader.read(path) {
            Ok(info) => info.friends,
            Err(error) => {
                debug!("Can not read friends of {}: {}", path.display(), error);
                Vec::new()
            }
        }
    }

    /// A dependent or friend: keeps its name, is re-keyed and goes to the output root.
    fn rekeyed(
        &self,
        info: &AssemblyInfo,
        kind: BinaryKind,
        key: &StrongNameKey,
    ) -> Result<BinaryDescriptor> {
        let file_name = info
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.dll", info.identity.name)));

        let mut descriptor = BinaryDescriptor::new(
            info.path.clone(),
            info.identity.clone(),
            info.identity.name.clone(),
            self.config.shaded_dir().join(file_name),
            PathBuf::new(),
            kind,
            key,
        );
        descriptor.grant_before = self.grant_before(&descriptor)?;

        Ok(descriptor)
    }

    fn add_satellites(&self, plan: &mut ShadingPlan, key: &StrongNameKey) -> Result<()> {
        let owners: Vec<BinaryDescriptor> = plan
            .iter()
            .filter(|descriptor| descriptor.kind != BinaryKind::Satellite)
            .cloned()
            .collect();

        for owner in owners {
            let Some(owner_dir) = owner.original_path.parent() else {
                continue;
            };
            let output_dir = owner
                .shaded_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();

            for path in self.reader.satellites(&owner.original_path) {
                let info = match self.reader.read(&path) {
                    Ok(info) => info,
                    Err(error) => {
                        debug!("Skipping unreadable satellite {}: {}", path.display(), error);
                        continue;
                    }
                };
                if plan.contains(&info.identity) {
                    continue;
                }

                let relative = path
                    .parent()
                    .and_then(|parent| parent.strip_prefix(owner_dir).ok())
                    .map(Path::to_path_buf)
                    .unwrap_or_default();

                let name = if owner.is_renamed() {
                    format!("{}.resources", owner.shaded_identity.name)
                } else {
                    info.identity.name.clone()
                };

                let mut descriptor = BinaryDescriptor::new(
                    info.path,
                    info.identity,
                    name.clone(),
                    output_dir.join(&relative).join(format!("{name}.dll")),
                    owner.subdirectory.join(&relative),
                    BinaryKind::Satellite,
                    key,
                );
                descriptor.package = owner.package.clone();
                descriptor.grant_before = self.grant_before(&descriptor)?;

                plan.insert(descriptor);
            }
        }

        Ok(())
    }

    /// The grant naming the original binary, shared through the cache when one is configured.
    ///
    /// Identities carrying only a token are read again for their full public key.
    fn grant_before(&self, descriptor: &BinaryDescriptor) -> Result<FriendGrant> {
        let compute = || -> Result<FriendGrant> {
            let identity = &descriptor.identity;
            if identity.strong_name.is_some() && identity.public_key().is_none() {
                let info = self.reader.read(&descriptor.original_path)?;
                return Ok(info.grant());
            }
            Ok(descriptor.grant_before.clone())
        };

        match self.cache {
            Some(cache) => Ok((*cache.grant(&descriptor.identity, compute)?).clone()),
            None => compute(),
        }
    }
}
