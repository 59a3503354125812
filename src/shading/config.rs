use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Name of the folder below the intermediate output receiving shaded binaries
pub const SHADED_FOLDER: &str = "ShadedAssemblies";

/// Settings of one shading run.
///
/// # Examples
///
/// ```rust
/// use dotshade::shading::ShadeConfig;
/// use std::path::Path;
///
/// let config = ShadeConfig::new("net6.0")
///     .with_moniker(".NETCoreApp,Version=v6.0")
///     .with_fallback("netstandard2.1")
///     .with_intermediate_output("obj/Debug/net6.0");
///
/// assert_eq!(config.shaded_dir(), Path::new("obj/Debug/net6.0/ShadedAssemblies"));
/// ```
#[derive(Debug, Clone)]
pub struct ShadeConfig {
    /// Target framework of the consuming project (`net6.0`)
    pub target_framework: String,
    /// Target framework moniker of the consuming project (`.NETCoreApp,Version=v6.0`)
    pub target_framework_moniker: Option<String>,
    /// Frameworks tried in order when no package folder matches the target framework
    pub fallback_frameworks: Vec<String>,
    /// Root of the extracted packages (`~/.nuget/packages`)
    pub package_root: PathBuf,
    /// Intermediate output directory of the consuming project
    pub intermediate_output: PathBuf,
    /// Key file used to sign shaded binaries, a key is generated when absent
    pub key_file: Option<PathBuf>,
    /// Password of an encrypted key file
    pub key_password: Option<String>,
    /// Central package versions by lowercase package id
    pub central_versions: HashMap<String, String>,
    /// Write shaded binaries in parallel
    pub parallel: bool,
}

impl ShadeConfig {
    /// Create a configuration for a project targeting `target_framework`.
    pub fn new(target_framework: impl Into<String>) -> Self {
        ShadeConfig {
            target_framework: target_framework.into(),
            target_framework_moniker: None,
            fallback_frameworks: Vec::new(),
            package_root: PathBuf::new(),
            intermediate_output: PathBuf::new(),
            key_file: None,
            key_password: None,
            central_versions: HashMap::new(),
            parallel: true,
        }
    }

    /// Set the target framework moniker.
    #[must_use]
    pub fn with_moniker(mut self, moniker: impl Into<String>) -> Self {
        self.target_framework_moniker = Some(moniker.into());
        self
    }

    /// Append a fallback framework.
    #[must_use]
    pub fn with_fallback(mut self, framework: impl Into<String>) -> Self {
        self.fallback_frameworks.push(framework.into());
        self
    }

    /// Set the package root.
    #[must_use]
    pub fn with_package_root(mut self, package_root: impl Into<PathBuf>) -> Self {
        self.package_root = package_root.into();
        self
    }

    /// Set the intermediate output directory.
    #[must_use]
    pub fn with_intermediate_output(mut self, intermediate_output: impl Into<PathBuf>) -> Self {
        self.intermediate_output = intermediate_output.into();
        self
    }

    /// Sign with the key in `key_file`, unlocked with `password`.
    #[must_use]
    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>, password: Option<String>) -> Self {
        self.key_file = Some(key_file.into());
        self.key_password = password;
        self
    }

    /// Record the central version of package `id`.
    #[must_use]
    pub fn with_central_version(mut self, id: &str, version: impl Into<String>) -> Self {
        self.central_versions
            .insert(id.to_ascii_lowercase(), version.into());
        self
    }

    /// Enable or disable parallel writes.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The package root.
    #[must_use]
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// The central version of package `id`, ignoring case.
    #[must_use]
    pub fn central_version(&self, id: &str) -> Option<&str> {
        self.central_versions
            .get(&id.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The directory receiving shaded binaries.
    #[must_use]
    pub fn shaded_dir(&self) -> PathBuf {
        self.intermediate_output.join(SHADED_FOLDER)
    }
}

impl Default for ShadeConfig {
    fn default() -> Self {
        ShadeConfig::new(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_versions_ignore_case() {
        let config = ShadeConfig::new("net472").with_central_version("Newtonsoft.Json", "13.0.1");
        assert_eq!(config.central_version("NEWTONSOFT.JSON"), Some("13.0.1"));
        assert_eq!(config.central_version("Other"), None);
    }

    #[test]
    fn defaults() {
        let config = ShadeConfig::default();
        assert!(config.parallel);
        assert!(config.fallback_frameworks.is_empty());
        assert_eq!(config.shaded_dir(), PathBuf::from(SHADED_FOLDER));
    }
}
