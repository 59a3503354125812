//! Target frameworks and the selection of a package's binaries.
//!
//! NuGet packages ship one folder per supported framework below `lib/` (`lib/net45`,
//! `lib/netstandard2.0`, `lib/net6.0`). Shading needs the folder a project targeting a given
//! framework would actually consume, which is the *nearest compatible* one.
//!
//! # Key Components
//!
//! - [`Framework`] - Parsed framework folder name or moniker
//! - [`Framework::is_compatible`] - Whether a project can consume a folder
//! - [`nearest`] - Best compatible candidate
//! - [`PackageResolver`] - Locates the binaries of a package, see [`FileSystemResolver`]
//!
//! # Examples
//!
//! ```rust
//! use dotshade::framework::{nearest, Framework};
//!
//! let target = Framework::parse("net6.0")?;
//! let folders = ["net45", "netstandard2.0", "netcoreapp3.1"];
//! let chosen = nearest(&target, folders, |name| Framework::parse(name).ok());
//! assert_eq!(chosen, Some("netcoreapp3.1"));
//! # Ok::<(), dotshade::Error>(())
//! ```

mod resolver;

pub use resolver::{FileSystemResolver, MemoryResolver, PackageBinary, PackageResolver};

use std::fmt;

use crate::{Error::NotSupported, Result};

/// The family of a target framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum FrameworkFamily {
    /// .NET Framework (`net472`, `.NETFramework,Version=v4.7.2`)
    NetFramework,
    /// .NET Standard (`netstandard2.0`)
    NetStandard,
    /// .NET Core up to 3.1 (`netcoreapp3.1`)
    NetCoreApp,
    /// .NET 5 and later (`net6.0`)
    Net,
}

/// A target framework.
///
/// Equality is structural: `net6.0` and `.NETCoreApp,Version=v6.0` parse to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Framework {
    /// Framework family
    pub family: FrameworkFamily,
    /// Major, minor and patch version
    pub version: (u32, u32, u32),
    /// Lowercase platform name of a platform specific .NET framework (`windows`, `android`)
    pub platform: Option<String>,
}

impl Framework {
    /// Create a platform neutral framework.
    #[must_use]
    pub fn new(family: FrameworkFamily, major: u32, minor: u32, patch: u32) -> Self {
        Framework {
            family,
            version: (major, minor, patch),
            platform: None,
        }
    }

    /// Parse a folder name (`net472`, `netstandard2.0`, `net6.0-windows`) or a moniker
    /// (`.NETFramework,Version=v4.7.2`).
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for frameworks outside the four families, like
    /// portable profiles or `uap10.0`.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.starts_with('.') || value.contains(",version=") {
            return Self::parse_moniker(&value);
        }

        let unsupported = || NotSupported(format!("Unknown target framework '{value}'"));

        if let Some(version) = value.strip_prefix("netcoreapp") {
            let version = parse_version(version).ok_or_else(unsupported)?;
            return Ok(Self::core_or_net(version, None));
        }
        if let Some(version) = value.strip_prefix("netstandard") {
            let version = parse_version(version).ok_or_else(unsupported)?;
            return Ok(Framework {
                family: FrameworkFamily::NetStandard,
                version,
                platform: None,
            });
        }
        if let Some(rest) = value.strip_prefix("net") {
            let (version, suffix) = match rest.split_once('-') {
                Some((version, suffix)) => (version, Some(suffix)),
                None => (rest, None),
            };

            if version.contains('.') {
                let parsed = parse_version(version).ok_or_else(unsupported)?;
                if parsed.0 >= 5 {
                    let platform = suffix
                        .map(|suffix| {
                            suffix
                                .chars()
                                .take_while(char::is_ascii_alphabetic)
                                .collect::<String>()
                        })
                        .filter(|platform| !platform.is_empty());
                    return Ok(Self::core_or_net(parsed, platform));
                }
                return Ok(Framework {
                    family: FrameworkFamily::NetFramework,
                    version: parsed,
                    platform: None,
                });
            }

            // `net40-client` and friends carry a profile, which does not affect selection
            let version = parse_digits(version).ok_or_else(unsupported)?;
            return Ok(Framework {
                family: FrameworkFamily::NetFramework,
                version,
                platform: None,
            });
        }

        Err(unsupported())
    }

    fn parse_moniker(value: &str) -> Result<Self> {
        let mut parts = value.split(',').map(str::trim);
        let identifier = parts.next().unwrap_or_default();
        let version = parts
            .find_map(|part| part.strip_prefix("version="))
            .map(|version| version.trim_start_matches('v'))
            .and_then(parse_version)
            .ok_or_else(|| NotSupported(format!("Moniker without version '{value}'")))?;

        match identifier {
            ".netframework" => Ok(Framework {
                family: FrameworkFamily::NetFramework,
                version,
                platform: None,
            }),
            ".netcoreapp" => Ok(Self::core_or_net(version, None)),
            ".netstandard" => Ok(Framework {
                family: FrameworkFamily::NetStandard,
                version,
                platform: None,
            }),
            _ => Err(NotSupported(format!("Unknown framework identifier '{identifier}'"))),
        }
    }

    fn core_or_net(version: (u32, u32, u32), platform: Option<String>) -> Self {
        let family = if version.0 >= 5 {
            FrameworkFamily::Net
        } else {
            FrameworkFamily::NetCoreApp
        };

        Framework {
            family,
            version,
            platform,
        }
    }

    /// The full moniker, for example `.NETCoreApp,Version=v6.0`.
    #[must_use]
    pub fn moniker(&self) -> String {
        let (major, minor, patch) = self.version;
        match self.family {
            FrameworkFamily::NetFramework if patch != 0 => {
                format!(".NETFramework,Version=v{major}.{minor}.{patch}")
            }
            FrameworkFamily::NetFramework => format!(".NETFramework,Version=v{major}.{minor}"),
            FrameworkFamily::NetStandard => format!(".NETStandard,Version=v{major}.{minor}"),
            FrameworkFamily::NetCoreApp | FrameworkFamily::Net => {
                format!(".NETCoreApp,Version=v{major}.{minor}")
            }
        }
    }

    /// Returns true if a project targeting `self` can consume binaries built for `candidate`.
    #[must_use]
    pub fn is_compatible(&self, candidate: &Framework) -> bool {
        use FrameworkFamily::{Net, NetCoreApp, NetFramework, NetStandard};

        match (self.family, candidate.family) {
            (Net, Net) => {
                candidate.version <= self.version
                    && candidate
                        .platform
                        .as_ref()
                        .map_or(true, |platform| self.platform.as_ref() == Some(platform))
            }
            (Net, NetCoreApp) => true,
            (Net, NetStandard) => candidate.version <= (2, 1, 0),
            (NetCoreApp, NetCoreApp) | (NetFramework, NetFramework) | (NetStandard, NetStandard) => {
                candidate.version <= self.version
            }
            (NetCoreApp, NetStandard) => {
                core_standard_support(self.version).is_some_and(|max| candidate.version <= max)
            }
            (NetFramework, NetStandard) => {
                framework_standard_support(self.version).is_some_and(|max| candidate.version <= max)
            }
            _ => false,
        }
    }

    fn preference(&self, candidate: &Framework) -> (u8, bool, (u32, u32, u32)) {
        let family = if candidate.family == self.family {
            3
        } else if candidate.family == FrameworkFamily::NetStandard {
            1
        } else {
            2
        };

        (family, candidate.platform.is_some(), candidate.version)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.version;
        match self.family {
            FrameworkFamily::NetFramework if patch != 0 => write!(f, "net{major}{minor}{patch}"),
            FrameworkFamily::NetFramework => write!(f, "net{major}{minor}"),
            FrameworkFamily::NetStandard => write!(f, "netstandard{major}.{minor}"),
            FrameworkFamily::NetCoreApp => write!(f, "netcoreapp{major}.{minor}"),
            FrameworkFamily::Net => match &self.platform {
                Some(platform) => write!(f, "net{major}.{minor}-{platform}"),
                None => write!(f, "net{major}.{minor}"),
            },
        }
    }
}

/// Highest .NET Standard version a .NET Core version implements.
fn core_standard_support(version: (u32, u32, u32)) -> Option<(u32, u32, u32)> {
    match version.0 {
        0 => None,
        1 => Some((1, 6, 0)),
        2 => Some((2, 0, 0)),
        _ => Some((2, 1, 0)),
    }
}

/// Highest .NET Standard version a .NET Framework version implements.
fn framework_standard_support(version: (u32, u32, u32)) -> Option<(u32, u32, u32)> {
    if version >= (4, 6, 1) {
        Some((2, 0, 0))
    } else if version >= (4, 6, 0) {
        Some((1, 3, 0))
    } else if version >= (4, 5, 1) {
        Some((1, 2, 0))
    } else if version >= (4, 5, 0) {
        Some((1, 1, 0))
    } else {
        None
    }
}

fn parse_version(value: &str) -> Option<(u32, u32, u32)> {
    if !value.contains('.') {
        return parse_digits(value);
    }

    let mut components = [0_u32; 3];
    for (index, part) in value.split('.').enumerate() {
        let parsed = part.parse().ok()?;
        // Four-part monikers (`v4.0.30319.0`) keep three components
        if let Some(slot) = components.get_mut(index) {
            *slot = parsed;
        }
    }
    Some((components[0], components[1], components[2]))
}

/// `472` is 4.7.2, `48` is 4.8: one digit per component.
fn parse_digits(value: &str) -> Option<(u32, u32, u32)> {
    if value.is_empty() || value.len() > 3 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut components = [0_u32; 3];
    for (slot, digit) in components.iter_mut().zip(value.chars()) {
        *slot = digit.to_digit(10)?;
    }
    Some((components[0], components[1], components[2]))
}

/// Select the candidate a project targeting `target` should consume.
///
/// Among compatible candidates the same family is preferred, then any other family, with .NET
/// Standard last; within a family platform specific builds win over neutral ones, then the
/// highest version. Candidates whose framework can not be determined are ignored. On ties the
/// first candidate wins.
pub fn nearest<T, I, F>(target: &Framework, candidates: I, framework_of: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> Option<Framework>,
{
    let mut best: Option<(T, (u8, bool, (u32, u32, u32)))> = None;

    for candidate in candidates {
        let Some(framework) = framework_of(&candidate) else {
            continue;
        };
        if !target.is_compatible(&framework) {
            continue;
        }

        let rank = target.preference(&framework);
        if best.as_ref().map_or(true, |(_, best_rank)| rank > *best_rank) {
            best = Some((candidate, rank));
        }
    }

    best.map(|(candidate, _)| candidate)
}
