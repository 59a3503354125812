use std::{collections::HashMap, path::PathBuf};

use log::debug;
use serde::Serialize;

use crate::shading::{
    AssemblyReader, BinaryDescriptor, BinaryKind, ResolvedReference, ShadingPlan,
};

/// One planned binary as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyToShade {
    /// Output path of the shaded binary
    pub shaded_path: PathBuf,
    /// Path of the original binary
    pub original_path: PathBuf,
    /// Display name of the original binary
    pub assembly_name: String,
    /// Display name of the shaded binary
    pub shaded_assembly_name: String,
    /// `InternalsVisibleTo` value naming the original binary
    pub internals_visible_to: String,
    /// `InternalsVisibleTo` value naming the shaded binary
    pub shaded_internals_visible_to: String,
    /// Destination subdirectory, empty for the output folder itself
    pub destination_subdirectory: PathBuf,
    /// How the binary entered the plan
    pub kind: BinaryKind,
}

impl From<&BinaryDescriptor> for AssemblyToShade {
    fn from(descriptor: &BinaryDescriptor) -> Self {
        AssemblyToShade {
            shaded_path: descriptor.shaded_path.clone(),
            original_path: descriptor.original_path.clone(),
            assembly_name: descriptor.identity.display_name(),
            shaded_assembly_name: descriptor.shaded_identity.display_name(),
            internals_visible_to: descriptor.grant_before.to_string(),
            shaded_internals_visible_to: descriptor.grant_after.to_string(),
            destination_subdirectory: descriptor.subdirectory.clone(),
            kind: descriptor.kind,
        }
    }
}

/// A reference item to remove from or add to the consuming project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceItem {
    /// Path of the referenced binary
    pub path: PathBuf,
    /// Hint path of an added reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_path: Option<PathBuf>,
    /// The binary an added reference replaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
}

/// What the host needs to repoint the consuming project at the shaded binaries.
///
/// Reference changes are split by whether the original reference came from a
/// project-to-project reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOutputs {
    /// Every planned binary
    pub assemblies_to_shade: Vec<AssemblyToShade>,
    /// Package references replaced by shaded binaries
    pub references_to_remove: Vec<ReferenceItem>,
    /// Shaded binaries replacing package references
    pub references_to_add: Vec<ReferenceItem>,
    /// Project references replaced by shaded binaries
    pub project_references_to_remove: Vec<ReferenceItem>,
    /// Shaded binaries replacing project references
    pub project_references_to_add: Vec<ReferenceItem>,
}

impl HostOutputs {
    /// Compute the host outputs of `plan`.
    ///
    /// `references` are matched to planned binaries by the display name read with `reader`;
    /// references that can not be read are ignored.
    pub fn compute(
        plan: &ShadingPlan,
        references: &[ResolvedReference],
        reader: &dyn AssemblyReader,
    ) -> Self {
        let mut by_name: HashMap<String, Vec<&ResolvedReference>> = HashMap::new();
        for reference in references {
            match reader.read(&reference.path) {
                Ok(info) => by_name
                    .entry(info.identity.display_name().to_ascii_lowercase())
                    .or_default()
                    .push(reference),
                Err(error) => debug!("Ignoring reference {}: {}", reference.path.display(), error),
            }
        }

        let mut outputs = HostOutputs::default();
        for descriptor in plan {
            outputs.assemblies_to_shade.push(descriptor.into());

            let name = descriptor.identity.display_name().to_ascii_lowercase();
            let Some(existing) = by_name.get(&name) else {
                continue;
            };

            for reference in existing {
                let item = ReferenceItem {
                    path: reference.path.clone(),
                    hint_path: None,
                    original_path: None,
                };
                if reference.project_reference {
                    outputs.project_references_to_remove.push(item);
                } else {
                    outputs.references_to_remove.push(item);
                }
            }

            let addition = ReferenceItem {
                path: descriptor.shaded_path.clone(),
                hint_path: Some(descriptor.shaded_path.clone()),
                original_path: Some(descriptor.original_path.clone()),
            };
            if existing.first().is_some_and(|first| first.project_reference) {
                outputs.project_references_to_add.push(addition);
            } else {
                outputs.references_to_add.push(addition);
            }
        }

        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::identity::AssemblyIdentity,
        shading::{AssemblyInfo, MemoryAssemblyReader},
        test::test_key,
    };

    fn identity(name: &str) -> AssemblyIdentity {
        AssemblyIdentity::parse(&format!("{name}, Version=1.0.0.0")).unwrap()
    }

    fn descriptor(name: &str, original: &str) -> BinaryDescriptor {
        BinaryDescriptor::new(
            PathBuf::from(original),
            identity(name),
            format!("{name}.1.0.0.0"),
            PathBuf::from(format!("/obj/ShadedAssemblies/{name}.1.0.0.0.dll")),
            PathBuf::new(),
            BinaryKind::Package,
            test_key(),
        )
    }

    #[test]
    fn partitions_references() {
        let mut plan = ShadingPlan::new();
        plan.insert(descriptor("Json", "/pkgs/Json.dll"));
        plan.insert(descriptor("Shared", "/src/Shared/bin/Shared.dll"));
        plan.insert(descriptor("Unreferenced", "/pkgs/Unreferenced.dll"));

        let reader = MemoryAssemblyReader::new()
            .with(AssemblyInfo::new("/pkgs/Json.dll", identity("Json")))
            .with(AssemblyInfo::new("/copy/Json.dll", identity("json")))
            .with(AssemblyInfo::new("/src/Shared/bin/Shared.dll", identity("Shared")))
            .with(AssemblyInfo::new("/bin/App.dll", identity("App")));

        let references = [
            ResolvedReference::new("/pkgs/Json.dll"),
            ResolvedReference::new("/copy/Json.dll"),
            ResolvedReference::project("/src/Shared/bin/Shared.dll"),
            ResolvedReference::new("/bin/App.dll"),
            ResolvedReference::new("/bin/Missing.dll"),
        ];

        let outputs = HostOutputs::compute(&plan, &references, &reader);

        assert_eq!(outputs.assemblies_to_shade.len(), 3);
        assert_eq!(
            outputs.assemblies_to_shade[0].shaded_assembly_name,
            format!(
                "Json.1.0.0.0, Version=1.0.0.0, Culture=neutral, PublicKeyToken={}",
                hex::encode(test_key().public_key_token())
            )
        );

        let removed: Vec<_> = outputs.references_to_remove.iter().map(|item| item.path.clone()).collect();
        assert_eq!(removed, vec![PathBuf::from("/pkgs/Json.dll"), PathBuf::from("/copy/Json.dll")]);
        assert_eq!(outputs.references_to_add.len(), 1);
        assert_eq!(
            outputs.references_to_add[0].hint_path,
            Some(PathBuf::from("/obj/ShadedAssemblies/Json.1.0.0.0.dll"))
        );
        assert_eq!(outputs.references_to_add[0].original_path, Some(PathBuf::from("/pkgs/Json.dll")));

        assert_eq!(outputs.project_references_to_remove.len(), 1);
        assert_eq!(outputs.project_references_to_add.len(), 1);

        let json = serde_json::to_value(&outputs).unwrap();
        assert_eq!(json["assembliesToShade"][0]["kind"], "Package");
        assert!(json["referencesToRemove"][0].get("hintPath").is_none());
    }
}
