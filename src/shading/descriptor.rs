use std::path::PathBuf;

use serde::Serialize;

use crate::{
    assets::PackageIdentity,
    metadata::identity::{AssemblyIdentity, FriendGrant, Identity},
    strongname::StrongNameKey,
};

/// How a binary entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum BinaryKind {
    /// Shipped by a package selected for shading, renamed to `<Name>.<Version>`
    Package,
    /// References a shaded binary, re-keyed under its own name
    Dependent,
    /// Named by an `InternalsVisibleToAttribute` of a shaded binary, re-keyed
    Friend,
    /// Localized resources of a planned binary
    Satellite,
}

/// One binary to shade: where it comes from, what it becomes and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDescriptor {
    /// Path of the original binary
    pub original_path: PathBuf,
    /// Identity of the original binary
    pub identity: AssemblyIdentity,
    /// Identity after shading: new name, same version and culture, the signing key
    pub shaded_identity: AssemblyIdentity,
    /// Output path of the shaded binary
    pub shaded_path: PathBuf,
    /// Destination subdirectory relative to the output folder, empty for the folder itself
    pub subdirectory: PathBuf,
    /// `InternalsVisibleTo` value naming the original binary
    pub grant_before: FriendGrant,
    /// `InternalsVisibleTo` value naming the shaded binary
    pub grant_after: FriendGrant,
    /// How the binary entered the plan
    pub kind: BinaryKind,
    /// The package that ships the binary, for package binaries
    pub package: Option<PackageIdentity>,
}

impl BinaryDescriptor {
    /// Describe shading `identity` at `original_path` to `shaded_name`, signed with `key`.
    ///
    /// The before grant names the original assembly, the after grant the shaded one with the
    /// public key of `key`.
    #[must_use]
    pub fn new(
        original_path: PathBuf,
        identity: AssemblyIdentity,
        shaded_name: String,
        shaded_path: PathBuf,
        subdirectory: PathBuf,
        kind: BinaryKind,
        key: &StrongNameKey,
    ) -> Self {
        let public_key = key.public_key_blob();
        let shaded_identity = AssemblyIdentity::new(
            shaded_name,
            identity.version,
            identity.culture.clone(),
            Some(Identity::PubKey(public_key.to_vec())),
        );

        BinaryDescriptor {
            grant_before: FriendGrant::new(identity.name.as_str(), identity.public_key()),
            grant_after: FriendGrant::new(shaded_identity.name.as_str(), Some(public_key)),
            original_path,
            identity,
            shaded_identity,
            shaded_path,
            subdirectory,
            kind,
            package: None,
        }
    }

    /// Attach the package shipping the binary.
    #[must_use]
    pub fn with_package(mut self, package: PackageIdentity) -> Self {
        self.package = Some(package);
        self
    }

    /// Returns true if shading changes the simple name.
    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.identity.name != self.shaded_identity.name
    }
}

/// The name a package binary is shaded to: the original name followed by its four-part version.
#[must_use]
pub fn shaded_name(identity: &AssemblyIdentity) -> String {
    format!("{}.{}", identity.name, identity.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::identity::AssemblyVersion, test::test_key};

    #[test]
    fn shaded_names() {
        let identity = AssemblyIdentity::new("Newtonsoft.Json", AssemblyVersion::new(12, 0, 0, 0), None, None);
        assert_eq!(shaded_name(&identity), "Newtonsoft.Json.12.0.0.0");
    }

    #[test]
    fn descriptor_identities() {
        let key = test_key();
        let identity = AssemblyIdentity::new(
            "Contoso.Lib",
            AssemblyVersion::new(2, 1, 0, 0),
            Some("de".to_string()),
            Some(Identity::PubKey(vec![1, 2, 3])),
        );

        let descriptor = BinaryDescriptor::new(
            PathBuf::from("/lib/de/Contoso.Lib.dll"),
            identity.clone(),
            shaded_name(&identity),
            PathBuf::from("/obj/ShadedAssemblies/de/Contoso.Lib.2.1.0.0.dll"),
            PathBuf::from("de"),
            BinaryKind::Package,
            key,
        );

        assert!(descriptor.is_renamed());
        assert_eq!(descriptor.shaded_identity.name, "Contoso.Lib.2.1.0.0");
        assert_eq!(descriptor.shaded_identity.version, identity.version);
        assert_eq!(descriptor.shaded_identity.culture_name(), "de");
        assert_eq!(descriptor.shaded_identity.public_key_token(), Some(key.public_key_token()));

        assert_eq!(descriptor.grant_before.to_string(), "Contoso.Lib, PublicKey=010203");
        assert_eq!(
            descriptor.grant_after.to_string(),
            format!("Contoso.Lib.2.1.0.0, PublicKey={}", hex::encode(key.public_key_blob()))
        );
    }

    #[test]
    fn unsigned_grant() {
        let key = test_key();
        let identity = AssemblyIdentity::new("Plain", AssemblyVersion::new(1, 0, 0, 0), None, None);
        let descriptor = BinaryDescriptor::new(
            PathBuf::from("/lib/Plain.dll"),
            identity.clone(),
            identity.name.clone(),
            PathBuf::from("/obj/ShadedAssemblies/Plain.dll"),
            PathBuf::new(),
            BinaryKind::Dependent,
            key,
        );

        assert!(!descriptor.is_renamed());
        assert_eq!(descriptor.grant_before.to_string(), "Plain");
        assert_eq!(descriptor.kind.to_string(), "Dependent");
    }
}
