use std::collections::HashMap;

use log::{debug, info};

use crate::{
    metadata::{
        assemblyview::InternalsVisibleTo,
        identity::{AssemblyIdentity, FriendGrant},
        writer::{AssemblyEdits, AttributeEdit, ReferenceEdit},
    },
    shading::{BinaryDescriptor, ShadingPlan},
};

/// The complete original-to-shaded mapping of a plan, built before any binary is touched.
///
/// Every binary is patched against the final mapping, so binaries can be rewritten in any
/// order and in parallel.
#[derive(Debug, Clone, Default)]
pub struct ShadeLookup {
    identities: HashMap<AssemblyIdentity, AssemblyIdentity>,
    grants: Vec<(FriendGrant, FriendGrant)>,
    token: [u8; 8],
}

impl ShadeLookup {
    /// Build the lookup of `plan`; references are re-keyed to `token`.
    #[must_use]
    pub fn new(plan: &ShadingPlan, token: [u8; 8]) -> Self {
        ShadeLookup {
            identities: plan
                .iter()
                .map(|descriptor| (descriptor.identity.clone(), descriptor.shaded_identity.clone()))
                .collect(),
            grants: plan
                .iter()
                .map(|descriptor| (descriptor.grant_before.clone(), descriptor.grant_after.clone()))
                .collect(),
            token,
        }
    }

    /// The shaded identity of a reference to `identity`.
    #[must_use]
    pub fn shaded(&self, identity: &AssemblyIdentity) -> Option<&AssemblyIdentity> {
        self.identities.get(identity)
    }

    /// The replacement of the `InternalsVisibleTo` value `value`.
    #[must_use]
    pub fn shaded_grant(&self, value: &str) -> Option<&FriendGrant> {
        let declared = FriendGrant::parse(value).ok()?;
        self.grants
            .iter()
            .find(|(before, _)| before.matches(&declared))
            .map(|(_, after)| after)
    }

    /// The edits turning `descriptor`'s binary, with `references` and `friends`, into its
    /// shaded form.
    ///
    /// References to binaries outside the plan and friend declarations without a planned
    /// replacement stay as they are.
    #[must_use]
    pub fn edits(
        &self,
        descriptor: &BinaryDescriptor,
        references: &[AssemblyIdentity],
        friends: &[InternalsVisibleTo],
    ) -> AssemblyEdits {
        let mut edits = AssemblyEdits {
            name: descriptor
                .is_renamed()
                .then(|| descriptor.shaded_identity.name.clone()),
            ..AssemblyEdits::default()
        };

        for (row, reference) in (1_u32..).zip(references) {
            let Some(shaded) = self.shaded(reference) else {
                continue;
            };

            info!(
                "  Reference: {} -> {}",
                reference.display_name(),
                shaded.display_name()
            );
            edits.references.push(ReferenceEdit {
                row,
                name: shaded.name.clone(),
                public_key_token: self.token,
            });
        }

        for friend in friends {
            match self.shaded_grant(&friend.value) {
                Some(replacement) => {
                    let value = replacement.to_string();
                    info!("  InternalsVisibleTo: {} -> {}", friend.value, value);
                    edits.attributes.push(AttributeEdit {
                        row: friend.row,
                        value,
                    });
                }
                None => debug!("  Keeping InternalsVisibleTo: {}", friend.value),
            }
        }

        edits
    }
}
