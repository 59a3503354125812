//! Assembly identities, strong names and friend grants.
//!
//! # Key Components
//!
//! - [`AssemblyIdentity`] - name, version, culture and strong name of an assembly or reference
//! - [`AssemblyVersion`] - four-part version numbering
//! - [`Identity`] - public key or public key token
//! - [`FriendGrant`] - the value of an `InternalsVisibleToAttribute`
//!
//! # ECMA-335 References
//!
//! - **Section II.6.3**: Referencing assemblies
//! - **Section II.22.2**: Assembly table
//! - **Section II.22.5**: AssemblyRef table
//! - **Section II.6.2.1.3**: PublicKeyToken

pub use assembly::{AssemblyIdentity, AssemblyVersion};
pub use cryptographic::Identity;
pub use grant::FriendGrant;

mod assembly;
mod cryptographic;
mod grant;
