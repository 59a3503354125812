//! Strong naming: key pairs, public key tokens and image signatures.
//!
//! # Key Components
//!
//! - [`StrongNameKey`] - an RSA key pair with its public key blob and token
//! - [`public_key_token`] - the 8-byte token of a public key blob
//! - [`sign_image`] / [`verify_image`] - strong-name signatures of PE images
//!
//! # Public key tokens
//!
//! The token of a public key blob is the last 8 bytes of its SHA-1 digest in reverse order.
//!
//! ```rust
//! use dotshade::strongname::public_key_token;
//!
//! // The ECMA standard public key
//! let ecma = [0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
//! assert_eq!(hex::encode(public_key_token(&ecma)), "b77a5c561934e089");
//! ```

mod key;
mod signer;

use sha1::{Digest, Sha1};

pub use key::{decode_public_key_blob, encode_public_key_blob, StrongNameKey, DEFAULT_KEY_BITS};
pub use signer::{sign_image, strong_name_hash, verify_image};

/// Compute the public key token of `public_key_blob`.
#[must_use]
pub fn public_key_token(public_key_blob: &[u8]) -> [u8; 8] {
    let digest = Sha1::digest(public_key_blob);

    let mut token = [0_u8; 8];
    token.copy_from_slice(&digest[12..]);
    token.reverse();
    token
}
