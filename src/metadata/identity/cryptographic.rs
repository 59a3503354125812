use crate::{strongname::public_key_token, Error::OutOfBounds, Result};

/// The strong-name part of an assembly identity: either the full public key or its token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Full public key blob, as stored in the `Assembly` table
    PubKey(Vec<u8>),
    /// 8-byte public key token, as stored in most `AssemblyRef` rows
    Token([u8; 8]),
}

impl Identity {
    /// Create an identity from a `#Blob` value.
    ///
    /// ## Arguments
    /// * 'data'    - The blob content
    /// * 'is_pub'  - True if the blob holds a full public key
    ///
    /// # Errors
    /// Returns an error if a token blob is not 8 bytes long.
    pub fn from(data: &[u8], is_pub: bool) -> Result<Self> {
        if is_pub {
            return Ok(Identity::PubKey(data.to_vec()));
        }

        let token: [u8; 8] = data.try_into().map_err(|_| OutOfBounds)?;
        Ok(Identity::Token(token))
    }

    /// The public key token of this identity.
    #[must_use]
    pub fn token(&self) -> [u8; 8] {
        match self {
            Identity::PubKey(key) => public_key_token(key),
            Identity::Token(token) => *token,
        }
    }

    /// The full public key, if known.
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8]> {
        match self {
            Identity::PubKey(key) => Some(key),
            Identity::Token(_) => None,
        }
    }
}
