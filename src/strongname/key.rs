//! Strong-name key pairs.
//!
//! Keys come from three sources: a freshly generated 1024-bit RSA key, a `.snk` file holding a
//! CryptoAPI `PRIVATEKEYBLOB`, or a PKCS#8 document (DER or PEM, optionally encrypted).
//!
//! ```text
//! PRIVATEKEYBLOB                      Public key blob (Assembly table)
//! 07 02 00 00  type, version          00 24 00 00  SigAlgId (CALG_RSA_SIGN)
//! 00 24 00 00  CALG_RSA_SIGN          04 80 00 00  HashAlgId (CALG_SHA1)
//! "RSA2"       magic                  cb           length of the PUBLICKEYBLOB
//! bitlen       modulus bits           06 02 00 00  type, version
//! pubexp       public exponent        00 24 00 00  CALG_RSA_SIGN
//! modulus      bitlen/8               "RSA1"       magic
//! prime1       bitlen/16              bitlen, pubexp
//! prime2       bitlen/16              modulus      bitlen/8
//! exponent1    bitlen/16
//! exponent2    bitlen/16
//! coefficient  bitlen/16
//! privateExp   bitlen/8
//! ```
//!
//! All integers are little-endian.

use std::{fmt, fs, path::Path};

use rsa::{
    pkcs8::DecodePrivateKey,
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};

use crate::{
    file::{
        io::{push_le, read_le_at},
        parser::Parser,
    },
    strongname::public_key_token,
    Error::KeyMaterial,
    Result,
};

/// Size of generated keys in bits
pub const DEFAULT_KEY_BITS: usize = 1024;

const PRIVATE_KEY_BLOB: u8 = 0x07;
const PUBLIC_KEY_BLOB: u8 = 0x06;
const BLOB_VERSION: u8 = 0x02;
const CALG_RSA_SIGN: u32 = 0x0000_2400;
const CALG_SHA1: u32 = 0x0000_8004;
const MAGIC_RSA1: u32 = 0x3141_5352;
const MAGIC_RSA2: u32 = 0x3241_5352;

/// An RSA key pair used to strong-name sign shaded assemblies.
#[derive(Clone)]
pub struct StrongNameKey {
    private_key: RsaPrivateKey,
    public_key_blob: Vec<u8>,
    public_key_token: [u8; 8],
}

impl fmt::Debug for StrongNameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongNameKey")
            .field("bits", &(self.signature_size() * 8))
            .field("public_key_token", &hex::encode(self.public_key_token))
            .finish_non_exhaustive()
    }
}

impl StrongNameKey {
    /// Generate a new 1024-bit key pair with public exponent 65537.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, DEFAULT_KEY_BITS)?;
        Self::from_private_key(private_key)
    }

    /// Wrap an existing RSA private key.
    ///
    /// # Errors
    /// Returns an error if the key is too large for a public key blob.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key_blob = encode_public_key_blob(&private_key.to_public_key())?;
        let public_key_token = public_key_token(&public_key_blob);

        Ok(StrongNameKey {
            private_key,
            public_key_blob,
            public_key_token,
        })
    }

    /// Load a key pair from a file.
    ///
    /// Files starting with a `PRIVATEKEYBLOB` header are read as `.snk`, everything else as
    /// PKCS#8 unlocked with `password`.
    ///
    /// # Errors
    /// Returns an error if the file can not be read or holds no usable private key.
    pub fn load(path: &Path, password: Option<&str>) -> Result<Self> {
        let data = fs::read(path)?;
        match data.first() {
            Some(&PRIVATE_KEY_BLOB | &PUBLIC_KEY_BLOB) => Self::from_snk(&data),
            Some(_) => Self::from_pkcs8(&data, password),
            None => Err(KeyMaterial(format!("{} is empty", path.display()))),
        }
    }

    /// Read a `.snk` key pair.
    ///
    /// # Errors
    /// Returns an error for public-only blobs and for truncated or inconsistent key material.
    pub fn from_snk(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);

        let blob_type = parser.read_le::<u8>()?;
        if blob_type == PUBLIC_KEY_BLOB {
            return Err(KeyMaterial(
                "the key file only holds a public key, delay signing is not supported".to_string(),
            ));
        }
        if blob_type != PRIVATE_KEY_BLOB || parser.read_le::<u8>()? != BLOB_VERSION {
            return Err(KeyMaterial("not a PRIVATEKEYBLOB".to_string()));
        }

        let _reserved = parser.read_le::<u16>()?;
        let _algorithm = parser.read_le::<u32>()?;
        if parser.read_le::<u32>()? != MAGIC_RSA2 {
            return Err(KeyMaterial("missing RSA2 magic".to_string()));
        }

        let bits = parser.read_le::<u32>()? as usize;
        if bits == 0 || bits % 16 != 0 {
            return Err(KeyMaterial(format!("invalid key length - {bits}")));
        }

        let exponent = BigUint::from(parser.read_le::<u32>()?);
        let mut read_integer =
            |len: usize| -> Result<BigUint> { Ok(BigUint::from_bytes_le(parser.read_bytes(len)?)) };

        let modulus = read_integer(bits / 8)?;
        let prime1 = read_integer(bits / 16)?;
        let prime2 = read_integer(bits / 16)?;
        let _exponent1 = read_integer(bits / 16)?;
        let _exponent2 = read_integer(bits / 16)?;
        let _coefficient = read_integer(bits / 16)?;
        let private_exponent = read_integer(bits / 8)?;

        let private_key = RsaPrivateKey::from_components(
            modulus,
            exponent,
            private_exponent,
            vec![prime1, prime2],
        )?;
        private_key.validate()?;

        Self::from_private_key(private_key)
    }

    /// Read a PKCS#8 private key in DER or PEM form, decrypting it with `password` if given.
    ///
    /// # Errors
    /// Returns an error if the document can not be decoded or decrypted.
    pub fn from_pkcs8(data: &[u8], password: Option<&str>) -> Result<Self> {
        let pem = std::str::from_utf8(data)
            .ok()
            .filter(|text| text.trim_start().starts_with("-----BEGIN"));

        let private_key = match (pem, password) {
            (Some(pem), Some(password)) => {
                RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password.as_bytes())
            }
            (Some(pem), None) => RsaPrivateKey::from_pkcs8_pem(pem),
            (None, Some(password)) => {
                RsaPrivateKey::from_pkcs8_encrypted_der(data, password.as_bytes())
            }
            (None, None) => RsaPrivateKey::from_pkcs8_der(data),
        }
        .map_err(|error| KeyMaterial(format!("invalid PKCS#8 key - {error}")))?;

        Self::from_private_key(private_key)
    }

    /// The public key blob stored in the `Assembly` table of signed assemblies.
    #[must_use]
    pub fn public_key_blob(&self) -> &[u8] {
        &self.public_key_blob
    }

    /// The public key token derived from [`Self::public_key_blob`].
    #[must_use]
    pub fn public_key_token(&self) -> [u8; 8] {
        self.public_key_token
    }

    /// Size of a signature in bytes, equal to the modulus size.
    #[must_use]
    pub fn signature_size(&self) -> usize {
        self.private_key.size()
    }

    /// Sign a SHA-1 `digest` with PKCS#1 v1.5 padding.
    ///
    /// The signature is returned little-endian, as stored in a strong-name signature slot.
    ///
    /// # Errors
    /// Returns an error if the digest has the wrong length.
    pub fn sign_hash(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let mut signature = self
            .private_key
            .sign(Pkcs1v15Sign::new::<::sha1::Sha1>(), digest)
            .map_err(|error| crate::Error::Signing(error.to_string()))?;

        signature.reverse();
        Ok(signature)
    }

    /// Export the key pair as a `.snk` `PRIVATEKEYBLOB`.
    ///
    /// # Errors
    /// Returns an error if the key does not have exactly two primes or a 32-bit exponent.
    pub fn export_snk(&self) -> Result<Vec<u8>> {
        let key = &self.private_key;
        let [prime1, prime2] = key.primes() else {
            return Err(KeyMaterial("only two-prime keys can be exported".to_string()));
        };

        let bits = key.size() * 8;
        let half = bits / 16;
        let one = BigUint::from(1_u32);
        let two = BigUint::from(2_u32);
        let exponent1 = key.d() % &(prime1 - &one);
        let exponent2 = key.d() % &(prime2 - &one);
        // prime1 is prime, so prime2^(prime1 - 2) is the inverse of prime2
        let coefficient = prime2.modpow(&(prime1 - &two), prime1);

        let mut blob = Vec::with_capacity(20 + bits / 8 * 2 + half * 5);
        blob.extend_from_slice(&[PRIVATE_KEY_BLOB, BLOB_VERSION, 0, 0]);
        push_le::<u32>(&mut blob, CALG_RSA_SIGN);
        push_le::<u32>(&mut blob, MAGIC_RSA2);
        push_le::<u32>(&mut blob, to_u32(bits)?);
        push_le::<u32>(&mut blob, exponent_u32(key.e())?);

        push_integer(&mut blob, key.n(), bits / 8)?;
        push_integer(&mut blob, prime1, half)?;
        push_integer(&mut blob, prime2, half)?;
        push_integer(&mut blob, &exponent1, half)?;
        push_integer(&mut blob, &exponent2, half)?;
        push_integer(&mut blob, &coefficient, half)?;
        push_integer(&mut blob, key.d(), bits / 8)?;

        Ok(blob)
    }
}

/// Encode `key` as a strong-name public key blob.
///
/// # Errors
/// Returns an error if the public exponent does not fit 32 bits.
pub fn encode_public_key_blob(key: &RsaPublicKey) -> Result<Vec<u8>> {
    let modulus_len = key.size();
    let bits = modulus_len * 8;

    let mut blob = Vec::with_capacity(32 + modulus_len);
    push_le::<u32>(&mut blob, CALG_RSA_SIGN);
    push_le::<u32>(&mut blob, CALG_SHA1);
    push_le::<u32>(&mut blob, to_u32(20 + modulus_len)?);
    blob.extend_from_slice(&[PUBLIC_KEY_BLOB, BLOB_VERSION, 0, 0]);
    push_le::<u32>(&mut blob, CALG_RSA_SIGN);
    push_le::<u32>(&mut blob, MAGIC_RSA1);
    push_le::<u32>(&mut blob, to_u32(bits)?);
    push_le::<u32>(&mut blob, exponent_u32(key.e())?);
    push_integer(&mut blob, key.n(), modulus_len)?;

    Ok(blob)
}

/// Decode a strong-name public key blob into an RSA public key.
///
/// # Errors
/// Returns an error if the blob is truncated or does not hold an RSA1 key.
pub fn decode_public_key_blob(blob: &[u8]) -> Result<RsaPublicKey> {
    let mut offset = 12;
    let blob_type = read_le_at::<u8>(blob, &mut offset)?;
    offset = 20;
    let magic = read_le_at::<u32>(blob, &mut offset)?;
    if blob_type != PUBLIC_KEY_BLOB || magic != MAGIC_RSA1 {
        return Err(KeyMaterial("not an RSA public key blob".to_string()));
    }

    let bits = read_le_at::<u32>(blob, &mut offset)? as usize;
    let exponent = read_le_at::<u32>(blob, &mut offset)?;
    let Some(modulus) = blob.get(offset..offset + bits / 8) else {
        return Err(KeyMaterial("public key blob is truncated".to_string()));
    };

    Ok(RsaPublicKey::new(
        BigUint::from_bytes_le(modulus),
        BigUint::from(exponent),
    )?)
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| KeyMaterial(format!("key too large - {value}")))
}

fn exponent_u32(exponent: &BigUint) -> Result<u32> {
    let bytes = exponent.to_bytes_le();
    if bytes.len() > 4 {
        return Err(KeyMaterial("public exponent exceeds 32 bits".to_string()));
    }

    let mut value = [0_u8; 4];
    value[..bytes.len()].copy_from_slice(&bytes);
    Ok(u32::from_le_bytes(value))
}

fn push_integer(buffer: &mut Vec<u8>, value: &BigUint, len: usize) -> Result<()> {
    let mut bytes = value.to_bytes_le();
    if bytes.len() > len {
        return Err(KeyMaterial(format!(
            "integer of {} bytes exceeds its {} byte field",
            bytes.len(),
            len
        )));
    }

    bytes.resize(len, 0);
    buffer.extend_from_slice(&bytes);
    Ok(())
}
