//! Strong-name hashing and signing of PE images.
//!
//! The signed hash covers the PE headers up to the end of the section table, with the checksum
//! and the certificate directory zeroed, followed by the raw data of every section in table
//! order. The signature slot itself is skipped, so signing does not change the hash.

use sha1::{Digest, Sha1};
use rsa::Pkcs1v15Sign;

use crate::{
    file::{
        io::{read_le, write_le},
        layout::{PeLayout, DIRECTORY_CLR, DIRECTORY_SECURITY},
    },
    metadata::cor20header::{ComImageFlags, Cor20Header, COR20_FLAGS_OFFSET, COR20_HEADER_SIZE},
    strongname::{decode_public_key_blob, StrongNameKey},
    Error::{OutOfBounds, Signing},
    Result,
};

/// Location of the CLI header and the signature slot of an image.
struct SignatureSlot {
    cor20_offset: usize,
    offset: usize,
    size: usize,
}

fn signature_slot(image: &[u8], layout: &PeLayout) -> Result<SignatureSlot> {
    let (clr_rva, _) = layout.directory(image, DIRECTORY_CLR)?;
    let cor20_offset = layout.rva_to_offset(clr_rva)?;
    let header = Cor20Header::read(
        image
            .get(cor20_offset..cor20_offset + COR20_HEADER_SIZE)
            .ok_or(OutOfBounds)?,
    )?;

    if header.strong_name_signature_rva == 0 {
        return Err(Signing("image has no strong-name signature slot".to_string()));
    }

    let offset = layout.rva_to_offset(header.strong_name_signature_rva)?;
    let size = header.strong_name_signature_size as usize;
    if offset + size > image.len() {
        return Err(OutOfBounds);
    }

    Ok(SignatureSlot {
        cor20_offset,
        offset,
        size,
    })
}

/// Compute the strong-name hash of `image`.
///
/// # Errors
/// Returns an error if the headers are invalid or the image has no signature slot.
pub fn strong_name_hash(image: &[u8]) -> Result<[u8; 20]> {
    let layout = PeLayout::parse(image)?;
    let slot = signature_slot(image, &layout)?;

    let mut headers = image
        .get(..layout.section_table_end())
        .ok_or(OutOfBounds)?
        .to_vec();
    write_le(&mut headers, layout.checksum_offset(), 0_u32)?;
    if layout.directory_count as usize > DIRECTORY_SECURITY {
        write_le(&mut headers, layout.directory_offset(DIRECTORY_SECURITY)?, 0_u64)?;
    }

    let mut hasher = Sha1::new();
    hasher.update(&headers);

    let slot_end = slot.offset + slot.size;
    for section in &layout.sections {
        let start = section.pointer_to_raw_data as usize;
        let end = start + section.size_of_raw_data as usize;
        let data = image.get(start..end).ok_or(OutOfBounds)?;

        if slot.offset >= start && slot_end <= end {
            hasher.update(&data[..slot.offset - start]);
            hasher.update(&data[slot_end - start..]);
        } else {
            hasher.update(data);
        }
    }

    Ok(hasher.finalize().into())
}

/// Strong-name sign `image` in place with `key`.
///
/// Sets the `StrongNameSigned` flag of the CLI header, then fills the signature slot.
///
/// # Errors
/// Returns an error if the slot is missing or its size does not match the key.
pub fn sign_image(image: &mut [u8], key: &StrongNameKey) -> Result<()> {
    let layout = PeLayout::parse(image)?;
    let slot = signature_slot(image, &layout)?;
    if slot.size != key.signature_size() {
        return Err(Signing(format!(
            "signature slot of {} bytes does not fit a {} byte signature",
            slot.size,
            key.signature_size()
        )));
    }

    let flags_offset = slot.cor20_offset + COR20_FLAGS_OFFSET;
    let flags = ComImageFlags::from_bits_retain(read_le::<u32>(
        image.get(flags_offset..).ok_or(OutOfBounds)?,
    )?);
    write_le(
        image,
        flags_offset,
        (flags | ComImageFlags::STRONG_NAME_SIGNED).bits(),
    )?;

    let digest = strong_name_hash(image)?;
    let signature = key.sign_hash(&digest)?;
    image[slot.offset..slot.offset + slot.size].copy_from_slice(&signature);

    Ok(())
}

/// Verify the strong-name signature of `image` against `public_key_blob`.
///
/// # Errors
/// Returns an error if the image is unsigned or the signature does not match.
pub fn verify_image(image: &[u8], public_key_blob: &[u8]) -> Result<()> {
    let layout = PeLayout::parse(image)?;
    let slot = signature_slot(image, &layout)?;
    let public_key = decode_public_key_blob(public_key_blob)?;

    let mut signature = image[slot.offset..slot.offset + slot.size].to_vec();
    signature.reverse();

    let digest = strong_name_hash(image)?;
    public_key
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
        .map_err(|error| Signing(format!("signature does not verify - {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{test_key, ImageBuilder};

    #[test]
    fn sign_and_verify() {
        let key = test_key();
        let mut image = ImageBuilder::new("Signed")
            .signature_slot(key.signature_size())
            .build();

        let unsigned_hash = strong_name_hash(&image).unwrap();
        sign_image(&mut image, &key).unwrap();

        verify_image(&image, key.public_key_blob()).unwrap();

        // Only the flag changed inside the hashed ranges
        assert_ne!(strong_name_hash(&image).unwrap(), unsigned_hash);

        let other = StrongNameKey::generate().unwrap();
        assert!(verify_image(&image, other.public_key_blob()).is_err());
    }

    #[test]
    fn tampering_breaks_signature() {
        let key = test_key();
        let mut image = ImageBuilder::new("Tampered")
            .signature_slot(key.signature_size())
            .build();
        sign_image(&mut image, &key).unwrap();

        let last = image.len() - 1;
        image[last] ^= 0xFF;
        assert!(verify_image(&image, key.public_key_blob()).is_err());
    }

    #[test]
    fn checksum_is_not_hashed() {
        let key = test_key();
        let mut image = ImageBuilder::new("Checksum")
            .signature_slot(key.signature_size())
            .build();
        let before = strong_name_hash(&image).unwrap();

        let layout = PeLayout::parse(&image).unwrap();
        write_le(&mut image, layout.checksum_offset(), 0x1234_u32).unwrap();
        assert_eq!(strong_name_hash(&image).unwrap(), before);
    }

    #[test]
    fn slot_must_fit_key() {
        let key = test_key();
        let mut image = ImageBuilder::new("Small").signature_slot(64).build();
        assert!(matches!(sign_image(&mut image, &key), Err(Signing(_))));

        let mut unsigned = ImageBuilder::new("Unsigned").build();
        assert!(sign_image(&mut unsigned, &key).is_err());
    }
}
