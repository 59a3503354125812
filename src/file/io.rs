//! Low-level byte order and safe reading/writing utilities for PE and metadata parsing.
//!
//! Every helper is bounds-checked and reports [`crate::Error::OutOfBounds`] instead of
//! panicking. All values in PE images and CLI metadata are little-endian.

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to little-endian buffers.
pub trait CilIO: Sized + Copy {
    /// The fixed size byte array backing this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build the value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode the value to its little-endian representation
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, u16, u32, u64, i32);

/// Read a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a value of type `T` at `offset`, advancing the offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Read a heap or table index that is either 2 or 4 bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Overwrite the value of type `T` at `offset`, advancing the offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write would exceed `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Overwrite the value of type `T` at a fixed `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write would exceed `data`.
pub fn write_le<T: CilIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let mut offset = offset;
    write_le_at(data, &mut offset, value)
}

/// Append a value of type `T` to a growing buffer.
pub fn push_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Append a heap or table index as either 2 or 4 bytes.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if a small index does not fit into 16 bits.
pub fn push_le_dyn(buffer: &mut Vec<u8>, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        push_le::<u32>(buffer, value);
    } else {
        let Ok(value) = u16::try_from(value) else {
            return Err(OutOfBounds);
        };
        push_le::<u16>(buffer, value);
    }

    Ok(())
}
