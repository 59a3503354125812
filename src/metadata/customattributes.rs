//! Custom attribute value blobs with a single string argument.
//!
//! `InternalsVisibleToAttribute(string)` is the only attribute the shading engine interprets.
//! Its value blob (ECMA-335 II.23.3) is the prolog `0x0001`, the argument as a `SerString`, and
//! a zero count of named arguments.

use crate::{
    file::{
        io::push_le,
        parser::{write_ser_string, Parser},
    },
    Result,
};

/// Namespace of `InternalsVisibleToAttribute`
pub const INTERNALS_VISIBLE_TO_NAMESPACE: &str = "System.Runtime.CompilerServices";
/// Type name of `InternalsVisibleToAttribute`
pub const INTERNALS_VISIBLE_TO_NAME: &str = "InternalsVisibleToAttribute";

const PROLOG: u16 = 0x0001;

/// Decode the string argument of a custom attribute value blob.
///
/// Returns `None` for a null string. Trailing named arguments are not interpreted.
///
/// # Errors
/// Returns an error if the prolog is missing or the string is truncated.
pub fn parse_string_argument(blob: &[u8]) -> Result<Option<String>> {
    let mut parser = Parser::new(blob);

    let prolog = parser.read_le::<u16>()?;
    if prolog != PROLOG {
        return Err(malformed_error!(
            "Invalid custom attribute prolog - {:#06x}",
            prolog
        ));
    }

    parser.read_ser_string()
}

/// Encode a custom attribute value blob with `value` as the only constructor argument.
///
/// # Errors
/// Returns an error if `value` is too long to encode.
pub fn encode_string_argument(value: &str) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(value.len() + 8);
    push_le::<u16>(&mut blob, PROLOG);
    write_ser_string(&mut blob, value)?;
    push_le::<u16>(&mut blob, 0);
    Ok(blob)
}
