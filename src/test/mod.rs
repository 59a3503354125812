//! Shared test support.

mod image;

use std::sync::OnceLock;

pub use image::ImageBuilder;

use crate::strongname::StrongNameKey;

/// A signing key generated once per test binary.
pub fn test_key() -> &'static StrongNameKey {
    static KEY: OnceLock<StrongNameKey> = OnceLock::new();
    KEY.get_or_init(|| StrongNameKey::generate().unwrap())
}
