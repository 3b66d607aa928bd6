//! Cryptographic helpers for media handles.
//!
//! - HKDF-SHA256 expansion of media keys
//! - Media MACs and content digests

mod hkdf;
mod media;

pub use hkdf::Hkdf;
pub use media::{sha256, MediaKeys, MEDIA_MAC_LEN};
