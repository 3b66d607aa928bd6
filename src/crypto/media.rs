//! Media key expansion and digests for uploaded attachments.

use hmac::digest::InvalidLength;
use hmac::Mac;
use sha2::{Digest, Sha256};

use super::hkdf::{Hkdf, HmacSha256};

/// Length of the MAC appended to an uploaded media object.
pub const MEDIA_MAC_LEN: usize = 10;

/// Keys expanded from a 32-byte media key.
#[derive(Debug, Clone)]
pub struct MediaKeys {
    pub iv: [u8; 16],
    pub cipher_key: [u8; 32],
    pub mac_key: [u8; 32],
}

impl MediaKeys {
    /// Expand `media_key` into IV, cipher key and MAC key using the
    /// per-media-type HKDF info string.
    pub fn expand(media_key: &[u8], info: &[u8]) -> Result<Self, InvalidLength> {
        let expanded = Hkdf::derive(None, media_key, info, 112)?;

        let mut iv = [0u8; 16];
        let mut cipher_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        iv.copy_from_slice(&expanded[0..16]);
        cipher_key.copy_from_slice(&expanded[16..48]);
        mac_key.copy_from_slice(&expanded[48..80]);

        Ok(Self {
            iv,
            cipher_key,
            mac_key,
        })
    }

    /// Append the truncated `HMAC(mac_key, iv || body)` to `body`.
    pub fn seal(&self, body: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key)?;
        mac.update(&self.iv);
        mac.update(body);
        let tag = mac.finalize().into_bytes();

        let mut sealed = Vec::with_capacity(body.len() + MEDIA_MAC_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(&tag[..MEDIA_MAC_LEN]);
        Ok(sealed)
    }
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}
