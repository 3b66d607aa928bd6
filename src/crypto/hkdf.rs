//! HKDF-SHA256 (RFC 5869), used to expand media keys.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// HKDF-SHA256 key derivation.
pub struct Hkdf {
    prk: [u8; 32],
}

impl Hkdf {
    /// HKDF-Extract over the input key material with an optional salt.
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Result<Self, InvalidLength> {
        let salt = salt.unwrap_or(&[0u8; 32]);
        let mut mac = HmacSha256::new_from_slice(salt)?;
        mac.update(ikm);
        let prk: [u8; 32] = mac.finalize().into_bytes().into();
        Ok(Self { prk })
    }

    /// HKDF-Expand to `length` bytes with the given info.
    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>, InvalidLength> {
        let mut output = Vec::with_capacity(length);
        let mut block = Vec::new();
        let mut counter = 1u8;

        while output.len() < length {
            let mut mac = HmacSha256::new_from_slice(&self.prk)?;
            mac.update(&block);
            mac.update(info);
            mac.update(&[counter]);
            block = mac.finalize().into_bytes().to_vec();

            let take = (length - output.len()).min(block.len());
            output.extend_from_slice(&block[..take]);
            counter = counter.wrapping_add(1);
        }

        Ok(output)
    }

    /// Extract and expand in one call.
    pub fn derive(
        salt: Option<&[u8]>,
        ikm: &[u8],
        info: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, InvalidLength> {
        Self::new(salt, ikm)?.expand(info, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();

        let okm = Hkdf::derive(Some(&salt), &ikm, &info, 42).unwrap();
        assert_eq!(okm.len(), 42);
        assert_eq!(&okm[..4], &[0x3c, 0xb2, 0x5f, 0x25]);
    }

    #[test]
    fn test_hkdf_no_salt() {
        let output = Hkdf::derive(None, b"input key material", b"info", 112).unwrap();
        assert_eq!(output.len(), 112);
    }
}
