//! Device records for linked WhatsApp sessions.

use serde::{Deserialize, Serialize};

use crate::types::JID;

/// Device represents one linked WhatsApp device/session.
///
/// Key material for the wire protocol belongs to the session transport; the
/// record only holds what identifies the device across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device JID, set once pairing succeeds
    pub jid: Option<JID>,
    /// Push name advertised by the account
    pub push_name: Option<String>,
    /// Platform identifier (e.g., "android", "web")
    pub platform: String,
    /// Registration ID
    pub registration_id: u32,
    /// Advertisement secret shared with the primary device during pairing
    #[serde(default)]
    pub adv_secret_key: Vec<u8>,
    /// Whether the device identity has been allocated
    pub initialized: bool,
}

impl Device {
    /// Create a new uninitialized device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh device identity.
    pub fn initialize(&mut self) {
        let adv_secret: [u8; 32] = rand::random();
        self.adv_secret_key = adv_secret.to_vec();
        self.registration_id = (rand::random::<u32>() & 0x3FFF).max(1); // 14 bits
        self.initialized = true;
    }
}

/// Contact information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub jid: JID,
    pub first_name: String,
    pub full_name: String,
    pub push_name: Option<String>,
    pub business_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_initialization() {
        let mut device = Device::new();
        assert!(!device.initialized);

        device.initialize();

        assert!(device.initialized);
        assert_eq!(device.adv_secret_key.len(), 32);
        assert!(device.registration_id > 0);
        assert!(device.registration_id <= 0x3FFF);
    }
}
