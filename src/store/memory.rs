//! In-memory store implementation for development and testing.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::{ContactInfo, ContactStore, Device, DeviceStore, StoreError, StoreResult};
use crate::types::JID;

/// In-memory implementation of all store traits.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, Device>>,
    contacts: RwLock<HashMap<String, ContactInfo>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Database("lock poisoned".to_string())
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn get_device(&self, jid: &JID) -> StoreResult<Option<Device>> {
        let devices = self.devices.read().map_err(poisoned)?;
        Ok(devices.get(&jid.to_string()).cloned())
    }

    fn put_device(&self, device: &Device) -> StoreResult<()> {
        if let Some(ref jid) = device.jid {
            let mut devices = self.devices.write().map_err(poisoned)?;
            devices.insert(jid.to_string(), device.clone());
        }
        Ok(())
    }

    fn delete_device(&self, jid: &JID) -> StoreResult<()> {
        let mut devices = self.devices.write().map_err(poisoned)?;
        devices.remove(&jid.to_string());
        Ok(())
    }

    fn get_all_devices(&self) -> StoreResult<Vec<Device>> {
        let devices = self.devices.read().map_err(poisoned)?;
        Ok(devices.values().cloned().collect())
    }
}

impl ContactStore for MemoryStore {
    fn get_contact(&self, jid: &JID) -> StoreResult<Option<ContactInfo>> {
        let contacts = self.contacts.read().map_err(poisoned)?;
        Ok(contacts.get(&jid.to_non_ad().to_string()).cloned())
    }

    fn put_contact(&self, contact: &ContactInfo) -> StoreResult<()> {
        let mut contacts = self.contacts.write().map_err(poisoned)?;
        contacts.insert(contact.jid.to_non_ad().to_string(), contact.clone());
        Ok(())
    }

    fn get_all_contacts(&self) -> StoreResult<Vec<ContactInfo>> {
        let contacts = self.contacts.read().map_err(poisoned)?;
        Ok(contacts.values().cloned().collect())
    }
}
