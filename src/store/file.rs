//! File-backed store that survives process restarts.
//!
//! The whole store is one JSON document. Every mutation rewrites it through a
//! temporary file and a rename, so a crash never leaves a half-written store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::store::{ContactInfo, ContactStore, Device, DeviceStore, StoreError, StoreResult};
use crate::types::JID;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    devices: BTreeMap<String, Device>,
    #[serde(default)]
    contacts: BTreeMap<String, ContactInfo>,
}

/// Durable store persisted as a single JSON file.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<Snapshot>,
}

/// Address of the store named `name`, kept at `<name>.db`.
pub fn store_address(name: &str) -> String {
    format!("file:{name}.db?_foreign_keys=on")
}

/// Resolve a store address to a filesystem path.
///
/// Accepts `file:<path>?<options>` (options are ignored) or a bare path.
pub fn address_to_path(address: &str) -> StoreResult<PathBuf> {
    let without_scheme = address.strip_prefix("file:").unwrap_or(address);
    let path = without_scheme
        .split_once('?')
        .map_or(without_scheme, |(path, _)| path);
    if path.is_empty() {
        return Err(StoreError::InvalidAddress(address.to_string()));
    }
    Ok(PathBuf::from(path))
}

impl FileStore {
    /// Open the store at `address`, creating an empty one if it does not exist.
    pub fn open(address: &str) -> StoreResult<Self> {
        let path = address_to_path(address)?;
        let snapshot = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let snapshot: Snapshot =
                serde_json::from_str(&raw).map_err(|e| StoreError::Schema(e.to_string()))?;
            if snapshot.version != SCHEMA_VERSION {
                return Err(StoreError::Schema(format!(
                    "unsupported store version {} (expected {SCHEMA_VERSION})",
                    snapshot.version
                )));
            }
            snapshot
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let snapshot = Snapshot {
                version: SCHEMA_VERSION,
                ..Default::default()
            };
            write_snapshot(&path, &snapshot)?;
            snapshot
        };

        Ok(Self {
            path,
            data: RwLock::new(snapshot),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> StoreResult<R> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))?;
        Ok(f(&data))
    }

    fn mutate(&self, f: impl FnOnce(&mut Snapshot)) -> StoreResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))?;
        f(&mut data);
        write_snapshot(&self.path, &data)
    }
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
    let serialized =
        serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::Schema(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl DeviceStore for FileStore {
    fn get_device(&self, jid: &JID) -> StoreResult<Option<Device>> {
        self.read(|data| data.devices.get(&jid.to_string()).cloned())
    }

    fn put_device(&self, device: &Device) -> StoreResult<()> {
        let Some(jid) = device.jid.as_ref() else {
            return Ok(());
        };
        let key = jid.to_string();
        self.mutate(|data| {
            data.devices.insert(key, device.clone());
        })
    }

    fn delete_device(&self, jid: &JID) -> StoreResult<()> {
        self.mutate(|data| {
            data.devices.remove(&jid.to_string());
        })
    }

    fn get_all_devices(&self) -> StoreResult<Vec<Device>> {
        self.read(|data| data.devices.values().cloned().collect())
    }
}

impl ContactStore for FileStore {
    fn get_contact(&self, jid: &JID) -> StoreResult<Option<ContactInfo>> {
        self.read(|data| data.contacts.get(&jid.to_non_ad().to_string()).cloned())
    }

    fn put_contact(&self, contact: &ContactInfo) -> StoreResult<()> {
        let key = contact.jid.to_non_ad().to_string();
        self.mutate(|data| {
            data.contacts.insert(key, contact.clone());
        })
    }

    fn get_all_contacts(&self) -> StoreResult<Vec<ContactInfo>> {
        self.read(|data| data.contacts.values().cloned().collect())
    }
}
