//! Store traits for WhatsApp session persistence.
//!
//! These traits define the interface the session layer needs from the
//! durable store: linked devices and the local contact list.

use thiserror::Error;

use crate::store::{ContactInfo, Device};
use crate::types::JID;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store address: {0}")]
    InvalidAddress(String),
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store schema error: {0}")]
    Schema(String),
    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Device container for storing device data.
pub trait DeviceStore: Send + Sync {
    /// Get a device by JID.
    fn get_device(&self, jid: &JID) -> StoreResult<Option<Device>>;

    /// Store a device. Devices without a JID are not persisted.
    fn put_device(&self, device: &Device) -> StoreResult<()>;

    /// Delete a device.
    fn delete_device(&self, jid: &JID) -> StoreResult<()>;

    /// Get all stored devices.
    fn get_all_devices(&self) -> StoreResult<Vec<Device>>;
}

/// Contact store for contact information.
pub trait ContactStore: Send + Sync {
    /// Get contact info for a JID.
    fn get_contact(&self, jid: &JID) -> StoreResult<Option<ContactInfo>>;

    /// Store contact info.
    fn put_contact(&self, contact: &ContactInfo) -> StoreResult<()>;

    /// Get all contacts.
    fn get_all_contacts(&self) -> StoreResult<Vec<ContactInfo>>;
}

/// Combined store interface.
pub trait Store: DeviceStore + ContactStore {}

impl<T> Store for T where T: DeviceStore + ContactStore {}
