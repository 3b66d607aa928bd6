//! Seam between the bridge and the chat-session library.
//!
//! The wire protocol, its encryption and its key material live behind
//! [`ChatTransport`]. The bridge only needs the operations below.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::protocol::QRChannel;
use crate::store::Device;
use crate::types::{Event, MessageBody, JID};

/// Event handler type.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("QR channel must be requested before connecting an unpaired device")]
    QrChannelUnavailable,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Kind of media being uploaded; selects the media endpoint and key info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
}

impl MediaType {
    /// HKDF info string used to expand the media key for this kind.
    pub fn key_info(self) -> &'static [u8] {
        match self {
            MediaType::Image => b"WhatsApp Image Keys",
        }
    }

    /// Path segment of the upload endpoint.
    pub fn endpoint(self) -> &'static str {
        match self {
            MediaType::Image => "image",
        }
    }
}

/// Result of a registration lookup for one phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsOnWhatsAppResponse {
    /// The phone number as queried.
    pub query: String,
    /// Account JID for the number.
    pub jid: JID,
    /// Whether the number has a WhatsApp account.
    pub is_in: bool,
}

/// Handle returned by a successful media upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Server acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// A connected (or connectable) WhatsApp client for one device.
pub trait ChatTransport: Send + Sync {
    /// Open the connection. Unpaired devices start pairing and stream codes
    /// on the channel obtained from [`ChatTransport::qr_channel`].
    fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection, keeping the device record.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Snapshot of the device record, including its JID once paired.
    fn device(&self) -> Device;

    /// Pairing event stream. Must be requested before `connect`.
    fn qr_channel(&self) -> Result<QRChannel, TransportError>;

    /// Look up which of `phones` have an account.
    fn is_on_whatsapp(&self, phones: &[String]) -> Result<Vec<IsOnWhatsAppResponse>, TransportError>;

    /// Upload media, returning the handle needed to reference it.
    fn upload(&self, data: &[u8], media_type: MediaType) -> Result<UploadResponse, TransportError>;

    fn send_message(&self, to: &JID, message: MessageBody) -> Result<SendResponse, TransportError>;

    /// Register an event handler; returns its id.
    fn add_event_handler(&self, handler: EventHandler) -> u32;

    /// Remove a handler. Returns false if the id was unknown.
    fn remove_event_handler(&self, id: u32) -> bool;
}

/// Builds transports for devices taken from the store.
pub trait Connector: Send + Sync {
    fn client_for(&self, device: Device) -> Arc<dyn ChatTransport>;
}
