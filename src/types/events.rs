//! Event types for WhatsApp events.
//!
//! The session transport hands every event to registered handlers as one
//! closed enum; handlers match on the variants they care about.

use chrono::{DateTime, Utc};

use crate::types::{MessageBody, JID};

/// Connected event is emitted when the client connects to WhatsApp servers.
#[derive(Debug, Clone)]
pub struct Connected {
    /// Whether this is an initial connection or a reconnection
    pub is_reconnect: bool,
}

/// Disconnected event is emitted when the client disconnects.
#[derive(Debug, Clone)]
pub struct Disconnected {
    /// The reason for disconnection
    pub reason: DisconnectReason,
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// Normal logout by user
    LoggedOut,
    /// Connection replaced by another device
    Replaced,
    /// Server requested disconnect
    ServerRequested,
    /// Network error
    NetworkError(String),
    /// Unknown reason
    Unknown,
}

/// LoggedOut event is emitted when the user is logged out.
#[derive(Debug, Clone)]
pub struct LoggedOut {
    /// Whether the logout was initiated by the user
    pub by_user: bool,
    /// Reason for logout if available
    pub reason: Option<String>,
}

/// Emitted once a pairing handshake links this device to an account.
#[derive(Debug, Clone)]
pub struct PairSuccess {
    pub jid: JID,
    pub platform: String,
}

/// Marker attached to messages that another device of the same account sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSentMeta {
    /// Chat the other device sent the message to.
    pub destination_jid: String,
    pub phash: Option<String>,
}

/// Message event containing a received message
#[derive(Debug, Clone)]
pub struct Message {
    /// The message info
    pub info: MessageInfo,
    /// The message content
    pub message: MessageBody,
}

/// Information about a message
#[derive(Debug, Clone)]
pub struct MessageInfo {
    /// Unique message ID
    pub id: String,
    /// Message type as labelled by the network, e.g. `text` or `media`
    pub msg_type: String,
    /// Sender JID
    pub sender: JID,
    /// Chat JID (same as sender for 1:1, group JID for groups)
    pub chat: JID,
    /// Whether this message was sent by us
    pub is_from_me: bool,
    /// Whether this is a group message
    pub is_group: bool,
    /// Timestamp of the message
    pub timestamp: DateTime<Utc>,
    /// Push name of sender
    pub push_name: Option<String>,
    /// Set when the message was relayed from another device of this account
    pub device_sent_meta: Option<DeviceSentMeta>,
}

/// Receipt event for message delivery/read status
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Message IDs this receipt is for
    pub message_ids: Vec<String>,
    /// The chat JID
    pub chat: JID,
    /// Type of receipt
    pub receipt_type: ReceiptType,
}

/// Type of receipt
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptType {
    Delivered,
    Read,
    Played,
    Server,
}

/// All possible events that can be received
#[derive(Debug, Clone)]
pub enum Event {
    Connected(Connected),
    Disconnected(Disconnected),
    LoggedOut(LoggedOut),
    PairSuccess(PairSuccess),
    Message(Box<Message>),
    Receipt(Receipt),
    /// Anything the bridge has no use for, tagged with its protocol name.
    Other(String),
}

impl Event {
    /// Short name of the event variant, for logging.
    pub fn name(&self) -> &str {
        match self {
            Event::Connected(_) => "connected",
            Event::Disconnected(_) => "disconnected",
            Event::LoggedOut(_) => "logged_out",
            Event::PairSuccess(_) => "pair_success",
            Event::Message(_) => "message",
            Event::Receipt(_) => "receipt",
            Event::Other(name) => name,
        }
    }
}
