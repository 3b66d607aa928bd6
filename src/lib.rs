//! whatsmeow-webhook: relay between a WhatsApp multi-device session and an
//! HTTP webhook.
//!
//! Inbound chat messages are POSTed to a webhook; the webhook's JSON answer
//! is sent back to the sender as a text or image message.
//!
//! ## Modules
//!
//! - `types` - JIDs, message bodies and transport events
//! - `store` - durable device and contact store
//! - `transport` - the chat-session seam the bridge is written against
//! - `client` - in-process chat network implementing the transport
//! - `protocol` - QR pairing events and rendering
//! - `session` - resuming and pairing sessions
//! - `bridge` - event handling, webhook relay and reply routing
//! - `config` - bridge configuration
//! - `logger` - structured logger handle

pub mod bridge;
pub mod client;
pub mod crypto;
pub mod logger;
pub mod phone;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

mod config;
mod state;

pub use bridge::{EventBridge, ReplyEnvelope, ReplyMessage, WebhookPayload};
pub use client::LocalNetwork;
pub use config::{BridgeConfig, ConfigError};
pub use logger::{Logger, LoggerError};
pub use session::{PairError, SessionError, SessionManager};
pub use state::{ConnectionState, Session, TransitionError};
pub use transport::{ChatTransport, Connector};

pub use types::JID;
