//! Bridge between a chat session and an HTTP webhook.
//!
//! - `events` - entry point for transport events
//! - `relay` - webhook delivery and reply decoding
//! - `reply` - routing replies back into the chat
//! - `directory` - phone number to recipient resolution
//! - `media` - image uploads

mod directory;
mod events;
mod media;
mod relay;
mod reply;

pub use directory::{DirectoryError, RecipientDirectory, RecipientResolution};
pub use events::{Disposition, EventBridge, InboundMessage};
pub use media::{detect_content_type, MediaUploadHandle, MediaUploader, UploadError};
pub use relay::{
    EventType, RelayError, ReplyEnvelope, ReplyMessage, WebhookPayload, WebhookRelay,
    TIMESTAMP_FORMAT,
};
pub use reply::{MessagePayload, ReplyRouter, RouteError, RouteOutcome};
