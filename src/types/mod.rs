//! Types module for WhatsApp protocol types.
//!
//! This module contains the core types shared between the session transport
//! and the bridge: JIDs, message bodies, and event types.

mod events;
mod jid;
mod message;

pub use events::*;
pub use jid::*;
pub use message::*;
