//! Message bodies exchanged with the chat network.
//!
//! Mirrors the subset of the WhatsApp `Message` protobuf the bridge reads and
//! writes. Every field is optional, as on the wire.

use serde::{Deserialize, Serialize};

/// A protocol message body. At most one of the content fields is expected
/// to be set by well-behaved senders, but clients in the wild disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Plain text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    /// Rich text body (links, quotes, mentions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_text_message: Option<ExtendedTextMessage>,
    /// Single image attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_message: Option<ImageMessage>,
}

/// Rich text variant of a text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedTextMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
}

/// Image attachment referencing an uploaded, encrypted media object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub caption: Option<String>,
    pub url: Option<String>,
    pub direct_path: Option<String>,
    pub media_key: Option<Vec<u8>>,
    pub mimetype: Option<String>,
    pub file_enc_sha256: Option<Vec<u8>>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_length: Option<u64>,
}

impl MessageBody {
    /// Build a plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            ..Default::default()
        }
    }

    /// Build a rich text message.
    pub fn extended_text(text: impl Into<String>) -> Self {
        Self {
            extended_text_message: Some(ExtendedTextMessage {
                text: Some(text.into()),
                matched_text: None,
            }),
            ..Default::default()
        }
    }

    /// Build an image message.
    pub fn image(image: ImageMessage) -> Self {
        Self {
            image_message: Some(image),
            ..Default::default()
        }
    }

    /// Extract the text content of the message.
    ///
    /// The plain `conversation` field is read first. Some senders only fill
    /// the extended text field, so an empty or missing conversation falls
    /// back to `extended_text_message.text`. Returns an empty string when
    /// neither carries text.
    pub fn text_content(&self) -> &str {
        match self.conversation.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => self
                .extended_text_message
                .as_ref()
                .and_then(|ext| ext.text.as_deref())
                .unwrap_or(""),
        }
    }
}
