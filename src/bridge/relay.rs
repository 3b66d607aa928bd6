//! Webhook delivery of inbound messages and decoding of the reply.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::bridge::InboundMessage;
use crate::logger::Logger;

/// Timestamp layout of the webhook payload.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Webhook delivery failures. None are retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to encode webhook payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("webhook transport error: {0}")]
    Transport(String),
    #[error("got error response from the webhook (status {status})")]
    Rejected { status: u16 },
    #[error("failed to read webhook response: {0}")]
    BodyRead(#[source] std::io::Error),
    #[error("failed to decode webhook response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Direction of a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "INCOMING_MESSAGE")]
    Incoming,
    #[serde(rename = "OUTGOING_MESSAGE")]
    Outgoing,
}

/// Body of the webhook POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub phone_owner: String,
    pub event_type: EventType,
    pub msg_id: String,
    pub msg_type: String,
    pub phone: String,
    pub name: String,
    pub message: String,
    /// Destination device JID; empty for inbound messages.
    pub target_jid: String,
    /// User part of `target_jid`.
    pub target_device: String,
    pub timestamp: String,
}

impl WebhookPayload {
    pub fn new(event: &InboundMessage, event_type: EventType, phone_owner: &str) -> Self {
        Self {
            phone_owner: phone_owner.to_string(),
            event_type,
            msg_id: event.id.clone(),
            msg_type: event.msg_type.clone(),
            phone: event.phone.clone(),
            name: event.name.clone(),
            message: event.text.clone(),
            target_jid: event.target.to_string(),
            target_device: event.target.user.clone(),
            timestamp: event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// JSON response of the webhook. Only `data` is interpreted; any other
/// top-level fields (status codes, messages) are kept in `meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl ReplyEnvelope {
    /// Envelope answering with `text` verbatim.
    pub fn echo(text: &str) -> Self {
        let reply = ReplyMessage {
            message: text.to_string(),
            ..Default::default()
        };
        Self {
            data: serde_json::to_value(reply).unwrap_or_default(),
            meta: Map::new(),
        }
    }

    /// Decode `data` into a reply.
    pub fn reply_message(&self) -> Result<ReplyMessage, serde_json::Error> {
        ReplyMessage::deserialize(&self.data)
    }
}

/// What to answer the sender with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    #[serde(default, alias = "Message")]
    pub message: String,
    #[serde(default, alias = "WithImage")]
    pub with_image: bool,
    /// File under the image directory; required when `with_image` is set.
    #[serde(default, alias = "ImageFileName", skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
}

/// Forwards inbound messages to the webhook.
pub struct WebhookRelay {
    agent: ureq::Agent,
    url: String,
    echo: bool,
    log: Logger,
}

impl WebhookRelay {
    /// `timeout` bounds the whole request; `None` waits indefinitely.
    pub fn new(url: impl Into<String>, echo: bool, timeout: Option<Duration>, log: &Logger) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            url: url.into(),
            echo,
            log: log.named("relay"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver `event` and return the webhook's reply.
    ///
    /// In echo mode no request is made: the reply repeats the inbound text.
    pub fn forward(
        &self,
        event: &InboundMessage,
        event_type: EventType,
        phone_owner: &str,
    ) -> Result<ReplyEnvelope, RelayError> {
        if self.echo {
            return Ok(ReplyEnvelope::echo(&event.text));
        }

        let payload = WebhookPayload::new(event, event_type, phone_owner);
        let body = serde_json::to_string(&payload).map_err(RelayError::Encode)?;

        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(RelayError::Rejected { status }),
            Err(ureq::Error::Transport(err)) => return Err(RelayError::Transport(err.to_string())),
        };

        let status = response.status();
        if status != 200 {
            return Err(RelayError::Rejected { status });
        }

        let body = response.into_string().map_err(RelayError::BodyRead)?;
        self.log
            .with("msg_id", &event.id)
            .with("bytes", body.len())
            .debug("webhook replied");
        serde_json::from_str(&body).map_err(RelayError::Decode)
    }
}
