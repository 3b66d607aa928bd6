//! Entry point for events coming from the session transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bridge::{
    EventType, MediaUploader, RecipientDirectory, ReplyRouter, RouteOutcome, WebhookRelay,
};
use crate::config::BridgeConfig;
use crate::logger::Logger;
use crate::state::Session;
use crate::store::Store;
use crate::transport::ChatTransport;
use crate::types::{Event, Message, JID};

/// Normalized view of a message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub msg_type: String,
    /// Sender phone number, without `+`.
    pub phone: String,
    /// Sender push name.
    pub name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Sent by another device of this account rather than received.
    pub device_sent: bool,
    /// Destination of a device-sent message; empty otherwise.
    pub target: JID,
}

impl InboundMessage {
    pub fn from_event(event: &Message) -> Self {
        let info = &event.info;
        let target: JID = info
            .device_sent_meta
            .as_ref()
            .and_then(|meta| meta.destination_jid.parse().ok())
            .unwrap_or_default();

        Self {
            id: info.id.clone(),
            msg_type: info.msg_type.clone(),
            phone: info.sender.user.clone(),
            name: info.push_name.clone().unwrap_or_default(),
            text: event.message.text_content().to_string(),
            timestamp: info.timestamp,
            device_sent: info.device_sent_meta.is_some(),
            target,
        }
    }
}

/// What the bridge did with a message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    WebhookDisabled,
    MissingWebhookUrl,
    EmptyText,
    /// Device-sent message; not forwarded.
    DeviceSent,
    RelayFailed,
    RouteFailed,
    Routed(RouteOutcome),
}

/// Forwards inbound messages to the webhook and routes its replies.
///
/// Handlers run concurrently, one per delivered event. The bridge only
/// reads its configuration while handling them.
pub struct EventBridge {
    client: Arc<dyn ChatTransport>,
    phone_owner: String,
    webhook_enabled: bool,
    relay: WebhookRelay,
    router: ReplyRouter,
    log: Logger,
}

impl EventBridge {
    pub fn new(
        client: Arc<dyn ChatTransport>,
        phone_owner: impl Into<String>,
        webhook_enabled: bool,
        relay: WebhookRelay,
        router: ReplyRouter,
        log: &Logger,
    ) -> Self {
        Self {
            client,
            phone_owner: phone_owner.into(),
            webhook_enabled,
            relay,
            router,
            log: log.named("bridge"),
        }
    }

    /// Wire up relay, router, directory and uploader for `session`.
    pub fn for_session(
        config: &BridgeConfig,
        session: &Session,
        store: Arc<dyn Store>,
        log: &Logger,
    ) -> Self {
        let client = Arc::clone(session.client());
        let log = log.with("phone_owner", session.phone());

        let timeout =
            Some(Duration::from_secs(config.http_timeout_secs)).filter(|t| !t.is_zero());
        let relay = WebhookRelay::new(&config.webhook_url, config.echo_message, timeout, &log);
        let router = ReplyRouter::new(
            Arc::clone(&client),
            RecipientDirectory::new(Arc::clone(&client), store, &log),
            MediaUploader::new(Arc::clone(&client), &log),
            PathBuf::from(&config.image_dir),
            config.require_contact,
            &log,
        );

        Self::new(client, session.phone(), config.webhook_enabled, relay, router, &log)
    }

    /// Subscribe to the transport's events. Returns the handler id.
    pub fn register(self: &Arc<Self>) -> u32 {
        let bridge = Arc::clone(self);
        let id = self
            .client
            .add_event_handler(Arc::new(move |event| bridge.on_event(event)));
        self.log.with("handler_id", id).debug("event handler registered");
        id
    }

    pub fn unregister(&self, handler_id: u32) -> bool {
        self.client.remove_event_handler(handler_id)
    }

    /// Handle one transport event.
    pub fn on_event(&self, event: Event) {
        match event {
            Event::Message(message) => {
                self.handle_message(&message);
            }
            Event::Connected(connected) => self
                .log
                .info(format!("connected (reconnect: {})", connected.is_reconnect)),
            Event::Disconnected(disconnected) => self
                .log
                .warn(format!("disconnected: {:?}", disconnected.reason)),
            Event::LoggedOut(logged_out) => self.log.warn(format!(
                "logged out: {}",
                logged_out.reason.as_deref().unwrap_or("no reason given")
            )),
            Event::PairSuccess(paired) => self
                .log
                .info(format!("paired as {} ({})", paired.jid, paired.platform)),
            Event::Receipt(_) | Event::Other(_) => {}
        }
    }

    /// Forward a message event and route the reply.
    pub fn handle_message(&self, message: &Message) -> Disposition {
        let event = InboundMessage::from_event(message);

        if !self.webhook_enabled {
            return Disposition::WebhookDisabled;
        }
        if self.relay.url().is_empty() {
            self.log.warn("invalid Webhook URL due to an empty value");
            return Disposition::MissingWebhookUrl;
        }
        if event.text.is_empty() {
            return Disposition::EmptyText;
        }

        let log = self.log.with("phone", &event.phone).with("msg_id", &event.id);

        if event.device_sent {
            log.debug(format!(
                "[{}] Sent a [{}] message to ({}) -> '{}'",
                event.timestamp, event.msg_type, event.target.user, event.text
            ));
            return Disposition::DeviceSent;
        }

        log.info(format!(
            "[{}] Received a [{}] message from [{}] -> '{}'",
            event.timestamp, event.msg_type, event.name, event.text
        ));

        let envelope = match self
            .relay
            .forward(&event, EventType::Incoming, &self.phone_owner)
        {
            Ok(envelope) => envelope,
            Err(err) => {
                log.error(format!("failed to forward incoming message to webhook: {err}"));
                return Disposition::RelayFailed;
            }
        };

        match self.router.route(&event.target, &event.phone, &envelope) {
            Ok(outcome) => Disposition::Routed(outcome),
            Err(err) => {
                log.error(format!("failed to reply the captured message: {err}"));
                Disposition::RouteFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceSentMeta, MessageBody, MessageInfo};

    fn message(body: MessageBody, device_sent: Option<&str>) -> Message {
        Message {
            info: MessageInfo {
                id: "3EB0ABC".into(),
                msg_type: "text".into(),
                sender: JID::new("6281234", "s.whatsapp.net"),
                chat: JID::new("6281234", "s.whatsapp.net"),
                is_from_me: device_sent.is_some(),
                is_group: false,
                timestamp: Utc::now(),
                push_name: Some("Budi".into()),
                device_sent_meta: device_sent.map(|jid| DeviceSentMeta {
                    destination_jid: jid.into(),
                    phash: None,
                }),
            },
            message: body,
        }
    }

    #[test]
    fn test_inbound_normalization() {
        let event = InboundMessage::from_event(&message(MessageBody::extended_text("rich"), None));
        assert_eq!(event.text, "rich");
        assert_eq!(event.phone, "6281234");
        assert_eq!(event.name, "Budi");
        assert!(!event.device_sent);
        assert!(event.target.is_empty());
        assert_eq!(event.target.to_string(), "");
    }

    #[test]
    fn test_device_sent_normalization() {
        let event = InboundMessage::from_event(&message(
            MessageBody::text("out"),
            Some("6285555@s.whatsapp.net"),
        ));
        assert!(event.device_sent);
        assert_eq!(event.target.user, "6285555");
    }

    #[test]
    fn test_unparseable_destination_is_empty() {
        let event = InboundMessage::from_event(&message(MessageBody::text("out"), Some("a@b@c")));
        assert!(event.device_sent);
        assert_eq!(event.target, JID::default());
    }
}
