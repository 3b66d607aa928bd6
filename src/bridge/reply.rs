//! Turning webhook replies into outbound chat messages.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::{DirectoryError, MediaUploader, RecipientDirectory, ReplyEnvelope, UploadError};
use crate::logger::Logger;
use crate::phone::{normalize_phone, sanitize_phone};
use crate::transport::{ChatTransport, SendResponse, TransportError};
use crate::types::{MessageBody, JID};

/// Reply routing failures. Each one drops the reply; nothing is retried.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to convert reply payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("reply requests an image but names no file")]
    MissingImageName,
    #[error("image file name {0:?} must be a plain file name")]
    InvalidImageName(String),
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("failed to send message: {0}")]
    Send(#[source] TransportError),
}

/// Result of routing one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Sent(SendResponse),
    /// The event already had a destination device; nothing is sent.
    Skipped,
}

/// Request to send a message directly, outside of a webhook reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_filename: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_caption: String,
}

impl MessagePayload {
    /// Strip separators and the leading `+` from both phone numbers.
    pub fn sanitize(&mut self) {
        self.from = sanitize_phone(&self.from, false);
        self.to = sanitize_phone(&self.to, false);
    }
}

/// Sends replies to the sender of an inbound message.
pub struct ReplyRouter {
    client: Arc<dyn ChatTransport>,
    directory: RecipientDirectory,
    uploader: MediaUploader,
    image_dir: PathBuf,
    require_contact: bool,
    log: Logger,
}

impl ReplyRouter {
    pub fn new(
        client: Arc<dyn ChatTransport>,
        directory: RecipientDirectory,
        uploader: MediaUploader,
        image_dir: impl Into<PathBuf>,
        require_contact: bool,
        log: &Logger,
    ) -> Self {
        Self {
            client,
            directory,
            uploader,
            image_dir: image_dir.into(),
            require_contact,
            log: log.named("reply"),
        }
    }

    /// Answer `sender_phone` with the reply carried by `envelope`.
    ///
    /// `target` is the destination device of the original event. Inbound
    /// events have none, and only those are answered.
    pub fn route(
        &self,
        target: &JID,
        sender_phone: &str,
        envelope: &ReplyEnvelope,
    ) -> Result<RouteOutcome, RouteError> {
        let reply = envelope.reply_message().map_err(RouteError::Decode)?;

        if target.has_user() {
            self.log
                .with("target", target)
                .debug("reply to a device-sent message ignored");
            return Ok(RouteOutcome::Skipped);
        }

        let resolution = self
            .directory
            .resolve(&normalize_phone(sender_phone), !self.require_contact)?;

        let image = if reply.with_image {
            Some(
                reply
                    .image_filename
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .ok_or(RouteError::MissingImageName)?,
            )
        } else {
            None
        };

        self.send(&resolution.jid, &reply.message, image.map(|name| (name, reply.message.as_str())))
            .map(RouteOutcome::Sent)
    }

    /// Send a message described by `payload` without a webhook round trip.
    pub fn send_direct(&self, mut payload: MessagePayload) -> Result<SendResponse, RouteError> {
        payload.sanitize();
        let resolution = self.directory.resolve(&payload.to, !self.require_contact)?;

        let caption = if payload.image_caption.is_empty() {
            payload.message.as_str()
        } else {
            payload.image_caption.as_str()
        };
        let image = Some(payload.image_filename.as_str())
            .filter(|name| !name.is_empty())
            .map(|name| (name, caption));

        self.send(&resolution.jid, &payload.message, image)
    }

    /// Send `text`, or the image `(file name, caption)` when given.
    fn send(
        &self,
        to: &JID,
        text: &str,
        image: Option<(&str, &str)>,
    ) -> Result<SendResponse, RouteError> {
        let log = self.log.with("to", &to.user);

        let body = match image {
            Some((file_name, caption)) => {
                let path = self.image_path(file_name)?;
                let bytes = fs::read(&path).map_err(|source| RouteError::ImageRead {
                    path: path.clone(),
                    source,
                })?;
                let handle = self.uploader.upload(&bytes)?;
                MessageBody::image(handle.to_image_message(caption))
            }
            None => MessageBody::text(text),
        };

        match self.client.send_message(to, body) {
            Ok(response) => {
                log.debug(format!(
                    "message sent (server timestamp: {})",
                    response.timestamp
                ));
                Ok(response)
            }
            Err(err) => {
                log.debug(format!("failed to send message: {text}"));
                Err(RouteError::Send(err))
            }
        }
    }

    fn image_path(&self, file_name: &str) -> Result<PathBuf, RouteError> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.image_dir.join(file_name)),
            _ => Err(RouteError::InvalidImageName(file_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FailureFlags, LocalNetwork};
    use crate::store::{Device, MemoryStore};
    use crate::transport::Connector;
    use crate::types::servers;

    struct Fixture {
        network: LocalNetwork,
        router: ReplyRouter,
        images: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let network = LocalNetwork::new();
        network.register_number("+6281234");
        let client = network.client_for(Device {
            jid: Some(JID::new_device("62999", 1)),
            ..Default::default()
        });
        client.connect().unwrap();

        let log = Logger::new();
        let store = Arc::new(MemoryStore::new());
        let images = tempfile::tempdir().unwrap();
        let router = ReplyRouter::new(
            client.clone(),
            RecipientDirectory::new(client.clone(), store, &log),
            MediaUploader::new(client, &log),
            images.path(),
            false,
            &log,
        );
        Fixture {
            network,
            router,
            images,
        }
    }

    fn envelope(json: &str) -> ReplyEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_route_text_reply() {
        let f = fixture();
        let outcome = f
            .router
            .route(&JID::default(), "6281234", &envelope(r#"{"data":{"message":"Hi back"}}"#))
            .unwrap();
        assert!(matches!(outcome, RouteOutcome::Sent(_)));

        let sent = f.network.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, JID::new("6281234", servers::DEFAULT_USER));
        assert_eq!(sent[0].message.conversation.as_deref(), Some("Hi back"));
        assert!(f.network.uploads().is_empty());
    }

    #[test]
    fn test_route_skips_known_target() {
        let f = fixture();
        let target = JID::new("6285555", servers::DEFAULT_USER);
        let outcome = f
            .router
            .route(&target, "6281234", &envelope(r#"{"data":{"message":"x"}}"#))
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Skipped);
        assert!(f.network.sent_messages().is_empty());
    }

    #[test]
    fn test_route_image_reply() {
        let f = fixture();
        let bytes = b"\x89PNG\r\n\x1a\ncat".to_vec();
        fs::write(f.images.path().join("cat.png"), &bytes).unwrap();

        f.router
            .route(
                &JID::default(),
                "+6281234",
                &envelope(r#"{"data":{"message":"a cat","with_image":true,"image_filename":"cat.png"}}"#),
            )
            .unwrap();

        let uploads = f.network.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].data, bytes);

        let sent = f.network.sent_messages();
        let image = sent[0].message.image_message.as_ref().unwrap();
        assert_eq!(image.caption.as_deref(), Some("a cat"));
        assert_eq!(image.mimetype.as_deref(), Some("image/png"));
        assert_eq!(image.url.as_ref(), Some(&uploads[0].response.url));
        assert_eq!(image.file_length, Some(bytes.len() as u64));
    }

    #[test]
    fn test_route_image_errors_send_nothing() {
        let f = fixture();
        let cases = [
            (r#"{"data":{"message":"x","with_image":true,"image_filename":"missing.png"}}"#, "read"),
            (r#"{"data":{"message":"x","with_image":true}}"#, "missing"),
            (r#"{"data":{"message":"x","with_image":true,"image_filename":"../etc/passwd"}}"#, "invalid"),
        ];
        for (json, kind) in cases {
            let err = f
                .router
                .route(&JID::default(), "6281234", &envelope(json))
                .unwrap_err();
            match kind {
                "read" => assert!(matches!(err, RouteError::ImageRead { .. })),
                "missing" => assert!(matches!(err, RouteError::MissingImageName)),
                _ => assert!(matches!(err, RouteError::InvalidImageName(_))),
            }
        }
        assert!(f.network.sent_messages().is_empty());
        assert!(f.network.uploads().is_empty());
    }

    #[test]
    fn test_route_upload_failure_has_no_text_fallback() {
        let f = fixture();
        fs::write(f.images.path().join("cat.png"), b"\x89PNG\r\n\x1a\n").unwrap();
        f.network.set_failures(FailureFlags {
            upload: true,
            ..Default::default()
        });

        let err = f
            .router
            .route(
                &JID::default(),
                "6281234",
                &envelope(r#"{"data":{"message":"x","with_image":true,"image_filename":"cat.png"}}"#),
            )
            .unwrap_err();
        assert!(matches!(err, RouteError::Upload(_)));
        assert!(f.network.sent_messages().is_empty());
    }

    #[test]
    fn test_route_decode_and_directory_errors() {
        let f = fixture();
        assert!(matches!(
            f.router.route(&JID::default(), "6281234", &envelope(r#"{"data":"oops"}"#)),
            Err(RouteError::Decode(_))
        ));
        assert!(matches!(
            f.router
                .route(&JID::default(), "+1555", &envelope(r#"{"data":{"message":"x"}}"#)),
            Err(RouteError::Directory(DirectoryError::Unreachable(_)))
        ));
    }

    #[test]
    fn test_send_direct() {
        let f = fixture();
        fs::write(f.images.path().join("menu.jpg"), b"\xFF\xD8\xFFjpeg").unwrap();

        f.router
            .send_direct(MessagePayload {
                from: "+62 999".into(),
                to: "+62 812-34".into(),
                message: "hello".into(),
                ..Default::default()
            })
            .unwrap();
        f.router
            .send_direct(MessagePayload {
                from: "+62999".into(),
                to: "6281234".into(),
                message: "see menu".into(),
                image_filename: "menu.jpg".into(),
                image_caption: "Menu".into(),
            })
            .unwrap();

        let sent = f.network.sent_messages();
        assert_eq!(sent[0].message.conversation.as_deref(), Some("hello"));
        let image = sent[1].message.image_message.as_ref().unwrap();
        assert_eq!(image.caption.as_deref(), Some("Menu"));
        assert_eq!(image.mimetype.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_message_payload_sanitize() {
        let mut payload = MessagePayload {
            from: "+62 812-34".into(),
            to: "+1 555".into(),
            ..Default::default()
        };
        payload.sanitize();
        assert_eq!(payload.from, "6281234");
        assert_eq!(payload.to, "1555");
    }
}
