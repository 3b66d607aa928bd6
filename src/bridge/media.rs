//! Media upload for image replies.

use std::sync::Arc;

use thiserror::Error;

use crate::logger::Logger;
use crate::transport::{ChatTransport, MediaType, TransportError};
use crate::types::ImageMessage;

const OCTET_STREAM: &str = "application/octet-stream";

/// Upload failures.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("refusing to upload an empty file")]
    Empty,
    #[error("media upload failed: {0}")]
    Transport(#[from] TransportError),
}

/// Everything needed to reference an uploaded image in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUploadHandle {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
    /// Sniffed from the uploaded bytes.
    pub mimetype: String,
}

impl MediaUploadHandle {
    /// Image message body pointing at this upload.
    pub fn to_image_message(&self, caption: impl Into<String>) -> ImageMessage {
        ImageMessage {
            caption: Some(caption.into()),
            url: Some(self.url.clone()),
            direct_path: Some(self.direct_path.clone()),
            media_key: Some(self.media_key.clone()),
            mimetype: Some(self.mimetype.clone()),
            file_enc_sha256: Some(self.file_enc_sha256.clone()),
            file_sha256: Some(self.file_sha256.clone()),
            file_length: Some(self.file_length),
        }
    }
}

/// Uploads images to the network's media store. Nothing is cached; every
/// call uploads again.
pub struct MediaUploader {
    client: Arc<dyn ChatTransport>,
    log: Logger,
}

impl MediaUploader {
    pub fn new(client: Arc<dyn ChatTransport>, log: &Logger) -> Self {
        Self {
            client,
            log: log.named("media"),
        }
    }

    pub fn upload(&self, data: &[u8]) -> Result<MediaUploadHandle, UploadError> {
        if data.is_empty() {
            return Err(UploadError::Empty);
        }

        let mimetype = detect_content_type(data);
        let uploaded = self.client.upload(data, MediaType::Image).map_err(|err| {
            self.log
                .with("bytes", data.len())
                .debug(format!("failed to upload file: {err}"));
            err
        })?;

        self.log
            .with("bytes", uploaded.file_length)
            .with("mimetype", mimetype)
            .debug("image uploaded");

        Ok(MediaUploadHandle {
            url: uploaded.url,
            direct_path: uploaded.direct_path,
            media_key: uploaded.media_key,
            file_sha256: uploaded.file_sha256,
            file_enc_sha256: uploaded.file_enc_sha256,
            file_length: data.len() as u64,
            mimetype: mimetype.to_string(),
        })
    }
}

/// Sniff the MIME type of image content from its leading bytes.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    image::guess_format(data).map_or(OCTET_STREAM, |format| format.to_mime_type())
}
