//! QR code pairing for WhatsApp authentication.
//!
//! A new device is linked by showing a rotating QR code that the primary
//! phone scans. The session transport streams [`QREvent`]s over a
//! [`QRChannel`]; this module renders the codes for a terminal or to a PNG.

use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageBuffer, Luma};
use qrcode::{render::unicode, Color, EcLevel, QrCode};
use tokio::sync::mpsc;

use crate::store::Device;

/// Side length the PNG writer aims for, in pixels.
const QR_IMAGE_SIZE: u32 = 256;
/// Light border around the code, in modules.
const QR_QUIET_ZONE: u32 = 4;

/// QR channel event types.
#[derive(Debug, Clone, PartialEq)]
pub enum QREvent {
    /// New QR code to display
    Code {
        /// The QR code data string
        data: String,
        /// Timeout before next code
        timeout: Duration,
    },
    /// Pairing successful
    Success,
    /// Pairing timed out
    Timeout,
    /// Error during pairing
    Error(String),
    /// Client outdated
    ClientOutdated,
}

impl QREvent {
    /// Name of the event, matching the protocol's event strings.
    pub fn name(&self) -> &'static str {
        match self {
            QREvent::Code { .. } => "code",
            QREvent::Success => "success",
            QREvent::Timeout => "timeout",
            QREvent::Error(_) => "error",
            QREvent::ClientOutdated => "err-client-outdated",
        }
    }
}

/// QR channel for receiving pairing events.
pub type QRChannel = mpsc::Receiver<QREvent>;

/// QR code errors.
#[derive(Debug, thiserror::Error)]
pub enum QRError {
    #[error("QR generation failed: {0}")]
    GenerationFailed(String),
    #[error("failed to write QR image: {0}")]
    WriteFailed(#[from] image::ImageError),
}

/// Rotating set of pairing codes for one device.
pub struct QRPairing {
    codes: Vec<String>,
    current_index: usize,
}

impl QRPairing {
    /// Create a pairing session with `rotations` codes.
    ///
    /// Code format: `ref,noisePublicKey,identityPublicKey,advSecretKey`.
    pub fn new(device: &Device, rotations: usize) -> Self {
        let noise_pub: [u8; 32] = rand::random();
        let identity_pub: [u8; 32] = rand::random();
        let noise_pub = STANDARD.encode(noise_pub);
        let identity_pub = STANDARD.encode(identity_pub);
        let adv_secret = STANDARD.encode(&device.adv_secret_key);

        let codes = (0..rotations.max(1))
            .map(|_| {
                let ref_id = format!("2@{:X}", rand::random::<u64>());
                format!("{ref_id},{noise_pub},{identity_pub},{adv_secret}")
            })
            .collect();

        Self {
            codes,
            current_index: 0,
        }
    }

    /// Get the current QR code data.
    pub fn current_code(&self) -> Option<&str> {
        self.codes.get(self.current_index).map(String::as_str)
    }

    /// Advance to the next QR code.
    pub fn next_code(&mut self) -> Option<&str> {
        if self.current_index + 1 < self.codes.len() {
            self.current_index += 1;
            self.current_code()
        } else {
            None
        }
    }

    /// Get timeout for current code. The first code lives longer.
    pub fn current_timeout(&self) -> Duration {
        if self.current_index == 0 {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(20)
        }
    }
}

/// Render QR code data as unicode half blocks for terminal display.
pub fn render_qr_terminal(data: &str) -> Result<String, QRError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| QRError::GenerationFailed(e.to_string()))?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Write QR code data as a PNG image at `path`.
pub fn write_qr_png(data: &str, path: &Path) -> Result<(), QRError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| QRError::GenerationFailed(e.to_string()))?;

    let modules = code.width() as u32;
    let colors = code.into_colors();
    let total_modules = modules + QR_QUIET_ZONE * 2;
    let module_size = (QR_IMAGE_SIZE / total_modules).max(1);
    let img_size = total_modules * module_size;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (mx, my) = (x / module_size, y / module_size);
        if mx < QR_QUIET_ZONE
            || my < QR_QUIET_ZONE
            || mx >= modules + QR_QUIET_ZONE
            || my >= modules + QR_QUIET_ZONE
        {
            return Luma([255u8]);
        }
        let idx = ((my - QR_QUIET_ZONE) * modules + (mx - QR_QUIET_ZONE)) as usize;
        match colors[idx] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized_device() -> Device {
        let mut device = Device::new();
        device.initialize();
        device
    }

    #[test]
    fn test_qr_code_rotation() {
        let mut pairing = QRPairing::new(&initialized_device(), 3);
        let first = pairing.current_code().unwrap().to_string();
        assert_eq!(pairing.current_timeout(), Duration::from_secs(60));
        assert_eq!(first.split(',').count(), 4);

        let second = pairing.next_code().unwrap().to_string();
        assert_ne!(first, second);
        assert_eq!(pairing.current_timeout(), Duration::from_secs(20));

        assert!(pairing.next_code().is_some());
        assert!(pairing.next_code().is_none());
    }

    #[test]
    fn test_qr_terminal_render() {
        let rendered = render_qr_terminal("test data").unwrap();
        assert!(!rendered.is_empty());
        assert!(rendered.lines().count() > 5);
    }

    #[test]
    fn test_write_qr_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("6281234.png");
        write_qr_png("2@ABC,noise,identity,adv", &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_write_qr_png_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("code.png");
        assert!(matches!(
            write_qr_png("data", &path),
            Err(QRError::WriteFailed(_))
        ));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(QREvent::Success.name(), "success");
        assert_eq!(
            QREvent::Code {
                data: String::new(),
                timeout: Duration::ZERO
            }
            .name(),
            "code"
        );
    }
}
