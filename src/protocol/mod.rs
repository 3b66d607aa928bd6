//! Protocol module for pairing flows.

mod qr;

pub use qr::{render_qr_terminal, write_qr_png, QRChannel, QRError, QREvent, QRPairing};
