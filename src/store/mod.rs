//! Storage module for WhatsApp session persistence.
//!
//! Provides device records, the contact list, and the stores that keep them.

mod device;
mod file;
mod memory;
mod traits;

pub use device::*;
pub use file::*;
pub use memory::*;
pub use traits::*;
