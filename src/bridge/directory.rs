//! Recipient lookup: phone number to account JID.

use std::sync::Arc;

use thiserror::Error;

use crate::logger::Logger;
use crate::phone::normalize_phone;
use crate::store::Store;
use crate::transport::{ChatTransport, TransportError};
use crate::types::JID;

/// Recipient resolution failures.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid phone number {0:?}")]
    InvalidPhone(String),
    #[error("reachability lookup failed: {0}")]
    Lookup(#[from] TransportError),
    #[error("this number [{0}] is not available in WhatsApp")]
    Unreachable(String),
    #[error("this number [{0}] is not on the contact list")]
    ContactNotFound(String),
}

/// A messageable recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientResolution {
    pub jid: JID,
    pub is_on_network: bool,
    /// Contact list membership. Only blocks sending when required.
    pub in_contacts: bool,
}

/// Resolves phone numbers against the network and the local contact list.
pub struct RecipientDirectory {
    client: Arc<dyn ChatTransport>,
    store: Arc<dyn Store>,
    log: Logger,
}

impl RecipientDirectory {
    pub fn new(client: Arc<dyn ChatTransport>, store: Arc<dyn Store>, log: &Logger) -> Self {
        Self {
            client,
            store,
            log: log.named("directory"),
        }
    }

    /// Resolve `phone` to an account JID.
    ///
    /// The number must be registered on the network. With
    /// `ignore_contact_absence` set, a number missing from the contact list
    /// (or a failed contact lookup) still resolves.
    pub fn resolve(
        &self,
        phone: &str,
        ignore_contact_absence: bool,
    ) -> Result<RecipientResolution, DirectoryError> {
        let phone = normalize_phone(phone);
        if phone.len() < 2 || !phone[1..].chars().all(|c| c.is_ascii_digit()) {
            return Err(DirectoryError::InvalidPhone(phone));
        }
        let log = self.log.with("phone", &phone);

        let mut results = self.client.is_on_whatsapp(std::slice::from_ref(&phone))?;
        let Some(result) = results.pop() else {
            return Err(DirectoryError::Unreachable(phone));
        };
        log.debug(format!("on network: {} ({})", result.is_in, result.jid));
        if !result.is_in {
            log.warn("this number is not available in WhatsApp");
            return Err(DirectoryError::Unreachable(phone));
        }

        let in_contacts = match self.store.get_contact(&result.jid) {
            Ok(contact) => contact.is_some(),
            Err(err) => {
                log.debug(format!("contact lookup failed: {err}"));
                false
            }
        };
        if !in_contacts && !ignore_contact_absence {
            log.warn("this number is not on your contact list");
            return Err(DirectoryError::ContactNotFound(phone));
        }

        Ok(RecipientResolution {
            jid: result.jid,
            is_on_network: true,
            in_contacts,
        })
    }
}
