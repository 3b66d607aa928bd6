use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::ChatTransport;
use crate::types::JID;

/// Connectivity of a session.
///
/// `Disconnected -> Connecting -> Connected`. Pairing happens while
/// `Connecting`; `Connected` is only reached once the network confirms the
/// link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Whether moving to `next` follows the lifecycle. Any state may drop
    /// back to `Disconnected`.
    pub fn can_transition(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Disconnected, ConnectionState::Connecting)
                | (ConnectionState::Connecting, ConnectionState::Connected)
                | (_, ConnectionState::Disconnected)
        )
    }

    /// Move to `next`, refusing moves outside the lifecycle.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, TransitionError> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

/// A connectivity change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// A linked device owned by this process.
#[derive(Clone)]
pub struct Session {
    jid: JID,
    phone: String,
    state: ConnectionState,
    client: Arc<dyn ChatTransport>,
}

impl Session {
    pub(crate) fn new(
        jid: JID,
        phone: impl Into<String>,
        state: ConnectionState,
        client: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            jid,
            phone: phone.into(),
            state,
            client,
        }
    }

    /// Device JID of the session.
    pub fn jid(&self) -> &JID {
        &self.jid
    }

    /// Phone number owning the session.
    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Current connectivity; reports `Disconnected` once the transport
    /// has dropped.
    pub fn state(&self) -> ConnectionState {
        if self.state == ConnectionState::Connected && !self.client.is_connected() {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }

    pub(crate) fn set_state(&mut self, next: ConnectionState) -> Result<(), TransitionError> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    /// The transport the session runs on.
    pub fn client(&self) -> &Arc<dyn ChatTransport> {
        &self.client
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("jid", &self.jid)
            .field("phone", &self.phone)
            .field("state", &self.state())
            .finish()
    }
}
