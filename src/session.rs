//! Session lifecycle: opening the device store, resuming a linked device and
//! linking a new one through QR pairing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::logger::Logger;
use crate::protocol::{render_qr_terminal, write_qr_png, QRError, QREvent};
use crate::state::{ConnectionState, Session, TransitionError};
use crate::store::{store_address, Device, FileStore, Store, StoreError};
use crate::transport::{Connector, TransportError};
use crate::types::{ParseJIDError, JID};

/// Pairing failures.
#[derive(Debug, Error)]
pub enum PairError {
    #[error("failed to write QR code: {0}")]
    QrWrite(#[from] QRError),
    #[error("pairing ended with {0}")]
    Rejected(String),
    #[error("pairing stream closed before the device was linked")]
    StreamClosed,
}

/// Session establishment failures. All are fatal for the startup attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid device JID: {0}")]
    InvalidJid(#[from] ParseJIDError),
    #[error("unable to find device with JID {0}")]
    DeviceNotFound(String),
    #[error("unable to connect: {0}")]
    Connect(#[from] TransportError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Pair(#[from] PairError),
}

/// Owns the device store and establishes sessions against it.
pub struct SessionManager {
    store: Arc<dyn Store>,
    connector: Arc<dyn Connector>,
    log: Logger,
}

impl SessionManager {
    /// Open (or create) the store named `name`, at `<name>.db`.
    pub fn open_store(name: &str) -> Result<Arc<FileStore>, StoreError> {
        FileStore::open(&store_address(name)).map(Arc::new)
    }

    pub fn new(store: Arc<dyn Store>, connector: Arc<dyn Connector>, log: &Logger) -> Self {
        Self {
            store,
            connector,
            log: log.named("session"),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Reconnect a previously paired device.
    pub fn resume_session(&self, jid: &str, phone: &str) -> Result<Session, SessionError> {
        let jid: JID = jid.parse()?;
        let log = self.log.with("phone", phone).with("jid", &jid);

        let device = self
            .store
            .get_device(&jid)?
            .ok_or_else(|| SessionError::DeviceNotFound(jid.to_string()))?;

        let client = self.connector.client_for(device);
        let state = advance(&log, ConnectionState::Disconnected, ConnectionState::Connecting)?;
        if let Err(err) = client.connect() {
            log.error(format!("WhatsApp connection error: {err}"));
            return Err(SessionError::Connect(err));
        }
        let state = advance(&log, state, ConnectionState::Connected)?;

        Ok(Session::new(jid, phone, state, client))
    }

    /// Link a new device to the account of `phone`.
    ///
    /// Each pairing code is written to `<qr_dir>/<phone>.png`, and printed
    /// to the terminal when `print_terminal` is set, until the network
    /// confirms the link. The image is removed once pairing succeeds.
    pub fn pair_new_session(
        &self,
        phone: &str,
        qr_dir: &Path,
        print_terminal: bool,
    ) -> Result<Session, SessionError> {
        let log = self.log.with("phone", phone);

        let mut device = Device::new();
        device.initialize();
        let client = self.connector.client_for(device);

        let mut qr_channel = client.qr_channel()?;
        let state = advance(&log, ConnectionState::Disconnected, ConnectionState::Connecting)?;
        client.connect()?;

        let qr_path = qr_image_path(qr_dir, phone);
        loop {
            match qr_channel.blocking_recv() {
                Some(QREvent::Code { data, timeout }) => {
                    if let Err(err) = write_qr_png(&data, &qr_path) {
                        log.error(format!("failed to write QR code to {}: {err}", qr_path.display()));
                        client.disconnect();
                        return Err(PairError::QrWrite(err).into());
                    }
                    log.debug(format!(
                        "QR code written to {} (valid for {}s)",
                        qr_path.display(),
                        timeout.as_secs()
                    ));

                    if print_terminal {
                        match render_qr_terminal(&data) {
                            Ok(rendered) => println!("{rendered}"),
                            Err(err) => log.warn(format!("failed to render QR code: {err}")),
                        }
                    }
                }
                Some(QREvent::Success) => {
                    log.info("Login event: success");
                    break;
                }
                Some(event) => {
                    log.warn(format!("Login event: {}", event.name()));
                    client.disconnect();
                    return Err(PairError::Rejected(event.name().to_string()).into());
                }
                None => {
                    client.disconnect();
                    return Err(PairError::StreamClosed.into());
                }
            }
        }

        if let Err(err) = fs::remove_file(&qr_path) {
            log.warn(format!("failed to delete QR code {}: {err}", qr_path.display()));
        }

        let device = client.device();
        let jid = device
            .jid
            .clone()
            .ok_or_else(|| PairError::Rejected("success without a device JID".to_string()))?;
        self.store.put_device(&device)?;

        let state = advance(&log.with("jid", &jid), state, ConnectionState::Connected)?;
        Ok(Session::new(jid, phone, state, client))
    }

    /// Disconnect the session and forget its device.
    pub fn logout(&self, session: &mut Session) -> Result<(), SessionError> {
        session.client().disconnect();
        self.store.delete_device(session.jid())?;
        session.set_state(ConnectionState::Disconnected)?;
        self.log
            .with("phone", session.phone())
            .with("jid", session.jid())
            .info("logged out");
        Ok(())
    }
}

/// Where the pairing QR image for `phone` is written.
pub fn qr_image_path(qr_dir: &Path, phone: &str) -> PathBuf {
    qr_dir.join(format!("{phone}.png"))
}

fn advance(
    log: &Logger,
    from: ConnectionState,
    to: ConnectionState,
) -> Result<ConnectionState, TransitionError> {
    let next = from.transition(to)?;
    log.info(format!("session {from} -> {next}"));
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FailureFlags, LocalNetwork, PairingOutcome, PairingScript};
    use crate::store::{DeviceStore, MemoryStore};

    fn manager(network: &LocalNetwork) -> (SessionManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(network.clone()),
            &Logger::new(),
        );
        (manager, store)
    }

    fn script(outcome: PairingOutcome) -> PairingScript {
        PairingScript {
            phone: "+6281234".into(),
            codes: 2,
            outcome,
        }
    }

    #[test]
    fn test_pair_new_session_persists_device_and_removes_qr() {
        let network = LocalNetwork::new();
        network.set_pairing(script(PairingOutcome::Success));
        let (manager, store) = manager(&network);
        let dir = tempfile::tempdir().unwrap();

        let session = manager
            .pair_new_session("+6281234", dir.path(), false)
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.jid().user, "6281234");
        assert!(store.get_device(session.jid()).unwrap().is_some());
        assert!(!qr_image_path(dir.path(), "+6281234").exists());
    }

    #[test]
    fn test_pair_timeout_is_rejected() {
        let network = LocalNetwork::new();
        network.set_pairing(script(PairingOutcome::Timeout));
        let (manager, _) = manager(&network);
        let dir = tempfile::tempdir().unwrap();

        let err = manager
            .pair_new_session("+6281234", dir.path(), false)
            .unwrap_err();
        assert!(matches!(err, SessionError::Pair(PairError::Rejected(ref e)) if e == "timeout"));
    }

    #[test]
    fn test_pair_stream_closed() {
        let network = LocalNetwork::new();
        network.set_pairing(script(PairingOutcome::Close));
        let (manager, _) = manager(&network);
        let dir = tempfile::tempdir().unwrap();

        let err = manager
            .pair_new_session("+6281234", dir.path(), false)
            .unwrap_err();
        assert!(matches!(err, SessionError::Pair(PairError::StreamClosed)));
    }

    #[test]
    fn test_pair_qr_write_failure() {
        let network = LocalNetwork::new();
        network.set_pairing(script(PairingOutcome::Success));
        let (manager, _) = manager(&network);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = manager
            .pair_new_session("+6281234", &missing, false)
            .unwrap_err();
        assert!(matches!(err, SessionError::Pair(PairError::QrWrite(_))));
    }

    #[test]
    fn test_resume_session() {
        let network = LocalNetwork::new();
        let (manager, store) = manager(&network);
        let jid = JID::new_device("6281234", 4);
        store
            .put_device(&Device {
                jid: Some(jid.clone()),
                initialized: true,
                ..Default::default()
            })
            .unwrap();

        let session = manager
            .resume_session("6281234:4@s.whatsapp.net", "+6281234")
            .unwrap();
        assert_eq!(session.jid(), &jid);
        assert!(session.client().is_connected());
    }

    #[test]
    fn test_resume_errors() {
        let network = LocalNetwork::new();
        let (manager, store) = manager(&network);

        assert!(matches!(
            manager.resume_session("6281234:4@s.whatsapp.net", "+6281234"),
            Err(SessionError::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.resume_session("a@b@c", "+6281234"),
            Err(SessionError::InvalidJid(_))
        ));

        let jid = JID::new_device("6281234", 4);
        store
            .put_device(&Device {
                jid: Some(jid),
                ..Default::default()
            })
            .unwrap();
        network.set_failures(FailureFlags {
            connect: true,
            ..Default::default()
        });
        assert!(matches!(
            manager.resume_session("6281234:4@s.whatsapp.net", "+6281234"),
            Err(SessionError::Connect(_))
        ));
    }

    #[test]
    fn test_logout_removes_device() {
        let network = LocalNetwork::new();
        network.set_pairing(script(PairingOutcome::Success));
        let (manager, store) = manager(&network);
        let dir = tempfile::tempdir().unwrap();

        let mut session = manager
            .pair_new_session("+6281234", dir.path(), false)
            .unwrap();
        manager.logout(&mut session).unwrap();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(store.get_device(session.jid()).unwrap().is_none());
    }

    #[test]
    fn test_open_store_creates_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("bot");
        let store = SessionManager::open_store(name.to_str().unwrap()).unwrap();
        assert_eq!(store.path(), dir.path().join("bot.db").as_path());
    }
}
