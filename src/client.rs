//! In-process chat network.
//!
//! [`LocalNetwork`] stands in for the WhatsApp servers: it knows which
//! numbers are registered, scripts the pairing handshake, stores uploads and
//! records every outbound message. [`LocalClient`] is the per-device
//! [`ChatTransport`] it hands out. The binary's local mode and the
//! integration tests run the bridge against it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::crypto::{sha256, MediaKeys};
use crate::phone::sanitize_phone;
use crate::protocol::{QRChannel, QREvent, QRPairing};
use crate::store::Device;
use crate::transport::{
    ChatTransport, Connector, EventHandler, IsOnWhatsAppResponse, MediaType, SendResponse,
    TransportError, UploadResponse,
};
use crate::types::{
    servers, Connected, DeviceSentMeta, Event, Message, MessageBody, MessageInfo, PairSuccess, JID,
};

const MEDIA_HOST: &str = "https://mmg.whatsapp.net";
const QR_CHANNEL_CAPACITY: usize = 16;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a scripted pairing handshake ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The phone scans the last code and the device is linked.
    Success,
    /// Nobody scans; the code stream times out.
    Timeout,
    /// The server rejects the handshake with a message.
    Error(String),
    /// The server reports the client version as outdated.
    ClientOutdated,
    /// The stream closes without a terminal event.
    Close,
}

/// Pairing handshake played out when an unpaired device connects.
#[derive(Debug, Clone)]
pub struct PairingScript {
    /// Account the scanning phone belongs to.
    pub phone: String,
    /// Number of codes emitted before the outcome.
    pub codes: usize,
    pub outcome: PairingOutcome,
}

impl Default for PairingScript {
    fn default() -> Self {
        Self {
            phone: String::new(),
            codes: 1,
            outcome: PairingOutcome::Success,
        }
    }
}

/// Network calls that should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureFlags {
    pub connect: bool,
    pub lookup: bool,
    pub upload: bool,
    pub send: bool,
}

/// A message accepted by the network.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    /// Device that sent it.
    pub from: Option<JID>,
    pub to: JID,
    pub message: MessageBody,
    pub timestamp: DateTime<Utc>,
}

/// A media object stored by the network.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub data: Vec<u8>,
    pub media_type: MediaType,
    pub response: UploadResponse,
}

#[derive(Default)]
struct NetworkState {
    registered: RwLock<HashSet<String>>,
    pairing: Mutex<PairingScript>,
    failures: RwLock<FailureFlags>,
    sent: Mutex<Vec<SentMessage>>,
    uploads: Mutex<Vec<StoredUpload>>,
    clients: Mutex<Vec<Weak<ClientShared>>>,
    next_device: AtomicU16,
}

impl NetworkState {
    fn failures(&self) -> FailureFlags {
        *self.failures.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clients still held by someone. Dropped ones are pruned.
    fn live_clients(&self) -> Vec<Arc<ClientShared>> {
        let mut clients = lock(&self.clients);
        clients.retain(|client| client.strong_count() > 0);
        clients.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Simulated chat network shared by every client it creates.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    state: Arc<NetworkState>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a phone number as having an account.
    pub fn register_number(&self, phone: &str) {
        self.state
            .registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sanitize_phone(phone, false));
    }

    /// Replace the pairing handshake for devices connecting from now on.
    pub fn set_pairing(&self, script: PairingScript) {
        *lock(&self.state.pairing) = script;
    }

    pub fn set_failures(&self, failures: FailureFlags) {
        *self
            .state
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner) = failures;
    }

    /// Messages accepted so far, oldest first.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        lock(&self.state.sent).clone()
    }

    /// Media objects stored so far, oldest first.
    pub fn uploads(&self) -> Vec<StoredUpload> {
        lock(&self.state.uploads).clone()
    }

    /// Deliver `event` to every connected client of device `jid`.
    ///
    /// Each handler runs on its own thread; the handles are returned so the
    /// caller can wait for delivery to finish.
    pub fn deliver(&self, jid: &JID, event: Event) -> Vec<JoinHandle<()>> {
        self.state
            .live_clients()
            .iter()
            .filter(|client| {
                client.connected.load(Ordering::SeqCst)
                    && client.device_jid().as_ref() == Some(jid)
            })
            .flat_map(|client| client.dispatch(event.clone()))
            .collect()
    }

    /// A text message from `sender_phone`, as a remote party sends it.
    pub fn incoming_text(sender_phone: &str, push_name: &str, text: &str) -> Event {
        let sender = JID::new(sanitize_phone(sender_phone, false), servers::DEFAULT_USER);
        Event::Message(Box::new(Message {
            info: MessageInfo {
                id: new_message_id(),
                msg_type: "text".to_string(),
                chat: sender.clone(),
                sender,
                is_from_me: false,
                is_group: false,
                timestamp: Utc::now(),
                push_name: Some(push_name.to_string()),
                device_sent_meta: None,
            },
            message: MessageBody::text(text),
        }))
    }

    /// A text message another device of `own_phone` sent to `destination`.
    pub fn device_sent_text(own_phone: &str, destination: &str, text: &str) -> Event {
        let sender = JID::new(sanitize_phone(own_phone, false), servers::DEFAULT_USER);
        let chat = JID::new(sanitize_phone(destination, false), servers::DEFAULT_USER);
        Event::Message(Box::new(Message {
            info: MessageInfo {
                id: new_message_id(),
                msg_type: "text".to_string(),
                device_sent_meta: Some(DeviceSentMeta {
                    destination_jid: chat.to_string(),
                    phash: None,
                }),
                sender,
                chat,
                is_from_me: true,
                is_group: false,
                timestamp: Utc::now(),
                push_name: None,
            },
            message: MessageBody::text(text),
        }))
    }
}

impl Connector for LocalNetwork {
    fn client_for(&self, device: Device) -> Arc<dyn ChatTransport> {
        let shared = Arc::new(ClientShared {
            device: RwLock::new(device),
            connected: AtomicBool::new(false),
            qr_sender: Mutex::new(None),
            handlers: RwLock::new(Vec::new()),
            next_handler_id: AtomicU32::new(1),
        });
        let mut clients = lock(&self.state.clients);
        clients.retain(|client| client.strong_count() > 0);
        clients.push(Arc::downgrade(&shared));
        drop(clients);

        Arc::new(LocalClient {
            shared,
            network: Arc::clone(&self.state),
        })
    }
}

struct ClientShared {
    device: RwLock<Device>,
    connected: AtomicBool,
    qr_sender: Mutex<Option<mpsc::Sender<QREvent>>>,
    handlers: RwLock<Vec<(u32, EventHandler)>>,
    next_handler_id: AtomicU32,
}

impl ClientShared {
    fn device(&self) -> Device {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn device_jid(&self) -> Option<JID> {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .jid
            .clone()
    }

    fn dispatch(&self, event: Event) -> Vec<JoinHandle<()>> {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                thread::spawn(move || handler(event))
            })
            .collect()
    }
}

/// Client for one device on a [`LocalNetwork`].
pub struct LocalClient {
    shared: Arc<ClientShared>,
    network: Arc<NetworkState>,
}

impl LocalClient {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.shared.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn start_pairing(&self, sender: mpsc::Sender<QREvent>) {
        let script = lock(&self.network.pairing).clone();
        let shared = Arc::clone(&self.shared);
        let network = Arc::clone(&self.network);

        thread::spawn(move || {
            let mut pairing = QRPairing::new(&shared.device(), script.codes);
            for _ in 0..script.codes {
                let Some(code) = pairing.current_code().map(str::to_string) else {
                    break;
                };
                let timeout = pairing.current_timeout();
                if sender.blocking_send(QREvent::Code { data: code, timeout }).is_err() {
                    return;
                }
                pairing.next_code();
            }

            let event = match script.outcome {
                PairingOutcome::Success => {
                    let device_id = network.next_device.fetch_add(1, Ordering::SeqCst) + 1;
                    let user = sanitize_phone(&script.phone, false);
                    let jid = JID::new_device(user.clone(), device_id);
                    {
                        let mut device = shared.device.write().unwrap_or_else(PoisonError::into_inner);
                        device.jid = Some(jid.clone());
                        device.platform = "web".to_string();
                    }
                    network
                        .registered
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(user);
                    shared.connected.store(true, Ordering::SeqCst);
                    shared.dispatch(Event::PairSuccess(PairSuccess {
                        jid,
                        platform: "web".to_string(),
                    }));
                    QREvent::Success
                }
                PairingOutcome::Timeout => QREvent::Timeout,
                PairingOutcome::Error(message) => QREvent::Error(message),
                PairingOutcome::ClientOutdated => QREvent::ClientOutdated,
                PairingOutcome::Close => return,
            };
            if !matches!(event, QREvent::Success) {
                shared.connected.store(false, Ordering::SeqCst);
            }
            let _ = sender.blocking_send(event);
        });
    }
}

impl ChatTransport for LocalClient {
    fn connect(&self) -> Result<(), TransportError> {
        if self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyConnected);
        }
        if self.network.failures().connect {
            return Err(TransportError::ConnectionFailed(
                "websocket handshake rejected".to_string(),
            ));
        }

        if self.shared.device_jid().is_some() {
            self.shared.connected.store(true, Ordering::SeqCst);
            self.shared.dispatch(Event::Connected(Connected {
                is_reconnect: false,
            }));
            return Ok(());
        }

        let sender = lock(&self.shared.qr_sender)
            .take()
            .ok_or(TransportError::QrChannelUnavailable)?;
        self.start_pairing(sender);
        Ok(())
    }

    fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn device(&self) -> Device {
        self.shared.device()
    }

    fn qr_channel(&self) -> Result<QRChannel, TransportError> {
        if self.shared.device_jid().is_some() || self.is_connected() {
            return Err(TransportError::QrChannelUnavailable);
        }
        let (sender, receiver) = mpsc::channel(QR_CHANNEL_CAPACITY);
        *lock(&self.shared.qr_sender) = Some(sender);
        Ok(receiver)
    }

    fn is_on_whatsapp(&self, phones: &[String]) -> Result<Vec<IsOnWhatsAppResponse>, TransportError> {
        self.ensure_connected()?;
        if self.network.failures().lookup {
            return Err(TransportError::QueryFailed("usync query timed out".to_string()));
        }

        let registered = self
            .network
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(phones
            .iter()
            .map(|phone| {
                let user = sanitize_phone(phone, false);
                IsOnWhatsAppResponse {
                    query: phone.clone(),
                    is_in: registered.contains(&user),
                    jid: JID::new(user, servers::DEFAULT_USER),
                }
            })
            .collect())
    }

    fn upload(&self, data: &[u8], media_type: MediaType) -> Result<UploadResponse, TransportError> {
        self.ensure_connected()?;
        if self.network.failures().upload {
            return Err(TransportError::UploadFailed("media server returned 500".to_string()));
        }

        let media_key: [u8; 32] = rand::random();
        let keys = MediaKeys::expand(&media_key, media_type.key_info())
            .map_err(|e| TransportError::UploadFailed(e.to_string()))?;
        let sealed = keys
            .seal(data)
            .map_err(|e| TransportError::UploadFailed(e.to_string()))?;

        let file_enc_sha256 = sha256(&sealed);
        let token = URL_SAFE_NO_PAD.encode(&file_enc_sha256);
        let direct_path = format!(
            "/v/t62.7118-24/{}.enc?ccb=11-4&oh={token}",
            Uuid::new_v4().simple()
        );
        let response = UploadResponse {
            url: format!("{MEDIA_HOST}{direct_path}&mms-type={}", media_type.endpoint()),
            direct_path,
            media_key: media_key.to_vec(),
            file_enc_sha256,
            file_sha256: sha256(data),
            file_length: data.len() as u64,
        };

        lock(&self.network.uploads).push(StoredUpload {
            data: data.to_vec(),
            media_type,
            response: response.clone(),
        });
        Ok(response)
    }

    fn send_message(&self, to: &JID, message: MessageBody) -> Result<SendResponse, TransportError> {
        self.ensure_connected()?;
        if self.network.failures().send {
            return Err(TransportError::SendFailed("server did not ack message".to_string()));
        }

        let sent = SentMessage {
            id: new_message_id(),
            from: self.shared.device_jid(),
            to: to.clone(),
            message,
            timestamp: Utc::now(),
        };
        let response = SendResponse {
            id: sent.id.clone(),
            timestamp: sent.timestamp,
        };
        lock(&self.network.sent).push(sent);
        Ok(response)
    }

    fn add_event_handler(&self, handler: EventHandler) -> u32 {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    fn remove_event_handler(&self, id: u32) -> bool {
        let mut handlers = self
            .shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }
}

fn new_message_id() -> String {
    format!("3EB0{}", &Uuid::new_v4().simple().to_string().to_uppercase()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn paired_client(network: &LocalNetwork, phone: &str) -> Arc<dyn ChatTransport> {
        let device = Device {
            jid: Some(JID::new_device(sanitize_phone(phone, false), 1)),
            initialized: true,
            ..Default::default()
        };
        let client = network.client_for(device);
        client.connect().unwrap();
        client
    }

    #[test]
    fn test_pairing_emits_codes_then_success() {
        let network = LocalNetwork::new();
        network.set_pairing(PairingScript {
            phone: "+6281234".into(),
            codes: 2,
            outcome: PairingOutcome::Success,
        });

        let mut device = Device::new();
        device.initialize();
        let client = network.client_for(device);
        let mut qr = client.qr_channel().unwrap();
        client.connect().unwrap();

        let events: Vec<QREvent> = std::iter::from_fn(|| qr.blocking_recv()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].name(), "code");
        assert_eq!(events[1].name(), "code");
        assert_eq!(events[2], QREvent::Success);

        assert!(client.is_connected());
        assert_eq!(client.device().jid.unwrap().user, "6281234");
    }

    #[test]
    fn test_connect_unpaired_without_qr_channel() {
        let network = LocalNetwork::new();
        let client = network.client_for(Device::new());
        assert_eq!(client.connect(), Err(TransportError::QrChannelUnavailable));
    }

    #[test]
    fn test_is_on_whatsapp() {
        let network = LocalNetwork::new();
        network.register_number("+6281234");
        let client = paired_client(&network, "+62999");

        let resp = client
            .is_on_whatsapp(&["+6281234".to_string(), "+1555".to_string()])
            .unwrap();
        assert!(resp[0].is_in);
        assert_eq!(resp[0].jid.to_string(), "6281234@s.whatsapp.net");
        assert!(!resp[1].is_in);
    }

    #[test]
    fn test_upload_digests() {
        let network = LocalNetwork::new();
        let client = paired_client(&network, "+62999");

        let data = b"\x89PNG\r\n\x1a\nfake";
        let resp = client.upload(data, MediaType::Image).unwrap();
        assert_eq!(resp.file_sha256, sha256(data));
        assert_eq!(resp.file_length, data.len() as u64);
        assert_eq!(resp.media_key.len(), 32);
        assert!(resp.url.ends_with("&mms-type=image"));
        assert!(resp.url.contains(&resp.direct_path));
        assert_eq!(network.uploads()[0].data, data.to_vec());
    }

    #[test]
    fn test_failure_injection() {
        let network = LocalNetwork::new();
        let client = paired_client(&network, "+62999");
        network.set_failures(FailureFlags {
            send: true,
            upload: true,
            ..Default::default()
        });

        let to = JID::new("6281234", servers::DEFAULT_USER);
        assert!(matches!(
            client.send_message(&to, MessageBody::text("hi")),
            Err(TransportError::SendFailed(_))
        ));
        assert!(matches!(
            client.upload(b"x", MediaType::Image),
            Err(TransportError::UploadFailed(_))
        ));
        assert!(network.sent_messages().is_empty());
    }

    #[test]
    fn test_send_requires_connection() {
        let network = LocalNetwork::new();
        let client = paired_client(&network, "+62999");
        client.disconnect();
        let to = JID::new("6281234", servers::DEFAULT_USER);
        assert_eq!(
            client.send_message(&to, MessageBody::text("hi")),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_deliver_runs_handlers_on_threads() {
        let network = LocalNetwork::new();
        let client = paired_client(&network, "+62999");
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = client.add_event_handler(Arc::new(move |event| {
            if matches!(event, Event::Message(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let jid = client.device().jid.unwrap();
        for handle in network.deliver(&jid, LocalNetwork::incoming_text("+1555", "Ann", "hi")) {
            handle.join().unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(client.remove_event_handler(id));
        assert!(!client.remove_event_handler(id));
        assert!(network
            .deliver(&jid, LocalNetwork::incoming_text("+1555", "Ann", "hi"))
            .is_empty());
    }

    #[test]
    fn test_dropped_clients_are_forgotten() {
        let network = LocalNetwork::new();
        let kept = paired_client(&network, "+62999");
        for _ in 0..3 {
            let client = paired_client(&network, "+62888");
            client.disconnect();
        }

        let live = network.state.live_clients();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].device_jid(), kept.device().jid);
        assert_eq!(lock(&network.state.clients).len(), 1);
    }
}
