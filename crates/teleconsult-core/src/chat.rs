use std::sync::Arc;
use tokio::sync::Mutex;
use livekit::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ConsultError;
use crate::events::{ChatMessage, ConsultEvent, EventEmitter};

/// Data-channel topic carrying chat packets.
pub const CHAT_TOPIC: &str = "chat";

/// Sender label used when a packet does not name its participant.
pub const ANONYMOUS_SENDER: &str = "Anonyme";

/// JSON body of a chat packet: `{"participant": "...", "message": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    participant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Whether a data packet published on `topic` carries chat.
pub fn is_chat_packet(topic: Option<&str>) -> bool {
    topic == Some(CHAT_TOPIC)
}

/// Encode an outgoing chat packet.
pub fn encode_payload(participant: &str, text: &str) -> Result<Vec<u8>, ConsultError> {
    let payload = ChatPayload {
        participant: Some(participant.to_string()),
        message: Some(text.to_string()),
    };
    serde_json::to_vec(&payload).map_err(|e| ConsultError::InvalidInput(e.to_string()))
}

/// Decode an incoming chat packet into a message stamped with receipt time.
///
/// `local_name` is the name this client sends under; packets carrying it are
/// flagged `is_local`.
pub fn decode_payload(bytes: &[u8], local_name: &str) -> Result<ChatMessage, ConsultError> {
    let payload: ChatPayload = serde_json::from_slice(bytes)
        .map_err(|e| ConsultError::InvalidInput(format!("malformed chat packet: {e}")))?;
    let text = payload
        .message
        .ok_or_else(|| ConsultError::InvalidInput("chat packet without message".into()))?;
    let participant = payload
        .participant
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ANONYMOUS_SENDER.to_string());
    let is_local = participant == local_name;
    Ok(new_message(participant, text, is_local))
}

fn new_message(participant: String, text: String, is_local: bool) -> ChatMessage {
    ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        participant,
        text,
        timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
        is_local,
    }
}

/// In-memory chat history for one call, in receipt order.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    open: bool,
    unread: u32,
}

impl ChatLog {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Append a message. Returns the new unread count when it changed.
    pub fn push(&mut self, msg: ChatMessage) -> Option<u32> {
        let counts = !msg.is_local && !self.open;
        self.messages.push(msg);
        if counts {
            self.unread += 1;
            Some(self.unread)
        } else {
            None
        }
    }

    /// Open or close the chat overlay. Opening marks everything read.
    /// Returns the new unread count when it changed.
    pub fn set_open(&mut self, open: bool) -> Option<u32> {
        self.open = open;
        if open && self.unread > 0 {
            self.unread = 0;
            Some(0)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.unread = 0;
        self.open = false;
    }
}

/// Shared chat log between the RoomManager event loop and ChatService.
pub type ChatStore = Arc<Mutex<ChatLog>>;

/// Append `msg` to the store and notify listeners.
pub(crate) async fn record(store: &ChatStore, emitter: &EventEmitter, msg: ChatMessage) {
    let unread = store.lock().await.push(msg.clone());
    emitter.emit(ConsultEvent::ChatMessageReceived(msg));
    if let Some(count) = unread {
        emitter.emit(ConsultEvent::UnreadCountChanged(count));
    }
}

/// Name the local participant publishes chat under.
pub(crate) fn local_chat_name(room: &Room) -> String {
    let local = room.local_participant();
    let name = local.name().to_string();
    if name.is_empty() {
        local.identity().to_string()
    } else {
        name
    }
}

/// Chat over the LiveKit reliable data channel.
pub struct ChatService {
    room: Arc<Mutex<Option<Arc<Room>>>>,
    emitter: EventEmitter,
    store: ChatStore,
}

impl ChatService {
    pub fn new(room: Arc<Mutex<Option<Arc<Room>>>>, emitter: EventEmitter, store: ChatStore) -> Self {
        Self {
            room,
            emitter,
            store,
        }
    }

    /// Send a chat message to every participant.
    ///
    /// Surrounding whitespace is trimmed; blank messages are rejected.
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, ConsultError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConsultError::InvalidInput("empty chat message".into()));
        }

        let room = self.room.lock().await;
        let room = room
            .as_ref()
            .ok_or_else(|| ConsultError::Room("not connected".into()))?;

        let sender = local_chat_name(room);
        let packet = DataPacket {
            payload: encode_payload(&sender, text)?,
            topic: Some(CHAT_TOPIC.to_string()),
            reliable: true,
            ..Default::default()
        };

        room.local_participant()
            .publish_data(packet)
            .await
            .map_err(|e| ConsultError::Room(format!("send chat: {e}")))?;

        let msg = new_message(sender, text.to_string(), true);
        self.store.lock().await.push(msg.clone());
        self.emitter.emit(ConsultEvent::ChatMessageReceived(msg.clone()));

        Ok(msg)
    }

    /// All messages of the current call.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.store.lock().await.messages().to_vec()
    }

    pub async fn unread_count(&self) -> u32 {
        self.store.lock().await.unread()
    }

    /// Track whether the chat overlay is visible, for unread accounting.
    pub async fn set_chat_open(&self, open: bool) {
        let changed = self.store.lock().await.set_open(open);
        if let Some(count) = changed {
            self.emitter.emit(ConsultEvent::UnreadCountChanged(count));
        }
    }

    /// Handle an incoming chat message from the event loop.
    pub async fn handle_incoming(&self, msg: ChatMessage) {
        record(&self.store, &self.emitter, msg).await;
    }

    /// Clear all messages (on leave).
    pub async fn clear(&self) {
        self.store.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::capturing_emitter;

    fn remote(participant: &str, text: &str) -> ChatMessage {
        new_message(participant.into(), text.into(), false)
    }

    #[test]
    fn encode_uses_participant_and_message_keys() {
        let bytes = encode_payload("dr-martin", "Bonjour").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["participant"], "dr-martin");
        assert_eq!(json["message"], "Bonjour");
    }

    #[test]
    fn only_chat_topic_is_chat() {
        assert!(is_chat_packet(Some("chat")));
        assert!(!is_chat_packet(Some("reactions")));
        assert!(!is_chat_packet(Some("Chat")));
        assert!(!is_chat_packet(None));
    }

    #[test]
    fn decode_remote_message() {
        let msg = decode_payload(br#"{"participant":"patient","message":"Hello"}"#, "dr-martin")
            .unwrap();
        assert_eq!(msg.participant, "patient");
        assert_eq!(msg.text, "Hello");
        assert!(!msg.is_local);
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp_ms > 0);
    }

    #[test]
    fn decode_flags_own_name_as_local() {
        let msg = decode_payload(br#"{"participant":"dr-martin","message":"echo"}"#, "dr-martin")
            .unwrap();
        assert!(msg.is_local);
    }

    #[test]
    fn decode_defaults_missing_participant() {
        let msg = decode_payload(br#"{"message":"who am i"}"#, "dr-martin").unwrap();
        assert_eq!(msg.participant, ANONYMOUS_SENDER);
        assert!(!msg.is_local);
    }

    #[test]
    fn decode_rejects_garbage_and_missing_text() {
        assert!(decode_payload(b"\xff\xfe", "me").is_err());
        assert!(decode_payload(b"not json", "me").is_err());
        assert!(decode_payload(br#"{"participant":"x"}"#, "me").is_err());
    }

    #[test]
    fn ids_are_unique() {
        let a = decode_payload(br#"{"participant":"p","message":"same"}"#, "me").unwrap();
        let b = decode_payload(br#"{"participant":"p","message":"same"}"#, "me").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn log_keeps_receipt_order() {
        let mut log = ChatLog::default();
        for text in ["one", "two", "three"] {
            log.push(remote("p", text));
        }
        let texts: Vec<_> = log.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn unread_counts_only_remote_messages_while_closed() {
        let mut log = ChatLog::default();
        assert_eq!(log.push(remote("p", "a")), Some(1));
        assert_eq!(log.push(new_message("me".into(), "mine".into(), true)), None);
        assert_eq!(log.push(remote("p", "b")), Some(2));

        assert_eq!(log.set_open(true), Some(0));
        assert_eq!(log.push(remote("p", "c")), None);
        assert_eq!(log.unread(), 0);

        assert_eq!(log.set_open(false), None);
        assert_eq!(log.push(remote("p", "d")), Some(1));
    }

    #[test]
    fn clear_resets_log() {
        let mut log = ChatLog::default();
        log.set_open(true);
        log.push(remote("p", "a"));
        log.clear();
        assert!(log.messages().is_empty());
        assert_eq!(log.unread(), 0);
        assert!(!log.is_open());
    }

    #[tokio::test]
    async fn send_requires_connection_and_text() {
        let (emitter, capture) = capturing_emitter();
        let chat = ChatService::new(Arc::new(Mutex::new(None)), emitter, ChatStore::default());

        assert!(matches!(
            chat.send_message("   ").await,
            Err(ConsultError::InvalidInput(_))
        ));
        assert!(matches!(chat.send_message("hello").await, Err(ConsultError::Room(_))));
        assert!(chat.messages().await.is_empty());
        assert!(capture.taken().is_empty());
    }

    #[tokio::test]
    async fn incoming_messages_emit_events_and_unread() {
        let (emitter, capture) = capturing_emitter();
        let chat = ChatService::new(Arc::new(Mutex::new(None)), emitter, ChatStore::default());

        chat.handle_incoming(remote("patient", "first")).await;
        chat.handle_incoming(remote("patient", "second")).await;
        assert_eq!(chat.unread_count().await, 2);

        chat.set_chat_open(true).await;
        assert_eq!(chat.unread_count().await, 0);

        let events = capture.taken();
        let unread: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ConsultEvent::UnreadCountChanged(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(unread, [1, 2, 0]);

        let texts: Vec<_> = chat.messages().await.into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["first", "second"]);
    }
}
