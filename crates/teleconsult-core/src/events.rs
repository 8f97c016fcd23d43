use std::sync::Arc;

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone)]
pub enum ConsultEvent {
    ConnectionStateChanged(ConnectionState),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(String), // participant SID
    TrackSubscribed(TrackInfo),
    TrackUnsubscribed(String), // track SID
    TrackMuted { participant_sid: String, source: TrackSource },
    TrackUnmuted { participant_sid: String, source: TrackSource },
    ActiveSpeakersChanged(Vec<String>), // participant SIDs
    ConnectionQualityChanged { participant_sid: String, quality: ConnectionQuality },
    ChatMessageReceived(ChatMessage),
    UnreadCountChanged(u32),
    ControlStateChanged(ControlState),
    SessionPhaseChanged(PhaseKind),
    /// Token request or room connection failed while joining.
    /// Shells surface this as a blocking alert.
    JoinFailed(String),
    /// Camera/microphone preview could not be opened in the lobby.
    DevicePreviewFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// Coarse session phase, without the session descriptor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Lobby,
    Joining,
    InCall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    pub is_muted: bool,
    pub has_video: bool,
    pub video_track_sid: Option<String>,
    pub connection_quality: ConnectionQuality,
}

impl ParticipantInfo {
    /// Name shown on tiles and chat bubbles: the display name, else the identity.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Lost,
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub sid: String,
    pub participant_sid: String,
    pub kind: TrackKind,
    pub source: TrackSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub participant: String,
    pub text: String,
    pub timestamp_ms: u64,
    pub is_local: bool,
}

/// Local media toggles as seen by the SDK.
///
/// `screen_sharing` is true when any participant in the room, local or
/// remote, currently publishes a screen-share track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub mic_muted: bool,
    pub camera_off: bool,
    pub screen_sharing: bool,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait ConsultEventListener: Send + Sync {
    fn on_event(&self, event: ConsultEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn ConsultEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConsultEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn emit(&self, event: ConsultEvent) {
        // Snapshot so a listener may register another listener without deadlocking.
        let listeners: Vec<_> = self.listeners.read().unwrap().iter().cloned().collect();
        for listener in listeners {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
