//! Teleconsult client core.
//!
//! Drives the pre-join lobby, the in-call consultation view, media
//! controls and data-channel chat on top of the LiveKit client SDK.
//! Contains no UI code; native shells consume it through `teleconsult-ffi`.

pub mod audio_playout;
pub mod auth;
pub mod chat;
pub mod consultation;
pub mod controls;
pub mod errors;
pub mod events;
pub mod layout;
pub mod lobby;
pub mod media;
pub mod participants;
pub mod room;
pub mod session;
pub mod settings;
pub mod video;

pub use audio_playout::AudioPlayoutBuffer;
pub use auth::{TokenClient, TokenGrant};
pub use chat::ChatService;
pub use consultation::{ClinicalNotes, ConsultationView, PatientChart};
pub use controls::MeetingControls;
pub use errors::ConsultError;
pub use events::{
    ChatMessage, ConnectionQuality, ConnectionState, ConsultEvent, ConsultEventListener,
    ControlState, ParticipantInfo, PhaseKind, TrackInfo, TrackKind, TrackSource,
};
pub use layout::{StageLayout, Tile};
pub use lobby::{DevicePreview, Lobby, LobbyState};
pub use media::I420Frame;
pub use participants::ParticipantManager;
pub use room::RoomManager;
pub use session::{ConsultSession, JoinOptions, SessionDescriptor, SessionPhase};
pub use settings::{Settings, SettingsStore};
pub use video::{VideoRenderers, VideoSink};
