//! UniFFI bindings for teleconsult-core.
//!
//! Provides a ConsultClient object that wraps the consultation session
//! (lobby, call lifecycle, controls, chat, layout) into a single FFI-safe
//! interface for native shells.

use std::sync::Arc;
use teleconsult_core::{
    consultation::{ClinicalNotes as CoreClinicalNotes, PatientChart as CorePatientChart},
    events::{
        ChatMessage as CoreChatMessage, ConnectionQuality as CoreConnectionQuality,
        ConnectionState as CoreConnectionState, ConsultEvent as CoreConsultEvent,
        ControlState as CoreControlState, ParticipantInfo as CoreParticipantInfo,
        PhaseKind as CorePhaseKind, TrackInfo as CoreTrackInfo, TrackKind as CoreTrackKind,
        TrackSource as CoreTrackSource,
    },
    layout::{StageLayout as CoreStageLayout, Tile as CoreTile},
    media::I420Frame as CoreI420Frame,
};

uniffi::include_scaffolding!("teleconsult");

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before using ConsultClient.
fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("teleconsult_core=debug,teleconsult_ffi=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .init();
    });
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl From<CoreConnectionState> for ConnectionState {
    fn from(s: CoreConnectionState) -> Self {
        match s {
            CoreConnectionState::Disconnected => Self::Disconnected,
            CoreConnectionState::Connecting => Self::Connecting,
            CoreConnectionState::Connected => Self::Connected,
            CoreConnectionState::Reconnecting { attempt } => Self::Reconnecting { attempt },
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Lost,
}

impl From<CoreConnectionQuality> for ConnectionQuality {
    fn from(q: CoreConnectionQuality) -> Self {
        match q {
            CoreConnectionQuality::Excellent => Self::Excellent,
            CoreConnectionQuality::Good => Self::Good,
            CoreConnectionQuality::Poor => Self::Poor,
            CoreConnectionQuality::Lost => Self::Lost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl From<CoreTrackKind> for TrackKind {
    fn from(k: CoreTrackKind) -> Self {
        match k {
            CoreTrackKind::Audio => Self::Audio,
            CoreTrackKind::Video => Self::Video,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

impl From<CoreTrackSource> for TrackSource {
    fn from(s: CoreTrackSource) -> Self {
        match s {
            CoreTrackSource::Microphone => Self::Microphone,
            CoreTrackSource::Camera => Self::Camera,
            CoreTrackSource::ScreenShare => Self::ScreenShare,
            CoreTrackSource::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Lobby,
    Joining,
    InCall,
}

impl From<CorePhaseKind> for PhaseKind {
    fn from(p: CorePhaseKind) -> Self {
        match p {
            CorePhaseKind::Lobby => Self::Lobby,
            CorePhaseKind::Joining => Self::Joining,
            CorePhaseKind::InCall => Self::InCall,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    pub is_muted: bool,
    pub has_video: bool,
    pub video_track_sid: Option<String>,
    pub connection_quality: ConnectionQuality,
}

impl From<CoreParticipantInfo> for ParticipantInfo {
    fn from(p: CoreParticipantInfo) -> Self {
        Self {
            sid: p.sid,
            identity: p.identity,
            name: p.name,
            is_muted: p.is_muted,
            has_video: p.has_video,
            video_track_sid: p.video_track_sid,
            connection_quality: p.connection_quality.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub sid: String,
    pub participant_sid: String,
    pub kind: TrackKind,
    pub source: TrackSource,
}

impl From<CoreTrackInfo> for TrackInfo {
    fn from(t: CoreTrackInfo) -> Self {
        Self {
            sid: t.sid,
            participant_sid: t.participant_sid,
            kind: t.kind.into(),
            source: t.source.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub participant: String,
    pub text: String,
    pub timestamp_ms: u64,
    pub is_local: bool,
}

impl From<CoreChatMessage> for ChatMessage {
    fn from(m: CoreChatMessage) -> Self {
        Self {
            id: m.id,
            participant: m.participant,
            text: m.text,
            timestamp_ms: m.timestamp_ms,
            is_local: m.is_local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub mic_muted: bool,
    pub camera_off: bool,
    pub screen_sharing: bool,
}

impl From<CoreControlState> for ControlState {
    fn from(s: CoreControlState) -> Self {
        Self {
            mic_muted: s.mic_muted,
            camera_off: s.camera_off,
            screen_sharing: s.screen_sharing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LobbyState {
    pub room_name: String,
    pub user_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub meeting_link: Option<String>,
    pub show_meeting_ready: bool,
    pub preview_active: bool,
    pub avatar_initial: String,
}

impl From<teleconsult_core::LobbyState> for LobbyState {
    fn from(s: teleconsult_core::LobbyState) -> Self {
        Self {
            room_name: s.room_name,
            user_name: s.user_name,
            audio_enabled: s.audio_enabled,
            video_enabled: s.video_enabled,
            meeting_link: s.meeting_link,
            show_meeting_ready: s.show_meeting_ready,
            preview_active: s.preview_active,
            avatar_initial: s.avatar_initial.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub room_name: String,
    pub user_name: String,
    pub token: String,
    pub server_url: String,
}

impl From<teleconsult_core::SessionDescriptor> for SessionDescriptor {
    fn from(d: teleconsult_core::SessionDescriptor) -> Self {
        Self {
            room_name: d.room_name,
            user_name: d.user_name,
            token: d.token,
            server_url: d.server_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsultationView {
    pub video_expanded: bool,
    pub chat_open: bool,
    pub share_popup_visible: bool,
    pub chart_visible: bool,
    pub notes_visible: bool,
    pub meeting_link: String,
}

impl From<teleconsult_core::ConsultationView> for ConsultationView {
    fn from(v: teleconsult_core::ConsultationView) -> Self {
        Self {
            chart_visible: v.chart_visible(),
            notes_visible: v.notes_visible(),
            video_expanded: v.video_expanded,
            chat_open: v.chat_open,
            share_popup_visible: v.share_popup_visible,
            meeting_link: v.meeting_link,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub participant_sid: String,
    pub label: String,
    pub initial: String,
    pub is_local: bool,
    pub is_muted: bool,
    pub video_track_sid: Option<String>,
}

impl From<CoreTile> for Tile {
    fn from(t: CoreTile) -> Self {
        Self {
            participant_sid: t.participant_sid,
            label: t.label,
            initial: t.initial.to_string(),
            is_local: t.is_local,
            is_muted: t.is_muted,
            video_track_sid: t.video_track_sid,
        }
    }
}

fn tiles(tiles: Vec<CoreTile>) -> Vec<Tile> {
    tiles.into_iter().map(Tile::from).collect()
}

#[derive(Debug, Clone)]
pub enum StageLayout {
    Empty,
    Solo { main: Tile },
    OneOnOne { main: Tile, pip: Tile },
    Grid { columns: u32, rows: u32, tiles: Vec<Tile>, pip: Option<Tile> },
    ScreenShare {
        presenter_sid: String,
        presenter_label: String,
        presenter_is_local: bool,
        thumbnails: Vec<Tile>,
    },
}

impl From<CoreStageLayout> for StageLayout {
    fn from(l: CoreStageLayout) -> Self {
        match l {
            CoreStageLayout::Empty => Self::Empty,
            CoreStageLayout::Solo { main } => Self::Solo { main: main.into() },
            CoreStageLayout::OneOnOne { main, pip } => {
                Self::OneOnOne { main: main.into(), pip: pip.into() }
            }
            CoreStageLayout::Grid { columns, rows, tiles: grid, pip } => Self::Grid {
                columns,
                rows,
                tiles: tiles(grid),
                pip: pip.map(Tile::from),
            },
            CoreStageLayout::ScreenShare { presenter_sid, presenter_label, presenter_is_local, thumbnails } => {
                Self::ScreenShare {
                    presenter_sid,
                    presenter_label,
                    presenter_is_local,
                    thumbnails: tiles(thumbnails),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub display_name: Option<String>,
    pub token_api_url: String,
    pub livekit_url: String,
    pub app_origin: String,
    pub mic_enabled_on_join: bool,
    pub camera_enabled_on_join: bool,
}

impl From<teleconsult_core::Settings> for Settings {
    fn from(s: teleconsult_core::Settings) -> Self {
        Self {
            display_name: s.display_name,
            token_api_url: s.token_api_url,
            livekit_url: s.livekit_url,
            app_origin: s.app_origin,
            mic_enabled_on_join: s.mic_enabled_on_join,
            camera_enabled_on_join: s.camera_enabled_on_join,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConsultEvent {
    ConnectionStateChanged { state: ConnectionState },
    ParticipantJoined { info: ParticipantInfo },
    ParticipantLeft { participant_sid: String },
    TrackSubscribed { info: TrackInfo },
    TrackUnsubscribed { track_sid: String },
    TrackMuted { participant_sid: String, source: TrackSource },
    TrackUnmuted { participant_sid: String, source: TrackSource },
    ActiveSpeakersChanged { participant_sids: Vec<String> },
    ConnectionQualityChanged { participant_sid: String, quality: ConnectionQuality },
    ChatMessageReceived { message: ChatMessage },
    UnreadCountChanged { count: u32 },
    ControlStateChanged { state: ControlState },
    SessionPhaseChanged { phase: PhaseKind },
    JoinFailed { message: String },
    DevicePreviewFailed { message: String },
}

impl From<CoreConsultEvent> for ConsultEvent {
    fn from(e: CoreConsultEvent) -> Self {
        match e {
            CoreConsultEvent::ConnectionStateChanged(s) => {
                Self::ConnectionStateChanged { state: s.into() }
            }
            CoreConsultEvent::ParticipantJoined(p) => {
                Self::ParticipantJoined { info: p.into() }
            }
            CoreConsultEvent::ParticipantLeft(sid) => {
                Self::ParticipantLeft { participant_sid: sid }
            }
            CoreConsultEvent::TrackSubscribed(t) => {
                Self::TrackSubscribed { info: t.into() }
            }
            CoreConsultEvent::TrackUnsubscribed(sid) => {
                Self::TrackUnsubscribed { track_sid: sid }
            }
            CoreConsultEvent::TrackMuted { participant_sid, source } => {
                Self::TrackMuted { participant_sid, source: source.into() }
            }
            CoreConsultEvent::TrackUnmuted { participant_sid, source } => {
                Self::TrackUnmuted { participant_sid, source: source.into() }
            }
            CoreConsultEvent::ActiveSpeakersChanged(sids) => {
                Self::ActiveSpeakersChanged { participant_sids: sids }
            }
            CoreConsultEvent::ConnectionQualityChanged { participant_sid, quality } => {
                Self::ConnectionQualityChanged { participant_sid, quality: quality.into() }
            }
            CoreConsultEvent::ChatMessageReceived(m) => {
                Self::ChatMessageReceived { message: m.into() }
            }
            CoreConsultEvent::UnreadCountChanged(count) => Self::UnreadCountChanged { count },
            CoreConsultEvent::ControlStateChanged(s) => Self::ControlStateChanged { state: s.into() },
            CoreConsultEvent::SessionPhaseChanged(p) => Self::SessionPhaseChanged { phase: p.into() },
            CoreConsultEvent::JoinFailed(message) => Self::JoinFailed { message },
            CoreConsultEvent::DevicePreviewFailed(message) => Self::DevicePreviewFailed { message },
        }
    }
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConsultError {
    #[error("Connection error: {msg}")]
    Connection { msg: String },
    #[error("Room error: {msg}")]
    Room { msg: String },
    #[error("Auth error: {msg}")]
    Auth { msg: String },
    #[error("HTTP error: {msg}")]
    Http { msg: String },
    #[error("Invalid input: {msg}")]
    InvalidInput { msg: String },
    #[error("Device error: {msg}")]
    Device { msg: String },
    #[error("Internal error: {msg}")]
    Internal { msg: String },
}

impl From<teleconsult_core::ConsultError> for ConsultError {
    fn from(e: teleconsult_core::ConsultError) -> Self {
        tracing::error!("ConsultError: {e}");
        match e {
            teleconsult_core::ConsultError::Connection(msg) => Self::Connection { msg },
            teleconsult_core::ConsultError::Room(msg) => Self::Room { msg },
            teleconsult_core::ConsultError::Auth(msg) => Self::Auth { msg },
            teleconsult_core::ConsultError::Http(msg) => Self::Http { msg },
            teleconsult_core::ConsultError::InvalidInput(msg) => Self::InvalidInput { msg },
            teleconsult_core::ConsultError::Device(msg) => Self::Device { msg },
        }
    }
}

/// Tightly packed I420 planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl From<CoreI420Frame> for I420Frame {
    fn from(f: CoreI420Frame) -> Self {
        Self {
            width: f.width,
            height: f.height,
            y: f.y,
            u: f.u,
            v: f.v,
        }
    }
}

impl From<I420Frame> for CoreI420Frame {
    fn from(f: I420Frame) -> Self {
        Self {
            width: f.width,
            height: f.height,
            y: f.y,
            u: f.u,
            v: f.v,
        }
    }
}

// ── Callback interfaces ───────────────────────────────────────────────

pub trait ConsultEventListener: Send + Sync {
    fn on_event(&self, event: ConsultEvent);
}

/// Camera/microphone preview owned by the native shell.
pub trait DevicePreview: Send + Sync {
    /// Open the preview. Returns false when the devices are unavailable.
    fn start(&self, audio: bool, video: bool) -> bool;
    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool;
    fn stop(&self);
}

/// Receives decoded frames of one remote video track.
pub trait VideoFrameSink: Send + Sync {
    fn on_frame(&self, track_sid: String, frame: I420Frame);
}

// ── Bridges: FFI callback → core trait ────────────────────────────────

struct BridgeListener {
    ffi_listener: Arc<dyn ConsultEventListener>,
}

impl teleconsult_core::ConsultEventListener for BridgeListener {
    fn on_event(&self, event: CoreConsultEvent) {
        self.ffi_listener.on_event(event.into());
    }
}

struct BridgePreview {
    ffi_preview: Box<dyn DevicePreview>,
}

impl teleconsult_core::DevicePreview for BridgePreview {
    fn start(&self, audio: bool, video: bool) -> Result<(), teleconsult_core::ConsultError> {
        if self.ffi_preview.start(audio, video) {
            Ok(())
        } else {
            Err(teleconsult_core::ConsultError::Device(format!(
                "could not open preview (audio={audio}, video={video})"
            )))
        }
    }

    fn set_track_enabled(&self, kind: CoreTrackKind, enabled: bool) -> bool {
        self.ffi_preview.set_track_enabled(kind.into(), enabled)
    }

    fn stop(&self) {
        self.ffi_preview.stop();
    }
}

struct BridgeSink {
    ffi_sink: Box<dyn VideoFrameSink>,
}

impl teleconsult_core::VideoSink for BridgeSink {
    fn on_frame(&self, track_sid: &str, frame: CoreI420Frame) {
        self.ffi_sink.on_frame(track_sid.to_string(), frame.into());
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── ConsultClient: main FFI object ────────────────────────────────────

pub struct ConsultClient {
    session: teleconsult_core::ConsultSession,
    settings: teleconsult_core::SettingsStore,
    rt: tokio::runtime::Runtime,
}

impl ConsultClient {
    /// Endpoint settings are read here; changes apply to the next client.
    pub fn new(data_dir: String) -> Result<Self, ConsultError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| ConsultError::Internal { msg: format!("tokio runtime: {e}") })?;
        let settings = teleconsult_core::SettingsStore::new(&data_dir);
        let session = teleconsult_core::ConsultSession::new(&settings.get());
        tracing::info!("ConsultClient created, data dir {data_dir}");
        Ok(Self { session, settings, rt })
    }

    pub fn add_listener(&self, listener: Box<dyn ConsultEventListener>) {
        let bridge = Arc::new(BridgeListener {
            ffi_listener: Arc::from(listener),
        });
        self.session.add_listener(bridge);
    }

    // ── Lobby ──

    pub fn open_link(&self, link: String) {
        self.session.open_link(&link);
    }

    pub fn current_link(&self) -> String {
        self.session.current_link()
    }

    pub fn lobby_state(&self) -> LobbyState {
        self.session.lobby_state().into()
    }

    pub fn set_room_name(&self, room: String) {
        self.session.with_lobby(|lobby| lobby.set_room_name(&room));
    }

    pub fn set_user_name(&self, user: String) {
        self.session.with_lobby(|lobby| lobby.set_user_name(&user));
    }

    pub fn toggle_lobby_audio(&self) -> bool {
        self.session.with_lobby(|lobby| lobby.toggle_audio())
    }

    pub fn toggle_lobby_video(&self) -> bool {
        self.session.with_lobby(|lobby| lobby.toggle_video())
    }

    pub fn new_meeting(&self) -> String {
        self.session.with_lobby(|lobby| lobby.new_meeting())
    }

    pub fn dismiss_meeting_ready(&self) {
        self.session.with_lobby(|lobby| lobby.dismiss_meeting_ready());
    }

    pub fn attach_preview(&self, preview: Box<dyn DevicePreview>) {
        let bridge = Arc::new(BridgePreview { ffi_preview: preview });
        self.session.with_lobby(|lobby| lobby.attach_preview(bridge));
    }

    pub fn release_preview(&self) {
        self.session.with_lobby(|lobby| lobby.release_preview());
    }

    // ── Session ──

    /// Run a join future, keeping panics from crossing the FFI boundary.
    fn guarded_join<T>(
        &self,
        join: impl std::future::Future<Output = Result<T, teleconsult_core::ConsultError>>,
    ) -> Result<T, ConsultError> {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.rt.block_on(join)));
        match result {
            Ok(res) => res.map_err(ConsultError::from),
            Err(panic_info) => {
                let msg = panic_message(panic_info.as_ref());
                tracing::error!("panic while joining: {msg}");
                Err(ConsultError::Internal { msg: format!("panic in join: {msg}") })
            }
        }
    }

    pub fn join(&self) -> Result<Option<SessionDescriptor>, ConsultError> {
        self.guarded_join(self.session.join_from_lobby())
            .map(|d| d.map(SessionDescriptor::from))
    }

    pub fn join_from_popup(&self) -> Result<Option<SessionDescriptor>, ConsultError> {
        self.guarded_join(self.session.join_from_popup())
            .map(|d| d.map(SessionDescriptor::from))
    }

    pub fn join_room(&self, room: String, user: String) -> Result<SessionDescriptor, ConsultError> {
        let settings = self.settings.get();
        let options = teleconsult_core::JoinOptions {
            audio: settings.mic_enabled_on_join,
            video: settings.camera_enabled_on_join,
        };
        self.guarded_join(self.session.join(&room, &user, options))
            .map(SessionDescriptor::from)
    }

    pub fn leave(&self) {
        self.rt.block_on(self.session.leave());
    }

    pub fn phase(&self) -> PhaseKind {
        self.session.phase().kind().into()
    }

    pub fn descriptor(&self) -> Option<SessionDescriptor> {
        self.session.descriptor().map(SessionDescriptor::from)
    }

    // ── Room ──

    pub fn connection_state(&self) -> ConnectionState {
        self.rt.block_on(self.session.room().connection_state()).into()
    }

    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.rt
            .block_on(self.session.room().participants())
            .into_iter()
            .map(ParticipantInfo::from)
            .collect()
    }

    pub fn local_participant(&self) -> Option<ParticipantInfo> {
        self.rt
            .block_on(self.session.room().local_participant_info())
            .map(ParticipantInfo::from)
    }

    pub fn active_speakers(&self) -> Vec<String> {
        self.rt.block_on(self.session.room().active_speakers())
    }

    pub fn stage_layout(&self) -> StageLayout {
        self.rt.block_on(self.session.room().stage_layout()).into()
    }

    pub fn presenter_banner(&self) -> Option<String> {
        self.rt.block_on(self.session.room().stage_layout()).presenter_banner()
    }

    pub fn screen_share_track_sid(&self, participant_sid: String) -> Option<String> {
        self.rt
            .block_on(self.session.room().screen_share_track_sid(&participant_sid))
    }

    /// Pull `count` samples of remote audio (48 kHz mono), silence-padded.
    pub fn pull_audio_samples(&self, count: u32) -> Vec<i16> {
        let mut out = vec![0i16; count as usize];
        self.session.room().playout_buffer().pull_samples(&mut out);
        out
    }

    /// Deliver decoded frames of a subscribed remote track to `sink`.
    /// Returns false when the track is not subscribed.
    pub fn start_video_renderer(&self, track_sid: String, sink: Box<dyn VideoFrameSink>) -> bool {
        let sink = Arc::new(BridgeSink { ffi_sink: sink });
        self.rt
            .block_on(self.session.room().start_video_renderer(&track_sid, sink))
    }

    pub fn stop_video_renderer(&self, track_sid: String) {
        self.session.room().stop_video_renderer(&track_sid);
    }

    // ── Controls ──

    pub fn control_state(&self) -> ControlState {
        self.session.controls().control_state().into()
    }

    pub fn toggle_microphone(&self) -> Result<ControlState, ConsultError> {
        self.rt
            .block_on(self.session.controls().toggle_microphone())
            .map(ControlState::from)
            .map_err(ConsultError::from)
    }

    pub fn toggle_camera(&self) -> Result<ControlState, ConsultError> {
        self.rt
            .block_on(self.session.controls().toggle_camera())
            .map(ControlState::from)
            .map_err(ConsultError::from)
    }

    pub fn toggle_screen_share(&self) -> Result<bool, ConsultError> {
        self.rt
            .block_on(self.session.controls().toggle_screen_share())
            .map_err(ConsultError::from)
    }

    /// Feed captured microphone PCM (48 kHz mono) into the call.
    pub fn push_audio_samples(&self, samples: Vec<i16>) -> Result<(), ConsultError> {
        self.rt
            .block_on(self.session.controls().push_audio_samples(&samples))
            .map_err(ConsultError::from)
    }

    pub fn push_camera_frame(&self, frame: I420Frame) -> Result<(), ConsultError> {
        self.session
            .controls()
            .push_camera_frame(&frame.into())
            .map_err(ConsultError::from)
    }

    pub fn push_screen_frame(&self, frame: I420Frame) -> Result<(), ConsultError> {
        self.session
            .controls()
            .push_screen_frame(&frame.into())
            .map_err(ConsultError::from)
    }

    // ── Chat ──

    pub fn send_chat_message(&self, text: String) -> Result<ChatMessage, ConsultError> {
        self.rt.block_on(async {
            self.session
                .chat()
                .send_message(&text)
                .await
                .map(ChatMessage::from)
                .map_err(ConsultError::from)
        })
    }

    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.rt
            .block_on(self.session.chat().messages())
            .into_iter()
            .map(ChatMessage::from)
            .collect()
    }

    pub fn unread_count(&self) -> u32 {
        self.rt.block_on(self.session.chat().unread_count())
    }

    // ── Consultation view ──

    pub fn consultation_view(&self) -> Option<ConsultationView> {
        self.session.consultation_view().map(ConsultationView::from)
    }

    pub fn toggle_chat(&self) -> bool {
        self.rt.block_on(self.session.toggle_chat())
    }

    pub fn toggle_video_expanded(&self) -> bool {
        self.session.toggle_video_expanded()
    }

    pub fn dismiss_share_popup(&self) {
        self.session.dismiss_share_popup();
    }

    pub fn patient_chart_json(&self) -> String {
        CorePatientChart::demo().to_json()
    }

    pub fn clinical_notes_json(&self) -> String {
        CoreClinicalNotes::demo().to_json()
    }

    // ── Settings ──

    pub fn get_settings(&self) -> Settings {
        self.settings.get().into()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.settings.set_display_name(name);
    }

    pub fn set_token_api_url(&self, url: String) {
        self.settings.set_token_api_url(url);
    }

    pub fn set_livekit_url(&self, url: String) {
        self.settings.set_livekit_url(url);
    }

    pub fn set_app_origin(&self, origin: String) {
        self.settings.set_app_origin(origin);
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.settings.set_mic_enabled_on_join(enabled);
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.settings.set_camera_enabled_on_join(enabled);
    }
}
