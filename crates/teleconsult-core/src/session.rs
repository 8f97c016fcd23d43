//! Client session: lobby → joining → in call, and back.

use std::sync::{Arc, Mutex, Weak};

use crate::auth::TokenClient;
use crate::chat::ChatService;
use crate::consultation::ConsultationView;
use crate::controls::MeetingControls;
use crate::errors::ConsultError;
use crate::events::{
    ConnectionState, ConsultEvent, ConsultEventListener, EventEmitter, PhaseKind,
};
use crate::lobby::{self, Lobby, LobbyState};
use crate::room::RoomManager;
use crate::settings::Settings;

/// Everything needed to stay in a call, created on a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub room_name: String,
    pub user_name: String,
    pub token: String,
    pub server_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Lobby,
    Joining,
    InCall(SessionDescriptor),
}

impl SessionPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Lobby => PhaseKind::Lobby,
            Self::Joining => PhaseKind::Joining,
            Self::InCall(_) => PhaseKind::InCall,
        }
    }
}

/// Media state to enter the call with, carried over from the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    pub audio: bool,
    pub video: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self { audio: true, video: true }
    }
}

/// State shared with the disconnect watcher.
struct SessionState {
    emitter: EventEmitter,
    phase: Mutex<SessionPhase>,
    current_link: Mutex<String>,
    view: Mutex<Option<ConsultationView>>,
}

impl SessionState {
    fn phase_kind(&self) -> PhaseKind {
        self.phase.lock().unwrap().kind()
    }

    /// Move to `next`, emitting `SessionPhaseChanged` when the kind changes.
    fn set_phase(&self, next: SessionPhase) {
        let (before, after) = {
            let mut phase = self.phase.lock().unwrap();
            let before = phase.kind();
            *phase = next;
            (before, phase.kind())
        };
        if before != after {
            tracing::info!("session phase: {before:?} -> {after:?}");
            self.emitter.emit(ConsultEvent::SessionPhaseChanged(after));
        }
    }

    /// Lobby → Joining in one step. False when a join is under way or a call is up.
    fn begin_join(&self) -> bool {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != SessionPhase::Lobby {
                return false;
            }
            *phase = SessionPhase::Joining;
        }
        tracing::info!("session phase: Lobby -> Joining");
        self.emitter.emit(ConsultEvent::SessionPhaseChanged(PhaseKind::Joining));
        true
    }

    /// Joining → InCall. False when the join was cancelled in the meantime.
    fn enter_call(&self, descriptor: SessionDescriptor, link: String) -> bool {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != SessionPhase::Joining {
                return false;
            }
            *self.current_link.lock().unwrap() = link.clone();
            *self.view.lock().unwrap() = Some(ConsultationView::new(link));
            *phase = SessionPhase::InCall(descriptor);
        }
        tracing::info!("session phase: Joining -> InCall");
        self.emitter.emit(ConsultEvent::SessionPhaseChanged(PhaseKind::InCall));
        true
    }

    /// Joining → Lobby. False when the join was already cancelled.
    fn abort_join(&self) -> bool {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != SessionPhase::Joining {
                return false;
            }
            *phase = SessionPhase::Lobby;
        }
        tracing::info!("session phase: Joining -> Lobby");
        self.emitter.emit(ConsultEvent::SessionPhaseChanged(PhaseKind::Lobby));
        true
    }

    /// Drop the call state and go back to the lobby.
    fn return_to_lobby(&self) {
        *self.view.lock().unwrap() = None;
        {
            let mut link = self.current_link.lock().unwrap();
            *link = lobby::without_room(&link);
        }
        self.set_phase(SessionPhase::Lobby);
    }
}

/// Sends the session back to the lobby when the room drops underneath it.
struct DisconnectWatcher {
    state: Weak<SessionState>,
}

impl ConsultEventListener for DisconnectWatcher {
    fn on_event(&self, event: ConsultEvent) {
        if let ConsultEvent::ConnectionStateChanged(ConnectionState::Disconnected) = event {
            if let Some(state) = self.state.upgrade() {
                if state.phase_kind() == PhaseKind::InCall {
                    tracing::info!("room closed while in call, returning to lobby");
                    state.return_to_lobby();
                }
            }
        }
    }
}

/// One consultation client: lobby, call lifecycle and in-call panels.
pub struct ConsultSession {
    tokens: TokenClient,
    default_server_url: String,
    origin: String,
    room: Arc<RoomManager>,
    controls: MeetingControls,
    chat: ChatService,
    lobby: Mutex<Lobby>,
    state: Arc<SessionState>,
}

impl ConsultSession {
    pub fn new(settings: &Settings) -> Self {
        let room = Arc::new(RoomManager::new());
        let emitter = room.emitter();
        let state = Arc::new(SessionState {
            emitter: emitter.clone(),
            phase: Mutex::new(SessionPhase::Lobby),
            current_link: Mutex::new(settings.app_origin.clone()),
            view: Mutex::new(None),
        });
        emitter.add_listener(Arc::new(DisconnectWatcher {
            state: Arc::downgrade(&state),
        }));

        let mut lobby = Lobby::new(&settings.app_origin, emitter)
            .with_media(settings.mic_enabled_on_join, settings.camera_enabled_on_join);
        if let Some(name) = &settings.display_name {
            lobby.set_user_name(name);
        }

        Self {
            tokens: TokenClient::new(&settings.token_api_url),
            default_server_url: settings.livekit_url.clone(),
            origin: settings.app_origin.clone(),
            controls: room.controls(),
            chat: room.chat(),
            room,
            lobby: Mutex::new(lobby),
            state,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConsultEventListener>) {
        self.room.add_listener(listener);
    }

    pub fn room(&self) -> Arc<RoomManager> {
        self.room.clone()
    }

    pub fn controls(&self) -> &MeetingControls {
        &self.controls
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase.lock().unwrap().clone()
    }

    pub fn descriptor(&self) -> Option<SessionDescriptor> {
        match self.phase() {
            SessionPhase::InCall(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// The address the client currently stands at: the app origin, with
    /// `?room=` while in a call.
    pub fn current_link(&self) -> String {
        self.state.current_link.lock().unwrap().clone()
    }

    /// Open the client at `link`; a `room` parameter pre-fills the lobby.
    pub fn open_link(&self, link: &str) {
        *self.state.current_link.lock().unwrap() = link.to_string();
        self.with_lobby(|lobby| lobby.prefill_from_link(link));
    }

    /// Run `f` against the lobby.
    pub fn with_lobby<R>(&self, f: impl FnOnce(&mut Lobby) -> R) -> R {
        f(&mut self.lobby.lock().unwrap())
    }

    pub fn lobby_state(&self) -> LobbyState {
        self.with_lobby(|lobby| lobby.snapshot())
    }

    /// Join with the lobby's form and media toggles.
    ///
    /// Returns `Ok(None)` when no room name is entered.
    pub async fn join_from_lobby(&self) -> Result<Option<SessionDescriptor>, ConsultError> {
        self.join_lobby_request(Lobby::join_request).await
    }

    /// Join from the "meeting ready" popup, closing it.
    pub async fn join_from_popup(&self) -> Result<Option<SessionDescriptor>, ConsultError> {
        self.join_lobby_request(Lobby::join_from_popup).await
    }

    async fn join_lobby_request(
        &self,
        take: impl FnOnce(&mut Lobby) -> Option<(String, String)>,
    ) -> Result<Option<SessionDescriptor>, ConsultError> {
        let request = self.with_lobby(|lobby| {
            take(lobby).map(|(room, user)| {
                let options = JoinOptions { audio: lobby.audio_enabled(), video: lobby.video_enabled() };
                (room, user, options)
            })
        });
        match request {
            Some((room, user, options)) => self.join(&room, &user, options).await.map(Some),
            None => Ok(None),
        }
    }

    /// Request a token, connect, and enter the call.
    ///
    /// Any failure is reported as `JoinFailed` and leaves the session in the lobby.
    /// A `leave` while joining cancels the join, which then fails with
    /// `ConsultError::Room` and no `JoinFailed`.
    pub async fn join(
        &self,
        room_name: &str,
        user_name: &str,
        options: JoinOptions,
    ) -> Result<SessionDescriptor, ConsultError> {
        let room_name = room_name.trim();
        if room_name.is_empty() {
            return Err(ConsultError::InvalidInput("room name is required".into()));
        }
        let user_name = match user_name.trim() {
            "" => lobby::default_user_name(),
            name => name.to_string(),
        };
        if !self.state.begin_join() {
            return Err(ConsultError::InvalidInput("already joining or in a call".into()));
        }

        let grant = match self.tokens.request_token(room_name, &user_name).await {
            Ok(grant) => grant,
            Err(e) => return Err(self.fail_join(e)),
        };
        if self.state.phase_kind() != PhaseKind::Joining {
            tracing::info!("join of {room_name} cancelled before connecting");
            return Err(join_cancelled());
        }
        let server_url = grant
            .server_url
            .unwrap_or_else(|| self.default_server_url.clone());

        if let Err(e) = self.room.connect_with_token(&server_url, &grant.token).await {
            return Err(self.fail_join(e));
        }

        let descriptor = SessionDescriptor {
            room_name: room_name.to_string(),
            user_name,
            token: grant.token,
            server_url,
        };
        let link = lobby::meeting_link(&self.origin, room_name);
        if !self.state.enter_call(descriptor.clone(), link) {
            tracing::info!("join of {room_name} cancelled while connecting");
            self.room.disconnect().await;
            self.controls.reset().await;
            return Err(join_cancelled());
        }
        tracing::info!("joined {} as {}", descriptor.room_name, descriptor.user_name);

        if let Err(e) = self.controls.set_microphone_enabled(options.audio).await {
            tracing::warn!("microphone not available in call: {e}");
        }
        if let Err(e) = self.controls.set_camera_enabled(options.video).await {
            tracing::warn!("camera not available in call: {e}");
        }

        Ok(descriptor)
    }

    fn fail_join(&self, error: ConsultError) -> ConsultError {
        if !self.state.abort_join() {
            tracing::info!("cancelled join failed: {error}");
            return join_cancelled();
        }
        tracing::warn!("join failed: {error}");
        self.state.emitter.emit(ConsultEvent::JoinFailed(error.to_string()));
        error
    }

    /// Leave the call, or cancel a join in progress, and return to the lobby.
    pub async fn leave(&self) {
        if self.state.phase_kind() == PhaseKind::Lobby {
            return;
        }
        self.chat.set_chat_open(false).await;
        self.room.disconnect().await;
        self.controls.reset().await;
        self.state.return_to_lobby();
    }

    /// Current in-call view flags, `None` outside a call.
    pub fn consultation_view(&self) -> Option<ConsultationView> {
        self.state.view.lock().unwrap().clone()
    }

    /// Show or hide the chat overlay. Returns whether it is now open.
    pub async fn toggle_chat(&self) -> bool {
        let open = {
            let mut view = self.state.view.lock().unwrap();
            match view.as_mut() {
                Some(view) => view.toggle_chat(),
                None => return false,
            }
        };
        self.chat.set_chat_open(open).await;
        open
    }

    /// Expand the video stage over the chart and notes panes.
    pub fn toggle_video_expanded(&self) -> bool {
        self.state
            .view
            .lock()
            .unwrap()
            .as_mut()
            .is_some_and(|view| view.toggle_video_expanded())
    }

    pub fn dismiss_share_popup(&self) {
        if let Some(view) = self.state.view.lock().unwrap().as_mut() {
            view.dismiss_share_popup();
        }
    }
}

fn join_cancelled() -> ConsultError {
    ConsultError::Room("join cancelled".into())
}
