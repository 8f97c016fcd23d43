//! Pre-join lobby: room/name entry, meeting creation and device preview.

use std::sync::Arc;

use rand::Rng;

use crate::errors::ConsultError;
use crate::events::{ConsultEvent, EventEmitter, TrackKind};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// Local camera/microphone preview shown before joining.
///
/// Implemented by the UI shell, which owns the capture devices.
pub trait DevicePreview: Send + Sync {
    /// Open the preview with the requested devices.
    fn start(&self, audio: bool, video: bool) -> Result<(), ConsultError>;
    /// Enable or disable the preview track of `kind`.
    /// Returns false when the preview holds no such track.
    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool;
    /// Release every capture device.
    fn stop(&self);
}

/// Snapshot of the lobby for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyState {
    pub room_name: String,
    pub user_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub meeting_link: Option<String>,
    pub show_meeting_ready: bool,
    pub preview_active: bool,
    pub avatar_initial: char,
}

pub struct Lobby {
    origin: String,
    emitter: EventEmitter,
    room_name: String,
    user_name: String,
    audio_enabled: bool,
    video_enabled: bool,
    meeting_link: Option<String>,
    show_meeting_ready: bool,
    preview: Option<Arc<dyn DevicePreview>>,
    preview_active: bool,
}

impl Lobby {
    pub fn new(origin: &str, emitter: EventEmitter) -> Self {
        Self {
            origin: origin.to_string(),
            emitter,
            room_name: String::new(),
            user_name: String::new(),
            audio_enabled: true,
            video_enabled: true,
            meeting_link: None,
            show_meeting_ready: false,
            preview: None,
            preview_active: false,
        }
    }

    /// Start with the given microphone and camera choices.
    pub fn with_media(mut self, audio: bool, video: bool) -> Self {
        self.audio_enabled = audio;
        self.video_enabled = video;
        self
    }

    pub fn snapshot(&self) -> LobbyState {
        LobbyState {
            room_name: self.room_name.clone(),
            user_name: self.user_name.clone(),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            meeting_link: self.meeting_link.clone(),
            show_meeting_ready: self.show_meeting_ready,
            preview_active: self.preview_active,
            avatar_initial: avatar_initial(&self.user_name),
        }
    }

    pub fn set_room_name(&mut self, room: &str) {
        self.room_name = room.to_string();
    }

    pub fn set_user_name(&mut self, user: &str) {
        self.user_name = user.to_string();
    }

    /// Pre-fill the room from a shared meeting link (`…?room=<name>`).
    pub fn prefill_from_link(&mut self, link: &str) -> bool {
        match room_from_link(link) {
            Some(room) => {
                tracing::info!("lobby pre-filled from link: room={room}");
                self.room_name = room;
                true
            }
            None => false,
        }
    }

    /// Attach the shell's preview and open it with the current toggles.
    ///
    /// A failing device is logged and reported, never fatal.
    pub fn attach_preview(&mut self, preview: Arc<dyn DevicePreview>) {
        self.release_preview();
        match preview.start(self.audio_enabled, self.video_enabled) {
            Ok(()) => {
                self.preview_active = true;
            }
            Err(e) => {
                tracing::warn!("device preview unavailable: {e}");
                self.preview_active = false;
                self.emitter.emit(ConsultEvent::DevicePreviewFailed(e.to_string()));
            }
        }
        self.preview = Some(preview);
    }

    /// Stop the preview and release the devices.
    pub fn release_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            if self.preview_active {
                preview.stop();
            }
        }
        self.preview_active = false;
    }

    /// Flip the preview microphone. Returns the resulting state.
    pub fn toggle_audio(&mut self) -> bool {
        let next = !self.audio_enabled;
        if self.apply_to_preview(TrackKind::Audio, next) {
            self.audio_enabled = next;
        }
        self.audio_enabled
    }

    /// Flip the preview camera. Returns the resulting state.
    pub fn toggle_video(&mut self) -> bool {
        let next = !self.video_enabled;
        if self.apply_to_preview(TrackKind::Video, next) {
            self.video_enabled = next;
        }
        self.video_enabled
    }

    // Toggles only take effect on a live preview holding the track.
    fn apply_to_preview(&self, kind: TrackKind, enabled: bool) -> bool {
        match &self.preview {
            Some(preview) if self.preview_active => preview.set_track_enabled(kind, enabled),
            _ => false,
        }
    }

    /// Create a fresh meeting and show the "meeting ready" popup.
    pub fn new_meeting(&mut self) -> String {
        if self.user_name.trim().is_empty() {
            self.user_name = default_user_name();
        }
        let room = format!("meet-{}", random_id());
        self.meeting_link = Some(meeting_link(&self.origin, &room));
        self.room_name = room.clone();
        self.show_meeting_ready = true;
        tracing::info!("new meeting created: {room}");
        room
    }

    pub fn dismiss_meeting_ready(&mut self) {
        self.show_meeting_ready = false;
    }

    /// Validate the form and produce `(room, user)` to join with.
    ///
    /// Returns `None` when no room is entered. The preview is released
    /// before joining so the call can claim the devices.
    pub fn join_request(&mut self) -> Option<(String, String)> {
        let room = self.room_name.trim().to_string();
        if room.is_empty() {
            return None;
        }
        let user = match self.user_name.trim() {
            "" => default_user_name(),
            name => name.to_string(),
        };
        self.release_preview();
        Some((room, user))
    }

    /// Join from the "meeting ready" popup, closing it.
    pub fn join_from_popup(&mut self) -> Option<(String, String)> {
        let request = self.join_request()?;
        self.show_meeting_ready = false;
        Some(request)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }
}

/// Nine random base-36 characters.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

pub fn default_user_name() -> String {
    format!("User-{}", random_id())
}

/// First letter of the name, upper-cased; `U` for an empty name.
pub fn avatar_initial(name: &str) -> char {
    name.trim()
        .chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('U')
}

/// Shareable link to `room` under `origin`.
pub fn meeting_link(origin: &str, room: &str) -> String {
    match url::Url::parse(origin) {
        Ok(mut url) => {
            url.query_pairs_mut().clear().append_pair("room", room);
            url.to_string()
        }
        Err(e) => {
            tracing::warn!("invalid app origin {origin:?}: {e}");
            format!("{}?room={}", origin, urlencoding::encode(room))
        }
    }
}

/// Room named by a meeting link's `room` query parameter.
pub fn room_from_link(link: &str) -> Option<String> {
    let url = url::Url::parse(link.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "room")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `link` with its `room` query parameter removed.
pub fn without_room(link: &str) -> String {
    let Ok(mut url) = url::Url::parse(link) else {
        return link.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "room")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::capturing_emitter;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePreview {
        fail: bool,
        has_audio: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakePreview {
        fn working() -> Arc<Self> {
            Arc::new(Self { has_audio: true, ..Default::default() })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DevicePreview for FakePreview {
        fn start(&self, audio: bool, video: bool) -> Result<(), ConsultError> {
            self.calls.lock().unwrap().push(format!("start {audio} {video}"));
            if self.fail {
                Err(ConsultError::Device("NotAllowedError".into()))
            } else {
                Ok(())
            }
        }

        fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
            self.calls.lock().unwrap().push(format!("{kind:?} {enabled}"));
            kind == TrackKind::Video || self.has_audio
        }

        fn stop(&self) {
            self.calls.lock().unwrap().push("stop".into());
        }
    }

    fn lobby() -> Lobby {
        Lobby::new("http://localhost:5173", crate::events::EventEmitter::new())
    }

    #[test]
    fn seeded_media_choices_open_the_preview() {
        let mut lobby = lobby().with_media(false, true);
        let state = lobby.snapshot();
        assert!(!state.audio_enabled);
        assert!(state.video_enabled);

        let preview = FakePreview::working();
        lobby.attach_preview(preview.clone());
        assert_eq!(preview.calls(), ["start false true"]);
    }

    #[test]
    fn random_ids_are_base36() {
        let id = random_id();
        assert_eq!(id.len(), 9);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert!(default_user_name().starts_with("User-"));
    }

    #[test]
    fn new_meeting_fills_room_user_and_link() {
        let mut lobby = lobby();
        let room = lobby.new_meeting();

        let state = lobby.snapshot();
        assert!(room.starts_with("meet-"));
        assert_eq!(room.len(), "meet-".len() + 9);
        assert_eq!(state.room_name, room);
        assert!(state.user_name.starts_with("User-"));
        assert!(state.show_meeting_ready);
        assert_eq!(
            state.meeting_link.as_deref(),
            Some(format!("http://localhost:5173/?room={room}").as_str())
        );
    }

    #[test]
    fn new_meeting_keeps_typed_name() {
        let mut lobby = lobby();
        lobby.set_user_name("Dr Martin");
        lobby.new_meeting();
        assert_eq!(lobby.snapshot().user_name, "Dr Martin");
    }

    #[test]
    fn join_without_room_is_a_no_op() {
        let mut lobby = lobby();
        lobby.set_room_name("   ");
        assert!(lobby.join_request().is_none());
    }

    #[test]
    fn join_defaults_blank_user_name() {
        let mut lobby = lobby();
        lobby.set_room_name(" consultation-1 ");
        let (room, user) = lobby.join_request().unwrap();
        assert_eq!(room, "consultation-1");
        assert!(user.starts_with("User-"));
    }

    #[test]
    fn join_releases_preview_and_popup_join_closes_popup() {
        let preview = FakePreview::working();
        let mut lobby = lobby();
        lobby.attach_preview(preview.clone());
        lobby.new_meeting();

        let (_, user) = lobby.join_from_popup().unwrap();
        assert!(user.starts_with("User-"));

        let state = lobby.snapshot();
        assert!(!state.show_meeting_ready);
        assert!(!state.preview_active);
        assert_eq!(preview.calls(), ["start true true", "stop"]);
    }

    #[test]
    fn toggles_follow_the_preview() {
        let preview = FakePreview::working();
        let mut lobby = lobby();
        lobby.attach_preview(preview.clone());

        assert!(!lobby.toggle_audio());
        assert!(!lobby.toggle_video());
        assert!(lobby.toggle_video());
        assert_eq!(
            preview.calls(),
            ["start true true", "Audio false", "Video false", "Video true"]
        );
    }

    #[test]
    fn toggle_without_track_keeps_state() {
        let preview = Arc::new(FakePreview::default()); // no audio track
        let mut lobby = lobby();
        lobby.attach_preview(preview);
        assert!(lobby.toggle_audio());
        assert!(lobby.audio_enabled());
    }

    #[test]
    fn toggle_without_preview_keeps_state() {
        let mut lobby = lobby();
        assert!(lobby.toggle_audio());
        assert!(lobby.toggle_video());
    }

    #[test]
    fn preview_failure_is_reported_not_fatal() {
        let (emitter, capture) = capturing_emitter();
        let mut lobby = Lobby::new("http://localhost:5173", emitter);
        let preview = Arc::new(FakePreview { fail: true, ..Default::default() });

        lobby.attach_preview(preview.clone());

        assert!(!lobby.snapshot().preview_active);
        let events = capture.taken();
        assert!(matches!(
            events.as_slice(),
            [ConsultEvent::DevicePreviewFailed(msg)] if msg.contains("NotAllowedError")
        ));

        // Joining still works and does not stop a preview that never started.
        lobby.set_room_name("consultation-1");
        assert!(lobby.join_request().is_some());
        assert_eq!(preview.calls(), ["start true true"]);
    }

    #[test]
    fn avatar_initial_rules() {
        assert_eq!(avatar_initial("martin"), 'M');
        assert_eq!(avatar_initial("élodie"), 'É');
        assert_eq!(avatar_initial(""), 'U');
        assert_eq!(avatar_initial("   "), 'U');
    }

    #[test]
    fn links_round_trip_room_parameter() {
        let link = meeting_link("https://consult.example/", "meet-abc123xyz");
        assert_eq!(link, "https://consult.example/?room=meet-abc123xyz");
        assert_eq!(room_from_link(&link).as_deref(), Some("meet-abc123xyz"));
        assert_eq!(without_room(&link), "https://consult.example/");
    }

    #[test]
    fn without_room_keeps_other_parameters() {
        assert_eq!(
            without_room("https://consult.example/?lang=fr&room=r1"),
            "https://consult.example/?lang=fr"
        );
        assert!(room_from_link("https://consult.example/?lang=fr").is_none());
        assert!(room_from_link("not a url").is_none());
    }

    #[test]
    fn prefill_from_shared_link() {
        let mut lobby = lobby();
        assert!(lobby.prefill_from_link("http://localhost:5173/?room=consultation-7"));
        assert_eq!(lobby.snapshot().room_name, "consultation-7");
        assert!(!lobby.prefill_from_link("http://localhost:5173/"));
    }
}
