use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use livekit::prelude::{RemoteParticipant, Room, RoomEvent, RoomOptions};
use livekit::track::{
    RemoteTrack,
    RemoteVideoTrack,
    TrackKind as LkTrackKind,
    TrackSource as LkTrackSource,
};
use livekit::participant::ConnectionQuality as LkConnectionQuality;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use futures_util::StreamExt;

use crate::audio_playout::{AudioPlayoutBuffer, PLAYOUT_CHANNELS, PLAYOUT_SAMPLE_RATE};
use crate::chat::{self, ChatStore};
use crate::controls::{self, ControlStore, SourceStore};
use crate::errors::ConsultError;
use crate::events::{
    ConnectionQuality, ConnectionState, ConsultEvent, ConsultEventListener, ControlState,
    EventEmitter, ParticipantInfo, TrackInfo, TrackKind, TrackSource,
};
use crate::layout::StageLayout;
use crate::participants::ParticipantManager;
use crate::video::{VideoRenderers, VideoSink};

/// A subscribed remote video track and where it comes from.
#[derive(Clone)]
struct SubscribedVideo {
    track: RemoteVideoTrack,
    participant_sid: String,
    source: TrackSource,
}

type VideoRegistry = Arc<Mutex<HashMap<String, SubscribedVideo>>>;

/// Per-call state, dropped whenever the room goes away.
#[derive(Clone)]
struct CallState {
    participants: Arc<Mutex<ParticipantManager>>,
    subscribed_tracks: VideoRegistry,
    chat: ChatStore,
    playout_buffer: Arc<AudioPlayoutBuffer>,
    control_state: ControlStore,
    sources: SourceStore,
    renderers: VideoRenderers,
}

impl CallState {
    fn new() -> Self {
        Self {
            participants: Arc::new(Mutex::new(ParticipantManager::new())),
            subscribed_tracks: Arc::new(Mutex::new(HashMap::new())),
            chat: ChatStore::default(),
            playout_buffer: Arc::new(AudioPlayoutBuffer::new()),
            control_state: ControlStore::default(),
            sources: SourceStore::default(),
            renderers: VideoRenderers::default(),
        }
    }

    async fn clear(&self) {
        self.renderers.stop_all();
        self.participants.lock().await.clear();
        self.subscribed_tracks.lock().await.clear();
        self.chat.lock().await.clear();
        self.playout_buffer.clear();
        self.sources.lock().unwrap().clear();
        *self.control_state.lock().unwrap() = ControlState::default();
    }
}

/// Manages the lifecycle of a LiveKit room connection.
pub struct RoomManager {
    room: Arc<Mutex<Option<Arc<Room>>>>,
    emitter: EventEmitter,
    connection_state: Arc<Mutex<ConnectionState>>,
    call: CallState,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::with_emitter(EventEmitter::new())
    }

    /// Build a manager that reports through an existing emitter.
    pub fn with_emitter(emitter: EventEmitter) -> Self {
        Self {
            room: Arc::new(Mutex::new(None)),
            emitter,
            connection_state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            call: CallState::new(),
        }
    }

    /// Remote audio, decoded to 48 kHz mono PCM, for the shell's audio output.
    pub fn playout_buffer(&self) -> Arc<AudioPlayoutBuffer> {
        self.call.playout_buffer.clone()
    }

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Register a listener for room events.
    pub fn add_listener(&self, listener: Arc<dyn ConsultEventListener>) {
        self.emitter.add_listener(listener);
    }

    /// Create MeetingControls bound to this room.
    pub fn controls(&self) -> controls::MeetingControls {
        controls::MeetingControls::new(
            self.room.clone(),
            self.emitter.clone(),
            self.call.control_state.clone(),
            self.call.sources.clone(),
        )
    }

    /// Create a ChatService bound to this room.
    pub fn chat(&self) -> chat::ChatService {
        chat::ChatService::new(self.room.clone(), self.emitter.clone(), self.call.chat.clone())
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.room.lock().await.is_some()
    }

    /// Snapshot of the remote participants, in join order.
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        self.call.participants.lock().await.participants().to_vec()
    }

    /// Local participant info, for the self-view tile.
    pub async fn local_participant_info(&self) -> Option<ParticipantInfo> {
        let room = self.room.lock().await;
        let room = room.as_ref()?;
        let local = room.local_participant();
        let name = {
            let n = local.name().to_string();
            if n.is_empty() { None } else { Some(n) }
        };
        let live = |source: LkTrackSource| {
            local
                .track_publications()
                .values()
                .any(|p| p.source() == source && !p.is_muted())
        };
        let has_video = live(LkTrackSource::Camera);
        Some(ParticipantInfo {
            sid: local.sid().to_string(),
            identity: local.identity().to_string(),
            name,
            is_muted: !live(LkTrackSource::Microphone),
            has_video,
            video_track_sid: if has_video { Some("local-camera".to_string()) } else { None },
            connection_quality: ConnectionQuality::Excellent,
        })
    }

    pub async fn active_speakers(&self) -> Vec<String> {
        self.call.participants.lock().await.active_speakers().to_vec()
    }

    /// SID of the participant currently sharing a screen, local first.
    pub async fn screen_share_presenter(&self) -> Option<String> {
        let room = self.room.lock().await.clone()?;
        let local = room.local_participant();
        let local_sharing = local
            .track_publications()
            .values()
            .any(|p| p.source() == LkTrackSource::Screenshare);
        let remote_sharing: Vec<String> = room
            .remote_participants()
            .values()
            .filter(|p| {
                p.track_publications()
                    .values()
                    .any(|p| p.source() == LkTrackSource::Screenshare)
            })
            .map(|p| p.sid().to_string())
            .collect();

        let pm = self.call.participants.lock().await;
        let join_order: Vec<String> = pm.participants().iter().map(|p| p.sid.clone()).collect();
        pick_presenter(local.sid().to_string(), local_sharing, &remote_sharing, &join_order)
    }

    /// Current arrangement of the video stage.
    pub async fn stage_layout(&self) -> StageLayout {
        let presenter = self.screen_share_presenter().await;
        let local = self.local_participant_info().await;
        let remotes = self.participants().await;
        StageLayout::compute(local.as_ref(), &remotes, presenter.as_deref())
    }

    /// Last mirrored media toggles.
    pub fn control_state(&self) -> ControlState {
        *self.call.control_state.lock().unwrap()
    }

    /// Get a subscribed remote video track by its SID.
    pub async fn get_video_track(&self, track_sid: &str) -> Option<RemoteVideoTrack> {
        self.call.subscribed_tracks
            .lock()
            .await
            .get(track_sid)
            .map(|v| v.track.clone())
    }

    /// All currently subscribed video track SIDs.
    pub async fn video_track_sids(&self) -> Vec<String> {
        self.call.subscribed_tracks.lock().await.keys().cloned().collect()
    }

    /// Subscribed screen-share track of a remote presenter.
    pub async fn screen_share_track_sid(&self, participant_sid: &str) -> Option<String> {
        self.call.subscribed_tracks
            .lock()
            .await
            .iter()
            .find(|(_, v)| v.participant_sid == participant_sid && v.source == TrackSource::ScreenShare)
            .map(|(sid, _)| sid.clone())
    }

    /// Deliver decoded frames of a subscribed remote video track to `sink`.
    /// Returns false when no such track is subscribed.
    pub async fn start_video_renderer(&self, track_sid: &str, sink: Arc<dyn VideoSink>) -> bool {
        match self.get_video_track(track_sid).await {
            Some(track) => {
                self.call.renderers.start(track_sid, track, sink);
                true
            }
            None => {
                tracing::warn!("no subscribed video track {track_sid} to render");
                false
            }
        }
    }

    pub fn stop_video_renderer(&self, track_sid: &str) {
        self.call.renderers.stop(track_sid);
    }

    /// Connect with a LiveKit URL and an access token.
    pub async fn connect_with_token(
        &self,
        livekit_url: &str,
        token: &str,
    ) -> Result<(), ConsultError> {
        self.set_connection_state(ConnectionState::Connecting).await;

        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, events) = match Room::connect(livekit_url, token, options).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!("room connection to {livekit_url} failed: {e}");
                self.set_connection_state(ConnectionState::Disconnected).await;
                return Err(ConsultError::Connection(format!("{livekit_url}: {e}")));
            }
        };

        // Nothing from a previous room survives into this one
        self.call.clear().await;

        let room = Arc::new(room);

        {
            let local = room.local_participant();
            let mut pm = self.call.participants.lock().await;
            pm.set_local_sid(local.sid().to_string());
        }

        // Seed existing remote participants
        {
            let mut pm = self.call.participants.lock().await;
            for (_, participant) in room.remote_participants() {
                let info = Self::remote_participant_to_info(&participant);
                pm.add_participant(info.clone());
                self.emitter.emit(ConsultEvent::ParticipantJoined(info));
            }
        }

        *self.room.lock().await = Some(room.clone());
        controls::refresh_state(&room, &self.call.control_state, &self.emitter);

        self.set_connection_state(ConnectionState::Connected).await;
        tracing::info!("connected to room {}", room.name());

        let ctx = LoopContext {
            emitter: self.emitter.clone(),
            connection_state: self.connection_state.clone(),
            room_ref: self.room.clone(),
            call: self.call.clone(),
        };

        tokio::spawn(async move {
            ctx.run(events).await;
        });

        Ok(())
    }

    /// Disconnect from the current room.
    pub async fn disconnect(&self) {
        let room = self.room.lock().await.take();
        if let Some(room) = room {
            if let Err(e) = room.close().await {
                tracing::warn!("error closing room: {e}");
            }
        }
        self.call.clear().await;
        self.set_connection_state(ConnectionState::Disconnected).await;
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.lock().await = state.clone();
        self.emitter.emit(ConsultEvent::ConnectionStateChanged(state));
    }

    fn remote_participant_to_info(p: &RemoteParticipant) -> ParticipantInfo {
        let name = {
            let n = p.name().to_string();
            if n.is_empty() { None } else { Some(n) }
        };

        // Video state is only set by TrackSubscribed, so a tile never
        // points at a track missing from the registry.
        let is_muted = p.track_publications().values().any(|pub_| {
            pub_.kind() == LkTrackKind::Audio && pub_.is_muted()
        });

        ParticipantInfo {
            sid: p.sid().to_string(),
            identity: p.identity().to_string(),
            name,
            is_muted,
            has_video: false,
            video_track_sid: None,
            connection_quality: ConnectionQuality::Good,
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn lk_source_to_consult(source: LkTrackSource) -> TrackSource {
    match source {
        LkTrackSource::Microphone => TrackSource::Microphone,
        LkTrackSource::Camera => TrackSource::Camera,
        LkTrackSource::Screenshare => TrackSource::ScreenShare,
        _ => TrackSource::Unknown,
    }
}

/// Choose whose screen share goes on stage: the local one, else the
/// earliest-joined remote presenter.
fn pick_presenter(
    local_sid: String,
    local_sharing: bool,
    remote_sharing: &[String],
    join_order: &[String],
) -> Option<String> {
    if local_sharing {
        return Some(local_sid);
    }
    join_order
        .iter()
        .find(|sid| remote_sharing.contains(*sid))
        .or_else(|| remote_sharing.first())
        .cloned()
}

/// Shared state the room event loop updates.
struct LoopContext {
    emitter: EventEmitter,
    connection_state: Arc<Mutex<ConnectionState>>,
    room_ref: Arc<Mutex<Option<Arc<Room>>>>,
    call: CallState,
}

impl LoopContext {
    async fn refresh_controls(&self) {
        if let Some(room) = self.room_ref.lock().await.clone() {
            controls::refresh_state(&room, &self.call.control_state, &self.emitter);
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.connection_state.lock().await = state.clone();
        self.emitter.emit(ConsultEvent::ConnectionStateChanged(state));
    }

    async fn run(self, mut events: tokio::sync::mpsc::UnboundedReceiver<RoomEvent>) {
        let mut reconnect_attempt: u32 = 0;
        // Audio playout tasks per track, aborted on unsubscribe/disconnect
        let mut audio_stream_tasks: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Connected { .. } | RoomEvent::Reconnected => {
                    reconnect_attempt = 0;
                    self.set_state(ConnectionState::Connected).await;
                }

                RoomEvent::Reconnecting => {
                    reconnect_attempt += 1;
                    self.set_state(ConnectionState::Reconnecting { attempt: reconnect_attempt }).await;
                }

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    self.call.clear().await;
                    for (sid, handle) in audio_stream_tasks.drain() {
                        handle.abort();
                        tracing::debug!("audio playout stream aborted on disconnect: {sid}");
                    }
                    *self.room_ref.lock().await = None;
                    self.set_state(ConnectionState::Disconnected).await;
                    break;
                }

                RoomEvent::ParticipantConnected(participant) => {
                    let info = RoomManager::remote_participant_to_info(&participant);
                    tracing::info!("participant joined: {}", info.display_name());
                    self.call.participants.lock().await.add_participant(info.clone());
                    self.emitter.emit(ConsultEvent::ParticipantJoined(info));
                }

                RoomEvent::ParticipantDisconnected(participant) => {
                    let sid = participant.sid().to_string();
                    self.call.participants.lock().await.remove_participant(&sid);
                    self.emitter.emit(ConsultEvent::ParticipantLeft(sid));
                    // A departing presenter ends the screen share
                    self.refresh_controls().await;
                }

                RoomEvent::TrackSubscribed { track, publication, participant } => {
                    let source = lk_source_to_consult(publication.source());
                    let kind = match publication.kind() {
                        LkTrackKind::Audio => TrackKind::Audio,
                        LkTrackKind::Video => TrackKind::Video,
                    };
                    let psid = participant.sid().to_string();
                    let track_sid = track.sid().to_string();

                    match &track {
                        RemoteTrack::Video(video_track) => {
                            self.call.subscribed_tracks.lock().await.insert(
                                track_sid.clone(),
                                SubscribedVideo {
                                    track: video_track.clone(),
                                    participant_sid: psid.clone(),
                                    source,
                                },
                            );
                            if source != TrackSource::ScreenShare {
                                self.call.participants.lock().await.attach_video(&psid, track_sid.clone());
                            }
                        }
                        RemoteTrack::Audio(audio_track) => {
                            let mut audio_stream = NativeAudioStream::new(
                                audio_track.rtc_track(),
                                PLAYOUT_SAMPLE_RATE as i32,
                                PLAYOUT_CHANNELS as i32,
                            );
                            let buf = self.call.playout_buffer.clone();
                            let sid = track_sid.clone();
                            let handle = tokio::spawn(async move {
                                tracing::debug!("audio playout stream started for track {sid}");
                                while let Some(frame) = audio_stream.next().await {
                                    buf.push_samples(&frame.data);
                                }
                                tracing::debug!("audio playout stream ended for track {sid}");
                            });
                            audio_stream_tasks.insert(track_sid.clone(), handle);
                        }
                    }

                    self.emitter.emit(ConsultEvent::TrackSubscribed(TrackInfo {
                        sid: track_sid,
                        participant_sid: psid,
                        kind,
                        source,
                    }));
                }

                RoomEvent::TrackUnsubscribed { track, publication, participant } => {
                    let psid = participant.sid().to_string();
                    let track_sid = track.sid().to_string();

                    match publication.kind() {
                        LkTrackKind::Video => {
                            self.call.participants.lock().await.detach_video(&psid, &track_sid);
                            self.call.subscribed_tracks.lock().await.remove(&track_sid);
                            self.call.renderers.stop(&track_sid);
                        }
                        LkTrackKind::Audio => {
                            if let Some(handle) = audio_stream_tasks.remove(&track_sid) {
                                handle.abort();
                            }
                        }
                    }

                    self.emitter.emit(ConsultEvent::TrackUnsubscribed(track_sid));
                }

                RoomEvent::LocalTrackPublished { .. }
                | RoomEvent::LocalTrackUnpublished { .. }
                | RoomEvent::TrackPublished { .. }
                | RoomEvent::TrackUnpublished { .. } => {
                    self.refresh_controls().await;
                }

                RoomEvent::TrackMuted { participant, publication } => {
                    let psid = participant.sid().to_string();
                    let source = lk_source_to_consult(publication.source());
                    if source == TrackSource::Microphone {
                        self.call.participants.lock().await.set_muted(&psid, true);
                    }
                    self.emitter.emit(ConsultEvent::TrackMuted { participant_sid: psid, source });
                    self.refresh_controls().await;
                }

                RoomEvent::TrackUnmuted { participant, publication } => {
                    let psid = participant.sid().to_string();
                    let source = lk_source_to_consult(publication.source());
                    if source == TrackSource::Microphone {
                        self.call.participants.lock().await.set_muted(&psid, false);
                    }
                    self.emitter.emit(ConsultEvent::TrackUnmuted { participant_sid: psid, source });
                    self.refresh_controls().await;
                }

                RoomEvent::ActiveSpeakersChanged { speakers } => {
                    let sids: Vec<String> = speakers.iter().map(|p| p.sid().to_string()).collect();
                    self.call.participants.lock().await.set_active_speakers(sids.clone());
                    self.emitter.emit(ConsultEvent::ActiveSpeakersChanged(sids));
                }

                RoomEvent::ConnectionQualityChanged { quality, participant } => {
                    let psid = participant.sid().to_string();
                    let q = match quality {
                        LkConnectionQuality::Excellent => ConnectionQuality::Excellent,
                        LkConnectionQuality::Good => ConnectionQuality::Good,
                        LkConnectionQuality::Poor => ConnectionQuality::Poor,
                        LkConnectionQuality::Lost => ConnectionQuality::Lost,
                    };

                    if let Some(p) = self.call.participants.lock().await.participant_mut(&psid) {
                        p.connection_quality = q.clone();
                    }

                    self.emitter.emit(ConsultEvent::ConnectionQualityChanged {
                        participant_sid: psid,
                        quality: q,
                    });
                }

                RoomEvent::DataReceived { payload, topic, participant, .. } => {
                    if !chat::is_chat_packet(topic.as_deref()) {
                        tracing::debug!("data packet on topic {topic:?} ignored");
                        continue;
                    }
                    let local_name = match self.room_ref.lock().await.as_ref() {
                        Some(room) => chat::local_chat_name(room),
                        None => continue,
                    };
                    match chat::decode_payload(&payload, &local_name) {
                        Ok(msg) => {
                            tracing::debug!("chat message from {}", msg.participant);
                            chat::record(&self.call.chat, &self.emitter, msg).await;
                        }
                        Err(e) => {
                            let from = participant
                                .as_ref()
                                .map(|p| p.identity().to_string())
                                .unwrap_or_default();
                            tracing::warn!("dropping chat packet from {from:?}: {e}");
                        }
                    }
                }

                _ => {
                    tracing::trace!("unhandled room event: {event:?}");
                }
            }
        }

        tracing::info!("room event loop ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::capturing_emitter;

    fn sids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn local_presenter_wins() {
        let presenter = pick_presenter("me".into(), true, &sids(&["r1"]), &sids(&["r1"]));
        assert_eq!(presenter.as_deref(), Some("me"));
    }

    #[test]
    fn earliest_remote_presenter_wins() {
        let presenter = pick_presenter(
            "me".into(),
            false,
            &sids(&["r3", "r1"]),
            &sids(&["r1", "r2", "r3"]),
        );
        assert_eq!(presenter.as_deref(), Some("r1"));
    }

    #[test]
    fn no_presenter() {
        assert_eq!(pick_presenter("me".into(), false, &[], &sids(&["r1"])), None);
    }

    #[test]
    fn unseeded_presenter_still_found() {
        let presenter = pick_presenter("me".into(), false, &sids(&["r9"]), &[]);
        assert_eq!(presenter.as_deref(), Some("r9"));
    }

    #[test]
    fn source_mapping() {
        assert_eq!(lk_source_to_consult(LkTrackSource::Microphone), TrackSource::Microphone);
        assert_eq!(lk_source_to_consult(LkTrackSource::Camera), TrackSource::Camera);
        assert_eq!(lk_source_to_consult(LkTrackSource::Screenshare), TrackSource::ScreenShare);
        assert_eq!(lk_source_to_consult(LkTrackSource::Unknown), TrackSource::Unknown);
    }

    #[tokio::test]
    async fn idle_manager_has_empty_stage() {
        let manager = RoomManager::new();
        assert_eq!(manager.connection_state().await, ConnectionState::Disconnected);
        assert!(!manager.is_connected().await);
        assert!(manager.participants().await.is_empty());
        assert!(manager.local_participant_info().await.is_none());
        assert!(manager.screen_share_presenter().await.is_none());
        assert_eq!(manager.stage_layout().await, StageLayout::Empty);
        assert_eq!(manager.control_state(), ControlState::default());
    }

    #[tokio::test]
    async fn disconnect_clears_chat_and_reports_state() {
        let (emitter, capture) = capturing_emitter();
        let manager = RoomManager::with_emitter(emitter);

        let chat = manager.chat();
        chat.handle_incoming(crate::events::ChatMessage {
            id: "1".into(),
            participant: "patient".into(),
            text: "bonjour".into(),
            timestamp_ms: 1,
            is_local: false,
        })
        .await;
        assert_eq!(chat.messages().await.len(), 1);
        capture.taken();

        manager.disconnect().await;
        assert!(chat.messages().await.is_empty());
        assert_eq!(chat.unread_count().await, 0);
        assert!(matches!(
            capture.taken().as_slice(),
            [ConsultEvent::ConnectionStateChanged(ConnectionState::Disconnected)]
        ));
    }

    struct NullSink;

    impl VideoSink for NullSink {
        fn on_frame(&self, _track_sid: &str, _frame: crate::media::I420Frame) {}
    }

    #[tokio::test]
    async fn unknown_track_has_no_renderer() {
        let manager = RoomManager::new();
        assert!(!manager.start_video_renderer("TR_missing", Arc::new(NullSink)).await);
        manager.stop_video_renderer("TR_missing");
    }

    #[tokio::test]
    async fn disconnect_stops_renderers_and_drops_sources() {
        let manager = RoomManager::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        manager.call.renderers.register("TR_cam", move |mut cancel_rx| async move {
            let _ = cancel_rx.changed().await;
            let _ = done_tx.send(());
        });
        assert!(manager.call.renderers.is_running("TR_cam"));

        manager.disconnect().await;
        assert!(!manager.call.renderers.is_running("TR_cam"));
        assert!(tokio::time::timeout(std::time::Duration::from_secs(1), done_rx).await.is_ok());
        assert!(manager.call.sources.lock().unwrap().is_empty());
    }
}
