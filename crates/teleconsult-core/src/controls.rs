use std::sync::Arc;
use tokio::sync::Mutex;
use livekit::prelude::*;
use livekit::track::TrackSource as LkTrackSource;
use livekit::webrtc::prelude::*;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::video_source::native::NativeVideoSource;
use livekit::options::TrackPublishOptions;

use crate::errors::ConsultError;
use crate::events::{ConsultEvent, ControlState, EventEmitter};
use crate::media::I420Frame;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

const CAMERA_WIDTH: u32 = 1280;
const CAMERA_HEIGHT: u32 = 720;

const SCREEN_WIDTH: u32 = 1920;
const SCREEN_HEIGHT: u32 = 1080;

/// Latest mirrored control state, shared with the room event loop.
pub type ControlStore = Arc<std::sync::Mutex<ControlState>>;

/// Native sources behind the local publications of the current room.
#[derive(Default)]
pub struct LocalSources {
    audio: Option<NativeAudioSource>,
    camera: Option<NativeVideoSource>,
    screen: Option<NativeVideoSource>,
}

impl LocalSources {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.camera.is_none() && self.screen.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Sources shared with the room, which drops them when the room closes.
pub type SourceStore = Arc<std::sync::Mutex<LocalSources>>;

/// A cached source is only reused while its track is still published.
fn reusable_source<S>(published: bool, cached: Option<S>) -> Option<S> {
    cached.filter(|_| published)
}

fn has_publication(room: &Room, source: LkTrackSource) -> bool {
    room.local_participant()
        .track_publications()
        .values()
        .any(|p| p.source() == source)
}

/// Compute toggles from the local publications `(source, muted)` and
/// whether any remote participant publishes a screen share.
pub fn derive_state(local: &[(LkTrackSource, bool)], remote_sharing: bool) -> ControlState {
    let live = |source: LkTrackSource| local.iter().any(|(s, muted)| *s == source && !muted);
    ControlState {
        mic_muted: !live(LkTrackSource::Microphone),
        camera_off: !live(LkTrackSource::Camera),
        screen_sharing: remote_sharing
            || local.iter().any(|(s, _)| *s == LkTrackSource::Screenshare),
    }
}

/// Read the toggles from the SDK's view of the room.
pub fn mirror_state(room: &Room) -> ControlState {
    let local: Vec<(LkTrackSource, bool)> = room
        .local_participant()
        .track_publications()
        .values()
        .map(|p| (p.source(), p.is_muted()))
        .collect();
    let remote_sharing = room.remote_participants().values().any(|p| {
        p.track_publications()
            .values()
            .any(|p| p.source() == LkTrackSource::Screenshare)
    });
    derive_state(&local, remote_sharing)
}

/// Re-mirror the toggles and emit `ControlStateChanged` if they moved.
pub(crate) fn refresh_state(room: &Room, store: &ControlStore, emitter: &EventEmitter) -> ControlState {
    let next = mirror_state(room);
    let changed = {
        let mut current = store.lock().unwrap();
        let changed = *current != next;
        *current = next;
        changed
    };
    if changed {
        tracing::debug!("control state: {next:?}");
        emitter.emit(ConsultEvent::ControlStateChanged(next));
    }
    next
}

/// In-call controls for local media: microphone, camera, screen share.
///
/// Publishing creates native sources; the UI shell feeds captured
/// audio/video frames into them.
pub struct MeetingControls {
    room: Arc<Mutex<Option<Arc<Room>>>>,
    emitter: EventEmitter,
    state: ControlStore,
    sources: SourceStore,
}

impl MeetingControls {
    pub fn new(
        room: Arc<Mutex<Option<Arc<Room>>>>,
        emitter: EventEmitter,
        state: ControlStore,
        sources: SourceStore,
    ) -> Self {
        Self {
            room,
            emitter,
            state,
            sources,
        }
    }

    async fn connected_room(&self) -> Result<Arc<Room>, ConsultError> {
        self.room
            .lock()
            .await
            .clone()
            .ok_or_else(|| ConsultError::Room("not connected".into()))
    }

    /// Publish a microphone track. Returns the source native code feeds PCM into.
    pub async fn publish_microphone(&self) -> Result<NativeAudioSource, ConsultError> {
        let room = self.connected_room().await?;

        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            AUDIO_SAMPLE_RATE,
            AUDIO_CHANNELS,
            AUDIO_QUEUE_SIZE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            "microphone",
            RtcAudioSource::Native(source.clone()),
        );

        room.local_participant()
            .publish_track(
                LocalTrack::Audio(track),
                TrackPublishOptions {
                    source: LkTrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsultError::Room(format!("publish audio: {e}")))?;

        self.sources.lock().unwrap().audio = Some(source.clone());
        tracing::info!("microphone track published");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(source)
    }

    /// Publish a camera track. Returns the source native code feeds frames into.
    pub async fn publish_camera(&self) -> Result<NativeVideoSource, ConsultError> {
        let room = self.connected_room().await?;
        let source = self
            .publish_video(&room, "camera", LkTrackSource::Camera, CAMERA_WIDTH, CAMERA_HEIGHT)
            .await?;
        self.sources.lock().unwrap().camera = Some(source.clone());
        tracing::info!("camera track published");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(source)
    }

    async fn publish_video(
        &self,
        room: &Room,
        name: &str,
        source_kind: LkTrackSource,
        width: u32,
        height: u32,
    ) -> Result<NativeVideoSource, ConsultError> {
        let is_screencast = source_kind == LkTrackSource::Screenshare;
        let source = NativeVideoSource::new(VideoResolution { width, height }, is_screencast);
        let track = LocalVideoTrack::create_video_track(name, RtcVideoSource::Native(source.clone()));

        room.local_participant()
            .publish_track(
                LocalTrack::Video(track),
                TrackPublishOptions {
                    source: source_kind,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsultError::Room(format!("publish {name}: {e}")))?;
        Ok(source)
    }

    /// Turn the microphone on or off, publishing it on first use.
    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), ConsultError> {
        let room = self.connected_room().await?;
        if !Self::set_muted(&room, LkTrackSource::Microphone, !enabled) && enabled {
            self.publish_microphone().await?;
        }
        tracing::info!("microphone enabled: {enabled}");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(())
    }

    /// Turn the camera on or off, publishing it on first use.
    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<(), ConsultError> {
        let room = self.connected_room().await?;
        if !Self::set_muted(&room, LkTrackSource::Camera, !enabled) && enabled {
            self.publish_camera().await?;
        }
        tracing::info!("camera enabled: {enabled}");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(())
    }

    /// Flip the microphone relative to what the SDK reports.
    pub async fn toggle_microphone(&self) -> Result<ControlState, ConsultError> {
        let muted = self.control_state().mic_muted;
        self.set_microphone_enabled(muted).await?;
        Ok(self.control_state())
    }

    /// Flip the camera relative to what the SDK reports.
    pub async fn toggle_camera(&self) -> Result<ControlState, ConsultError> {
        let off = self.control_state().camera_off;
        self.set_camera_enabled(off).await?;
        Ok(self.control_state())
    }

    /// Mute/unmute the local publication of `source`.
    /// Returns false when nothing is published for it.
    fn set_muted(room: &Room, source: LkTrackSource, muted: bool) -> bool {
        let local = room.local_participant();
        match local
            .track_publications()
            .into_values()
            .find(|p| p.source() == source)
        {
            Some(publication) => {
                if muted {
                    publication.mute();
                } else {
                    publication.unmute();
                }
                true
            }
            None => false,
        }
    }

    /// Publish a screen-share track. Returns the source the shell feeds
    /// captured screen frames into.
    pub async fn start_screen_share(&self) -> Result<NativeVideoSource, ConsultError> {
        let room = self.connected_room().await?;
        let cached = self.sources.lock().unwrap().screen.clone();
        if let Some(source) = reusable_source(has_publication(&room, LkTrackSource::Screenshare), cached) {
            return Ok(source);
        }
        let source = self
            .publish_video(&room, "screen", LkTrackSource::Screenshare, SCREEN_WIDTH, SCREEN_HEIGHT)
            .await?;
        self.sources.lock().unwrap().screen = Some(source.clone());
        tracing::info!("screen share started");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(source)
    }

    /// Unpublish the local screen share, if any.
    pub async fn stop_screen_share(&self) -> Result<(), ConsultError> {
        let room = self.connected_room().await?;
        let local = room.local_participant();
        let sids: Vec<_> = local
            .track_publications()
            .into_values()
            .filter(|p| p.source() == LkTrackSource::Screenshare)
            .map(|p| p.sid())
            .collect();
        for sid in sids {
            local
                .unpublish_track(&sid)
                .await
                .map_err(|e| ConsultError::Room(format!("unpublish screen share: {e}")))?;
        }
        self.sources.lock().unwrap().screen = None;
        tracing::info!("screen share stopped");
        refresh_state(&room, &self.state, &self.emitter);
        Ok(())
    }

    /// Start or stop the local screen share. Returns true while sharing.
    pub async fn toggle_screen_share(&self) -> Result<bool, ConsultError> {
        if self.is_screen_sharing_locally().await {
            self.stop_screen_share().await?;
            Ok(false)
        } else {
            self.start_screen_share().await?;
            Ok(true)
        }
    }

    pub async fn is_screen_sharing_locally(&self) -> bool {
        match self.room.lock().await.as_ref() {
            Some(room) => has_publication(room, LkTrackSource::Screenshare),
            None => false,
        }
    }

    /// Last mirrored toggles.
    pub fn control_state(&self) -> ControlState {
        *self.state.lock().unwrap()
    }

    /// Feed captured microphone PCM (48 kHz mono) into the published track.
    pub async fn push_audio_samples(&self, samples: &[i16]) -> Result<(), ConsultError> {
        let source = self
            .sources
            .lock()
            .unwrap()
            .audio
            .clone()
            .ok_or_else(|| ConsultError::Device("microphone is not published".into()))?;
        if samples.is_empty() {
            return Ok(());
        }
        let frame = AudioFrame {
            data: samples.into(),
            sample_rate: AUDIO_SAMPLE_RATE,
            num_channels: AUDIO_CHANNELS,
            samples_per_channel: samples.len() as u32 / AUDIO_CHANNELS,
        };
        source
            .capture_frame(&frame)
            .await
            .map_err(|e| ConsultError::Device(format!("capture audio: {e}")))
    }

    /// Feed a captured camera frame into the published camera track.
    pub fn push_camera_frame(&self, frame: &I420Frame) -> Result<(), ConsultError> {
        let source = self.sources.lock().unwrap().camera.clone();
        capture_video(source, "camera", frame)
    }

    /// Feed a captured screen frame into the published screen-share track.
    pub fn push_screen_frame(&self, frame: &I420Frame) -> Result<(), ConsultError> {
        let source = self.sources.lock().unwrap().screen.clone();
        capture_video(source, "screen share", frame)
    }

    /// Drop the native sources (on leave).
    pub async fn reset(&self) {
        self.sources.lock().unwrap().clear();
        *self.state.lock().unwrap() = ControlState::default();
    }
}

fn capture_video(
    source: Option<NativeVideoSource>,
    what: &str,
    frame: &I420Frame,
) -> Result<(), ConsultError> {
    let source = source.ok_or_else(|| ConsultError::Device(format!("{what} is not published")))?;
    let frame = VideoFrame {
        rotation: VideoRotation::VideoRotation0,
        timestamp_us: 0,
        buffer: frame.to_buffer()?,
    };
    source.capture_frame(&frame);
    Ok(())
}
