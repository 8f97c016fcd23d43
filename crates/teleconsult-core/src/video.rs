//! Remote video delivery.
//!
//! One frame loop per subscribed video track, keyed by track SID. Each loop
//! decodes to packed I420 and hands frames to a shell-provided sink until it
//! is stopped or the track ends.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use livekit::prelude::RemoteVideoTrack;
use livekit::webrtc::video_stream::native::NativeVideoStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::media::I420Frame;

/// Receives decoded frames for one remote track.
pub trait VideoSink: Send + Sync {
    fn on_frame(&self, track_sid: &str, frame: I420Frame);
}

struct TrackRenderer {
    cancel_tx: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

/// Running frame loops by track SID.
#[derive(Clone, Default)]
pub struct VideoRenderers {
    inner: Arc<Mutex<HashMap<String, TrackRenderer>>>,
}

impl VideoRenderers {
    /// Start delivering `track` to `sink`, replacing any loop for the same SID.
    pub fn start(&self, track_sid: &str, track: RemoteVideoTrack, sink: Arc<dyn VideoSink>) {
        let sid = track_sid.to_string();
        self.register(track_sid, move |cancel_rx| frame_loop(sid, track, sink, cancel_rx));
    }

    pub(crate) fn register<F, Fut>(&self, track_sid: &str, make_loop: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop(track_sid);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(make_loop(cancel_rx));
        self.inner.lock().unwrap().insert(
            track_sid.to_string(),
            TrackRenderer {
                cancel_tx,
                _handle: handle,
            },
        );
    }

    /// Stop the loop for `track_sid`. Returns false if none was running.
    pub fn stop(&self, track_sid: &str) -> bool {
        match self.inner.lock().unwrap().remove(track_sid) {
            Some(renderer) => {
                let _ = renderer.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for (_, renderer) in self.inner.lock().unwrap().drain() {
            let _ = renderer.cancel_tx.send(true);
        }
    }

    pub fn is_running(&self, track_sid: &str) -> bool {
        self.inner.lock().unwrap().contains_key(track_sid)
    }
}

async fn frame_loop(
    track_sid: String,
    track: RemoteVideoTrack,
    sink: Arc<dyn VideoSink>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    tracing::info!(track_sid = %track_sid, "frame_loop started");
    let mut stream = NativeVideoStream::new(track.rtc_track());
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => {
                tracing::info!(track_sid = %track_sid, "frame_loop cancelled");
                break;
            }
            frame = stream.next() => match frame {
                Some(frame) => {
                    frames += 1;
                    if frames == 1 {
                        tracing::info!(
                            track_sid = %track_sid,
                            width = frame.buffer.width(),
                            height = frame.buffer.height(),
                            "first video frame received"
                        );
                    }
                    let i420 = frame.buffer.to_i420();
                    sink.on_frame(&track_sid, I420Frame::from_buffer(&i420));
                }
                None => {
                    tracing::info!(track_sid = %track_sid, "video stream ended");
                    break;
                }
            },
        }
    }

    tracing::info!(track_sid = %track_sid, frames, "frame_loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn waiting_loop(
        done: Arc<AtomicBool>,
    ) -> impl FnOnce(watch::Receiver<bool>) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |mut cancel_rx| {
            Box::pin(async move {
                let _ = cancel_rx.changed().await;
                done.store(true, Ordering::SeqCst);
            })
        }
    }

    async fn wait_for(flag: &AtomicBool) {
        for _ in 0..100 {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("frame loop was not cancelled");
    }

    #[tokio::test]
    async fn stop_cancels_the_loop() {
        let renderers = VideoRenderers::default();
        let done = Arc::new(AtomicBool::new(false));
        renderers.register("TR_cam", waiting_loop(done.clone()));
        assert!(renderers.is_running("TR_cam"));

        assert!(renderers.stop("TR_cam"));
        wait_for(&done).await;
        assert!(!renderers.is_running("TR_cam"));
        assert!(!renderers.stop("TR_cam"));
    }

    #[tokio::test]
    async fn restarting_a_track_replaces_its_loop() {
        let renderers = VideoRenderers::default();
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        renderers.register("TR_cam", waiting_loop(first.clone()));
        renderers.register("TR_cam", waiting_loop(second.clone()));

        wait_for(&first).await;
        assert!(!second.load(Ordering::SeqCst));
        assert!(renderers.is_running("TR_cam"));
    }

    #[tokio::test]
    async fn stop_all_cancels_every_loop() {
        let renderers = VideoRenderers::default();
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        renderers.register("TR_a", waiting_loop(a.clone()));
        renderers.register("TR_b", waiting_loop(b.clone()));

        renderers.stop_all();
        wait_for(&a).await;
        wait_for(&b).await;
        assert!(!renderers.is_running("TR_a"));
    }
}
