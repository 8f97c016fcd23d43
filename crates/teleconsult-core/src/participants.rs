use crate::events::ParticipantInfo;

#[cfg(test)]
use crate::events::ConnectionQuality;

/// Remote participants of the current room, in join order.
///
/// Updated by the room event loop. Read by the layout and UI layers.
#[derive(Debug, Clone, Default)]
pub struct ParticipantManager {
    participants: Vec<ParticipantInfo>,
    active_speakers: Vec<String>,
    local_sid: Option<String>,
}

impl ParticipantManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local_sid(&mut self, sid: String) {
        self.local_sid = Some(sid);
    }

    pub fn local_sid(&self) -> Option<&str> {
        self.local_sid.as_deref()
    }

    /// Add a remote participant. Re-adding a known SID is ignored.
    pub fn add_participant(&mut self, info: ParticipantInfo) {
        if !self.participants.iter().any(|p| p.sid == info.sid) {
            self.participants.push(info);
        }
    }

    pub fn remove_participant(&mut self, sid: &str) {
        self.participants.retain(|p| p.sid != sid);
        self.active_speakers.retain(|s| s != sid);
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.participants
    }

    pub fn participant(&self, sid: &str) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|p| p.sid == sid)
    }

    pub fn participant_mut(&mut self, sid: &str) -> Option<&mut ParticipantInfo> {
        self.participants.iter_mut().find(|p| p.sid == sid)
    }

    /// Record a subscribed camera track. Returns false for unknown SIDs.
    pub fn attach_video(&mut self, sid: &str, track_sid: String) -> bool {
        match self.participant_mut(sid) {
            Some(p) => {
                p.has_video = true;
                p.video_track_sid = Some(track_sid);
                true
            }
            None => false,
        }
    }

    /// Forget a camera track, but only if it is the one currently attached.
    pub fn detach_video(&mut self, sid: &str, track_sid: &str) {
        if let Some(p) = self.participant_mut(sid) {
            if p.video_track_sid.as_deref() == Some(track_sid) {
                p.has_video = false;
                p.video_track_sid = None;
            }
        }
    }

    pub fn set_muted(&mut self, sid: &str, muted: bool) {
        if let Some(p) = self.participant_mut(sid) {
            p.is_muted = muted;
        }
    }

    pub fn set_active_speakers(&mut self, sids: Vec<String>) {
        self.active_speakers = sids;
    }

    pub fn active_speakers(&self) -> &[String] {
        &self.active_speakers
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.active_speakers.clear();
        self.local_sid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_participant(sid: &str, name: &str) -> ParticipantInfo {
        ParticipantInfo {
            sid: sid.to_string(),
            identity: format!("identity-{sid}"),
            name: Some(name.to_string()),
            is_muted: false,
            has_video: false,
            video_track_sid: None,
            connection_quality: ConnectionQuality::Good,
        }
    }

    #[test]
    fn add_keeps_join_order_without_duplicates() {
        let mut mgr = ParticipantManager::new();
        mgr.add_participant(make_participant("p1", "Patient"));
        mgr.add_participant(make_participant("p2", "Nurse"));
        mgr.add_participant(make_participant("p1", "Patient"));

        let sids: Vec<_> = mgr.participants().iter().map(|p| p.sid.as_str()).collect();
        assert_eq!(sids, ["p1", "p2"]);
    }

    #[test]
    fn remove_participant_drops_speaker_entry() {
        let mut mgr = ParticipantManager::new();
        mgr.add_participant(make_participant("p1", "Patient"));
        mgr.add_participant(make_participant("p2", "Nurse"));
        mgr.set_active_speakers(vec!["p1".into(), "p2".into()]);

        mgr.remove_participant("p1");

        assert_eq!(mgr.participant_count(), 1);
        assert!(mgr.participant("p1").is_none());
        assert_eq!(mgr.active_speakers(), &["p2"]);
    }

    #[test]
    fn video_attach_and_detach() {
        let mut mgr = ParticipantManager::new();
        mgr.add_participant(make_participant("p1", "Patient"));

        assert!(mgr.attach_video("p1", "TR_cam".into()));
        assert!(!mgr.attach_video("ghost", "TR_x".into()));
        assert_eq!(mgr.participant("p1").unwrap().video_track_sid.as_deref(), Some("TR_cam"));

        // A stale unsubscribe for another track leaves the current one alone.
        mgr.detach_video("p1", "TR_old");
        assert!(mgr.participant("p1").unwrap().has_video);

        mgr.detach_video("p1", "TR_cam");
        let p = mgr.participant("p1").unwrap();
        assert!(!p.has_video);
        assert!(p.video_track_sid.is_none());
    }

    #[test]
    fn mute_flag_updates() {
        let mut mgr = ParticipantManager::new();
        mgr.add_participant(make_participant("p1", "Patient"));
        mgr.set_muted("p1", true);
        assert!(mgr.participant("p1").unwrap().is_muted);
        mgr.set_muted("p1", false);
        assert!(!mgr.participant("p1").unwrap().is_muted);
    }

    #[test]
    fn clear_resets_everything() {
        let mut mgr = ParticipantManager::new();
        mgr.set_local_sid("local".to_string());
        mgr.add_participant(make_participant("p1", "Patient"));
        mgr.set_active_speakers(vec!["p1".to_string()]);
        mgr.clear();
        assert_eq!(mgr.participant_count(), 0);
        assert!(mgr.active_speakers().is_empty());
        assert!(mgr.local_sid().is_none());
    }
}
