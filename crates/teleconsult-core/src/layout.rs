//! Video stage arrangement for the consultation view.

use crate::events::ParticipantInfo;
use crate::lobby::avatar_initial;

/// Suffix appended to the local participant's tile label.
pub const LOCAL_SUFFIX: &str = " (Vous)";

/// One participant tile: video when `video_track_sid` is set, avatar otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub participant_sid: String,
    pub label: String,
    pub initial: char,
    pub is_local: bool,
    pub is_muted: bool,
    pub video_track_sid: Option<String>,
}

impl Tile {
    pub fn new(info: &ParticipantInfo, is_local: bool) -> Self {
        let name = info.display_name();
        let label = if is_local {
            format!("{name}{LOCAL_SUFFIX}")
        } else {
            name.to_string()
        };
        Self {
            participant_sid: info.sid.clone(),
            label,
            initial: avatar_initial(name),
            is_local,
            is_muted: info.is_muted,
            video_track_sid: if info.has_video { info.video_track_sid.clone() } else { None },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageLayout {
    /// Nobody in the room yet: a placeholder avatar.
    Empty,
    /// Only the local participant, full stage.
    Solo { main: Tile },
    /// One remote participant full stage, local picture-in-picture.
    OneOnOne { main: Tile, pip: Tile },
    /// Several remote participants in a grid, local picture-in-picture.
    Grid { columns: u32, rows: u32, tiles: Vec<Tile>, pip: Option<Tile> },
    /// Someone is presenting: the shared screen on stage, everyone as thumbnails.
    ScreenShare {
        presenter_sid: String,
        presenter_label: String,
        /// A local presenter gets a "stop sharing" action.
        presenter_is_local: bool,
        thumbnails: Vec<Tile>,
    },
}

/// Grid dimensions `(columns, rows)` for a number of remote tiles.
pub fn grid_dimensions(remote_count: usize) -> (u32, u32) {
    match remote_count {
        0 | 1 => (1, 1),
        2 => (2, 1),
        3 | 4 => (2, 2),
        5 | 6 => (3, 2),
        7..=9 => (3, 3),
        _ => (4, 3),
    }
}

impl StageLayout {
    /// Arrange the stage.
    ///
    /// `presenter_sid` names the participant publishing a screen share, if any.
    pub fn compute(
        local: Option<&ParticipantInfo>,
        remotes: &[ParticipantInfo],
        presenter_sid: Option<&str>,
    ) -> Self {
        let local_tile = local.map(|l| Tile::new(l, true));
        let mut remote_tiles: Vec<Tile> = remotes.iter().map(|r| Tile::new(r, false)).collect();

        if let Some(presenter) = presenter_sid {
            let presenter_is_local = local.is_some_and(|l| l.sid == presenter);
            let presenter_label = local
                .filter(|l| l.sid == presenter)
                .or_else(|| remotes.iter().find(|r| r.sid == presenter))
                .map(|p| p.display_name().to_string())
                .unwrap_or_default();
            let thumbnails = local_tile.into_iter().chain(remote_tiles).collect();
            return Self::ScreenShare {
                presenter_sid: presenter.to_string(),
                presenter_label,
                presenter_is_local,
                thumbnails,
            };
        }

        match (local_tile, remote_tiles.len()) {
            (None, 0) => Self::Empty,
            (Some(main), 0) => Self::Solo { main },
            (Some(pip), 1) => Self::OneOnOne { main: remote_tiles.remove(0), pip },
            (pip, n) => {
                let (columns, rows) = grid_dimensions(n);
                Self::Grid { columns, rows, tiles: remote_tiles, pip }
            }
        }
    }

    /// Text for the presenter banner, e.g. "Dr Martin partage son écran".
    pub fn presenter_banner(&self) -> Option<String> {
        match self {
            Self::ScreenShare { presenter_is_local: true, .. } => {
                Some("Vous partagez votre écran".to_string())
            }
            Self::ScreenShare { presenter_label, .. } => {
                Some(format!("{presenter_label} partage son écran"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionQuality;

    fn participant(sid: &str, name: &str) -> ParticipantInfo {
        ParticipantInfo {
            sid: sid.into(),
            identity: format!("id-{sid}"),
            name: Some(name.into()),
            is_muted: false,
            has_video: false,
            video_track_sid: None,
            connection_quality: ConnectionQuality::Good,
        }
    }

    fn remotes(n: usize) -> Vec<ParticipantInfo> {
        (0..n).map(|i| participant(&format!("r{i}"), &format!("remote {i}"))).collect()
    }

    #[test]
    fn empty_room() {
        assert_eq!(StageLayout::compute(None, &[], None), StageLayout::Empty);
    }

    #[test]
    fn solo_shows_local_labelled() {
        let me = participant("me", "martin");
        match StageLayout::compute(Some(&me), &[], None) {
            StageLayout::Solo { main } => {
                assert_eq!(main.label, "martin (Vous)");
                assert_eq!(main.initial, 'M');
                assert!(main.is_local);
            }
            other => panic!("expected Solo, got {other:?}"),
        }
    }

    #[test]
    fn one_on_one_puts_remote_on_stage() {
        let me = participant("me", "martin");
        let layout = StageLayout::compute(Some(&me), &remotes(1), None);
        match layout {
            StageLayout::OneOnOne { main, pip } => {
                assert_eq!(main.participant_sid, "r0");
                assert_eq!(pip.participant_sid, "me");
            }
            other => panic!("expected OneOnOne, got {other:?}"),
        }
    }

    #[test]
    fn grid_dimensions_table() {
        let expected = [
            (2, (2, 1)),
            (3, (2, 2)),
            (4, (2, 2)),
            (5, (3, 2)),
            (6, (3, 2)),
            (7, (3, 3)),
            (9, (3, 3)),
            (10, (4, 3)),
            (15, (4, 3)),
        ];
        for (count, dims) in expected {
            assert_eq!(grid_dimensions(count), dims, "remote count {count}");
        }
    }

    #[test]
    fn grid_keeps_remote_order_and_local_pip() {
        let me = participant("me", "martin");
        match StageLayout::compute(Some(&me), &remotes(3), None) {
            StageLayout::Grid { columns, rows, tiles, pip } => {
                assert_eq!((columns, rows), (2, 2));
                let sids: Vec<_> = tiles.iter().map(|t| t.participant_sid.as_str()).collect();
                assert_eq!(sids, ["r0", "r1", "r2"]);
                assert_eq!(pip.unwrap().participant_sid, "me");
            }
            other => panic!("expected Grid, got {other:?}"),
        }
    }

    #[test]
    fn screen_share_takes_precedence() {
        let me = participant("me", "martin");
        let others = remotes(2);
        let layout = StageLayout::compute(Some(&me), &others, Some("r1"));
        assert_eq!(layout.presenter_banner().as_deref(), Some("remote 1 partage son écran"));
        match &layout {
            StageLayout::ScreenShare { presenter_is_local, thumbnails, .. } => {
                assert!(!presenter_is_local);
                let sids: Vec<_> = thumbnails.iter().map(|t| t.participant_sid.as_str()).collect();
                assert_eq!(sids, ["me", "r0", "r1"]);
            }
            other => panic!("expected ScreenShare, got {other:?}"),
        }
    }

    #[test]
    fn local_presenter_can_stop() {
        let me = participant("me", "martin");
        let layout = StageLayout::compute(Some(&me), &[], Some("me"));
        assert!(matches!(
            layout,
            StageLayout::ScreenShare { presenter_is_local: true, .. }
        ));
        assert_eq!(layout.presenter_banner().as_deref(), Some("Vous partagez votre écran"));
    }

    #[test]
    fn tile_shows_video_only_when_subscribed() {
        let mut p = participant("r0", "patient");
        p.video_track_sid = Some("TR_1".into());
        assert!(Tile::new(&p, false).video_track_sid.is_none());

        p.has_video = true;
        assert_eq!(Tile::new(&p, false).video_track_sid.as_deref(), Some("TR_1"));
    }
}
