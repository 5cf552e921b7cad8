//! The single "now playing" snapshot and the model that owns it.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

/// A complete now-playing snapshot. Every write replaces the whole value.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub artist: String,
    pub title: String,
    pub is_playing: bool,
    pub current_lyric: String,
    /// Informational only.
    pub next_lyric: String,
    /// Seconds from the start of the track.
    pub position: f64,
    /// Seconds. `0.0` means unknown.
    pub duration: f64,
    /// Set only on the sentinel pushed when the backend is lost. An idle backend reports empty
    /// fields with this cleared.
    pub disconnected: bool,
    /// Stamped by [`StateModel`] when the snapshot is accepted.
    pub last_updated_at: Option<Instant>,
}

impl PlaybackState {
    /// The "not connected" representation pushed when the backend is lost.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Nothing loaded: not playing and no metadata.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.is_playing
            && self.artist.is_empty()
            && self.title.is_empty()
            && self.current_lyric.is_empty()
            && self.next_lyric.is_empty()
    }
}

// `last_updated_at` is bookkeeping, not content.
impl PartialEq for PlaybackState {
    fn eq(&self, other: &Self) -> bool {
        self.artist == other.artist
            && self.title == other.title
            && self.is_playing == other.is_playing
            && self.current_lyric == other.current_lyric
            && self.next_lyric == other.next_lyric
            && self.position == other.position
            && self.duration == other.duration
            && self.disconnected == other.disconnected
    }
}

/// Consumer of accepted snapshots.
///
/// Implementations are called while the model holds its lock and must not call back into the
/// model.
pub trait DisplaySink: Send + Sync {
    fn on_state_changed(&self, state: &PlaybackState);
    /// Surface an error the user should see (failed spawn, unreachable bus).
    fn show_error(&self, message: &str);
}

pub struct StateModel {
    snapshot: Mutex<Arc<PlaybackState>>,
    display: Box<dyn DisplaySink>,
}

impl StateModel {
    #[must_use]
    pub fn new(display: Box<dyn DisplaySink>) -> Self {
        Self {
            snapshot: Mutex::new(Arc::new(PlaybackState::disconnected())),
            display,
        }
    }

    /// Replace the snapshot and notify the display.
    pub fn update(&self, mut state: PlaybackState) {
        state.last_updated_at = Some(Instant::now());
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        *snapshot = Arc::new(state);
        tracing::debug!(state = ?**snapshot, "State updated");
        self.display.on_state_changed(&snapshot);
    }

    #[must_use]
    pub fn current(&self) -> Arc<PlaybackState> {
        Arc::clone(&self.snapshot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn reset(&self) {
        tracing::info!("Resetting state to disconnected");
        self.update(PlaybackState::disconnected());
    }

    pub fn show_error(&self, message: &str) {
        self.display.show_error(message);
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Display sink forwarding every notification to a channel.
    pub struct ChannelSink(pub mpsc::UnboundedSender<PlaybackState>);
    impl DisplaySink for ChannelSink {
        fn on_state_changed(&self, state: &PlaybackState) {
            let _ = self.0.send(state.clone());
        }
        fn show_error(&self, _message: &str) {}
    }

    pub fn recording_model() -> (Arc<StateModel>, mpsc::UnboundedReceiver<PlaybackState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(StateModel::new(Box::new(ChannelSink(tx)))), rx)
    }

    fn song(title: &str) -> PlaybackState {
        PlaybackState {
            artist: "Artist".to_owned(),
            title: title.to_owned(),
            is_playing: true,
            current_lyric: "la la la".to_owned(),
            ..PlaybackState::default()
        }
    }

    #[test]
    fn starts_disconnected() {
        let (model, _rx) = recording_model();
        assert!(model.current().is_disconnected());
        assert!(model.current().last_updated_at.is_none());
    }

    #[test]
    fn update_replaces_and_notifies() {
        let (model, mut rx) = recording_model();
        model.update(song("Song"));

        let current = model.current();
        assert_eq!(*current, song("Song"));
        assert!(current.last_updated_at.is_some());
        assert_eq!(rx.try_recv().unwrap(), song("Song"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_does_not_merge() {
        let (model, _rx) = recording_model();
        let mut first = song("First");
        first.next_lyric = "next".to_owned();
        first.duration = 200.0;
        model.update(first);
        model.update(song("Second"));

        let current = model.current();
        assert_eq!(current.title, "Second");
        assert_eq!(current.next_lyric, "");
        assert_eq!(current.duration, 0.0);
    }

    #[test]
    fn reset_pushes_disconnected() {
        let (model, mut rx) = recording_model();
        model.update(song("Song"));
        model.reset();

        assert!(model.current().is_disconnected());
        assert_eq!(rx.try_recv().unwrap(), song("Song"));
        assert!(rx.try_recv().unwrap().is_disconnected());
    }

    #[test]
    fn old_snapshots_stay_intact() {
        let (model, _rx) = recording_model();
        model.update(song("First"));
        let held = model.current();
        model.update(song("Second"));

        assert_eq!(held.title, "First");
        assert_eq!(model.current().title, "Second");
    }

    #[test]
    fn empty_update_is_not_the_lost_sentinel() {
        let (model, mut rx) = recording_model();
        model.update(PlaybackState::default());

        let current = model.current();
        assert!(current.is_idle());
        assert!(!current.is_disconnected());
        assert_ne!(*current, PlaybackState::disconnected());
        assert!(!rx.try_recv().unwrap().is_disconnected());
    }

    #[test]
    fn equality_ignores_timestamp() {
        let mut stamped = song("Song");
        stamped.last_updated_at = Some(Instant::now());
        assert_eq!(stamped, song("Song"));
        assert_ne!(song("Song"), song("Other"));
    }
}
