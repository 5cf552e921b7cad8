use std::time::Duration;

use crate::state::PlaybackState;

/// Warns once when a playing state has not been refreshed for too long. Diagnostic only.
pub struct StalenessCheck {
    threshold: Duration,
    reported: bool,
}

impl StalenessCheck {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            reported: false,
        }
    }

    /// Returns `true` when a warning was emitted by this call.
    pub fn check(&mut self, state: &PlaybackState) -> bool {
        let age = state.last_updated_at.map(|t| t.elapsed());
        let stale = state.is_playing && age.is_some_and(|age| age > self.threshold);
        if !stale {
            self.reported = false;
            return false;
        }
        if self.reported {
            return false;
        }
        tracing::warn!(
            ?age,
            title = %state.title,
            "Playing state has not been refreshed, backend may be hung"
        );
        self.reported = true;
        true
    }
}
