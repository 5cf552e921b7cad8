use std::{
    future::{pending, Pending},
    pin::Pin,
    time::Duration,
};

use futures::future::Either;
use tokio::time::{sleep, Sleep};

/// How the event loop reacts to a lost backend. The supervisor itself never retries.
///
/// A backend that fails to spawn, at startup or on a restart, uses up one attempt and schedules
/// the next one the same way a lost backend does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub delay: Duration,
}

/// Counts restart attempts and arms the timer that triggers the next one.
pub struct RestartSchedule {
    policy: RestartPolicy,
    attempts: u32,
    pub timer: Pin<Box<Either<Sleep, Pending<()>>>>,
}

impl RestartSchedule {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            timer: Box::pin(Either::Right(pending())),
        }
    }

    /// Arm the timer if the restart budget allows it. Returns whether a restart is pending.
    pub fn schedule(&mut self) -> bool {
        if self.attempts >= self.policy.max_restarts {
            tracing::info!(
                attempts = self.attempts,
                "Not restarting backend, restart budget exhausted"
            );
            return false;
        }
        self.attempts += 1;
        tracing::info!(
            attempt = self.attempts,
            max = self.policy.max_restarts,
            delay = ?self.policy.delay,
            "Scheduling backend restart"
        );
        self.timer = Box::pin(Either::Left(sleep(self.policy.delay)));
        true
    }

    /// Called once the timer has fired.
    pub fn disarm(&mut self) {
        self.timer = Box::pin(Either::Right(pending()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn schedule(max_restarts: u32) -> RestartSchedule {
        RestartSchedule::new(RestartPolicy {
            max_restarts,
            delay: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn no_restarts_by_default() {
        let mut restarts = schedule(0);
        assert!(!restarts.schedule());
        assert!(timeout(Duration::from_millis(50), &mut restarts.timer)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn budget_is_not_replenished() {
        let mut restarts = schedule(2);
        assert!(restarts.schedule());
        restarts.disarm();
        assert!(restarts.schedule());
        restarts.disarm();
        assert!(!restarts.schedule());
    }

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let mut restarts = schedule(1);
        assert!(restarts.schedule());
        timeout(Duration::from_secs(1), &mut restarts.timer)
            .await
            .unwrap();

        restarts.disarm();
        assert!(timeout(Duration::from_millis(50), &mut restarts.timer)
            .await
            .is_err());
    }
}
