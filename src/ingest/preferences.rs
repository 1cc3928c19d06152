//! Preference poller.
//!
//! Fetches `GET /users/preferences` once on start and then on a fixed
//! interval, publishing each result as a new snapshot. The poller is the
//! only writer of the snapshot; everyone else holds a watch receiver.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::api::PREFERENCES_PATH;
use super::{AlertBackend, TaskGuard};
use crate::logging::{self, Component};
use crate::model::Preferences;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// The most recently fetched preferences and when they were fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSnapshot {
    pub preferences: Preferences,
    pub fetched_at: DateTime<Utc>,
}

pub type SnapshotSender = watch::Sender<Option<PreferenceSnapshot>>;
pub type SnapshotReceiver = watch::Receiver<Option<PreferenceSnapshot>>;

pub struct PreferencePoller<B> {
    backend: B,
    interval: Duration,
}

impl<B: AlertBackend> PreferencePoller<B> {
    pub fn new(backend: B, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Start polling on a background task. Dropping the guard stops it.
    pub fn spawn(self, snapshots: SnapshotSender) -> TaskGuard {
        TaskGuard::spawn(self.run(snapshots))
    }

    /// Poll until every snapshot receiver has been dropped. The first tick
    /// fires immediately.
    pub async fn run(self, snapshots: SnapshotSender) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = snapshots.closed() => break,
            }
            self.poll_once(&snapshots).await;
        }
        logging::debug(Component::Preferences, None, "preference poller stopped");
    }

    /// One fetch. On success the snapshot is replaced wholesale; on failure
    /// it is left untouched. Returns whether the fetch succeeded.
    pub async fn poll_once(&self, snapshots: &SnapshotSender) -> bool {
        match self.backend.fetch_preferences().await {
            Ok(preferences) => {
                logging::debug(
                    Component::Preferences,
                    Some(PREFERENCES_PATH),
                    &format!(
                        "alerts={} frequency={} threshold={}",
                        preferences.show_pollution_alerts,
                        preferences
                            .notification_frequency
                            .map(|f| f.as_wire())
                            .unwrap_or("none"),
                        preferences
                            .aqi_threshold
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "none".to_string()),
                    ),
                );
                snapshots.send_replace(Some(PreferenceSnapshot {
                    preferences,
                    fetched_at: Utc::now(),
                }));
                true
            }
            Err(e) => {
                logging::log_api_failure(Component::Preferences, Some(PREFERENCES_PATH), "preference fetch", &e);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fake::{FakeBackend, disabled, immediate};
    use crate::model::ApiError;

    fn start(backend: &FakeBackend) -> (TaskGuard, SnapshotReceiver) {
        let (tx, rx) = watch::channel(None);
        let guard = PreferencePoller::new(backend.clone(), DEFAULT_POLL_INTERVAL).spawn(tx);
        (guard, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate_then_every_interval() {
        let backend = FakeBackend::new(immediate(100.0));
        let (_guard, rx) = start(&backend);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.preference_fetches(), 1);
        assert_eq!(
            rx.borrow().as_ref().map(|s| s.preferences.clone()),
            Some(immediate(100.0))
        );

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(backend.preference_fetches(), 2);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(backend.preference_fetches(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_fetch_replaces_snapshot_wholesale() {
        let backend = FakeBackend::new(immediate(100.0));
        let (_guard, rx) = start(&backend);
        tokio::time::sleep(Duration::from_millis(1)).await;

        backend.set_preferences(Ok(disabled()));
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;

        let snapshot = rx.borrow().clone().expect("snapshot present");
        assert_eq!(snapshot.preferences, disabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_retains_previous_snapshot() {
        let backend = FakeBackend::new(immediate(120.0));
        let (_guard, rx) = start(&backend);
        tokio::time::sleep(Duration::from_millis(1)).await;
        let before = rx.borrow().clone().expect("first fetch succeeded");

        backend.set_preferences(Err(ApiError::HttpError(502)));
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;

        assert_eq!(backend.preference_fetches(), 2);
        assert_eq!(rx.borrow().clone(), Some(before));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_before_first_success_leaves_no_snapshot() {
        let backend = FakeBackend::new(immediate(100.0));
        backend.set_preferences(Err(ApiError::Transport("connection refused".into())));
        let (guard, rx) = start(&backend);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;
        assert!(rx.borrow().is_none());
        assert!(!guard.is_finished(), "poller must survive fetch failures");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_guard_cancels_polling() {
        let backend = FakeBackend::new(immediate(100.0));
        let (guard, _rx) = start(&backend);
        tokio::time::sleep(Duration::from_millis(1)).await;

        drop(guard);
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 5).await;
        assert_eq!(backend.preference_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_exits_when_nobody_observes_snapshot() {
        let backend = FakeBackend::new(immediate(100.0));
        let (guard, rx) = start(&backend);
        tokio::time::sleep(Duration::from_millis(1)).await;

        drop(rx);
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;
        assert!(guard.is_finished());
    }
}
