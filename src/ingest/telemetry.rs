//! Current-AQI poller.
//!
//! Polls the latest overall AQI of one monitoring station and feeds it to
//! the pipeline's instantaneous rule. Only runs when a device id is
//! configured.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{AlertBackend, PipelineEvent, TaskGuard};
use crate::logging::{self, Component};

pub struct CurrentAqiPoller<B> {
    backend: B,
    device_id: String,
    interval: Duration,
}

impl<B: AlertBackend> CurrentAqiPoller<B> {
    pub fn new(backend: B, device_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            backend,
            device_id: device_id.into(),
            interval,
        }
    }

    pub fn spawn(self, events: mpsc::Sender<PipelineEvent>) -> TaskGuard {
        TaskGuard::spawn(self.run(events))
    }

    /// Poll until the event queue closes. Stations reporting "N/A" and
    /// failed fetches are logged and skipped.
    pub async fn run(self, events: mpsc::Sender<PipelineEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = events.closed() => break,
            }

            match self.backend.fetch_current_aqi(&self.device_id).await {
                Ok(Some(aqi)) => {
                    logging::debug(Component::Telemetry, Some(&self.device_id), &format!("current AQI {}", aqi));
                    if events.send(PipelineEvent::CurrentAqi(aqi)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    logging::debug(Component::Telemetry, Some(&self.device_id), "station reports no AQI");
                }
                Err(e) => {
                    logging::log_api_failure(Component::Telemetry, Some(&self.device_id), "current AQI fetch", &e);
                }
            }
        }
    }
}
