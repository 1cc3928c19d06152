//! Everything that pulls data from the backend.
//!
//! Submodules:
//! - `api`         - `ApiClient`, the reqwest-backed `AlertBackend`.
//! - `preferences` - the preference poller and its snapshot type.
//! - `stream`      - incremental frame decoding of the alert stream.
//! - `telemetry`   - optional current-AQI poller for one station.
//!
//! Producers never evaluate alerts themselves; they publish into the
//! pipeline (a watch channel for preferences, the event queue for the rest).

pub mod api;
pub mod preferences;
pub mod stream;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;
use tokio::task::JoinHandle;

use crate::model::{ApiError, ForecastFrame, Preferences};
use stream::StreamStats;

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The three backend operations the pipeline consumes.
///
/// `ApiClient` is the production implementation; tests substitute an
/// in-memory fake so the poller and supervisor run without sockets.
pub trait AlertBackend: Clone + Send + Sync + 'static {
    type Chunks: ChunkSource;

    /// `GET /users/preferences`
    fn fetch_preferences(&self) -> impl Future<Output = Result<Preferences, ApiError>> + Send;

    /// `GET /telemetry/all-data/{deviceId}` → `overallAqi`. `Ok(None)` when
    /// the station reports no value.
    fn fetch_current_aqi(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<f64>, ApiError>> + Send;

    /// `GET /alerts` with the bearer token. Fails with `MissingToken`
    /// without touching the network when no token is configured.
    fn open_alert_stream(&self) -> impl Future<Output = Result<Self::Chunks, ApiError>> + Send;
}

/// A chunked response body. `Ok(None)` marks a clean end of stream.
pub trait ChunkSource: Send + 'static {
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Producer → consumer events
// ---------------------------------------------------------------------------

/// Messages on the pipeline's event queue.
///
/// Stream messages carry the session number of the stream that produced
/// them so the consumer can discard anything left over from a stream it has
/// already cancelled.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Forecast { session: u64, frame: ForecastFrame },
    StreamClosed { session: u64, stats: StreamStats, error: Option<ApiError> },
    CurrentAqi(f64),
}

// ---------------------------------------------------------------------------
// Task ownership
// ---------------------------------------------------------------------------

/// Owns a spawned task and aborts it when dropped, so tearing down a
/// component never leaves a timer or reader running.
#[derive(Debug)]
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl TaskGuard {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { handle: tokio::spawn(future) }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
