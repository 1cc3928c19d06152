//! In-memory `AlertBackend` for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{AlertBackend, ChunkSource};
use crate::model::{ApiError, NotificationFrequency, Preferences};

pub fn immediate(threshold: f64) -> Preferences {
    Preferences {
        show_pollution_alerts: true,
        notification_frequency: Some(NotificationFrequency::Immediate),
        aqi_threshold: Some(threshold),
    }
}

pub fn with_frequency(frequency: NotificationFrequency, threshold: f64) -> Preferences {
    Preferences {
        show_pollution_alerts: true,
        notification_frequency: Some(frequency),
        aqi_threshold: Some(threshold),
    }
}

pub fn disabled() -> Preferences {
    Preferences {
        show_pollution_alerts: false,
        notification_frequency: Some(NotificationFrequency::Immediate),
        aqi_threshold: Some(100.0),
    }
}

struct FakeState {
    preferences: Result<Preferences, ApiError>,
    preference_fetches: usize,
    current_aqi: Result<Option<f64>, ApiError>,
    stream_open: Result<(), ApiError>,
    stream_opens: usize,
    chunks: Vec<Result<Vec<u8>, ApiError>>,
    hold_open: bool,
}

#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                preferences: Ok(preferences),
                preference_fetches: 0,
                current_aqi: Ok(None),
                stream_open: Ok(()),
                stream_opens: 0,
                chunks: Vec::new(),
                hold_open: true,
            })),
        }
    }

    pub fn set_preferences(&self, preferences: Result<Preferences, ApiError>) {
        self.state.lock().unwrap().preferences = preferences;
    }

    pub fn set_current_aqi(&self, aqi: Result<Option<f64>, ApiError>) {
        self.state.lock().unwrap().current_aqi = aqi;
    }

    pub fn set_stream_open(&self, result: Result<(), ApiError>) {
        self.state.lock().unwrap().stream_open = result;
    }

    /// Chunks served by every stream opened from now on. With `hold_open`
    /// the stream then stays pending instead of ending.
    pub fn set_chunks(&self, chunks: Vec<Result<Vec<u8>, ApiError>>, hold_open: bool) {
        let mut state = self.state.lock().unwrap();
        state.chunks = chunks;
        state.hold_open = hold_open;
    }

    pub fn preference_fetches(&self) -> usize {
        self.state.lock().unwrap().preference_fetches
    }

    pub fn stream_opens(&self) -> usize {
        self.state.lock().unwrap().stream_opens
    }
}

impl AlertBackend for FakeBackend {
    type Chunks = ScriptedChunks;

    async fn fetch_preferences(&self) -> Result<Preferences, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.preference_fetches += 1;
        state.preferences.clone()
    }

    async fn fetch_current_aqi(&self, _device_id: &str) -> Result<Option<f64>, ApiError> {
        self.state.lock().unwrap().current_aqi.clone()
    }

    async fn open_alert_stream(&self) -> Result<ScriptedChunks, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.stream_open.clone()?;
        state.stream_opens += 1;
        Ok(ScriptedChunks::new(state.chunks.clone(), state.hold_open))
    }
}

pub struct ScriptedChunks {
    chunks: VecDeque<Result<Vec<u8>, ApiError>>,
    hold_open: bool,
}

impl ScriptedChunks {
    pub fn new(chunks: Vec<Result<Vec<u8>, ApiError>>, hold_open: bool) -> Self {
        Self { chunks: chunks.into(), hold_open }
    }

    pub fn from_text(chunks: &[&str]) -> Self {
        Self::new(chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(), false)
    }
}

impl ChunkSource for ScriptedChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        match self.chunks.pop_front() {
            Some(chunk) => chunk.map(Some),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}
