//! Alert stream reader.
//!
//! The backend answers `GET /alerts` with a chunked body of JSON frames
//! separated by a blank line (`"\n\n"`). Chunk boundaries are arbitrary: a
//! frame, or a single multi-byte UTF-8 character, may be split across
//! chunks. `FrameDecoder` turns the byte chunks into complete frame strings,
//! `parse_frame` turns a frame into a `ForecastFrame`, and `StreamReader`
//! drives both over a `ChunkSource` and forwards results to the pipeline.

use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use super::{AlertBackend, ChunkSource, PipelineEvent};
use crate::logging::{self, Component};
use crate::model::{ApiError, ForecastFrame};

pub const FRAME_DELIMITER: &str = "\n\n";

// ---------------------------------------------------------------------------
// Incremental decoding
// ---------------------------------------------------------------------------

/// Unterminated frame data kept before the decoder gives up on it. Real
/// frames are a few hundred bytes.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a delimiter.
    buffer: String,
    /// Offset in `buffer` before which no delimiter can start.
    scanned: usize,
    max_frame_bytes: usize,
    /// Bytes thrown away since the last `take_discarded`.
    discarded: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            buffer: String::new(),
            scanned: 0,
            max_frame_bytes,
            discarded: 0,
        }
    }

    /// Append a chunk and return every frame it completed, trimmed. Empty
    /// frames (runs of blank lines) are skipped. The unterminated tail stays
    /// buffered for the next chunk unless it outgrows the frame limit, in
    /// which case it is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer[self.scanned..].find(FRAME_DELIMITER) {
            let end = self.scanned + idx + FRAME_DELIMITER.len();
            let raw: String = self.buffer.drain(..end).collect();
            self.scanned = 0;
            let frame = raw.trim();
            if !frame.is_empty() {
                frames.push(frame.to_string());
            }
        }

        if self.buffer.len() > self.max_frame_bytes {
            self.discarded += self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
        } else {
            self.scanned = self.resume_offset();
        }
        frames
    }

    /// Number of bytes discarded for exceeding the frame limit since the
    /// previous call.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// End of stream: hand back whatever is left as a final frame. An
    /// incomplete UTF-8 sequence at the very end becomes U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        let frame = rest.trim();
        if frame.is_empty() {
            None
        } else {
            Some(frame.to_string())
        }
    }

    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// A delimiter split across chunks can only start in the last
    /// `len - 1` bytes of what has been searched.
    fn resume_offset(&self) -> usize {
        let mut at = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        while !self.buffer.is_char_boundary(at) {
            at -= 1;
        }
        at
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        // Invalid sequence: replace it and keep going.
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Truncated sequence: wait for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Not valid JSON.
    Malformed(String),
    /// Valid JSON without a `forecast` array.
    MissingForecast,
    /// `forecast[index]` is not a number.
    NonNumeric(usize),
    /// The backend reported an error in-band (`{"error": "..."}`).
    ServerError(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Malformed(msg) => write!(f, "Malformed frame: {}", msg),
            FrameError::MissingForecast => write!(f, "Frame has no forecast array"),
            FrameError::NonNumeric(idx) => write!(f, "Frame forecast[{}] is not a number", idx),
            FrameError::ServerError(msg) => write!(f, "Backend reported: {}", msg),
        }
    }
}

impl std::error::Error for FrameError {}

/// Strip SSE `data:` field names. Frames without any `data:` line are
/// returned unchanged; otherwise only the data lines are kept, joined by
/// newlines, and `event:`/`id:`/comment lines are dropped.
pub fn sse_payload(frame: &str) -> String {
    if !frame.lines().any(|line| line.starts_with("data:")) {
        return frame.to_string();
    }
    frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_frame(frame: &str) -> Result<ForecastFrame, FrameError> {
    let payload = sse_payload(frame);
    let value: Value =
        serde_json::from_str(payload.trim()).map_err(|e| FrameError::Malformed(e.to_string()))?;

    if let Some(err) = value.get("error") {
        let message = err.as_str().map(String::from).unwrap_or_else(|| err.to_string());
        return Err(FrameError::ServerError(message));
    }

    let entries = value
        .get("forecast")
        .and_then(Value::as_array)
        .ok_or(FrameError::MissingForecast)?;

    let forecast = entries
        .iter()
        .enumerate()
        .map(|(idx, v)| v.as_f64().ok_or(FrameError::NonNumeric(idx)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ForecastFrame { forecast })
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: usize,
    pub frames_forwarded: usize,
    pub frames_dropped: usize,
}

pub struct StreamReader {
    session: u64,
    context: String,
    decoder: FrameDecoder,
    stats: StreamStats,
}

impl StreamReader {
    pub fn new(session: u64) -> Self {
        Self {
            session,
            context: format!("session {}", session),
            decoder: FrameDecoder::new(),
            stats: StreamStats::default(),
        }
    }

    /// Decode one chunk and return the forecasts it completed. Frames that
    /// fail to parse are logged, counted and dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ForecastFrame> {
        self.stats.chunks += 1;
        let frames = self.decoder.push(chunk);

        let discarded = self.decoder.take_discarded();
        if discarded > 0 {
            self.stats.frames_dropped += 1;
            logging::warn(
                Component::Stream,
                Some(&self.context),
                &format!("discarded {} bytes of unterminated frame data", discarded),
            );
        }

        frames.iter().filter_map(|frame| self.accept(frame)).collect()
    }

    /// Parse the unterminated tail left at a clean end of stream.
    pub fn finish(&mut self) -> Option<ForecastFrame> {
        let frame = self.decoder.finish()?;
        self.accept(&frame)
    }

    fn accept(&mut self, frame: &str) -> Option<ForecastFrame> {
        match parse_frame(frame) {
            Ok(forecast) => {
                self.stats.frames_forwarded += 1;
                Some(forecast)
            }
            Err(FrameError::ServerError(msg)) => {
                self.stats.frames_dropped += 1;
                logging::warn(Component::Stream, Some(&self.context), &format!("backend error frame: {}", msg));
                None
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                logging::warn(Component::Stream, Some(&self.context), &format!("frame dropped: {}", e));
                None
            }
        }
    }

    /// Read `chunks` to the end, forwarding every forecast to `events`, then
    /// report `StreamClosed`. Returns early, without the close event, if
    /// the consumer is gone.
    pub async fn run<C: ChunkSource>(
        mut self,
        mut chunks: C,
        events: mpsc::Sender<PipelineEvent>,
    ) -> StreamStats {
        let error = loop {
            match chunks.next_chunk().await {
                Ok(Some(chunk)) => {
                    for frame in self.feed(&chunk) {
                        if !self.forward(&events, frame).await {
                            return self.stats;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(frame) = self.finish() {
                        if !self.forward(&events, frame).await {
                            return self.stats;
                        }
                    }
                    break None;
                }
                Err(e) => {
                    logging::log_api_failure(Component::Stream, Some(&self.context), "stream read", &e);
                    break Some(e);
                }
            }
        };

        logging::log_stream_summary(
            self.session,
            self.stats.chunks,
            self.stats.frames_forwarded,
            self.stats.frames_dropped,
        );
        let _ = events
            .send(PipelineEvent::StreamClosed { session: self.session, stats: self.stats, error })
            .await;
        self.stats
    }

    async fn forward(&self, events: &mpsc::Sender<PipelineEvent>, frame: ForecastFrame) -> bool {
        events
            .send(PipelineEvent::Forecast { session: self.session, frame })
            .await
            .is_ok()
    }
}

/// Open the alert stream and read it to the end. Setup failures (no token,
/// non-success status, connection error) are logged and reported as an
/// immediately closed session; there is no retry.
pub async fn open_and_run<B: AlertBackend>(
    backend: B,
    session: u64,
    events: mpsc::Sender<PipelineEvent>,
) {
    let context = format!("session {}", session);

    match backend.open_alert_stream().await {
        Ok(chunks) => {
            logging::info(Component::Stream, Some(&context), "alert stream opened");
            StreamReader::new(session).run(chunks, events).await;
        }
        Err(e) => {
            if e == ApiError::MissingToken {
                logging::warn(Component::Stream, Some(&context), "no authorization token; alert stream not opened");
            } else {
                logging::log_api_failure(Component::Stream, Some(&context), "stream setup", &e);
            }
            let _ = events
                .send(PipelineEvent::StreamClosed { session, stats: StreamStats::default(), error: Some(e) })
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
