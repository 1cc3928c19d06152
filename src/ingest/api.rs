/// Air-quality backend API client
///
/// Retrieves user alert preferences, the latest station telemetry, and the
/// long-lived forecast alert stream from the monitoring backend.
///
/// Endpoints (relative to the configured base URL, which includes `/api`):
///   GET /users/preferences            → UserPreferencesDTO
///   GET /telemetry/all-data/{device}  → latest raw data with `overallAqi`
///   GET /alerts                       → chunked forecast frames (bearer auth)

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{AlertBackend, ChunkSource};
use crate::config::ServiceConfig;
use crate::model::{ApiError, Preferences};

pub const PREFERENCES_PATH: &str = "/users/preferences";
pub const ALERTS_PATH: &str = "/alerts";
pub const TELEMETRY_PATH: &str = "/telemetry/all-data";

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    /// Build a client. `request_timeout` bounds the short JSON requests and
    /// the connect phase of the stream; the stream body itself is unbounded.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(http, base_url, token, request_timeout))
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.api.base_url,
            config.api.token.clone(),
            config.request_timeout(),
        )
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            request_timeout,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let response = self
            .authorized(self.http.get(self.endpoint(path)))
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .send()
            .await?;

        check_status(response)?
            .json::<Value>()
            .await
            .map_err(|e| ApiError::ParseError(e.to_string()))
    }
}

/// 401 is reported separately so callers can tell an expired token from a
/// backend fault.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        Err(ApiError::Unauthorized)
    } else if !status.is_success() {
        Err(ApiError::HttpError(status.as_u16()))
    } else {
        Ok(response)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Extract `overallAqi` from a telemetry response.
///
/// The backend reports `"N/A"` (or null) when the station has no computed
/// AQI yet; that is `Ok(None)`, not an error. Numeric strings are accepted,
/// but `"NaN"` and `"inf"` are not.
pub fn parse_overall_aqi(body: &Value) -> Result<Option<f64>, ApiError> {
    match body.get("overallAqi") {
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("N/A") => Ok(None),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(aqi) if aqi.is_finite() => Ok(Some(aqi)),
            _ => Err(ApiError::ParseError(format!("overallAqi is not a number: {:?}", s))),
        },
        Some(other) => Err(ApiError::ParseError(format!("unexpected overallAqi value: {}", other))),
        None => Err(ApiError::ParseError("response has no overallAqi field".to_string())),
    }
}

pub fn parse_preferences(body: Value) -> Result<Preferences, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::ParseError(e.to_string()))
}

// ============================================================================
// Backend implementation
// ============================================================================

impl AlertBackend for ApiClient {
    type Chunks = reqwest::Response;

    async fn fetch_preferences(&self) -> Result<Preferences, ApiError> {
        parse_preferences(self.get_json(PREFERENCES_PATH).await?)
    }

    async fn fetch_current_aqi(&self, device_id: &str) -> Result<Option<f64>, ApiError> {
        let body = self.get_json(&format!("{}/{}", TELEMETRY_PATH, device_id)).await?;
        parse_overall_aqi(&body)
    }

    async fn open_alert_stream(&self) -> Result<reqwest::Response, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;

        let response = self
            .http
            .get(self.endpoint(ALERTS_PATH))
            .bearer_auth(token)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        check_status(response)
    }
}

impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        self.chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
