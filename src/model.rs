/// Preferences, ForecastFrame, AlertMessage, ApiError
/// core data structures and error handling
///
/// Shared domain model imported by all other modules. Apart from the serde
/// glue needed to read the backend's nullable DTO fields it contains no
/// logic and no I/O.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Notification frequency
// ---------------------------------------------------------------------------

/// How often the user wants to be told about pollution.
///
/// Only `Immediate` enables the real-time pipeline; the two summary modes
/// are delivered by the backend (email/push) and are inert here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationFrequency {
    #[serde(rename = "Immediate")]
    Immediate,
    #[serde(rename = "Daily Summary")]
    DailySummary,
    #[serde(rename = "Weekly Summary")]
    WeeklySummary,
}

impl NotificationFrequency {
    /// Maps the backend's string value. Returns `None` for anything unknown.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "Immediate" => Some(Self::Immediate),
            "Daily Summary" | "DailySummary" => Some(Self::DailySummary),
            "Weekly Summary" | "WeeklySummary" => Some(Self::WeeklySummary),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::DailySummary => "Daily Summary",
            Self::WeeklySummary => "Weekly Summary",
        }
    }
}

impl fmt::Display for NotificationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// The user's alert configuration as returned by `GET /users/preferences`.
///
/// The backend DTO has many more fields (language, email/sms toggles, ...)
/// which are ignored. Every field the pipeline reads is nullable on the
/// wire, so nulls are folded into "off":
///   - `showPollutionAlerts: null` → `false`
///   - unknown or null frequency   → `None`
///   - `aqiThreshold: null`        → `None` (no rule can fire)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, deserialize_with = "null_as_false")]
    pub show_pollution_alerts: bool,
    #[serde(default, deserialize_with = "frequency_from_wire")]
    pub notification_frequency: Option<NotificationFrequency>,
    #[serde(default)]
    pub aqi_threshold: Option<f64>,
}

impl Preferences {
    /// The activation condition for the stream and both alert rules:
    /// `showPollutionAlerts && notificationFrequency == Immediate`.
    pub fn wants_immediate_alerts(&self) -> bool {
        self.show_pollution_alerts
            && self.notification_frequency == Some(NotificationFrequency::Immediate)
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn frequency_from_wire<'de, D>(deserializer: D) -> Result<Option<NotificationFrequency>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(NotificationFrequency::from_wire))
}

// ---------------------------------------------------------------------------
// Stream and alert types
// ---------------------------------------------------------------------------

/// One batch of predicted AQI values decoded from a single stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrame {
    pub forecast: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A transient notification produced by the evaluator. Consumed once by the
/// notifier and then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub text: String,
    pub severity: Severity,
}

impl AlertMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), severity: Severity::Error }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when talking to the air-quality backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Non-2xx HTTP response other than 401.
    HttpError(u16),
    /// 401: the bearer token is missing server-side, expired or invalid.
    Unauthorized,
    /// No bearer token is configured, so the request was never sent.
    MissingToken,
    /// Connection, timeout or body read failure.
    Transport(String),
    /// The response body could not be deserialized.
    ParseError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::HttpError(code) => write!(f, "HTTP error: {}", code),
            ApiError::Unauthorized => write!(f, "HTTP error: 401 (token expired, please login again)"),
            ApiError::MissingToken => write!(f, "No authorization token configured"),
            ApiError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ApiError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::ParseError(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::HttpError(status.as_u16())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_parse_backend_dto() {
        // Shape of UserPreferencesDTO as serialized by the backend.
        let json = r#"{
            "locationCustomization": "Hanoi",
            "displayLanguage": "en",
            "showPollutionAlerts": true,
            "showHealthTips": false,
            "useLocation": true,
            "emailAlerts": true,
            "pushAlerts": false,
            "smsAlerts": false,
            "aqiThreshold": 100,
            "notificationFrequency": "Immediate"
        }"#;
        let prefs: Preferences = serde_json::from_str(json).expect("DTO should parse");
        assert!(prefs.show_pollution_alerts);
        assert_eq!(prefs.notification_frequency, Some(NotificationFrequency::Immediate));
        assert_eq!(prefs.aqi_threshold, Some(100.0));
        assert!(prefs.wants_immediate_alerts());
    }

    #[test]
    fn test_summary_frequencies_use_spaced_wire_names() {
        let daily: Preferences = serde_json::from_str(
            r#"{"showPollutionAlerts": true, "notificationFrequency": "Daily Summary", "aqiThreshold": 80}"#,
        )
        .unwrap();
        assert_eq!(daily.notification_frequency, Some(NotificationFrequency::DailySummary));
        assert!(!daily.wants_immediate_alerts());

        let weekly: Preferences = serde_json::from_str(
            r#"{"showPollutionAlerts": true, "notificationFrequency": "WeeklySummary"}"#,
        )
        .unwrap();
        assert_eq!(weekly.notification_frequency, Some(NotificationFrequency::WeeklySummary));
    }

    #[test]
    fn test_null_fields_fold_to_disabled() {
        let prefs: Preferences = serde_json::from_str(
            r#"{"showPollutionAlerts": null, "notificationFrequency": null, "aqiThreshold": null}"#,
        )
        .unwrap();
        assert!(!prefs.show_pollution_alerts);
        assert_eq!(prefs.notification_frequency, None);
        assert_eq!(prefs.aqi_threshold, None);
        assert!(!prefs.wants_immediate_alerts());
    }

    #[test]
    fn test_unknown_frequency_closes_the_gate() {
        let prefs: Preferences = serde_json::from_str(
            r#"{"showPollutionAlerts": true, "notificationFrequency": "Hourly", "aqiThreshold": 100}"#,
        )
        .unwrap();
        assert_eq!(prefs.notification_frequency, None);
        assert!(!prefs.wants_immediate_alerts());
    }

    #[test]
    fn test_alerts_disabled_closes_the_gate_even_when_immediate() {
        let prefs = Preferences {
            show_pollution_alerts: false,
            notification_frequency: Some(NotificationFrequency::Immediate),
            aqi_threshold: Some(100.0),
        };
        assert!(!prefs.wants_immediate_alerts());
    }

    #[test]
    fn test_api_error_display_keeps_classification_prefixes() {
        assert_eq!(ApiError::HttpError(500).to_string(), "HTTP error: 500");
        assert!(ApiError::ParseError("eof".into()).to_string().starts_with("Parse error"));
        assert!(ApiError::Unauthorized.to_string().contains("401"));
    }
}
