//! Alert evaluation and notification dispatch.
//!
//! - `thresholds` - the two pure AQI rules.
//! - `notifier`   - the injected notification surface.
//! - `staleness`  - age checks on the preference snapshot the rules run on.

pub mod notifier;
pub mod staleness;
pub mod thresholds;

use crate::logging::{self, Component};
use crate::model::{AlertMessage, Preferences};
use notifier::Notifier;

/// Runs the threshold rules and hands any resulting alert to the notifier.
/// Holds no state besides the notifier; every call is independent.
pub struct AlertEvaluator<N> {
    notifier: N,
}

impl<N: Notifier> AlertEvaluator<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    /// Instantaneous rule. Returns `true` if an alert was emitted.
    pub fn evaluate_current(&self, current_aqi: f64, prefs: &Preferences) -> bool {
        self.emit(thresholds::check_current_aqi(current_aqi, prefs))
    }

    /// Forecast rule. Returns `true` if an alert was emitted.
    pub fn evaluate_forecast(&self, forecast: &[f64], prefs: &Preferences) -> bool {
        self.emit(thresholds::check_forecast(forecast, prefs))
    }

    fn emit(&self, alert: Option<AlertMessage>) -> bool {
        match alert {
            Some(alert) => {
                logging::debug(Component::Evaluator, None, &format!("raising alert: {}", alert.text));
                self.notifier.notify(alert);
                true
            }
            None => false,
        }
    }
}
