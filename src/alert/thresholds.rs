//! AQI threshold rules.
//!
//! Both rules are pure: they look only at their arguments, keep no state
//! between calls, and return the alert they would raise. Dispatch to a
//! notifier happens in `alert::AlertEvaluator`.

use crate::aqi::AqiCategory;
use crate::model::{AlertMessage, Preferences};

/// Share of forecast entries that must exceed the threshold, strictly.
pub const FORECAST_EXCEEDANCE_PERCENT: f64 = 50.0;

/// Instantaneous rule: raises an error alert when `current_aqi` strictly
/// exceeds the user's threshold and immediate pollution alerts are on.
///
/// Returns `None` at or below the threshold, for a non-finite reading, when
/// alerts are off, when the frequency is not `Immediate`, or when no
/// threshold is set.
pub fn check_current_aqi(current_aqi: f64, prefs: &Preferences) -> Option<AlertMessage> {
    if !prefs.wants_immediate_alerts() {
        return None;
    }
    let threshold = prefs.aqi_threshold?;
    if !current_aqi.is_finite() || current_aqi <= threshold {
        return None;
    }

    let category = AqiCategory::from_aqi(current_aqi);
    Some(AlertMessage::error(format!(
        "Air Quality Alert: current AQI {} exceeds your threshold of {} ({}). {}",
        current_aqi,
        threshold,
        category,
        category.advice()
    )))
}

/// Percentage (0–100) of `values` strictly greater than `threshold`.
/// An empty slice is 0%.
pub fn exceedance_percentage(values: &[f64], threshold: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let above = values.iter().filter(|v| **v > threshold).count();
    (above as f64 / values.len() as f64) * 100.0
}

/// Time-range phrase chosen purely by forecast length: 24 hourly values,
/// 3 daily values, anything else is reported as a week.
pub fn time_range_phrase(len: usize) -> &'static str {
    match len {
        24 => "next 24 hours",
        3 => "next 3 days",
        _ => "next 7 days",
    }
}

/// Forecast rule: raises an error alert when more than half of the
/// forecast values strictly exceed the threshold. Exactly 50% does not.
pub fn check_forecast(forecast: &[f64], prefs: &Preferences) -> Option<AlertMessage> {
    if !prefs.wants_immediate_alerts() {
        return None;
    }
    let threshold = prefs.aqi_threshold?;
    if exceedance_percentage(forecast, threshold) <= FORECAST_EXCEEDANCE_PERCENT {
        return None;
    }

    Some(AlertMessage::error(format!(
        "AQI is forecasted to exceed {} in the {}. Please take necessary precautions.",
        threshold,
        time_range_phrase(forecast.len())
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationFrequency, Severity};

    fn prefs(show: bool, frequency: NotificationFrequency, threshold: f64) -> Preferences {
        Preferences {
            show_pollution_alerts: show,
            notification_frequency: Some(frequency),
            aqi_threshold: Some(threshold),
        }
    }

    fn immediate(threshold: f64) -> Preferences {
        prefs(true, NotificationFrequency::Immediate, threshold)
    }

    // --- Instantaneous rule ---------------------------------------------------

    #[test]
    fn test_current_aqi_above_threshold_names_value_and_threshold() {
        let alert = check_current_aqi(150.0, &immediate(100.0)).expect("150 > 100 should alert");
        assert_eq!(alert.severity, Severity::Error);
        assert!(alert.text.contains("150"), "text should name the value: {}", alert.text);
        assert!(alert.text.contains("100"), "text should name the threshold: {}", alert.text);
        assert!(alert.text.contains("Poor"));
    }

    #[test]
    fn test_current_aqi_at_or_below_threshold_never_alerts() {
        let p = immediate(100.0);
        for v in [0.0, 42.0, 99.9, 100.0] {
            assert!(check_current_aqi(v, &p).is_none(), "{} <= 100 must not alert", v);
        }
    }

    #[test]
    fn test_current_aqi_every_value_above_threshold_alerts() {
        let p = immediate(100.0);
        for v in [100.1, 101.0, 250.0, 500.0] {
            assert!(check_current_aqi(v, &p).is_some(), "{} > 100 must alert", v);
        }
    }

    #[test]
    fn test_current_aqi_non_finite_reading_never_alerts() {
        let p = immediate(100.0);
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(check_current_aqi(v, &p).is_none(), "{} must not alert", v);
        }
    }

    #[test]
    fn test_current_aqi_respects_alert_toggle_and_frequency() {
        assert!(check_current_aqi(300.0, &prefs(false, NotificationFrequency::Immediate, 100.0)).is_none());
        assert!(check_current_aqi(300.0, &prefs(true, NotificationFrequency::DailySummary, 100.0)).is_none());
        assert!(check_current_aqi(300.0, &prefs(true, NotificationFrequency::WeeklySummary, 100.0)).is_none());
    }

    #[test]
    fn test_current_aqi_without_threshold_never_alerts() {
        let mut p = immediate(100.0);
        p.aqi_threshold = None;
        assert!(check_current_aqi(400.0, &p).is_none());
    }

    // --- Forecast rule --------------------------------------------------------

    #[test]
    fn test_forecast_four_of_seven_above_alerts_for_seven_days() {
        let forecast = [50.0, 60.0, 70.0, 200.0, 210.0, 220.0, 230.0];
        let alert = check_forecast(&forecast, &immediate(100.0)).expect("4/7 ≈ 57% should alert");
        assert_eq!(alert.severity, Severity::Error);
        assert!(alert.text.contains("next 7 days"), "got: {}", alert.text);
        assert!(alert.text.contains("100"));
    }

    #[test]
    fn test_forecast_exactly_half_does_not_alert() {
        let forecast = [50.0, 60.0, 200.0, 210.0];
        assert_eq!(exceedance_percentage(&forecast, 100.0), 50.0);
        assert!(check_forecast(&forecast, &immediate(100.0)).is_none());
    }

    #[test]
    fn test_forecast_values_equal_to_threshold_do_not_count() {
        // Strictly greater: three values at the threshold are not exceedances.
        let forecast = [100.0, 100.0, 100.0];
        assert_eq!(exceedance_percentage(&forecast, 100.0), 0.0);
        assert!(check_forecast(&forecast, &immediate(100.0)).is_none());
    }

    #[test]
    fn test_forecast_time_range_phrase_by_length() {
        let hourly = vec![180.0; 24];
        let daily = vec![180.0; 3];
        let weekly = vec![180.0; 7];
        let odd = vec![180.0; 5];
        let p = immediate(100.0);

        assert!(check_forecast(&hourly, &p).unwrap().text.contains("next 24 hours"));
        assert!(check_forecast(&daily, &p).unwrap().text.contains("next 3 days"));
        assert!(check_forecast(&weekly, &p).unwrap().text.contains("next 7 days"));
        // Any other length falls back to the weekly phrase.
        assert!(check_forecast(&odd, &p).unwrap().text.contains("next 7 days"));
    }

    #[test]
    fn test_forecast_empty_never_alerts() {
        assert_eq!(exceedance_percentage(&[], 100.0), 0.0);
        assert!(check_forecast(&[], &immediate(100.0)).is_none());
    }

    #[test]
    fn test_forecast_respects_alert_toggle_and_frequency() {
        let forecast = [180.0, 190.0, 100.0];
        assert!(check_forecast(&forecast, &immediate(100.0)).is_some());
        assert!(check_forecast(&forecast, &prefs(false, NotificationFrequency::Immediate, 100.0)).is_none());
        assert!(check_forecast(&forecast, &prefs(true, NotificationFrequency::DailySummary, 100.0)).is_none());
    }
}
