//! Real-time AQI alert service
//!
//! Polls a user's pollution-alert preferences, keeps a forecast alert stream
//! open while immediate alerts are enabled, and raises alerts when current
//! or forecasted AQI crosses the user's threshold.

pub mod alert;
pub mod aqi;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
