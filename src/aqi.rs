/// AQI category scale used in alert texts.
///
/// Six buckets with inclusive upper bounds, matching what the dashboard
/// shows next to the current reading:
///   Good ≤ 50 < Average ≤ 100 < Poor ≤ 150 < Bad ≤ 200 < Dangerous ≤ 300 < Hazardous

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AqiCategory {
    Good,
    Average,
    Poor,
    Bad,
    Dangerous,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            AqiCategory::Good
        } else if aqi <= 100.0 {
            AqiCategory::Average
        } else if aqi <= 150.0 {
            AqiCategory::Poor
        } else if aqi <= 200.0 {
            AqiCategory::Bad
        } else if aqi <= 300.0 {
            AqiCategory::Dangerous
        } else {
            AqiCategory::Hazardous
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Average => "Average",
            AqiCategory::Poor => "Poor",
            AqiCategory::Bad => "Bad",
            AqiCategory::Dangerous => "Dangerous",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Air quality is satisfactory. You can go outside.",
            AqiCategory::Average => {
                "Moderate air quality. Sensitive groups should limit outdoor activities."
            }
            AqiCategory::Poor => {
                "Air quality is unhealthy for sensitive groups. Limit outdoor exposure."
            }
            AqiCategory::Bad => "Air quality is unhealthy. Sensitive groups should avoid going out.",
            AqiCategory::Dangerous => "Dangerous air quality. Avoid going outside.",
            AqiCategory::Hazardous => "Very hazardous. Everyone should stay indoors.",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
