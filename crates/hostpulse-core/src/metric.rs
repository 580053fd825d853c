use serde::{Deserialize, Serialize};

/// Reason used when the network identity could not be resolved
pub const REASON_NETWORK_ERROR: &str = "network error";
/// Reason used when no GPU probing tool was detected at startup
pub const REASON_CAPABILITY_UNAVAILABLE: &str = "capability unavailable";
/// Reason used when the GPU tool reports no devices
pub const REASON_NO_DEVICE: &str = "no supported device found";
/// Reason used when the GPU tool fails or times out
pub const REASON_QUERY_ERROR: &str = "query error";
/// Reason used when a sensor panics mid-sample
pub const REASON_SENSOR_FAULT: &str = "sensor fault";

/// A sampled value, or the reason it could not be sampled.
///
/// Every field of a [`crate::Snapshot`] is one of these, so a failed probe is
/// an ordinary value rather than a sentinel string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue<T> {
    Available(T),
    Unavailable(String),
}

impl<T> MetricValue<T> {
    pub fn available(value: T) -> Self {
        Self::Available(value)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MetricValue<U> {
        match self {
            Self::Available(v) => MetricValue::Available(f(v)),
            Self::Unavailable(reason) => MetricValue::Unavailable(reason),
        }
    }
}

impl MetricValue<f64> {
    /// Percentage clamped into [0, 100]; non-finite readings become unavailable.
    pub fn percent(value: f64) -> Self {
        if !value.is_finite() {
            return Self::unavailable("invalid reading");
        }
        Self::Available(value.clamp(0.0, 100.0))
    }
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let ok = MetricValue::available(3.5);
        assert!(ok.is_available());
        assert_eq!(ok.value(), Some(&3.5));
        assert_eq!(ok.reason(), None);

        let na: MetricValue<f64> = MetricValue::unavailable(REASON_QUERY_ERROR);
        assert!(!na.is_available());
        assert_eq!(na.value(), None);
        assert_eq!(na.reason(), Some("query error"));
    }

    #[test]
    fn test_map_keeps_reason() {
        let na: MetricValue<u64> = MetricValue::unavailable("boom");
        assert_eq!(na.map(|v| v * 2), MetricValue::unavailable("boom"));
        assert_eq!(MetricValue::available(2u64).map(|v| v * 2), MetricValue::available(4));
    }

    #[test]
    fn test_percent_clamps() {
        assert_eq!(MetricValue::percent(104.2), MetricValue::available(100.0));
        assert_eq!(MetricValue::percent(-1.0), MetricValue::available(0.0));
        assert!(!MetricValue::percent(f64::NAN).is_available());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(42.36, 1), 42.4);
        assert_eq!(round_to(1.005_1, 2), 1.01);
    }
}
