//! Sensor trait and per-sensor failure isolation

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use hostpulse_core::{CpuReading, GpuReading, MemoryReading, MetricValue};
use tracing::{debug, warn};

/// A single metric-family probe. `sample` never fails: problems are reported
/// as `MetricValue::Unavailable` inside the reading.
pub trait Sensor: Send + Sync {
    type Reading: Send;

    fn name(&self) -> &'static str;

    fn sample(&self) -> Self::Reading;
}

/// Readings that can be filled entirely with an unavailability reason
pub trait Degrade {
    fn degraded(reason: &str) -> Self;
}

impl<T> Degrade for MetricValue<T> {
    fn degraded(reason: &str) -> Self {
        MetricValue::unavailable(reason)
    }
}

impl Degrade for CpuReading {
    fn degraded(reason: &str) -> Self {
        CpuReading::unavailable(reason)
    }
}

impl Degrade for MemoryReading {
    fn degraded(reason: &str) -> Self {
        MemoryReading::unavailable(reason)
    }
}

impl Degrade for GpuReading {
    fn degraded(reason: &str) -> Self {
        GpuReading::unavailable(reason)
    }
}

/// Sample one sensor, turning a panic into a degraded reading so the other
/// sensors of the tick are unaffected.
pub fn sample_isolated<S>(sensor: &S) -> S::Reading
where
    S: Sensor + ?Sized,
    S::Reading: Degrade,
{
    let started = Instant::now();

    match panic::catch_unwind(AssertUnwindSafe(|| sensor.sample())) {
        Ok(reading) => {
            debug!(
                sensor = sensor.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sensor sampled"
            );
            reading
        }
        Err(payload) => {
            warn!(
                sensor = sensor.name(),
                panic = %panic_message(payload.as_ref()),
                "Sensor panicked, reporting unavailable"
            );
            <S::Reading as Degrade>::degraded(hostpulse_core::REASON_SENSOR_FAULT)
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Sensor for Fixed {
        type Reading = MetricValue<String>;

        fn name(&self) -> &'static str {
            "fixed"
        }

        fn sample(&self) -> Self::Reading {
            MetricValue::available("10.0.0.2".to_string())
        }
    }

    struct Exploding;

    impl Sensor for Exploding {
        type Reading = CpuReading;

        fn name(&self) -> &'static str {
            "exploding"
        }

        fn sample(&self) -> Self::Reading {
            panic!("driver fault");
        }
    }

    #[test]
    fn test_passes_reading_through() {
        let reading = sample_isolated(&Fixed);
        assert_eq!(reading, MetricValue::available("10.0.0.2".to_string()));
    }

    #[test]
    fn test_panic_becomes_sensor_fault() {
        let reading = sample_isolated(&Exploding);
        assert_eq!(reading, CpuReading::unavailable("sensor fault"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(payload.as_ref()), "bad");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
