use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use hostpulse_core::{CpuReading, MetricValue};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, instrument};

use crate::sensors::Sensor;

/// Raw CPU counters behind [`CpuSensor`].
pub trait CpuCounters: Send + Sync {
    /// Model name of the first core, if the OS reports one
    fn brand(&self) -> Option<String>;

    /// Global utilization measured across `window`. `None` when the OS
    /// reports no cores.
    fn usage_over(&self, window: Duration) -> Option<f32>;
}

/// Counters read through a long-lived `sysinfo::System`
pub struct SysinfoCounters {
    system: Mutex<System>,
}

impl SysinfoCounters {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }

    // A panic mid-refresh leaves the counters usable; the next refresh overwrites them
    fn lock(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCounters for SysinfoCounters {
    fn brand(&self) -> Option<String> {
        self.lock()
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
    }

    fn usage_over(&self, window: Duration) -> Option<f32> {
        let mut system = self.lock();

        system.refresh_cpu_usage();
        thread::sleep(window);
        system.refresh_cpu_usage();

        if system.cpus().is_empty() {
            return None;
        }
        Some(system.global_cpu_usage())
    }
}

/// CPU model name (read once) and utilization over a short window.
///
/// `sample` blocks for the measurement window. The window is never shorter
/// than what sysinfo needs between two refreshes to produce a usage figure.
/// The name and the usage are read separately, so either can be unavailable
/// while the other is reported.
pub struct CpuSensor<C = SysinfoCounters> {
    name: MetricValue<String>,
    counters: C,
    window: Duration,
}

impl CpuSensor {
    pub fn new(window: Duration) -> Self {
        Self::with_counters(SysinfoCounters::new(), window)
    }
}

impl<C: CpuCounters> CpuSensor<C> {
    #[instrument(skip(counters))]
    pub fn with_counters(counters: C, window: Duration) -> Self {
        let name = counters
            .brand()
            .filter(|brand| !brand.is_empty())
            .map(MetricValue::available)
            .unwrap_or_else(|| MetricValue::unavailable("cpu brand not reported"));

        debug!(name = ?name, "CPU identified");

        Self {
            name,
            counters,
            window: window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn measure_usage(&self) -> MetricValue<f64> {
        match self.counters.usage_over(self.window) {
            Some(usage) => MetricValue::percent(usage as f64),
            None => MetricValue::unavailable("cpu counters unavailable"),
        }
    }
}

impl<C: CpuCounters> Sensor for CpuSensor<C> {
    type Reading = CpuReading;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(&self) -> CpuReading {
        CpuReading {
            name: self.name.clone(),
            usage_percent: self.measure_usage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    struct FixedCounters {
        brand: Option<&'static str>,
        usage: Option<f32>,
    }

    impl CpuCounters for FixedCounters {
        fn brand(&self) -> Option<String> {
            self.brand.map(str::to_string)
        }

        fn usage_over(&self, _window: Duration) -> Option<f32> {
            self.usage
        }
    }

    #[test]
    fn test_window_has_floor() {
        let sensor = CpuSensor::new(Duration::from_millis(1));
        assert!(sensor.window >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[test]
    fn test_sample_blocks_for_window_and_stays_in_range() {
        let sensor = CpuSensor::new(Duration::from_millis(100));
        let started = Instant::now();
        let reading = sensor.sample();
        assert!(started.elapsed() >= sensor.window);

        if let Some(usage) = reading.usage_percent.value() {
            assert!((0.0..=100.0).contains(usage));
        }
    }

    #[test]
    fn test_missing_brand_keeps_usage() {
        let counters = FixedCounters {
            brand: None,
            usage: Some(37.5),
        };
        let reading = CpuSensor::with_counters(counters, Duration::ZERO).sample();

        assert_eq!(reading.name, MetricValue::unavailable("cpu brand not reported"));
        assert_eq!(reading.usage_percent, MetricValue::available(37.5));
    }

    #[test]
    fn test_blank_brand_is_unavailable() {
        let counters = FixedCounters {
            brand: Some(""),
            usage: Some(10.0),
        };
        let reading = CpuSensor::with_counters(counters, Duration::ZERO).sample();

        assert!(!reading.name.is_available());
        assert!(reading.usage_percent.is_available());
    }

    #[test]
    fn test_missing_usage_keeps_name() {
        let counters = FixedCounters {
            brand: Some("Example CPU @ 3.00GHz"),
            usage: None,
        };
        let reading = CpuSensor::with_counters(counters, Duration::ZERO).sample();

        assert_eq!(reading.name, MetricValue::available("Example CPU @ 3.00GHz".to_string()));
        assert_eq!(
            reading.usage_percent,
            MetricValue::unavailable("cpu counters unavailable")
        );
    }

    #[test]
    fn test_counters_recover_after_panic_while_locked() {
        let counters = Arc::new(SysinfoCounters::new());

        let holder = Arc::clone(&counters);
        let result = thread::spawn(move || {
            let _guard = holder.system.lock().unwrap();
            panic!("sampling thread died");
        })
        .join();
        assert!(result.is_err());
        assert!(counters.system.is_poisoned());

        let cores = counters.lock().cpus().len();
        let usage = counters.usage_over(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        assert_eq!(usage.is_some(), cores > 0);
    }
}
