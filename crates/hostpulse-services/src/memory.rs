use std::sync::{Mutex, MutexGuard, PoisonError};

use hostpulse_core::{round_to, MemoryReading, MetricValue};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::sensors::Sensor;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total RAM and the share of it not available to new allocations
pub struct MemorySensor {
    system: Mutex<System>,
}

impl MemorySensor {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
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

impl Default for MemorySensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for MemorySensor {
    type Reading = MemoryReading;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&self) -> MemoryReading {
        let mut system = self.lock();
        system.refresh_memory();
        memory_reading(system.total_memory(), system.available_memory())
    }
}

/// Convert one read of the byte counters into a reading. Both fields come
/// from the same read, so a zero total fails them together.
pub fn memory_reading(total_bytes: u64, available_bytes: u64) -> MemoryReading {
    if total_bytes == 0 {
        return MemoryReading::unavailable("memory counters unavailable");
    }

    let total = total_bytes as f64;
    let used = total_bytes.saturating_sub(available_bytes) as f64;

    // Below 0.005 GiB the two-decimal total would read as a misleading 0.00 GB
    let total_gb = round_to(total / BYTES_PER_GIB, 2);
    let total_gb = if total_gb > 0.0 {
        MetricValue::available(total_gb)
    } else {
        MetricValue::unavailable("memory total below reporting precision")
    };

    MemoryReading {
        total_gb,
        usage_percent: MetricValue::percent(used / total * 100.0),
    }
}
