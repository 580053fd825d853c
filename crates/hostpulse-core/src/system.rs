//! Snapshot model for host telemetry

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::metric::MetricValue;

/// CPU name and utilization from one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuReading {
    pub name: MetricValue<String>,
    pub usage_percent: MetricValue<f64>,
}

impl CpuReading {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            name: MetricValue::unavailable(reason),
            usage_percent: MetricValue::unavailable(reason),
        }
    }
}

/// Memory capacity (GiB) and utilization, read from one counter read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    pub total_gb: MetricValue<f64>,
    pub usage_percent: MetricValue<f64>,
}

impl MemoryReading {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            total_gb: MetricValue::unavailable(reason),
            usage_percent: MetricValue::unavailable(reason),
        }
    }
}

/// Name and load of the first reported GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuReading {
    pub name: MetricValue<String>,
    pub usage_percent: MetricValue<f64>,
}

impl GpuReading {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            name: MetricValue::unavailable(reason),
            usage_percent: MetricValue::unavailable(reason),
        }
    }
}

/// Identifies one metric field of a [`Snapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotField {
    IpAddress,
    CpuName,
    CpuUsage,
    RamTotal,
    RamUsage,
    GpuName,
    GpuUsage,
}

impl SnapshotField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IpAddress => "IP Address:",
            Self::CpuName => "CPU Model:",
            Self::CpuUsage => "CPU Usage:",
            Self::RamTotal => "Total RAM:",
            Self::RamUsage => "RAM Usage:",
            Self::GpuName => "GPU Model:",
            Self::GpuUsage => "GPU Usage:",
        }
    }
}

/// One tick's worth of telemetry. Immutable once built; the next tick
/// produces a new value instead of mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ip_address: MetricValue<String>,
    pub cpu_name: MetricValue<String>,
    pub cpu_usage_percent: MetricValue<f64>,
    pub ram_total_gb: MetricValue<f64>,
    pub ram_usage_percent: MetricValue<f64>,
    pub gpu_name: MetricValue<String>,
    pub gpu_usage_percent: MetricValue<f64>,
    pub captured_at_ms: u64,
}

impl Snapshot {
    /// Every metric field, in display order
    pub const FIELDS: [SnapshotField; 7] = [
        SnapshotField::IpAddress,
        SnapshotField::CpuName,
        SnapshotField::CpuUsage,
        SnapshotField::GpuName,
        SnapshotField::GpuUsage,
        SnapshotField::RamTotal,
        SnapshotField::RamUsage,
    ];

    /// Assemble a snapshot from sensor readings, stamped with the current time.
    pub fn assemble(
        ip_address: MetricValue<String>,
        cpu: CpuReading,
        memory: MemoryReading,
        gpu: GpuReading,
    ) -> Self {
        Self {
            ip_address,
            cpu_name: cpu.name,
            cpu_usage_percent: cpu.usage_percent,
            ram_total_gb: memory.total_gb,
            ram_usage_percent: memory.usage_percent,
            gpu_name: gpu.name,
            gpu_usage_percent: gpu.usage_percent,
            captured_at_ms: now_ms(),
        }
    }

    pub fn is_available(&self, field: SnapshotField) -> bool {
        match field {
            SnapshotField::IpAddress => self.ip_address.is_available(),
            SnapshotField::CpuName => self.cpu_name.is_available(),
            SnapshotField::CpuUsage => self.cpu_usage_percent.is_available(),
            SnapshotField::RamTotal => self.ram_total_gb.is_available(),
            SnapshotField::RamUsage => self.ram_usage_percent.is_available(),
            SnapshotField::GpuName => self.gpu_name.is_available(),
            SnapshotField::GpuUsage => self.gpu_usage_percent.is_available(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
