// Domain modules
pub mod config;
pub mod display;
pub mod error;
pub mod metric;
pub mod system;

pub use config::{HostpulseConfig, ProbeConfig, RefreshConfig};
pub use display::{format_gigabytes, format_percent, format_text, rows, PLACEHOLDER};
pub use error::{HostpulseError, Result};
pub use metric::{
    round_to, MetricValue, REASON_CAPABILITY_UNAVAILABLE, REASON_NETWORK_ERROR, REASON_NO_DEVICE,
    REASON_QUERY_ERROR, REASON_SENSOR_FAULT,
};
pub use system::{now_ms, CpuReading, GpuReading, MemoryReading, Snapshot, SnapshotField};
