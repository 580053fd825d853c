mod cpu;
mod gpu_monitor;
mod memory;
mod network;
mod refresh;
mod sampler;
mod sensors;
mod services;

pub use cpu::{CpuCounters, CpuSensor, SysinfoCounters};
pub use gpu_monitor::{
    parse_nvidia_csv, parse_rocm_json, GpuCapability, GpuDevice, GpuProbe, GpuQueryError,
    GpuSensor, NvidiaSmiProbe, RocmSmiProbe,
};
pub use memory::{memory_reading, MemorySensor};
pub use network::{AddressResolver, NetworkSensor, ResolveError, SystemResolver};
pub use refresh::{DisplaySink, LoopState, LoopStats, RefreshLoop, SnapshotSlot, TickError};
pub use sampler::{Collector, CpuSensorBox, GpuSensorBox, MemorySensorBox, NetworkSensorBox, Sampler};
pub use sensors::{sample_isolated, Degrade, Sensor};
pub use services::RefreshService;

// Re-export core types so front-ends only import from services
pub use hostpulse_core::{
    rows, HostpulseConfig, HostpulseError, MetricValue, Snapshot, SnapshotField, PLACEHOLDER,
};
