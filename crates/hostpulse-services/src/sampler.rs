use hostpulse_core::{CpuReading, GpuReading, MemoryReading, MetricValue, ProbeConfig, Snapshot};
use tracing::debug;

use crate::cpu::CpuSensor;
use crate::gpu_monitor::{GpuCapability, GpuSensor};
use crate::memory::MemorySensor;
use crate::network::NetworkSensor;
use crate::sensors::{sample_isolated, Sensor};

pub type NetworkSensorBox = Box<dyn Sensor<Reading = MetricValue<String>>>;
pub type CpuSensorBox = Box<dyn Sensor<Reading = CpuReading>>;
pub type MemorySensorBox = Box<dyn Sensor<Reading = MemoryReading>>;
pub type GpuSensorBox = Box<dyn Sensor<Reading = GpuReading>>;

/// Produces one complete snapshot per call. Must not fail.
pub trait Collector: Send + Sync + 'static {
    fn collect(&self) -> Snapshot;
}

/// Runs every sensor once and assembles the results
pub struct Sampler {
    network: NetworkSensorBox,
    cpu: CpuSensorBox,
    memory: MemorySensorBox,
    gpu: GpuSensorBox,
}

impl Sampler {
    pub fn new(
        network: NetworkSensorBox,
        cpu: CpuSensorBox,
        memory: MemorySensorBox,
        gpu: GpuSensorBox,
    ) -> Self {
        Self {
            network,
            cpu,
            memory,
            gpu,
        }
    }

    /// Host sensors; `capability` comes from the startup GPU check.
    pub fn from_config(config: &ProbeConfig, capability: GpuCapability) -> Self {
        Self::new(
            Box::new(NetworkSensor::from_config(config)),
            Box::new(CpuSensor::new(config.cpu_window())),
            Box::new(MemorySensor::new()),
            Box::new(GpuSensor::new(capability)),
        )
    }
}

impl Collector for Sampler {
    fn collect(&self) -> Snapshot {
        let ip_address = sample_isolated(self.network.as_ref());
        let cpu = sample_isolated(self.cpu.as_ref());
        let memory = sample_isolated(self.memory.as_ref());
        let gpu = sample_isolated(self.gpu.as_ref());

        let snapshot = Snapshot::assemble(ip_address, cpu, memory, gpu);
        debug!(
            available = Snapshot::FIELDS.iter().filter(|f| snapshot.is_available(**f)).count(),
            total = Snapshot::FIELDS.len(),
            "Snapshot assembled"
        );
        snapshot
    }
}
