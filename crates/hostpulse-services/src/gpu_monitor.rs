use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hostpulse_core::{
    round_to, GpuReading, MetricValue, REASON_CAPABILITY_UNAVAILABLE, REASON_NO_DEVICE,
    REASON_QUERY_ERROR,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::sensors::Sensor;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum GpuQueryError {
    #[error("Failed to execute {tool}: {source}")]
    ExecutionFailed {
        tool: &'static str,
        source: std::io::Error,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{tool} timed out after {timeout:?}")]
    TimedOut {
        tool: &'static str,
        timeout: Duration,
    },
    #[error("{tool} exited with {status}")]
    Failed { tool: &'static str, status: String },
    #[error("Unexpected {tool} output: {detail}")]
    Parse { tool: &'static str, detail: String },
}

/// One device as reported by a GPU tool
#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    pub index: u32,
    pub name: String,
    /// Load as a fraction in [0, 1]; `None` when the tool does not report it
    pub load: Option<f64>,
}

/// A command-line GPU tool that can list devices
pub trait GpuProbe: Send + Sync {
    fn tool(&self) -> &'static str;

    /// Whether the tool can be launched at all. Only consulted at startup.
    fn is_available(&self) -> bool;

    /// Supported devices in the tool's natural order
    fn devices(&self) -> Result<Vec<GpuDevice>, GpuQueryError>;
}

/// NVIDIA devices via `nvidia-smi`
pub struct NvidiaSmiProbe {
    timeout: Duration,
}

impl NvidiaSmiProbe {
    const TOOL: &'static str = "nvidia-smi";

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl GpuProbe for NvidiaSmiProbe {
    fn tool(&self) -> &'static str {
        Self::TOOL
    }

    fn is_available(&self) -> bool {
        tool_launches(Self::TOOL, &["--version"], self.timeout)
    }

    fn devices(&self) -> Result<Vec<GpuDevice>, GpuQueryError> {
        let stdout = run_tool(
            Self::TOOL,
            &[
                "--query-gpu=index,name,utilization.gpu",
                "--format=csv,noheader,nounits",
            ],
            self.timeout,
        )?;
        parse_nvidia_csv(&stdout)
    }
}

/// AMD devices via `rocm-smi`
pub struct RocmSmiProbe {
    timeout: Duration,
}

impl RocmSmiProbe {
    const TOOL: &'static str = "rocm-smi";

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl GpuProbe for RocmSmiProbe {
    fn tool(&self) -> &'static str {
        Self::TOOL
    }

    fn is_available(&self) -> bool {
        tool_launches(Self::TOOL, &["--version"], self.timeout)
    }

    fn devices(&self) -> Result<Vec<GpuDevice>, GpuQueryError> {
        let stdout = run_tool(
            Self::TOOL,
            &["--showproductname", "--showuse", "--json"],
            self.timeout,
        )?;
        parse_rocm_json(&stdout)
    }
}

/// Parse `index, name, utilization` lines from `nvidia-smi`.
/// Utilization may read `[N/A]` or `[Not Supported]`.
pub fn parse_nvidia_csv(output: &str) -> Result<Vec<GpuDevice>, GpuQueryError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let parts: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
            let [index, name, utilization] = parts.as_slice() else {
                return Err(GpuQueryError::Parse {
                    tool: NvidiaSmiProbe::TOOL,
                    detail: format!("expected 3 columns in {:?}", line),
                });
            };
            let index = index.parse::<u32>().map_err(|e| GpuQueryError::Parse {
                tool: NvidiaSmiProbe::TOOL,
                detail: format!("bad index {:?}: {}", index, e),
            })?;

            Ok(GpuDevice {
                index,
                name: name.to_string(),
                load: utilization.parse::<f64>().ok().map(|pct| pct / 100.0),
            })
        })
        .collect()
}

/// Parse `rocm-smi --json` output: one `cardN` object per device.
/// Cards are returned in numeric index order.
pub fn parse_rocm_json(output: &str) -> Result<Vec<GpuDevice>, GpuQueryError> {
    let root: serde_json::Value =
        serde_json::from_str(output).map_err(|e| GpuQueryError::Parse {
            tool: RocmSmiProbe::TOOL,
            detail: e.to_string(),
        })?;

    let cards = root.as_object().ok_or_else(|| GpuQueryError::Parse {
        tool: RocmSmiProbe::TOOL,
        detail: "top-level value is not an object".to_string(),
    })?;

    let mut devices: Vec<GpuDevice> = cards
        .iter()
        .filter_map(|(key, card)| {
            let index = key.strip_prefix("card")?.parse::<u32>().ok()?;
            let name = ["Card series", "Card Series", "Card model", "Card Model"]
                .iter()
                .find_map(|field| card.get(*field).and_then(|v| v.as_str()))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("AMD GPU {}", index));
            let load = card
                .get("GPU use (%)")
                .and_then(|v| match v {
                    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                    other => other.as_f64(),
                })
                .map(|pct| pct / 100.0);

            Some(GpuDevice { index, name, load })
        })
        .collect();

    devices.sort_by_key(|d| d.index);
    Ok(devices)
}

fn tool_launches(tool: &'static str, args: &[&str], timeout: Duration) -> bool {
    match run_tool(tool, args, timeout) {
        Ok(_) | Err(GpuQueryError::Failed { .. }) | Err(GpuQueryError::TimedOut { .. }) => true,
        Err(GpuQueryError::NotFound(_)) => false,
        Err(e) => {
            warn!(tool, error = %e, "GPU tool could not be launched");
            false
        }
    }
}

/// Run a tool to completion, killing it if it outlives `timeout`.
/// Stdout is drained on a helper thread so a chatty tool never blocks on a
/// full pipe.
fn run_tool(tool: &'static str, args: &[&str], timeout: Duration) -> Result<String, GpuQueryError> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GpuQueryError::NotFound(tool),
            _ => GpuQueryError::ExecutionFailed { tool, source: e },
        })?;

    let (tx, rx) = channel();
    if let Some(mut pipe) = child.stdout.take() {
        thread::spawn(move || {
            let mut stdout = String::new();
            let _ = tx.send(pipe.read_to_string(&mut stdout).map(|_| stdout));
        });
    } else {
        let _ = tx.send(Ok(String::new()));
    }

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill_quietly(&mut child);
                return Err(GpuQueryError::TimedOut { tool, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_quietly(&mut child);
                return Err(GpuQueryError::ExecutionFailed { tool, source: e });
            }
        }
    };

    if !status.success() {
        return Err(GpuQueryError::Failed {
            tool,
            status: status.to_string(),
        });
    }

    // Descendants may still hold the pipe open; bound the final read too
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining.max(POLL_INTERVAL)) {
        Ok(Ok(stdout)) => Ok(stdout),
        Ok(Err(e)) => Err(GpuQueryError::ExecutionFailed { tool, source: e }),
        Err(_) => Err(GpuQueryError::TimedOut { tool, timeout }),
    }
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Result of the one-time startup check for a usable GPU tool
#[derive(Clone)]
pub enum GpuCapability {
    Present(Arc<dyn GpuProbe>),
    Absent,
}

impl GpuCapability {
    /// Check `nvidia-smi`, then `rocm-smi`. Never fails: a missing or broken
    /// tool only yields `Absent`.
    #[instrument]
    pub fn detect(timeout: Duration) -> Self {
        Self::detect_with(vec![
            Arc::new(NvidiaSmiProbe::new(timeout)),
            Arc::new(RocmSmiProbe::new(timeout)),
        ])
    }

    pub fn detect_with(probes: Vec<Arc<dyn GpuProbe>>) -> Self {
        match probes.into_iter().find(|probe| probe.is_available()) {
            Some(probe) => {
                info!(tool = probe.tool(), "GPU probing tool detected");
                Self::Present(probe)
            }
            None => {
                info!("No GPU probing tool found. GPU information will not be available.");
                Self::Absent
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

impl std::fmt::Debug for GpuCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present(probe) => f.debug_tuple("Present").field(&probe.tool()).finish(),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// Name and load of the first device reported by the detected tool
pub struct GpuSensor {
    capability: GpuCapability,
}

impl GpuSensor {
    pub fn new(capability: GpuCapability) -> Self {
        Self { capability }
    }
}

impl Sensor for GpuSensor {
    type Reading = GpuReading;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn sample(&self) -> GpuReading {
        let GpuCapability::Present(probe) = &self.capability else {
            return GpuReading::unavailable(REASON_CAPABILITY_UNAVAILABLE);
        };

        let devices = match probe.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(tool = probe.tool(), error = %e, "GPU query failed");
                return GpuReading::unavailable(REASON_QUERY_ERROR);
            }
        };

        let Some(first) = devices.into_iter().next() else {
            debug!(tool = probe.tool(), "GPU tool reported no devices");
            return GpuReading::unavailable(REASON_NO_DEVICE);
        };

        let usage_percent = match first.load {
            Some(load) => MetricValue::percent(round_to(load * 100.0, 1)),
            None => MetricValue::unavailable("load not reported"),
        };

        GpuReading {
            name: MetricValue::available(first.name),
            usage_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProbe {
        available: bool,
        devices: fn() -> Result<Vec<GpuDevice>, GpuQueryError>,
        queries: AtomicUsize,
    }

    impl MockProbe {
        fn new(available: bool, devices: fn() -> Result<Vec<GpuDevice>, GpuQueryError>) -> Arc<Self> {
            Arc::new(Self {
                available,
                devices,
                queries: AtomicUsize::new(0),
            })
        }
    }

    impl GpuProbe for MockProbe {
        fn tool(&self) -> &'static str {
            "mock-smi"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn devices(&self) -> Result<Vec<GpuDevice>, GpuQueryError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            (self.devices)()
        }
    }

    fn two_devices() -> Result<Vec<GpuDevice>, GpuQueryError> {
        Ok(vec![
            GpuDevice {
                index: 0,
                name: "NVIDIA GeForce RTX 3080".to_string(),
                load: Some(0.4236),
            },
            GpuDevice {
                index: 1,
                name: "NVIDIA GeForce RTX 4090".to_string(),
                load: Some(0.99),
            },
        ])
    }

    #[test]
    fn test_absent_never_queries() {
        let probe = MockProbe::new(false, two_devices);
        let capability = GpuCapability::detect_with(vec![probe.clone()]);
        assert!(!capability.is_present());

        let reading = GpuSensor::new(capability).sample();
        assert_eq!(reading, GpuReading::unavailable("capability unavailable"));
        assert_eq!(probe.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_device_list() {
        let probe = MockProbe::new(true, || Ok(Vec::new()));
        let reading = GpuSensor::new(GpuCapability::detect_with(vec![probe])).sample();
        assert_eq!(reading, GpuReading::unavailable("no supported device found"));
    }

    #[test]
    fn test_query_error_not_propagated() {
        let probe = MockProbe::new(true, || {
            Err(GpuQueryError::Failed {
                tool: "mock-smi",
                status: "exit status: 9".to_string(),
            })
        });
        let reading = GpuSensor::new(GpuCapability::detect_with(vec![probe])).sample();
        assert_eq!(reading, GpuReading::unavailable("query error"));
    }

    #[test]
    fn test_first_device_wins() {
        let probe = MockProbe::new(true, two_devices);
        let reading = GpuSensor::new(GpuCapability::detect_with(vec![probe])).sample();
        assert_eq!(reading.name, MetricValue::available("NVIDIA GeForce RTX 3080".to_string()));
        assert_eq!(reading.usage_percent, MetricValue::available(42.4));
    }

    #[test]
    fn test_detection_prefers_first_available() {
        let missing = MockProbe::new(false, two_devices);
        let present = MockProbe::new(true, || Ok(Vec::new()));
        let capability = GpuCapability::detect_with(vec![missing, present.clone()]);
        assert!(capability.is_present());

        GpuSensor::new(capability).sample();
        assert_eq!(present.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_nvidia_csv() {
        let output = "0, NVIDIA GeForce RTX 3080, 37\n1, Tesla T4, [N/A]\n\n";
        let devices = parse_nvidia_csv(output).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "NVIDIA GeForce RTX 3080");
        assert_eq!(devices[0].load, Some(0.37));
        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].load, None);
    }

    #[test]
    fn test_parse_nvidia_csv_rejects_short_line() {
        assert!(matches!(
            parse_nvidia_csv("0, only-two-columns"),
            Err(GpuQueryError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_rocm_json_orders_cards() {
        let output = r#"{
            "card10": {"GPU use (%)": "5", "Card series": "Instinct MI210"},
            "card2": {"GPU use (%)": "81", "Card Series": "Radeon RX 7900 XTX"},
            "system": {"Driver version": "6.8.5"}
        }"#;
        let devices = parse_rocm_json(output).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].index, 2);
        assert_eq!(devices[0].name, "Radeon RX 7900 XTX");
        assert_eq!(devices[0].load, Some(0.81));
        assert_eq!(devices[1].name, "Instinct MI210");
    }

    #[test]
    fn test_parse_rocm_json_rejects_garbage() {
        assert!(matches!(
            parse_rocm_json("WARNING: No AMD GPUs specified"),
            Err(GpuQueryError::Parse { .. })
        ));
    }

    #[test]
    fn test_large_output_is_drained() {
        let stdout = run_tool(
            "sh",
            &["-c", "head -c 200000 /dev/zero | tr '\\0' a"],
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(stdout.len(), 200_000);
        assert!(stdout.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_hung_tool_times_out() {
        let started = Instant::now();
        let result = run_tool("sh", &["-c", "sleep 5"], Duration::from_millis(200));
        assert!(matches!(result, Err(GpuQueryError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_tool_not_available() {
        assert!(!tool_launches(
            "hostpulse-definitely-missing-tool",
            &["--version"],
            Duration::from_millis(200)
        ));
    }
}
