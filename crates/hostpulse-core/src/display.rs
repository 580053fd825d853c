//! Text rendering of snapshot fields, shared by every sink

use crate::metric::MetricValue;
use crate::system::{Snapshot, SnapshotField};

/// Shown for every row until the first snapshot arrives
pub const PLACEHOLDER: &str = "Fetching...";

pub fn format_percent(value: &MetricValue<f64>) -> String {
    match value {
        MetricValue::Available(v) => format!("{:.1}%", v),
        MetricValue::Unavailable(reason) => format_unavailable(reason),
    }
}

pub fn format_gigabytes(value: &MetricValue<f64>) -> String {
    match value {
        MetricValue::Available(v) => format!("{:.2} GB", v),
        MetricValue::Unavailable(reason) => format_unavailable(reason),
    }
}

pub fn format_text(value: &MetricValue<String>) -> String {
    match value {
        MetricValue::Available(v) => v.clone(),
        MetricValue::Unavailable(reason) => format_unavailable(reason),
    }
}

pub fn format_unavailable(reason: &str) -> String {
    format!("N/A ({})", reason)
}

impl Snapshot {
    pub fn field_text(&self, field: SnapshotField) -> String {
        match field {
            SnapshotField::IpAddress => format_text(&self.ip_address),
            SnapshotField::CpuName => format_text(&self.cpu_name),
            SnapshotField::CpuUsage => format_percent(&self.cpu_usage_percent),
            SnapshotField::RamTotal => format_gigabytes(&self.ram_total_gb),
            SnapshotField::RamUsage => format_percent(&self.ram_usage_percent),
            SnapshotField::GpuName => format_text(&self.gpu_name),
            SnapshotField::GpuUsage => format_percent(&self.gpu_usage_percent),
        }
    }

    /// `(field, text)` for every declared field, in display order
    pub fn fields(&self) -> Vec<(SnapshotField, String)> {
        Snapshot::FIELDS
            .into_iter()
            .map(|field| (field, self.field_text(field)))
            .collect()
    }
}

/// Label/value rows for a sink. `None` yields the placeholder rows shown
/// before the first tick completes.
pub fn rows(snapshot: Option<&Snapshot>) -> Vec<(&'static str, String)> {
    Snapshot::FIELDS
        .into_iter()
        .map(|field| {
            let text = snapshot
                .map(|s| s.field_text(field))
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            (field.label(), text)
        })
        .collect()
}
