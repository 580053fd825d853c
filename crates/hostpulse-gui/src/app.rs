use eframe::egui;
use hostpulse_services::{HostpulseConfig, RefreshService};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::panels::system_monitor::SystemMonitorPanel;

pub struct HostpulseApp {
    monitor: SystemMonitorPanel,
    cancel_token: Arc<CancellationToken>,
}

impl HostpulseApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: HostpulseConfig) -> Self {
        let (snapshot_rx, cancel_token) = RefreshService::new(config).subscribe();

        Self {
            monitor: SystemMonitorPanel::new(snapshot_rx),
            cancel_token,
        }
    }
}

impl eframe::App for HostpulseApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            self.monitor.ui(ui);
        });

        // Snapshots arrive off-thread; poll for them without user input
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

impl Drop for HostpulseApp {
    fn drop(&mut self) {
        RefreshService::shutdown(&self.cancel_token);
    }
}
