use eframe::egui;
use hostpulse_services::{rows, Snapshot};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

pub struct SystemMonitorPanel {
    snapshot: Option<Arc<Snapshot>>,
    snapshot_rx: Receiver<Arc<Snapshot>>,
}

impl SystemMonitorPanel {
    pub fn new(snapshot_rx: Receiver<Arc<Snapshot>>) -> Self {
        Self {
            snapshot: None,
            snapshot_rx,
        }
    }

    /// Keep only the newest snapshot; older ones are already superseded
    pub fn update(&mut self) {
        while let Ok(snapshot) = self.snapshot_rx.try_recv() {
            self.snapshot = Some(snapshot);
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        self.update();

        ui.horizontal(|ui| {
            ui.heading("System Monitor");
            let status_color = match self.snapshot {
                Some(_) => egui::Color32::GREEN,
                None => egui::Color32::YELLOW,
            };
            ui.colored_label(status_color, "●");
        });

        ui.separator();

        let snapshot = self.snapshot.as_deref();
        egui::Grid::new("system_monitor_rows")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                for (field, (label, value)) in Snapshot::FIELDS.into_iter().zip(rows(snapshot)) {
                    ui.label(egui::RichText::new(label).strong());
                    match snapshot.map(|s| s.is_available(field)) {
                        Some(false) => {
                            ui.colored_label(egui::Color32::GRAY, value);
                        }
                        _ => {
                            ui.label(value);
                        }
                    }
                    ui.end_row();
                }
            });

        if let Some(snapshot) = snapshot {
            ui.add_space(6.0);
            let unavailable = Snapshot::FIELDS
                .iter()
                .filter(|f| !snapshot.is_available(**f))
                .count();
            if unavailable > 0 {
                ui.small(format!("{} metric(s) unavailable", unavailable));
            }
        }
    }
}
