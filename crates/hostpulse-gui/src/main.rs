mod app;
mod panels;

use app::HostpulseApp;
use eframe::egui;
use hostpulse_services::HostpulseConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> eframe::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("hostpulse_services=info,hostpulse_gui=info")
        }))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    tracing::info!("hostpulse GUI starting");

    let config = HostpulseConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!("Ignoring invalid configuration: {}", e);
        HostpulseConfig::default()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([400.0, 250.0])
            .with_resizable(false)
            .with_title("System Monitor"),
        ..Default::default()
    };

    eframe::run_native(
        "System Monitor",
        options,
        Box::new(|cc| Ok(Box::new(HostpulseApp::new(cc, config)))),
    )
}
