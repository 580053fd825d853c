//! Entry point for display front-ends.
//!
//! A front-end calls [`RefreshService::subscribe`] once and drains the
//! returned receiver from its own thread. Sampling, GPU detection and the
//! CPU measurement window all happen on a dedicated worker thread.

use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;

use hostpulse_core::{HostpulseConfig, Snapshot};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::gpu_monitor::GpuCapability;
use crate::refresh::RefreshLoop;
use crate::sampler::Sampler;

pub struct RefreshService {
    config: HostpulseConfig,
}

impl RefreshService {
    pub fn new(config: HostpulseConfig) -> Self {
        Self { config }
    }

    /// Start sampling. Snapshots arrive on the receiver at the configured
    /// interval until the token is cancelled or the receiver is dropped.
    #[instrument(skip(self), fields(interval_ms = self.config.refresh.interval_ms))]
    pub fn subscribe(&self) -> (Receiver<Arc<Snapshot>>, Arc<CancellationToken>) {
        info!("Starting snapshot subscription");

        let (tx, rx) = channel();
        let cancel_token = Arc::new(CancellationToken::new());
        let cancel_clone = (*cancel_token).clone();
        let config = self.config.clone();

        thread::spawn(move || {
            let rt = match Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let capability = GpuCapability::detect(config.probes.timeout());
                let sampler = Sampler::from_config(&config.probes, capability);
                let refresh = RefreshLoop::new(sampler, config.refresh.interval());

                let mut sink = tx;
                refresh.run(&mut sink, cancel_clone).await;
            });
        });

        (rx, cancel_token)
    }

    /// Stop a subscription after its current tick
    pub fn shutdown(token: &CancellationToken) {
        info!("Stopping snapshot subscription");
        token.cancel();
    }
}

impl Default for RefreshService {
    fn default() -> Self {
        Self::new(HostpulseConfig::default())
    }
}
