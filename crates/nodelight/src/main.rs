//! # nodelight
//!
//! Relay binary: wires the hub, the selected device and the HTTP/WebSocket
//! server together and runs until Ctrl-C.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nodelight_core::{Broadcaster, Device};
use nodelight_device::{BridgeConfig, DeviceBridge, Spoofer};
use nodelight_server::shutdown::{DEFAULT_DRAIN_TIMEOUT, ctrl_c};
use nodelight_server::{Hub, HubHandle, NodelightServer, ShutdownCoordinator};
use nodelight_settings::{DeviceMode, DeviceSettings, NodelightSettings};
use tracing::{error, info, warn};

/// Relay between a light-node controller and browser viewers.
#[derive(Parser, Debug)]
#[command(name = "nodelight", about = "Light-node relay server")]
struct Cli {
    /// Controller serial port (e.g. /dev/ttyUSB0 on Linux, COM3 on Windows).
    #[arg(long)]
    arduino: Option<String>,

    /// Use the software spoofer instead of real hardware.
    #[arg(long)]
    spoof: bool,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Directory of viewer files served at `/`.
    #[arg(long)]
    static_dir: Option<String>,

    /// Settings file (defaults to ~/.nodelight/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn settings(&self) -> Result<NodelightSettings> {
        let mut settings = match &self.config {
            Some(path) => nodelight_settings::load_settings_from_path(path),
            None => nodelight_settings::load_settings(),
        }
        .context("failed to load settings")?;

        if let Some(port) = &self.arduino {
            settings.device.port = Some(port.clone());
        }
        if self.spoof {
            settings.device.spoof = true;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir.clone_from(dir);
        }
        Ok(settings)
    }
}

/// The device variant chosen at startup.
enum ActiveDevice {
    Serial(Arc<DeviceBridge>),
    Spoof(Arc<Spoofer>),
    None,
}

impl ActiveDevice {
    fn as_device(&self) -> Option<Arc<dyn Device>> {
        match self {
            Self::Serial(bridge) => Some(Arc::clone(bridge) as Arc<dyn Device>),
            Self::Spoof(spoofer) => Some(Arc::clone(spoofer) as Arc<dyn Device>),
            Self::None => None,
        }
    }

    async fn stop(&self) {
        match self {
            Self::Serial(bridge) => bridge.disconnect_and_wait().await,
            Self::Spoof(spoofer) => spoofer.stop(),
            Self::None => {}
        }
    }
}

fn bridge_config(settings: &DeviceSettings) -> BridgeConfig {
    BridgeConfig {
        baud_rate: settings.baud_rate,
        read_timeout: settings.read_timeout(),
        read_chunk_bytes: settings.read_chunk_bytes,
        max_line_bytes: settings.max_line_bytes,
        backoff_initial: Duration::from_millis(settings.backoff_initial_ms),
        backoff_max: Duration::from_millis(settings.backoff_max_ms),
    }
}

/// Start the configured device. A serial port that cannot be opened is
/// logged and the relay runs without a device.
fn start_device(settings: &DeviceSettings, hub: &HubHandle) -> ActiveDevice {
    let broadcaster: Arc<dyn Broadcaster> = Arc::new(hub.clone());
    match settings.mode() {
        DeviceMode::Serial(address) => {
            let bridge = Arc::new(DeviceBridge::new(broadcaster, bridge_config(settings)));
            match bridge.connect(&address) {
                Ok(()) => ActiveDevice::Serial(bridge),
                Err(e) => {
                    error!(%address, error = %e, "failed to connect to device, continuing without one");
                    ActiveDevice::None
                }
            }
        }
        DeviceMode::Spoof => {
            let spoofer = Arc::new(Spoofer::new(broadcaster));
            spoofer.start();
            ActiveDevice::Spoof(spoofer)
        }
        DeviceMode::None => {
            info!("no device configured, light commands will be ignored");
            ActiveDevice::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    logging::init(&settings.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting nodelight");

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let (hub, hub_handle) = Hub::new(settings.server.hub_queue_capacity);
    let hub_task = tokio::spawn(hub.run(shutdown.token()));

    let device = start_device(&settings.device, &hub_handle);
    let server = NodelightServer::new(
        settings.server.clone(),
        hub_handle,
        device.as_device(),
        Arc::clone(&shutdown),
    );
    let (addr, mut serve_task) = server.listen().await?;
    info!(%addr, "nodelight ready");

    let early_exit = tokio::select! {
        () = ctrl_c() => None,
        joined = &mut serve_task => Some(joined),
    };

    shutdown.shutdown();
    device.stop().await;
    shutdown.drain(vec![hub_task], DEFAULT_DRAIN_TIMEOUT).await;

    let joined = match early_exit {
        Some(joined) => joined,
        None => match tokio::time::timeout(DEFAULT_DRAIN_TIMEOUT, serve_task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("server did not stop in time");
                return Ok(());
            }
        },
    };
    joined.context("server task panicked")??;

    info!("nodelight stopped");
    Ok(())
}
