//! softapd - soft AP lifecycle daemon.
//!
//! Runs one soft AP lifecycle against the built-in simulated driver:
//! bring-up, client tracking, idle-timeout policy, and clean teardown on
//! SIGINT/SIGTERM. Real hardware backends plug in through the
//! [`softapd_daemon::ApDriver`] trait; this binary is the development
//! and integration surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use softapd_core::{
    ApConfiguration, ApState, Band, ClientSet, CountryCode, FailureReason, NetworkProfile,
    OperatingMode, Security,
};
use softapd_daemon::{
    timeout_settings, ApEventListener, ConfigStore, FakeDriver, FileConfigStore, ManagerConfig,
    PrometheusApMetrics, Role, SoftApManager,
};

/// softapd - soft AP lifecycle daemon (simulation harness)
#[derive(Parser, Debug)]
#[command(name = "softapd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a stored AP configuration (JSON). Falls back to the
    /// built-in demo profile when absent or unreadable.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network name for the built-in demo profile.
    #[arg(long, default_value = "softapd-demo")]
    ssid: String,

    /// Regulatory country code (ISO 3166-1 alpha-2).
    #[arg(long)]
    country: Option<String>,

    /// Use a randomized locally-administered MAC address.
    #[arg(long)]
    randomize_mac: bool,

    /// Idle-timeout delay in seconds (clamped to the 600 s floor).
    #[arg(long, default_value = "600")]
    idle_timeout_secs: u64,

    /// Start with the idle-timeout policy disabled.
    #[arg(long)]
    no_idle_timeout: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Listener that mirrors notifications into the log stream.
struct LogListener;

impl ApEventListener for LogListener {
    fn on_state_changed(&self, new_state: ApState, failure: Option<FailureReason>) {
        match failure {
            Some(reason) => info!(state = %new_state, %reason, "AP state changed"),
            None => info!(state = %new_state, "AP state changed"),
        }
    }

    fn on_connected_clients_changed(&self, clients: &ClientSet) {
        info!(count = clients.len(), "connected clients changed");
    }

    fn on_started(&self) {
        info!("soft AP started");
    }

    fn on_start_failure(&self) {
        warn!("soft AP start failed");
    }

    fn on_stopped(&self) {
        info!("soft AP stopped");
    }
}

fn demo_configuration(args: &Args) -> ApConfiguration {
    ApConfiguration {
        mode: OperatingMode::Tethered,
        profile: NetworkProfile {
            ssid: args.ssid.clone(),
            security: Security::Open,
            hidden: false,
            band: Band::TwoGhz,
            channel: None,
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let configuration = args
        .config
        .as_ref()
        .and_then(|path| FileConfigStore::new(path).ap_configuration())
        .unwrap_or_else(|| demo_configuration(&args));

    let mut manager_config = ManagerConfig::new()
        .with_idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .with_mac_randomization(args.randomize_mac);
    if let Some(country) = &args.country {
        let code: CountryCode = country
            .parse()
            .with_context(|| format!("invalid country code '{country}'"))?;
        manager_config = manager_config.with_country_code(code);
    }

    let registry = prometheus::Registry::new();
    let metrics =
        Arc::new(PrometheusApMetrics::new(&registry).context("metrics registration failed")?);

    let (settings_handle, settings) = timeout_settings(!args.no_idle_timeout);

    let manager = SoftApManager::builder(Arc::new(FakeDriver::new()), Arc::new(LogListener))
        .configuration(configuration)
        .manager_config(manager_config)
        .metrics(metrics)
        .timeout_settings(settings)
        .spawn()
        .context("failed to spawn soft AP manager")?;

    manager
        .set_role(Role::Tethering)
        .context("role assignment failed")?;
    manager.start();

    info!("running; send SIGINT or SIGTERM to stop");
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    match manager.dump().await {
        Ok(dump) => print!("{dump}"),
        Err(error) => warn!(%error, "no final dump available"),
    }

    manager.stop();
    manager.join().await;
    drop(settings_handle);

    Ok(())
}
