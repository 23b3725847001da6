// # readvertiserd - WireGuard Endpoint Readvertiser
//
// Keeps the endpoint address of one WireGuard peer in sync with the DNS name
// it was configured with. WireGuard resolves endpoint names exactly once, when
// the configuration is applied; this daemon re-resolves the name on a fixed
// interval and rewrites the peer's endpoint address when it no longer matches.
//
// The daemon is a thin integration layer:
// 1. Parse and validate flags
// 2. Work out which peer and name to track
// 3. Wire the system resolver and the WireGuard backend into a Reconciler
// 4. Run it until SIGTERM/SIGINT
//
// All reconciliation logic lives in readvertiser-core.
//
// ## Configuration
//
// - `--wireguard-device` / `READVERTISER_WIREGUARD_DEVICE`: device to manage (required)
// - `--refresh-time` / `READVERTISER_REFRESH_TIME`: seconds between checks (default 60)
// - `--peer-key` + `--dns-name`: track this peer and name directly
// - `--config-dir` / `READVERTISER_CONFIG_DIR`: where `<device>.conf` lives
//   when the peer is not given on the command line (default /etc/wireguard)
// - `--backend` / `READVERTISER_BACKEND`: kernel or userspace
// - `--log-level` / `READVERTISER_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// readvertiserd --wireguard-device wg0 --refresh-time 120
// ```

use anyhow::{Context, Result};
use clap::Parser;
use readvertiser_core::wg_conf::DEFAULT_CONFIG_DIR;
use readvertiser_core::{
    EndpointHost, PeerKey, Reconciler, ReconcilerConfig, SystemResolver, WgPeerTarget,
};
use readvertiser_wireguard::{WgBackend, WireguardControl};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ReadvertiserExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ReadvertiserExitCode> for ExitCode {
    fn from(code: ReadvertiserExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command line flags
#[derive(Debug, Parser)]
#[command(name = "readvertiserd", version, about)]
struct Cli {
    /// WireGuard device to manage
    #[arg(long, env = "READVERTISER_WIREGUARD_DEVICE")]
    wireguard_device: String,

    /// Seconds between DNS checks
    #[arg(
        long,
        env = "READVERTISER_REFRESH_TIME",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=86400)
    )]
    refresh_time: u64,

    /// Public key (base64) of the peer to track
    #[arg(long, env = "READVERTISER_PEER_KEY", requires = "dns_name")]
    peer_key: Option<String>,

    /// DNS name the tracked peer's endpoint should follow
    #[arg(long, env = "READVERTISER_DNS_NAME", requires = "peer_key")]
    dns_name: Option<String>,

    /// Directory holding <device>.conf
    #[arg(long, env = "READVERTISER_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// WireGuard backend (kernel, userspace)
    #[arg(long, env = "READVERTISER_BACKEND")]
    backend: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "READVERTISER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Validate the flags
    ///
    /// Covers what clap cannot express on its own:
    /// - Device name format
    /// - DNS name format, when given on the command line
    /// - Backend and log level names
    fn validate(&self) -> Result<()> {
        self.validate_device_name(&self.wireguard_device)?;

        if let Some(ref dns_name) = self.dns_name
            && let EndpointHost::Name(name) = EndpointHost::parse(dns_name)
        {
            self.validate_domain_name(&name)?;
        }

        if let Some(ref backend) = self.backend {
            backend.parse::<WgBackend>()?;
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "--log-level '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Validate a network interface name
    ///
    /// Linux limits interface names to 15 bytes and forbids '/' and whitespace.
    fn validate_device_name(&self, device: &str) -> Result<()> {
        if device.is_empty() {
            anyhow::bail!("--wireguard-device cannot be empty");
        }

        if device.len() > 15 {
            anyhow::bail!(
                "Device name too long: {} chars (max 15). Got: {}",
                device.len(),
                device
            );
        }

        if device.chars().any(|c| c == '/' || c.is_whitespace()) {
            anyhow::bail!(
                "Device name contains invalid characters. Got: '{}'",
                device
            );
        }

        Ok(())
    }

    /// Validate that a string is a valid domain name
    ///
    /// This implements basic DNS domain name validation per RFC 1035.
    /// It's not comprehensive but catches common errors.
    fn validate_domain_name(&self, domain: &str) -> Result<()> {
        // A single trailing dot marks a fully qualified name
        let domain = domain.strip_suffix('.').unwrap_or(domain);

        if domain.is_empty() {
            anyhow::bail!("Domain name cannot be empty");
        }

        if domain.len() > 253 {
            anyhow::bail!(
                "Domain name too long: {} chars (max 253). Got: {}",
                domain.len(),
                domain
            );
        }

        for label in domain.split('.') {
            if label.is_empty() {
                anyhow::bail!("Domain name has empty label: '{}'", domain);
            }

            if label.len() > 63 {
                anyhow::bail!(
                    "Domain label too long: {} chars (max 63). Label: '{}'",
                    label.len(),
                    label
                );
            }

            if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
                anyhow::bail!(
                    "Domain label contains invalid characters. Label: '{}'. \
                    Valid: alphanumeric and hyphen only.",
                    label
                );
            }

            if label.starts_with('-') || label.ends_with('-') {
                anyhow::bail!(
                    "Domain label cannot start or end with hyphen. Label: '{}'",
                    label
                );
            }
        }

        Ok(())
    }

    fn backend(&self) -> Result<WgBackend> {
        match self.backend {
            Some(ref name) => Ok(name.parse()?),
            None => Ok(WgBackend::default()),
        }
    }

    /// Work out the peer to track and build the reconciler configuration
    ///
    /// The peer key is always decoded before anything else is looked at, so a
    /// malformed key stops startup even when the endpoint turns out to be a
    /// literal address.
    fn reconciler_config(&self) -> Result<ReconcilerConfig> {
        let (peer_key, endpoint_host) = match (&self.peer_key, &self.dns_name) {
            (Some(key), Some(name)) => {
                let peer_key: PeerKey = key.parse().context("Invalid --peer-key")?;
                (peer_key, EndpointHost::parse(name))
            }
            _ => {
                let path = WgPeerTarget::config_path(&self.config_dir, &self.wireguard_device);
                info!("Reading tracked peer from {}", path.display());
                let target = WgPeerTarget::from_file(&path)?;
                (target.peer_key, target.endpoint_host)
            }
        };

        let config = ReconcilerConfig::new(&self.wireguard_device, peer_key, endpoint_host)
            .with_interval_secs(self.refresh_time);
        config.validate()?;

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ReadvertiserExitCode::ConfigError.into()
            } else {
                ReadvertiserExitCode::CleanShutdown.into()
            };
        }
    };

    if let Err(e) = cli.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ReadvertiserExitCode::ConfigError.into();
    }

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ReadvertiserExitCode::ConfigError.into();
    }

    info!("Starting readvertiserd for device {}", cli.wireguard_device);

    let backend = match cli.backend() {
        Ok(backend) => backend,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ReadvertiserExitCode::ConfigError.into();
        }
    };

    let config = match cli.reconciler_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ReadvertiserExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ReadvertiserExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, backend).await {
            error!("Daemon error: {:#}", e);
            ReadvertiserExitCode::RuntimeError
        } else {
            ReadvertiserExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: ReconcilerConfig, backend: WgBackend) -> Result<()> {
    let shutdown = shutdown_signal()?;

    info!("Using {} wireguard backend", backend);

    let (reconciler, events) = Reconciler::new(
        Box::new(SystemResolver::new()),
        Box::new(WireguardControl::new(backend)),
        config,
    )?;

    // Everything worth reporting is already logged by the reconciler
    drop(events);

    reconciler.run_until(shutdown).await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Install SIGTERM and SIGINT handlers
///
/// Installation happens eagerly so that a failure stops startup; the returned
/// future completes on the first signal.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
    })
}

/// Fallback for non-Unix platforms: SIGINT (Ctrl-C) only
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: SIGINT"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
    })
}
