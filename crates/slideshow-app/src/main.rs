//! Slideshow Manager - one browser session for a fleet of slideshow players.
//!
//! Runs the HTTP API that signs in to players, stores their cookies in a
//! single browser cookie, and forwards every device call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use slideshow_core::config::{DEFAULT_SESSION_COOKIE, DEVICE_REGISTRY_ENV};
use slideshow_core::{DeviceRegistry, HostAllowList, ManagerConfig};
use slideshow_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Slideshow Manager - manage slideshow players from one place
#[derive(Parser, Debug)]
#[command(name = "slideshow-manager", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "SLIDESHOW_MANAGER_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(long, env = "SLIDESHOW_MANAGER_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// JSON file with the device registry (takes precedence over --devices)
    #[arg(long)]
    registry_file: Option<PathBuf>,

    /// Device registry as a JSON array [env: SLIDESHOW_MANAGER_DEVICE_REGISTRY]
    #[arg(long)]
    devices: Option<String>,

    /// Comma-separated hostnames devices may point at (empty allows any)
    #[arg(long, env = "SLIDESHOW_MANAGER_ALLOWED_HOSTS")]
    allowed_hosts: Option<String>,

    /// Name of the cookie carrying the device session
    #[arg(long, env = "SLIDESHOW_MANAGER_SESSION_COOKIE", default_value = DEFAULT_SESSION_COOKIE)]
    session_cookie: String,

    /// Deadline for each device call, in milliseconds
    #[arg(long, env = "SLIDESHOW_MANAGER_UPSTREAM_TIMEOUT_MS", default_value_t = 8000)]
    upstream_timeout_ms: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate the configuration, then exit
    CheckConfig,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "slideshow", "SlideshowManager").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging to the console and, when possible, a rolling file.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slideshow={},warn", log_level)));

    let file_appender = logs_dir().and_then(|log_dir| {
        std::fs::create_dir_all(&log_dir).ok()?;
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .max_log_files(5)
            .filename_prefix("slideshow-manager")
            .filename_suffix("log")
            .build(&log_dir)
            .ok()
            .map(|appender| (log_dir, appender))
    });

    if let Some((log_dir, appender)) = file_appender {
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stdout))
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        tracing::info!("Logging to {:?}", log_dir);
        return Some(guard);
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Loads the registry from the file, the inline JSON, or the environment.
fn load_registry(file: Option<&Path>, inline: Option<&str>) -> anyhow::Result<DeviceRegistry> {
    let registry = match (file, inline) {
        (Some(path), _) => DeviceRegistry::from_file(path)
            .with_context(|| format!("loading registry file {}", path.display()))?,
        (None, Some(raw)) if !raw.trim().is_empty() => {
            DeviceRegistry::from_json(raw).context("parsing --devices")?
        }
        (None, _) => DeviceRegistry::from_env(DEVICE_REGISTRY_ENV)
            .with_context(|| format!("parsing {DEVICE_REGISTRY_ENV}"))?,
    };
    Ok(registry)
}

fn allow_list(raw: Option<&str>) -> HostAllowList {
    match raw.map(str::trim) {
        Some(list) if !list.is_empty() => HostAllowList::parse(list),
        _ => HostAllowList::allow_all(),
    }
}

fn manager_config(args: &Args) -> anyhow::Result<ManagerConfig> {
    let config = ManagerConfig::default()
        .with_session_cookie(&args.session_cookie)
        .with_upstream_timeout(Duration::from_millis(args.upstream_timeout_ms));
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let registry = match load_registry(args.registry_file.as_deref(), args.devices.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Device registry is invalid: {:#}", e);
            return Err(e);
        }
    };
    let allow_list = allow_list(args.allowed_hosts.as_deref());
    let config = manager_config(&args)?;

    if registry.is_empty() {
        tracing::warn!("No devices configured");
    }
    for device in registry.list() {
        if let Err(e) = allow_list.check(&device.host) {
            tracing::warn!(device = %device.id, "Device will be refused: {}", e);
        }
    }

    if let Some(Command::CheckConfig) = args.command {
        tracing::info!(
            devices = registry.len(),
            restricted = allow_list.is_restricted(),
            "Configuration is valid"
        );
        return Ok(());
    }

    tracing::info!(
        devices = registry.len(),
        session_cookie = %config.session_cookie,
        timeout_ms = args.upstream_timeout_ms,
        "Starting Slideshow Manager"
    );

    let state = AppState::new(registry, allow_list, config).context("creating device proxy")?;
    let server_config = ServerConfig::default()
        .with_host(&args.host)
        .with_port(args.port);
    let server = Server::with_state(server_config, state)?;

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ONE_DEVICE: &str = r#"[{"id":"lobby","name":"Lobby","host":"http://player1.local"}]"#;

    #[test]
    fn registry_file_wins_over_inline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ONE_DEVICE.as_bytes()).unwrap();

        let registry = load_registry(Some(file.path()), Some("not json")).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("lobby"));
    }

    #[test]
    fn inline_registry() {
        let registry = load_registry(None, Some(ONE_DEVICE)).unwrap();
        assert_eq!(registry.list()[0].name, "Lobby");
    }

    #[test]
    fn malformed_registry_is_fatal() {
        assert!(load_registry(None, Some(r#"{"id":"lobby"}"#)).is_err());

        let missing = Path::new("/nonexistent/slideshow/devices.json");
        assert!(load_registry(Some(missing), None).is_err());
    }

    #[test]
    fn blank_allow_list_allows_any_host() {
        assert!(!allow_list(None).is_restricted());
        assert!(!allow_list(Some("  ")).is_restricted());
        assert!(allow_list(Some("player1.local")).is_restricted());
    }

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["slideshow-manager"]).unwrap();
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.log_level, "info");
        assert!(args.command.is_none());
    }

    #[test]
    fn check_config_subcommand() {
        let args = Args::try_parse_from([
            "slideshow-manager",
            "--session-cookie",
            "sm",
            "--upstream-timeout-ms",
            "2000",
            "check-config",
        ])
        .unwrap();
        assert!(matches!(args.command, Some(Command::CheckConfig)));

        let config = manager_config(&args).unwrap();
        assert_eq!(config.session_cookie, "sm");
        assert_eq!(config.upstream_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn invalid_cookie_name_is_rejected() {
        let args =
            Args::try_parse_from(["slideshow-manager", "--session-cookie", "bad name"]).unwrap();
        assert!(manager_config(&args).is_err());
    }
}
