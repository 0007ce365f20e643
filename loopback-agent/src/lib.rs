//! Loopback Agent
//!
//! Runs the interceptor next to a browser host. The host streams tab, frame
//! and request events as JSON lines on stdin; decisions and actions go back
//! on stdout. Logs are written to stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use loopback_core::{
    admin::start_admin_server, InterceptionRegistry, InterceptorActor, InterceptorConfig, Metrics, Payload,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::oneshot;

pub mod bridge;
pub mod catalog;
pub mod logging;
pub mod protocol;
pub mod relay;


use bridge::HostBridge;
use logging::LoggingConfig;
use relay::RelayClient;

const ADMIN_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the host protocol on stdin/stdout
    Serve(ServeArgs),
    /// Generate a script payload and print it as a chunked data URL
    MkPayload(MkPayloadArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the JSON rule catalog
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Enable debug mode (verbose logging, /frames admin route)
    #[arg(long)]
    pub debug: bool,

    /// Port to expose the Admin API (health/metrics)
    #[arg(long)]
    pub admin_port: Option<u16>,

    /// Do not start the Admin API
    #[arg(long)]
    pub no_admin: bool,

    /// Capacity of the interceptor event queue
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Base log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Also log to this file, rotated daily
    #[arg(long)]
    pub log_file: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MkPayloadArgs {
    /// File holding the function source
    pub file: PathBuf,

    /// MIME type of the payload
    #[arg(long, default_value = loopback_core::payload::SCRIPT_MIME)]
    pub mime: String,

    /// Title printed above the output (defaults to the file name)
    #[arg(long)]
    pub title: Option<String>,
}

/// Resolve the interceptor configuration.
///
/// Sources, lowest to highest precedence: defaults, the JSON config file,
/// `LOOPBACK_*` environment variables, command line flags.
pub fn load_config(args: &ServeArgs) -> Result<InterceptorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => InterceptorConfig::default(),
    };

    if let Some(debug) = env_var::<bool>("LOOPBACK_DEBUG")? {
        config.debug_mode = debug;
    }
    if let Some(capacity) = env_var::<usize>("LOOPBACK_CHANNEL_CAPACITY")? {
        config.event_channel_capacity = capacity;
    }
    if let Some(enabled) = env_var::<bool>("LOOPBACK_ADMIN_ENABLED")? {
        config.admin.enabled = enabled;
    }
    if let Some(port) = env_var::<u16>("LOOPBACK_ADMIN_PORT")? {
        config.admin.port = port;
    }
    if let Some(catalog) = env_var::<PathBuf>("LOOPBACK_CATALOG")? {
        config.catalog_path = Some(catalog);
    }
    if let Some(enabled) = env_var::<bool>("LOOPBACK_RELAY_ENABLED")? {
        config.relay.enabled = enabled;
    }
    if let Some(timeout) = env_var::<u64>("LOOPBACK_RELAY_TIMEOUT")? {
        config.relay.timeout_secs = timeout;
    }

    if args.debug {
        config.debug_mode = true;
    }
    if let Some(port) = args.admin_port {
        config.admin.port = port;
    }
    if args.no_admin {
        config.admin.enabled = false;
    }
    if let Some(capacity) = args.channel_capacity {
        config.event_channel_capacity = capacity;
    }
    if let Some(catalog) = &args.catalog {
        config.catalog_path = Some(catalog.clone());
    }

    config.validate()?;
    Ok(config)
}

fn env_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {} value '{}': {}", name, value, e)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow!("Invalid {}: {}", name, e)),
    }
}

pub fn logging_config(args: &ServeArgs, config: &InterceptorConfig) -> LoggingConfig {
    let logging = LoggingConfig {
        level: args.log_level.clone(),
        log_file: args.log_file.clone(),
        ..Default::default()
    };
    if config.debug_mode {
        logging.for_debug()
    } else {
        logging
    }
}

/// Build the registry from the configured catalog
pub fn build_registry(config: &InterceptorConfig, metrics: Arc<Metrics>) -> Result<InterceptionRegistry> {
    let mut registry = InterceptionRegistry::new().with_metrics(metrics);
    if let Some(path) = &config.catalog_path {
        catalog::load_catalog(path, &mut registry)?;
    } else {
        tracing::warn!("No rule catalog configured, every request will proceed");
    }
    Ok(registry)
}

/// Run the agent over arbitrary streams until input ends
pub async fn run_with_io<R, W>(config: InterceptorConfig, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tracing::info!("Starting Loopback Agent...");
    tracing::info!("  Debug:   {}", config.debug_mode);
    tracing::info!("  Catalog: {:?}", config.catalog_path);

    let metrics = Arc::new(Metrics::default());
    let registry = build_registry(&config, metrics.clone())?;
    let rules = registry.len();

    let (interceptor, actor_task) =
        InterceptorActor::new(registry).spawn(config.event_channel_capacity);

    // Dropping the sender also stops the admin API if serving fails
    let (admin_stop, admin_stopped) = oneshot::channel::<()>();
    let admin_task = config.admin.enabled.then(|| {
        let frames = config.debug_mode.then(|| interceptor.downgrade());
        let port = config.admin.port;
        let admin_metrics = metrics.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = admin_stopped.await;
            };
            if let Err(e) = start_admin_server(port, admin_metrics, frames, shutdown).await {
                tracing::error!("Admin API failed: {}", e);
            }
        })
    });

    let relay = RelayClient::new(&config.relay)?;
    let bridge = HostBridge::new(interceptor, relay);
    bridge.serve(reader, writer, rules).await?;

    // The bridge held the last strong handle, so the actor drains and stops
    actor_task.await.context("Interceptor task failed")?;

    let _ = admin_stop.send(());
    if let Some(mut task) = admin_task {
        if tokio::time::timeout(ADMIN_SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("Admin API did not stop in time, aborting");
            task.abort();
        }
    }
    tracing::info!(
        "Host disconnected after {} requests",
        metrics.snapshot().requests_dispatched
    );
    Ok(())
}

pub async fn run_agent(config: InterceptorConfig) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_with_io(config, stdin, tokio::io::stdout()).await
}

/// Generate a payload from a source file, pretty-printed under its title
pub fn mk_payload(args: &MkPayloadArgs) -> Result<String> {
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let payload = Payload::from_script_with_mime(&source, &args.mime);
    let title = args
        .title
        .clone()
        .unwrap_or_else(|| default_title(&args.file));
    Ok(format!("{}\n{}", title, payload.pretty_print()))
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string())
}
