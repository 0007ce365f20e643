use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the agent
///
/// Console output always goes to stderr: stdout carries the host protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Whether to enable colored output on stderr
    pub enable_colors: bool,

    /// Optional log file, rotated daily
    pub log_file: Option<String>,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("hyper".to_string(), "warn".to_string());
        module_levels.insert("reqwest".to_string(), "warn".to_string());
        module_levels.insert("tokio".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            include_file_info: false,
            enable_colors: false,
            log_file: None,
            module_levels,
        }
    }
}

impl LoggingConfig {
    /// Debug mode: per-event detail from the interceptor crates
    pub fn for_debug(mut self) -> Self {
        self.module_levels
            .insert("loopback_core".to_string(), "debug".to_string());
        self.module_levels
            .insert("loopback_agent".to_string(), "debug".to_string());
        self
    }
}

/// Initialize logging based on the provided configuration.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    if !levels::is_valid_level(&config.level) {
        return Err(anyhow!(
            "Invalid log level '{}', expected one of {:?}",
            config.level,
            levels::valid_levels()
        ));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| anyhow!("Invalid log directive '{}': {}", directive, e))?,
        );
    }

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(create_file_appender(path)?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(config.include_file_info)
                .with_line_number(config.include_file_info)
                .with_ansi(config.enable_colors)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();

    match result {
        Ok(_) => tracing::info!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(guard)
}

fn create_file_appender(log_file: &str) -> Result<RollingFileAppender> {
    let log_path = Path::new(log_file);
    let directory = match log_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let filename = log_path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid log file name: {}", log_file))?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    Ok(RollingFileAppender::new(Rotation::DAILY, directory, filename))
}

/// Log level utilities
pub mod levels {
    pub fn is_valid_level(level: &str) -> bool {
        matches!(
            level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        )
    }

    pub fn valid_levels() -> Vec<&'static str> {
        vec!["trace", "debug", "info", "warn", "error"]
    }
}
