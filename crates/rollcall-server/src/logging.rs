//! Logging initialization.
//!
//! - **Production**: JSON logs to daily rolling files plus compact stdout
//! - **Development**: Pretty stdout with span open/close events
//!
//! The filter comes from `RUST_LOG` when set, otherwise `ROLLCALL_LOG_LEVEL`,
//! otherwise `info`.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the fallback log filter.
pub const LOG_LEVEL_ENV: &str = "ROLLCALL_LOG_LEVEL";

// Writer guards live for the whole process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter cannot be parsed, the log directory cannot
/// be created, or a subscriber is already installed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let env_filter = build_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref())?;

    if is_production {
        init_production(env_filter)
    } else {
        init_development(env_filter)
    }
}

fn build_filter(fallback: Option<&str>) -> anyhow::Result<EnvFilter> {
    let fallback = fallback.unwrap_or("info");
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?)
}

fn init_production(env_filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "rollcall");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // No ANSI colors for journald
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    tracing::info!(log_dir = %log_dir.display(), "Production logging initialized");
    Ok(())
}

fn init_development(env_filter: EnvFilter) -> anyhow::Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}

/// Directory for production log files on this platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/rollcall")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "rollcall")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}
