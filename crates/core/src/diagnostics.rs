use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use chrono::Utc;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "KOZANI_LOG";
const DEFAULT_FILTER: &str = "info";

static INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    pub log_file: PathBuf,
    pub filter: Option<String>,
}

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("failed to prepare log file at {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Routes `tracing` output to the debug log file.
///
/// The file is truncated on every start. The terminal owns stdout, so nothing
/// is ever written there. Later calls are no-ops.
pub fn init_diagnostics(config: &DiagnosticsConfig) -> Result<(), DiagnosticsError> {
    if INIT.is_completed() {
        return Ok(());
    }

    let file = prepare_log_file(&config.log_file)?;
    let filter = resolve_filter(
        std::env::var(LOG_FILTER_ENV).ok(),
        config.filter.as_deref(),
    );

    INIT.call_once(move || {
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(Mutex::new(file));
        if tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .is_err()
        {
            eprintln!("kozani: a global tracing subscriber was already installed");
        }
    });
    Ok(())
}

fn prepare_log_file(path: &Path) -> Result<File, DiagnosticsError> {
    let to_error = |source| DiagnosticsError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent_dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(to_error)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(to_error)?;
    writeln!(
        file,
        "--- Kozani Debug Log Started: {} ---",
        Utc::now().to_rfc3339()
    )
    .map_err(to_error)?;
    Ok(file)
}

fn resolve_filter(from_env: Option<String>, configured: Option<&str>) -> EnvFilter {
    let directives = from_env
        .filter(|value| !value.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    EnvFilter::try_new(&directives).unwrap_or_else(|error| {
        eprintln!("kozani: ignoring invalid log filter `{directives}`: {error}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}
