//! Lumina: client-side visual search engine
//!
//! Validates uploads, runs object detection through a remote service,
//! draws detected regions over the image, and sequences text and
//! region-similarity searches through a state machine that drops
//! superseded responses.

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub use crate::core::{
    overlay::{OverlayRenderer, RenderedOverlay},
    search::{DetectedRegion, HttpSearchBackend, NormalizedBox, SearchBackend, SearchResult},
    settings::Settings,
    upload::{SelectedFile, UploadValidator, UploadedImage},
    workflow::{SearchOrchestrator, Transition, WorkflowState},
    CoreError, CoreResult,
};

// =============================================================================
// Logging
// =============================================================================

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Log file name prefix inside the log directory
pub const LOG_FILE_NAME: &str = "lumina.log";

/// Installs the global tracing subscriber.
///
/// Logs go to stderr and, when `log_dir` is given, to a daily rolling file.
/// Filtering follows `RUST_LOG` with `info` as the floor. Only the first call
/// installs anything; later calls return `None`. Keep the returned guard
/// alive for as long as file logs should be flushed.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    if LOGGING_INIT.set(()).is_err() {
        return None;
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let (file_layer, guard) = match log_dir.and_then(file_appender) {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Another subscriber may already be installed (tests, embedding apps).
    let _ = tracing::subscriber::set_global_default(subscriber);
    guard
}

/// Opens the daily rolling log file in `dir`, creating the directory first.
///
/// Returns `None` with a warning on stderr when the directory is unusable,
/// in which case logging continues on the console only.
fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warning: cannot create log directory {}: {}",
            dir.display(),
            e
        );
        return None;
    }

    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!(
                "warning: cannot open log file in {}: {}",
                dir.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let _first = init_logging(Some(dir.path()), false);
        assert!(init_logging(Some(dir.path()), true).is_none());
        tracing::info!("logging initialized");
    }

    #[test]
    fn test_file_appender_opens_in_new_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        assert!(file_appender(&logs).is_some());
        assert!(logs.is_dir());
    }

    #[test]
    fn test_unusable_log_dir_falls_back_to_console() {
        // A directory cannot be created underneath a regular file.
        let file = tempfile::NamedTempFile::new().unwrap();
        let logs = file.path().join("logs");
        assert!(file_appender(&logs).is_none());
    }
}
