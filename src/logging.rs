//! Logging setup.
//!
//! Stdout logging is installed before anything else runs, so warnings raised
//! while the configuration is read are not lost. The log file named by that
//! configuration is attached afterwards through a reload layer.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type FileLayer = fmt::Layer<Registry, DefaultFields, Format, Mutex<File>>;

#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("Failed to create log directory '{}': {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to open log file '{}': {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to attach log file: {0}")]
    Reload(#[from] reload::Error),
}

/// Slot for the optional log file of an installed subscriber.
pub struct LogFileHandle {
    handle: reload::Handle<Option<FileLayer>, Registry>,
}

impl LogFileHandle {
    /// Truncates `path` and mirrors every subsequent event into it, without
    /// ANSI colours. Missing parent directories are created.
    pub fn attach(&self, path: &Path) -> Result<(), LogFileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LogFileError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| LogFileError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
        self.handle.reload(Some(layer))?;
        Ok(())
    }
}

/// Builds a subscriber that logs to stdout and has an empty log file slot.
pub fn subscriber(
    filter: EnvFilter,
) -> (impl tracing::Subscriber + Send + Sync + 'static, LogFileHandle) {
    let (file_layer, handle) = reload::Layer::new(None);
    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(fmt::layer());
    (subscriber, LogFileHandle { handle })
}

/// Installs the global subscriber. The filter comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init() -> LogFileHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (subscriber, handle) = subscriber(filter);
    subscriber.init();
    handle
}
