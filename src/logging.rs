//! Logging session
//!
//! The binary builds one `LogSession` at start-up and finishes it on exit.
//! The subscriber is installed as the scoped default for the session's
//! lifetime rather than as a process-global, so tests and embedders can run
//! several sessions side by side.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::Result;

pub struct LogSession {
    log_file: Option<(PathBuf, Arc<File>)>,
    _guard: DefaultGuard,
}

impl LogSession {
    /// Install console logging (stderr) and, optionally, a plain-text log file.
    ///
    /// `RUST_LOG` overrides the level chosen by `verbose`.
    pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Self> {
        let level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let log_file = match log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Some((path.to_path_buf(), Arc::new(File::create(path)?)))
            }
            None => None,
        };

        let file_layer = log_file
            .as_ref()
            .map(|(_, file)| fmt::layer().with_ansi(false).with_writer(Arc::clone(file)));

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .with(filter);
        let guard = tracing::subscriber::set_default(subscriber);

        tracing::info!("Log started");
        if let Some((path, _)) = &log_file {
            tracing::debug!("Writing log to {}", path.display());
        }

        Ok(Self { log_file, _guard: guard })
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Log the final status line, flush the log file and uninstall the
    /// subscriber.
    pub fn finish(self, status: i32) -> Result<()> {
        if status == 0 {
            tracing::info!("Success!");
        } else {
            tracing::error!("Failed. Return Code: {}", status);
        }

        if let Some((_, file)) = &self.log_file {
            let mut handle: &File = file;
            handle.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}
