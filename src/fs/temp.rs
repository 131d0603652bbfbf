//! Auto-deleting temporary files.
//!
//! Used to hand configuration payloads to the child process without
//! depending on its internals: the host writes the payload here and passes
//! the path through the environment.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use crate::lifecycle::Shutdown;

/// A temporary file deleted on the shutdown signal or on drop, whichever
/// comes first. Deletion happens exactly once and is best-effort: a failure
/// is logged at debug, never surfaced.
pub struct ScopedTempFile {
    path: PathBuf,
    file: Arc<Mutex<Option<NamedTempFile>>>,
}

impl ScopedTempFile {
    /// Write `content` to a fresh temp file and register cleanup against the
    /// shutdown signal. Must be called within a tokio runtime.
    pub fn new(content: &str, shutdown: &Shutdown) -> io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        let path = file.path().to_path_buf();
        tracing::debug!(path = %path.display(), "Created temporary file");

        let slot = Arc::new(Mutex::new(Some(file)));
        let watcher = slot.clone();
        let watched_path = path.clone();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            signal.triggered().await;
            delete_now(&watcher, &watched_path);
        });

        Ok(Self { path, file: slot })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        delete_now(&self.file, &self.path);
    }
}

fn delete_now(slot: &Mutex<Option<NamedTempFile>>, path: &Path) {
    let file = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(file) = file {
        if let Err(error) = file.close() {
            tracing::debug!(path = %path.display(), error = %error, "Could not delete temporary file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn file_exists_until_dropped() {
        let shutdown = Shutdown::new();
        let file = ScopedTempFile::new("payload", &shutdown).unwrap();
        let path = file.path().to_path_buf();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "payload");

        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn shutdown_signal_deletes_the_file() {
        let shutdown = Shutdown::new();
        let file = ScopedTempFile::new("payload", &shutdown).unwrap();
        let path = file.path().to_path_buf();

        shutdown.trigger();
        // Give the cleanup task a moment to run.
        for _ in 0..50 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());

        // Dropping afterwards must not double-delete or fail.
        drop(file);
    }
}
