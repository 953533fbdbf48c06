// src/system/file_watcher.rs

use crate::CancellationToken;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

/// Polls one file's modification time on a background thread.
///
/// The callback fires whenever the file appears or its mtime changes. Stopped on drop.
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn spawn<F>(path: PathBuf, interval: Duration, on_change: F) -> Self
    where
        F: Fn(SystemTime) + Send + 'static,
    {
        let cancel: CancellationToken = Arc::new(AtomicBool::new(false));
        let token = cancel.clone();
        let watched = path.clone();
        log::debug!("Watching '{}' every {:?}.", path.display(), interval);

        let handle = thread::spawn(move || {
            let mut last = modified_time(&watched);
            while !token.load(Ordering::Relaxed) {
                thread::sleep(interval);
                let current = modified_time(&watched);
                if let Some(modified) = current {
                    if current != last {
                        log::trace!("'{}' changed.", watched.display());
                        on_change(modified);
                    }
                }
                last = current;
            }
        });

        Self {
            path,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Watcher thread for '{}' panicked.", self.path.display());
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The file's modification time, or `None` if it does not exist (yet).
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
