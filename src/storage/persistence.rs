//! Line-file persistence for peer data
//!
//! The address book and the ban list each live in a plain text file, one
//! entry per line. Writes go to a temporary sibling first and are renamed
//! over the target, so an interrupted write never leaves a truncated file
//! behind.
//!
//! Every write carries a generation number. A write whose generation is
//! older than the last one on disk is skipped, so background writes may
//! finish in any order.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Default)]
struct WriteState {
    /// Last generation handed out
    issued: AtomicU64,
    /// Last generation on disk; held for the duration of a write
    written: Mutex<u64>,
    /// Most recent background write
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Line-oriented data file
///
/// Clones share write ordering.
#[derive(Debug, Clone)]
pub struct PeerStore {
    path: PathBuf,
    writes: Arc<WriteState>,
}

impl PeerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: Arc::new(WriteState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a saved file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read every non-blank line, trimmed
    ///
    /// Lines are returned unvalidated. Lines that are not UTF-8 are skipped;
    /// the rest of the file is still read.
    pub fn load(&self) -> Result<Vec<String>, StorageError> {
        let data = fs::read(&self.path)?;

        let mut lines = Vec::new();
        for raw in data.split(|b| *b == b'\n') {
            let Ok(line) = std::str::from_utf8(raw) else {
                log::debug!("Skipping non UTF-8 line in {}", self.path.display());
                continue;
            };
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        Ok(lines)
    }

    /// Atomically replace the file with `entries`, one per line
    ///
    /// Blocks on the write. Meant for startup; use
    /// [`PeerStore::save_in_background`] from async code.
    pub fn save<'a, I>(&self, entries: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let lines: Vec<String> = entries.into_iter().cloned().collect();
        let generation = self.next_generation();
        write_generation(&self.writes, &self.path, generation, &lines)
    }

    /// Replace the file with `lines` without blocking the caller
    ///
    /// Inside a tokio runtime the write runs on the blocking pool; outside
    /// one it runs inline. Failures are logged.
    pub fn save_in_background(&self, lines: Vec<String>) {
        let generation = self.next_generation();
        let writes = Arc::clone(&self.writes);
        let path = self.path.clone();
        let job = move || {
            if let Err(e) = write_generation(&writes, &path, generation, &lines) {
                log::warn!("Failed to write {}: {}", path.display(), e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn_blocking(job);
                *lock(&self.writes.pending) = Some(task);
            }
            Err(_) => job(),
        }
    }

    /// Wait for the latest background write to land
    pub async fn flush(&self) {
        let pending = lock(&self.writes.pending).take();
        if let Some(task) = pending {
            if let Err(e) = task.await {
                log::warn!("Write to {} did not finish: {}", self.path.display(), e);
            }
        }
    }

    fn next_generation(&self) -> u64 {
        self.writes.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_generation(
    writes: &WriteState,
    path: &Path,
    generation: u64,
    lines: &[String],
) -> Result<(), StorageError> {
    let mut written = lock(&writes.written);
    if generation <= *written {
        return Ok(());
    }

    write_lines(path, lines)?;
    *written = generation;
    Ok(())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    let mut temp_name = name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    // Atomic rename
    fs::rename(&temp_path, path)?;

    Ok(())
}
