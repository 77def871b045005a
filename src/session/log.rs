//! # Diagnostic Log
//!
//! Append-only, capacity-bounded diagnostic log with absolute offsets.
//!
//! Independent pollers ask for "everything since offset K"; offsets are
//! monotonic and never re-indexed, so eviction of old entries cannot change
//! the meaning of an offset a poller already holds. Every entry is also
//! mirrored, best-effort, to a plain-text log file.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

struct LogInner {
    entries: VecDeque<String>,
    /// Absolute offset of the first retained entry
    start_offset: u64,
}

/// Thread-safe diagnostic ring buffer
pub struct DiagnosticLog {
    inner: Mutex<LogInner>,
    /// High-water mark; exceeding it triggers eviction
    capacity: usize,
    /// Entries retained after an eviction pass
    trim_to: usize,
    /// Best-effort plain-text mirror; write failures are swallowed
    file_path: Option<PathBuf>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize, trim_to: usize, file_path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                start_offset: 0,
            }),
            capacity,
            trim_to,
            file_path,
        }
    }

    /// Append a message, stamped `[HH:MM:SS]`
    ///
    /// Safe to call concurrently with [`DiagnosticLog::since`]; the file
    /// mirror is written outside the lock.
    pub fn append(&self, message: &str) {
        let stamped = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);

        if let Some(path) = &self.file_path {
            let _ = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{}", stamped));
        }

        let mut inner = self.lock();
        inner.entries.push_back(stamped);
        if inner.entries.len() > self.capacity {
            while inner.entries.len() > self.trim_to {
                inner.entries.pop_front();
                inner.start_offset += 1;
            }
        }
    }

    /// All retained entries with absolute offset >= `offset`
    ///
    /// # Returns
    ///
    /// * `(Vec<String>, u64)` - The entries and the offset to pass on the
    ///   next poll
    pub fn since(&self, offset: u64) -> (Vec<String>, u64) {
        let inner = self.lock();
        let next = inner.start_offset + inner.entries.len() as u64;
        let from = offset.max(inner.start_offset);
        let skip = (from - inner.start_offset) as usize;
        let lines = inner.entries.iter().skip(skip).cloned().collect();
        (lines, next)
    }

    /// Offset one past the newest entry
    pub fn next_offset(&self) -> u64 {
        let inner = self.lock();
        inner.start_offset + inner.entries.len() as u64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        // A poisoned log is still a usable log
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
