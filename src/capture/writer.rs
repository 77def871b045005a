//! # Resilient CSV Writer
//!
//! Appends each record to the first writable destination out of an ordered
//! candidate list, so that a results file left open in a spreadsheet never
//! loses data: writes fall through to numbered siblings and finally to the
//! temp-directory fallback.
//!
//! Routing is sticky: once a candidate accepts a write, subsequent writes go
//! there first, which also keeps duplicate-header suppression consistent for
//! that file.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use super::schema::{is_header_line, FIELD_DELIMITER};

/// Column name appended to header rows for the PC-side timestamp
pub const TIMESTAMP_COLUMN: &str = "Timestamp_PC";

/// Timestamp format of the appended PC-side column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTF-8 byte-order mark written at the start of every new file
/// (spreadsheet applications need it to pick the right encoding)
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Multi-candidate append-only CSV sink
pub struct CsvSink {
    default_path: PathBuf,
    fallback_path: PathBuf,
    max_alt_files: usize,
    /// Last candidate that accepted a write; tried first on the next call
    active_path: Option<PathBuf>,
    #[cfg(test)]
    locked_paths: HashSet<PathBuf>,
}

impl CsvSink {
    /// Create a sink routing to `default_path` with `fallback_path` in the
    /// temp/fallback directory and `max_alt_files` numbered siblings each
    pub fn new(default_path: PathBuf, fallback_path: PathBuf, max_alt_files: usize) -> Self {
        Self {
            default_path,
            fallback_path,
            max_alt_files,
            active_path: None,
            #[cfg(test)]
            locked_paths: HashSet::new(),
        }
    }

    /// Destination of the most recent successful write, if any
    pub fn active_path(&self) -> Option<&Path> {
        self.active_path.as_deref()
    }

    /// Persist one device line, never failing to the caller
    ///
    /// Header lines are classified with the same sentinel test as the schema
    /// tracker; a header landing on a file that already has content is
    /// suppressed (at most one header per physical file). Data lines get the
    /// PC timestamp appended as the last field.
    ///
    /// # Returns
    ///
    /// * `Vec<String>` - Diagnostic messages for the session log (empty on a
    ///   quiet success)
    pub fn persist(&mut self, line: &str) -> Vec<String> {
        let mut diags = Vec::new();
        let line = line.trim();
        if line.is_empty() {
            return diags;
        }

        let is_header = is_header_line(line);
        let candidates = self.candidates();
        let mut warned = false;

        for path in &candidates {
            let has_data = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

            match self.open_append(path) {
                Ok(mut file) => {
                    if is_header && has_data {
                        // This file already carries a header; just pin it
                        self.active_path = Some(path.clone());
                        return diags;
                    }

                    match write_record(&mut file, line, is_header, has_data) {
                        Ok(()) => {
                            self.active_path = Some(path.clone());
                            if !is_header {
                                debug!("Record saved to {}", path.display());
                            }
                            return diags;
                        }
                        Err(e) => {
                            // Write failures are not retryable for this line
                            warn!("Failed to save record to {}: {}", path.display(), e);
                            diags.push(format!(
                                "Failed to save record to {}: {}",
                                path.display(),
                                e
                            ));
                            return diags;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    if !warned {
                        warn!("File locked or busy: {} ({})", path.display(), e);
                        diags.push(format!(
                            "File locked or busy: {} ({}); trying an alternative",
                            path.display(),
                            e
                        ));
                        warned = true;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path.display(), e);
                    diags.push(format!("Failed to save record to {}: {}", path.display(), e));
                    return diags;
                }
            }
        }

        if !is_header {
            let attempted: Vec<String> = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            warn!("Could not save record anywhere: {}", attempted.join(", "));
            diags.push(format!(
                "CRITICAL: failed to save record after trying: {}",
                attempted.join(", ")
            ));
        }
        diags
    }

    /// Ordered, deduplicated candidate list built fresh per write attempt
    fn candidates(&self) -> Vec<PathBuf> {
        let mut list = Vec::new();
        if let Some(active) = &self.active_path {
            list.push(active.clone());
        }
        list.push(self.default_path.clone());
        list.extend(numbered_siblings(&self.default_path, self.max_alt_files));
        list.push(self.fallback_path.clone());
        list.extend(numbered_siblings(&self.fallback_path, self.max_alt_files));

        let mut seen = HashSet::new();
        list.retain(|path| seen.insert(path.clone()));
        list
    }

    fn open_append(&self, path: &Path) -> io::Result<std::fs::File> {
        #[cfg(test)]
        if self.locked_paths.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "simulated lock",
            ));
        }
        OpenOptions::new().append(true).create(true).open(path)
    }

    /// Simulate a destination held open by another application
    #[cfg(test)]
    pub(crate) fn lock_path(&mut self, path: PathBuf) {
        self.locked_paths.insert(path);
    }
}

/// Append one delimited row, adding the PC-timestamp field
fn write_record(
    file: &mut std::fs::File,
    line: &str,
    is_header: bool,
    has_data: bool,
) -> io::Result<()> {
    let mut fields: Vec<String> = line
        .split(FIELD_DELIMITER)
        .map(|f| f.to_string())
        .collect();
    if is_header {
        fields.push(TIMESTAMP_COLUMN.to_string());
    } else {
        fields.push(Local::now().format(TIMESTAMP_FORMAT).to_string());
    }

    if !has_data {
        file.write_all(UTF8_BOM)?;
    }
    let mut row = fields.join(&FIELD_DELIMITER.to_string());
    row.push_str("\r\n");
    file.write_all(row.as_bytes())
}

/// Numbered sibling paths: `name_1.ext` through `name_N.ext`
fn numbered_siblings(path: &Path, n: usize) -> Vec<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("resultados");
    let ext = path.extension().and_then(|s| s.to_str());
    (1..=n)
        .map(|i| {
            let name = match ext {
                Some(ext) => format!("{}_{}.{}", stem, i, ext),
                None => format!("{}_{}", stem, i),
            };
            path.with_file_name(name)
        })
        .collect()
}
