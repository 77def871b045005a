//! # Schema Tracker
//!
//! Remembers the column order of the most recently observed header line.
//!
//! The firmware re-emits its header at the start of every test run, so the
//! current schema is whatever header arrived last. Data lines are addressed
//! by column name through the schema's name-to-index map.

use std::collections::HashMap;

/// Field delimiter used by the firmware and the persisted CSV
pub const FIELD_DELIMITER: char = ';';

/// Sentinel column name identifying the sliding-mass field
pub const MASS_SENTINEL: &str = "massa_g";

/// Sentinel column name identifying the base-abrasive field
pub const BASE_ABRASIVE_SENTINEL: &str = "lbc";

/// Heuristic header test shared by the tracker and the CSV sink
///
/// A line is a header iff it contains both sentinel column names as
/// case-insensitive substrings of the raw line. Deliberately permissive
/// (substring, not token-exact) to survive minor firmware formatting drift.
pub fn is_header_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains(MASS_SENTINEL) && lower.contains(BASE_ABRASIVE_SENTINEL)
}

/// Ordered column names with a name-to-index map
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema from a header line, trimming whitespace per field
    pub fn from_header(line: &str) -> Self {
        let columns: Vec<String> = line
            .split(FIELD_DELIMITER)
            .map(|field| field.trim().to_string())
            .collect();
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { columns, index }
    }

    /// Position of a named column, if present
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Ordered column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Tracks the schema currently in effect
///
/// Before the first header arrives the schema is undefined and callers must
/// treat name lookups as "cannot evaluate".
#[derive(Debug, Default)]
pub struct SchemaTracker {
    current: Option<Schema>,
}

impl SchemaTracker {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Observe a line; replace the current schema if it is a header
    ///
    /// # Returns
    ///
    /// * `bool` - true if the line was recognized as a header
    pub fn observe(&mut self, line: &str) -> bool {
        if is_header_line(line) {
            self.current = Some(Schema::from_header(line));
            true
        } else {
            false
        }
    }

    /// Schema currently in effect, if any header has been seen
    pub fn schema(&self) -> Option<&Schema> {
        self.current.as_ref()
    }
}
