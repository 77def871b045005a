//! # Capture Pipeline Module
//!
//! The per-line processing chain applied to the tribometer byte stream.
//!
//! This module handles:
//! - Framing raw bytes into decoded text lines
//! - Tracking the most recently observed header schema
//! - Evaluating data-quality rules against each line
//! - Persisting records to the first writable CSV destination

pub mod framer;
pub mod quality;
pub mod schema;
pub mod writer;

pub use framer::LineFramer;
pub use schema::{Schema, SchemaTracker};
pub use writer::CsvSink;
