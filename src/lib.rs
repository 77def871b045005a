//! # Tribo Capture Library
//!
//! Serial telemetry capture for a tribometer (friction test rig).
//!
//! The device streams semicolon-delimited result lines over a serial link.
//! This library frames and decodes those bytes, tracks the most recent header
//! schema, evaluates per-line data-quality rules, and appends every record to
//! the first writable CSV destination — falling back to numbered siblings and
//! a temp-directory path when the main file is locked by another application.

pub mod capture;
pub mod config;
pub mod error;
pub mod serial;
pub mod session;
