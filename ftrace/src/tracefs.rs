//! # Tracefs
//!
//! Small helpers to access the kernel tracing files. Those files are plain
//! text and are written in a single call.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
};

use log::debug;

use crate::config::TracingPaths;

/// Returns true if ftrace is available on this system.
pub fn available(paths: &TracingPaths) -> bool {
    trim(&read_file_or(&paths.enabled_status, "0")) == "1"
}

pub(crate) fn trim(s: &str) -> &str {
    s.trim_matches(['\r', '\n', '\t', ' '])
}

/// Read a file to a string, falling back to `default` on error.
pub(crate) fn read_file_or<P: AsRef<Path>>(path: P, default: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|_| default.to_string())
}

/// Write `data` to a file, replacing its contents.
pub(crate) fn write_file<P: AsRef<Path>>(path: P, data: &str) -> io::Result<()> {
    debug!("Writing '{data}' to {}", path.as_ref().display());
    fs::write(path, data)
}

/// Append `data` to an existing file.
pub(crate) fn append_file<P: AsRef<Path>>(path: P, data: &str) -> io::Result<()> {
    debug!("Appending '{data}' to {}", path.as_ref().display());
    OpenOptions::new()
        .append(true)
        .open(path)?
        .write_all(data.as_bytes())
}
