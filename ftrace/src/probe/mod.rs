//! # Probe
//!
//! Kprobes attached through ftrace, and the worker turning the trace pipe
//! lines into events.

// Re-export probe.rs
#[allow(clippy::module_inception)]
pub mod probe;
pub use probe::*;

mod descriptor;
mod worker;
