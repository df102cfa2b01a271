//! # Ftrace
//!
//! Attach a kprobe to a kernel function using the ftrace interface (the
//! kprobe_events file of tracefs), and read the resulting trace lines from the
//! trace pipe as structured events.
//!
//! ```no_run
//! use ftrace::Probe;
//!
//! let probe = Probe::new("test_probe", "sys_execve", ["sched/sched_process_fork"]);
//! let events = probe.events()?;
//! probe.enable()?;
//! for event in events.iter().take(10) {
//!     println!("{event}");
//! }
//! probe.disable()?;
//! # Ok::<(), ftrace::ProbeError>(())
//! ```

pub mod config;
pub use config::*;

pub mod error;
pub use error::*;

pub mod helpers;

pub mod probe;
pub use probe::Probe;

pub mod reader;

pub mod tracefs;
pub use tracefs::available;

// Re-export the events crate, so events appear as a module of this crate.
pub use events;
