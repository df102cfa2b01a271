//! # Config
//!
//! Location of the kernel files used to drive ftrace. Those default to the
//! debugfs layout but can be overridden, e.g. to use a tracefs mount point or
//! a fake hierarchy.

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Maximum number of arguments fetched by a probe.
pub const MAX_ARGUMENTS: usize = 16;
/// File telling if the function tracer is enabled.
pub const ENABLED_STATUS_FILE: &str = "/proc/sys/kernel/ftrace_enabled";
/// Tracing directory, in debugfs.
pub const TRACING_DIR: &str = "/sys/kernel/debug/tracing";

/// Paths of the kernel files used to control probes and read their events.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TracingPaths {
    /// Availability file, reads "1" when ftrace is usable.
    pub enabled_status: PathBuf,
    /// Definition file used to register and unregister kprobes.
    pub kprobe_events: PathBuf,
    /// Stream of formatted trace lines.
    pub trace_pipe: PathBuf,
    /// Root of the per-event directories, holding their enable files.
    pub events_dir: PathBuf,
}

impl Default for TracingPaths {
    fn default() -> Self {
        Self::from_tracefs(TRACING_DIR)
    }
}

impl TracingPaths {
    /// Paths for a tracing hierarchy mounted at `root` (e.g.
    /// "/sys/kernel/tracing").
    pub fn from_tracefs<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        TracingPaths {
            enabled_status: PathBuf::from(ENABLED_STATUS_FILE),
            kprobe_events: root.join("kprobe_events"),
            trace_pipe: root.join("trace_pipe"),
            events_dir: root.join("events"),
        }
    }

    /// Load the paths from a YAML file. Missing keys use their default value.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            read_to_string(path).map_err(|e| anyhow!("Could not read {}: {e}", path.display()))?;
        Self::parse(&contents)
    }

    /// Load the paths from a YAML string.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Enable file of the kprobe named `name`.
    pub fn probe_enable(&self, name: &str) -> PathBuf {
        self.events_dir.join("kprobes").join(name).join("enable")
    }

    /// Enable file of an event, given as "group/name".
    pub fn event_enable(&self, event: &str) -> PathBuf {
        self.events_dir.join(event).join("enable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let paths = TracingPaths::default();
        assert_eq!(
            paths.enabled_status,
            PathBuf::from("/proc/sys/kernel/ftrace_enabled")
        );
        assert_eq!(
            paths.kprobe_events,
            PathBuf::from("/sys/kernel/debug/tracing/kprobe_events")
        );
        assert_eq!(
            paths.trace_pipe,
            PathBuf::from("/sys/kernel/debug/tracing/trace_pipe")
        );
        assert_eq!(
            paths.probe_enable("test_probe"),
            PathBuf::from("/sys/kernel/debug/tracing/events/kprobes/test_probe/enable")
        );
        assert_eq!(
            paths.event_enable("sched/sched_process_fork"),
            PathBuf::from("/sys/kernel/debug/tracing/events/sched/sched_process_fork/enable")
        );
    }

    #[test]
    fn tracefs() {
        let paths = TracingPaths::from_tracefs("/sys/kernel/tracing");
        assert_eq!(
            paths.kprobe_events,
            PathBuf::from("/sys/kernel/tracing/kprobe_events")
        );
        assert_eq!(
            paths.enabled_status,
            PathBuf::from("/proc/sys/kernel/ftrace_enabled")
        );
    }

    #[test]
    fn load_file() {
        let paths = TracingPaths::load("test_data/paths.yaml").unwrap();
        assert_eq!(paths.trace_pipe, PathBuf::from("/sys/kernel/tracing/trace_pipe"));
        assert_eq!(paths.events_dir, PathBuf::from("/sys/kernel/tracing/events"));
        // Not in the file.
        assert_eq!(paths.kprobe_events, TracingPaths::default().kprobe_events);
        assert_eq!(paths.enabled_status, TracingPaths::default().enabled_status);
    }

    #[test]
    fn parse_errors() {
        assert!(TracingPaths::parse("foo: /bar").is_err());
        assert!(TracingPaths::load("test_data/does-not-exist.yaml").is_err());
        assert_eq!(TracingPaths::parse("{}").unwrap(), TracingPaths::default());
    }
}
