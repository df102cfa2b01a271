//! # Cli
//!
//! Command line interface: attach a probe and print its events, or report the
//! ftrace availability.

use std::{
    io::{stdout, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Result;
use clap::{builder::PossibleValuesParser, Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use log::info;

use ftrace::{available, events::Event, helpers::signals::Running, Probe, TracingPaths};

/// Timeout when waiting for events, to check for termination.
const EVENTS_POLL_TIMEOUT_MS: u64 = 200;

/// Trace kernel functions using kprobes
///
/// ftrace registers a kprobe through the kernel tracing files and reports its
/// hits, along with optional kernel events.
#[derive(Parser, Debug)]
#[command(name = "ftrace", version)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) main_config: MainConfig,
    #[command(subcommand)]
    pub(crate) command: SubCommand,
}

#[derive(Args, Debug)]
pub(crate) struct MainConfig {
    #[arg(
        long,
        global = true,
        value_parser=PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]),
        default_value = "info",
        help = "Log level",
    )]
    pub(crate) log_level: String,
    #[arg(
        long,
        global = true,
        help = "YAML file overriding the tracing paths (enabled_status, kprobe_events, trace_pipe, events_dir)"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        conflicts_with = "config",
        help = "Tracing directory to use (e.g. /sys/kernel/tracing; default: /sys/kernel/debug/tracing)"
    )]
    pub(crate) tracefs: Option<PathBuf>,
}

impl MainConfig {
    /// Tracing paths to use, given the command line.
    pub(crate) fn paths(&self) -> Result<TracingPaths> {
        Ok(match (&self.config, &self.tracefs) {
            (Some(config), _) => TracingPaths::load(config)?,
            (None, Some(root)) => TracingPaths::from_tracefs(root),
            (None, None) => TracingPaths::default(),
        })
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum SubCommand {
    Probe(ProbeCmd),
    Status(StatusCmd),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Attach a probe and print its events until interrupted.
#[derive(Args, Debug)]
pub(crate) struct ProbeCmd {
    #[arg(help = "Kernel function to probe (e.g. sys_execve)")]
    pub(crate) symbol: String,
    #[arg(long, default_value = "ftrace_probe", help = "Name of the kprobe")]
    pub(crate) name: String,
    // Use the plural in the struct but singular for the cli parameter as we're
    // dealing with a list here.
    #[arg(
        id = "event",
        short,
        long,
        value_delimiter = ',',
        help = "Kernel event to also report, as GROUP/NAME. Can be used multiple times.

Example:
  -e sched/sched_process_fork -e sched/sched_process_exit"
    )]
    pub(crate) events: Vec<String>,
    #[arg(long, value_enum, default_value_t, help = "Events output format")]
    pub(crate) format: OutputFormat,
}

impl ProbeCmd {
    pub(crate) fn run(&self, paths: TracingPaths) -> Result<()> {
        let run = Running::with_term_signals()?;

        let probe = Probe::with_paths(&self.name, &self.symbol, &self.events, paths);
        let events = probe.events()?;
        probe.enable()?;
        info!("Probe is running ...");

        let mut out = stdout().lock();
        while run.running() {
            match events.recv_timeout(Duration::from_millis(EVENTS_POLL_TIMEOUT_MS)) {
                Ok(event) => self.print(&mut out, &event)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        probe.disable()?;
        Ok(())
    }

    fn print<W: Write>(&self, out: &mut W, event: &Event) -> Result<()> {
        match self.format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
            OutputFormat::Text if event.is_syscall => writeln!(out, "SYSCALL {event}")?,
            OutputFormat::Text => writeln!(out, "\t{event}")?,
        }
        out.flush()?;
        Ok(())
    }
}

/// Show if ftrace is available and the tracing paths in use.
#[derive(Args, Debug)]
pub(crate) struct StatusCmd {}

impl StatusCmd {
    pub(crate) fn run(&self, paths: TracingPaths) -> Result<()> {
        let mut out = stdout().lock();
        writeln!(
            out,
            "ftrace: {}",
            match available(&paths) {
                true => "available",
                false => "not available",
            }
        )?;
        writeln!(out, "enabled status: {}", paths.enabled_status.display())?;
        writeln!(out, "kprobe events: {}", paths.kprobe_events.display())?;
        writeln!(out, "trace pipe: {}", paths.trace_pipe.display())?;
        writeln!(out, "events: {}", paths.events_dir.display())?;
        Ok(())
    }
}
