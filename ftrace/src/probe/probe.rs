use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Mutex, PoisonError, RwLock, RwLockWriteGuard},
};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use super::{
    descriptor::{make_descriptor, map_sub_events},
    worker::{EventFilter, Worker},
};
use crate::{
    config::TracingPaths, error::ProbeError, events::Event, helpers::signals::Running,
    reader::LineSource, tracefs,
};

/// State of a probe.
enum State {
    /// The probe is not running. `dirty` is set if a failed enable left the
    /// kernel configuration partially modified.
    Disabled { dirty: bool },
    /// The probe is registered and its worker is running.
    Enabled(Worker),
}

/// Guards the probe state. Queries share the lock, transitions take it
/// exclusively for their whole duration.
struct StateGuard(RwLock<State>);

impl StateGuard {
    fn new() -> Self {
        StateGuard(RwLock::new(State::Disabled { dirty: false }))
    }

    fn is_enabled(&self) -> bool {
        matches!(
            *self.0.read().unwrap_or_else(PoisonError::into_inner),
            State::Enabled(_)
        )
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A kprobe on a kernel function, plus optional sub events (existing trace
/// events also reported, e.g. "sched/sched_process_fork").
///
/// Events are reported in the order they appear in the trace pipe, through
/// the receiver returned by `events()`. The channel has no buffer: the
/// worker waits for each event to be received before reading further.
pub struct Probe {
    /// Name of the probe, used as the kprobe name.
    name: String,
    /// Kernel function being probed.
    syscall: String,
    /// Kprobe definition.
    descriptor: String,
    /// Enable file of the kprobe.
    enable_file: PathBuf,
    /// Sub events, by bare name, and their enable file.
    events: BTreeMap<String, PathBuf>,
    filter: EventFilter,
    paths: TracingPaths,
    state: StateGuard,
    sender: Sender<Event>,
    receiver: Mutex<Option<Receiver<Event>>>,
}

impl Probe {
    /// Create a new probe named `name` on `syscall`, using the default tracing
    /// paths. Sub events are given as "group/name".
    pub fn new<I, S>(name: &str, syscall: &str, sub_events: I) -> Probe
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_paths(name, syscall, sub_events, TracingPaths::default())
    }

    /// Same as `new()` with custom tracing paths.
    pub fn with_paths<I, S>(
        name: &str,
        syscall: &str,
        sub_events: I,
        paths: TracingPaths,
    ) -> Probe
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let events = map_sub_events(sub_events, &paths);
        let (sender, receiver) = bounded(0);

        Probe {
            name: name.to_string(),
            syscall: syscall.to_string(),
            descriptor: make_descriptor(name, syscall),
            enable_file: paths.probe_enable(name),
            filter: EventFilter::new(name, events.keys()),
            events,
            paths,
            state: StateGuard::new(),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syscall(&self) -> &str {
        &self.syscall
    }

    /// Kprobe definition written to the kernel when enabling the probe.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Sub events, by bare name, and the path of their enable file.
    pub fn sub_events(&self) -> &BTreeMap<String, PathBuf> {
        &self.events
    }

    /// Returns true if the last completed transition was an `enable()`. The
    /// worker may have stopped since, e.g. at the end of the trace pipe.
    pub fn enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Take the receiver of the events. It can only be taken once and stays
    /// valid across enable/disable cycles.
    pub fn events(&self) -> Result<Receiver<Event>, ProbeError> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ProbeError::EventsTaken)
    }

    /// Register and enable the probe and its sub events, then start the worker
    /// reading the trace pipe. Does nothing if the probe is already enabled.
    ///
    /// Nothing is rolled back on error: `disable()` can be used to clean up.
    pub fn enable(&self) -> Result<(), ProbeError> {
        let mut state = self.state.write();
        if let State::Enabled(_) = *state {
            return Ok(());
        }

        if !tracefs::available(&self.paths) {
            return Err(ProbeError::Unavailable);
        }

        // From now on the kernel configuration may be modified.
        *state = State::Disabled { dirty: true };

        for (event, path) in self.events.iter() {
            tracefs::write_file(path, "1").map_err(|source| ProbeError::EnableEventFailed {
                event: event.clone(),
                source,
            })?;
        }

        tracefs::write_file(&self.paths.kprobe_events, &self.descriptor).map_err(|source| {
            ProbeError::DescriptorFailed {
                probe: self.name.clone(),
                source,
            }
        })?;

        tracefs::write_file(&self.enable_file, "1").map_err(|source| {
            ProbeError::ProbeEnableFailed {
                probe: self.name.clone(),
                source,
            }
        })?;

        let run_state = Running::new();
        let source = LineSource::open(&self.paths.trace_pipe, run_state.clone()).map_err(
            |source| ProbeError::PipeOpenFailed {
                path: self.paths.trace_pipe.clone(),
                source,
            },
        )?;

        let worker = Worker::spawn(
            &self.name,
            source,
            self.filter.clone(),
            self.sender.clone(),
            run_state,
        )?;

        *state = State::Enabled(worker);
        info!("Probe {} enabled on {}", self.name, self.syscall);
        Ok(())
    }

    /// Disable and unregister the probe, disable its sub events and stop the
    /// worker. No event is delivered once this returns. Does nothing if the
    /// probe is already disabled.
    ///
    /// All steps are attempted even if one fails, the first error is
    /// returned.
    pub fn disable(&self) -> Result<(), ProbeError> {
        let mut state = self.state.write();
        match *state {
            State::Disabled { dirty: false } => return Ok(()),
            State::Disabled { dirty: true } => {
                debug!("Cleaning up after probe {} failed to enable", self.name)
            }
            State::Enabled(_) => (),
        }

        let mut result = self.teardown();
        if let State::Enabled(worker) = &mut *state {
            result = result.and(worker.stop());
        }

        *state = State::Disabled { dirty: false };
        info!("Probe {} disabled", self.name);
        result
    }

    /// Undo the kernel configuration done by `enable()`.
    fn teardown(&self) -> Result<(), ProbeError> {
        let mut errors = Vec::new();

        for (event, path) in self.events.iter() {
            if let Err(source) = tracefs::write_file(path, "0") {
                errors.push(ProbeError::DisableEventFailed {
                    event: event.clone(),
                    source,
                });
            }
        }

        if let Err(source) = tracefs::write_file(&self.enable_file, "0") {
            errors.push(ProbeError::ProbeDisableFailed {
                probe: self.name.clone(),
                source,
            });
        }

        if let Err(source) =
            tracefs::append_file(&self.paths.kprobe_events, &format!("-:{}", self.name))
        {
            errors.push(ProbeError::DeregisterFailed {
                probe: self.name.clone(),
                source,
            });
        }

        let mut errors = errors.into_iter();
        match errors.next() {
            Some(first) => {
                errors.for_each(|e| warn!("{e}"));
                Err(first)
            }
            None => Ok(()),
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        if self.enabled() {
            if let Err(e) = self.disable() {
                error!("{e}");
            }
        }
    }
}
