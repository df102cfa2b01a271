//! Worker reading the trace pipe lines, keeping the ones related to a probe
//! and publishing them as events.

use std::{sync::mpsc::RecvTimeoutError, thread, time::Duration};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, error, warn};

use crate::{
    error::ProbeError,
    events::{parse_event, Event},
    helpers::signals::Running,
    reader::LineSource,
};

/// Timeout when waiting for a new line.
const WORKER_POLL_TIMEOUT_MS: u64 = 200;

/// Selects the trace lines belonging to a probe. A line is selected if it
/// contains the probe name or one of its sub events name; this is a plain
/// substring match and unrelated lines can be selected too (e.g. when a
/// process name contains an event name).
#[derive(Clone, Debug)]
pub(super) struct EventFilter {
    names: Vec<String>,
}

impl EventFilter {
    pub(super) fn new<'a, I>(probe: &str, sub_events: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut names = vec![probe.to_string()];
        names.extend(sub_events.into_iter().cloned());
        EventFilter { names }
    }

    pub(super) fn matches(&self, line: &str) -> bool {
        self.names.iter().any(|name| line.contains(name.as_str()))
    }
}

/// Handle on a running worker thread.
pub(super) struct Worker {
    probe: String,
    state: Running,
    /// Dropped to interrupt a pending publication.
    cancel: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Start a worker consuming `source`. The worker runs until `state` is
    /// terminated, the source is exhausted or the events receiver is gone.
    pub(super) fn spawn(
        probe: &str,
        source: LineSource,
        filter: EventFilter,
        bus: Sender<Event>,
        state: Running,
    ) -> Result<Worker, ProbeError> {
        let run_state = state.clone();
        let (cancel, cancelled) = bounded(0);
        let handle = thread::Builder::new()
            .name(format!("ftrace-{probe}"))
            .spawn(move || run(source, filter, bus, cancelled, run_state))
            .map_err(|source| ProbeError::WorkerSpawnFailed {
                probe: probe.to_string(),
                source,
            })?;

        Ok(Worker {
            probe: probe.to_string(),
            state,
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    #[cfg(test)]
    pub(super) fn thread_id(&self) -> Option<thread::ThreadId> {
        self.handle.as_ref().map(|th| th.thread().id())
    }

    /// Request the worker to stop and wait for it. No event is published
    /// once this returns.
    pub(super) fn stop(&mut self) -> Result<(), ProbeError> {
        self.state.terminate();
        self.cancel.take();
        self.handle.take().map_or(Ok(()), |th| {
            th.join().map_err(|_| ProbeError::WorkerPanicked {
                probe: self.probe.clone(),
            })
        })
    }
}

fn run(
    mut source: LineSource,
    filter: EventFilter,
    bus: Sender<Event>,
    cancelled: Receiver<()>,
    state: Running,
) {
    while state.running() {
        let line = match source.recv_timeout(Duration::from_millis(WORKER_POLL_TIMEOUT_MS)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("No more lines to read from the trace pipe");
                break;
            }
        };

        if !filter.matches(&line) {
            continue;
        }

        match parse_event(&line) {
            Ok(event) => {
                if !publish(&bus, event, &cancelled) {
                    break;
                }
            }
            Err(e) => warn!("Error while parsing event: {e}"),
        }
    }

    if let Err(e) = source.close() {
        error!("{e}");
    }
}

/// Send an event to the consumer, blocking until it is received. Returns
/// false if the worker should stop instead.
fn publish(bus: &Sender<Event>, event: Event, cancelled: &Receiver<()>) -> bool {
    select! {
        send(bus, event) -> res => match res {
            Ok(()) => true,
            Err(_) => {
                debug!("Events receiver is gone, stopping");
                false
            }
        },
        recv(cancelled) -> _ => false,
    }
}
