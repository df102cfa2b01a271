use std::{io, path::PathBuf};

/// Errors reported when controlling a probe.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("FTRACE kernel framework not available on your system")]
    Unavailable,
    #[error("Error while enabling event {event}: {source}")]
    EnableEventFailed {
        event: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while enabling probe descriptor for {probe}: {source}")]
    DescriptorFailed {
        probe: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while enabling probe {probe}: {source}")]
    ProbeEnableFailed {
        probe: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while opening {}: {source}", path.display())]
    PipeOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not start the worker of probe {probe}: {source}")]
    WorkerSpawnFailed {
        probe: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while disabling event {event}: {source}")]
    DisableEventFailed {
        event: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while disabling probe {probe}: {source}")]
    ProbeDisableFailed {
        probe: String,
        #[source]
        source: io::Error,
    },
    #[error("Error while removing the probe {probe}: {source}")]
    DeregisterFailed {
        probe: String,
        #[source]
        source: io::Error,
    },
    #[error("The worker of probe {probe} panicked")]
    WorkerPanicked { probe: String },
    #[error("Events receiver was already taken")]
    EventsTaken,
}
