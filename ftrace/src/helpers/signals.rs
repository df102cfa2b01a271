//! # Signals
//!
//! Provides a shared termination state, used to stop the threads reading and
//! processing trace lines. It can optionally be tied to termination signals.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use anyhow::Result;
use log::info;
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM},
    iterator::Signals,
};

#[derive(Clone, Debug, Default)]
pub struct Running {
    condition: Arc<AtomicBool>,
}

impl Running {
    /// Create a new running state. Termination must be requested by calling
    /// `terminate()` on any of its clones.
    pub fn new() -> Running {
        Self::default()
    }

    /// Same as `new()` but the state is also terminated upon receiving one of
    /// SIGHUP, SIGINT, SIGQUIT or SIGTERM.
    pub fn with_term_signals() -> Result<Running> {
        let mut sigs = Signals::new([SIGHUP, SIGINT, SIGQUIT, SIGTERM])?;

        let run = Self::new();
        let condition = Arc::clone(&run.condition);

        thread::Builder::new()
            .name("ftrace-signals".into())
            .spawn(move || {
                sigs.wait();
                condition.store(true, Ordering::Relaxed);
                info!("Received signal, terminating...");
            })?;

        Ok(run)
    }

    pub fn running(&self) -> bool {
        !self.condition.load(Ordering::Relaxed)
    }

    pub fn terminate(&self) {
        self.condition.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_clones() {
        let run = Running::new();
        let other = run.clone();
        assert!(run.running() && other.running());

        other.terminate();
        assert!(!run.running());
        assert!(!other.running());

        // Unrelated states are not affected.
        assert!(Running::new().running());
    }
}
