//! Reasons to stop a running process early: wall clock and cancellation
mod cancel;
mod walltime;

use std::{fmt::Display, time::Duration};

pub use cancel::{channel, CancelHandle, CancelListener};

pub(crate) trait Monitor {
    type Resource;
    /// resolve once the monitored resource is exhausted
    async fn wait_exhaust(&mut self) -> MonitorKind;
    fn poll_exhaust(&mut self) -> Option<MonitorKind>;
    fn stat(&self) -> Self::Resource;
}

/// Why the watchdog killed the process
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MonitorKind {
    Walltime,
    Cancelled,
}

impl Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Walltime => "wall time",
                Self::Cancelled => "cancellation",
            }
        )
    }
}

/// composite monitor, the first exhausted resource wins
pub(crate) struct Watchdog {
    walltime: walltime::Monitor,
    cancel: Option<CancelListener>,
}

impl Watchdog {
    pub fn new(walltime: Duration, cancel: Option<CancelListener>) -> Self {
        Self {
            walltime: walltime::Monitor::new(walltime),
            cancel,
        }
    }
}

impl Monitor for Watchdog {
    type Resource = Duration;

    async fn wait_exhaust(&mut self) -> MonitorKind {
        match self.cancel.as_mut() {
            Some(cancel) => tokio::select! {
                x = self.walltime.wait_exhaust() => x,
                x = cancel.wait_exhaust() => x,
            },
            None => self.walltime.wait_exhaust().await,
        }
    }
    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        if let Some(reason) = self.cancel.as_mut().and_then(Monitor::poll_exhaust) {
            return Some(reason);
        }
        self.walltime.poll_exhaust()
    }
    /// elapsed wall time since the watchdog was armed
    fn stat(&self) -> Self::Resource {
        self.walltime.stat()
    }
}
