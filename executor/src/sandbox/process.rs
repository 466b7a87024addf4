use std::{
    io,
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    time::Duration,
};

use rustix::process::{kill_process_group, Pid, Signal};
use tokio::{
    process::{Child, ChildStderr, ChildStdout, Command},
    time,
};

use super::{
    monitor::{Monitor, MonitorKind, Watchdog},
    output::Capture,
    Error,
};

/// What is left after the process is gone
#[derive(Debug)]
pub struct RawOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// stdout reached the output limit
    pub stdout_full: bool,
    /// stderr reached the output limit
    pub stderr_full: bool,
    /// `None` if the watchdog killed the process
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub duration: Duration,
}

/// Knobs of the kill sequence
#[derive(Debug, Clone, Copy)]
pub struct Reaper {
    /// between SIGTERM and SIGKILL
    pub grace: Duration,
    /// how long to keep reading pipes once the process group is dead
    pub drain: Duration,
}

/// A spawned process leading its own process group
pub struct Process {
    child: Child,
    pgid: Option<Pid>,
    watchdog: Watchdog,
    stdout: Option<Capture<ChildStdout>>,
    stderr: Option<Capture<ChildStderr>>,
    reaper: Reaper,
    reaped: bool,
}

impl Process {
    pub fn spawn(
        mut cmd: Command,
        watchdog: Watchdog,
        output_limit: usize,
        reaper: Reaper,
    ) -> Result<Self, Error> {
        log::trace!("spawn process with args: {:?}", cmd.as_std());
        let mut child = cmd.spawn().map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::Interpreter {
                program: cmd.as_std().get_program().to_string_lossy().into_owned(),
                source: err,
            },
            _ => Error::Spawn(err),
        })?;

        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .and_then(Pid::from_raw);
        let stdout = child.stdout.take().ok_or(Error::CapturedPipe)?;
        let stderr = child.stderr.take().ok_or(Error::CapturedPipe)?;

        Ok(Self {
            child,
            pgid,
            watchdog,
            stdout: Some(Capture::new(stdout, output_limit)),
            stderr: Some(Capture::new(stderr, output_limit)),
            reaper,
            reaped: false,
        })
    }
    fn signal_group(&self, signal: Signal) {
        if let Some(pgid) = self.pgid {
            match kill_process_group(pgid, signal) {
                Ok(()) | Err(rustix::io::Errno::SRCH) => {}
                Err(err) => log::debug!("Fail signaling process group {:?}: {}", pgid, err),
            }
        }
    }
    /// SIGTERM the group, SIGKILL it after the grace period
    async fn terminate(&mut self) -> io::Result<ExitStatus> {
        self.signal_group(Signal::Term);
        let status = match time::timeout(self.reaper.grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                log::debug!("process ignored SIGTERM, escalating");
                self.signal_group(Signal::Kill);
                self.child.start_kill().ok();
                self.child.wait().await
            }
        };
        // stragglers that survived SIGTERM while the leader did not
        self.signal_group(Signal::Kill);
        self.reaped = true;
        status
    }
    /// wait until exit (with output drained) or until the watchdog fires
    pub async fn wait(mut self) -> Result<RawOutcome, Error> {
        let (mut stdout, mut stderr) = match (self.stdout.take(), self.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => return Err(Error::CapturedPipe),
        };

        let finished = {
            let child = &mut self.child;
            let exit = async {
                let (status, out, err) =
                    tokio::join!(child.wait(), stdout.drain(), stderr.drain());
                if let Err(err) = out.and(err) {
                    log::debug!("Fail forwarding buffer: {}", err);
                }
                status
            };
            tokio::select! {
                status = exit => Ok(status),
                reason = self.watchdog.wait_exhaust() => Err(reason),
            }
        };

        let (exit_code, reason) = match finished {
            Ok(status) => {
                let status = status?;
                self.reaped = true;
                self.signal_group(Signal::Kill);
                (Some(exit_code(status)), None)
            }
            Err(reason) => {
                log::debug!("{} exhausted, terminating process group", reason);
                self.terminate().await?;
                // pipes close once every holder is dead, unless something
                // escaped the group
                let drained = time::timeout(self.reaper.drain, async {
                    tokio::join!(stdout.drain(), stderr.drain())
                })
                .await;
                if drained.is_err() {
                    log::debug!("output pipes still open after kill, discarding the rest");
                }
                (None, Some(reason))
            }
        };

        if let (None, Some(reason)) = (reason, self.watchdog.poll_exhaust()) {
            log::trace!("process finished right at {} limit", reason);
        }
        let discarded = stdout.discarded() + stderr.discarded();
        if discarded > 0 {
            log::debug!("discarded {} bytes of output past the limit", discarded);
        }

        Ok(RawOutcome {
            stdout_full: stdout.is_full(),
            stderr_full: stderr.is_full(),
            stdout: stdout.into_buffer(),
            stderr: stderr.into_buffer(),
            exit_code,
            timed_out: reason.is_some(),
            cancelled: reason == Some(MonitorKind::Cancelled),
            duration: self.watchdog.stat(),
        })
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // dropped before reaping, the owning future was cancelled
        if !self.reaped {
            self.signal_group(Signal::Kill);
        }
    }
}

/// Exit code, or `128 + signal` for a process killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signal_exit_code() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // killed by SIGKILL
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
