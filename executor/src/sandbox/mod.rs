//! Execute one source text as a confined subprocess
pub mod isolation;
mod limit;
mod monitor;
mod output;
mod process;
mod workspace;

use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use thiserror::Error;
use uuid::Uuid;

use crate::init::config::{GlobalConfig, Interpreter};

use self::{
    isolation::{Isolation, Launch},
    monitor::Watchdog,
    process::{Process, Reaper},
};

pub use limit::{ExecutionLimits, LimitError, LimitOverride, LimitOverrideBuilder};
pub use monitor::{channel, CancelHandle, CancelListener, MonitorKind};
pub use process::RawOutcome;
pub use workspace::ScratchWorkspace;

/// Faults of the execution machinery itself, never of the submitted code
#[derive(Error, Debug)]
pub enum Error {
    #[error("interpreter `{program}` cannot be spawned: {source}")]
    Interpreter {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Fail to spawn sandboxed process: `{0}`")]
    Spawn(#[source] std::io::Error),
    #[error("Fail to prepare scratch workspace: `{0}`")]
    Workspace(#[source] std::io::Error),
    #[error("The pipe has been captured")]
    CapturedPipe,
    #[error("IO error: `{0}`")]
    IO(#[from] std::io::Error),
    #[error("Invalid limits: {0}")]
    Limit(#[from] LimitError),
}

pub struct Sandbox {
    id_counter: AtomicU64,
    spawned: AtomicU64,
    root: PathBuf,
    interpreter: Interpreter,
    isolation: Box<dyn Isolation>,
    reaper: Reaper,
}

impl Sandbox {
    /// Create the scratch root if needed and pin it as an absolute path
    ///
    /// The interpreter runs with the workspace as its cwd, so a relative
    /// source path would resolve against the workspace itself.
    pub fn new(config: &GlobalConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.runtime.temp)?;
        let root = config.runtime.temp.canonicalize()?;
        Ok(Self {
            id_counter: AtomicU64::new(0),
            spawned: AtomicU64::new(0),
            root,
            interpreter: config.interpreter.clone(),
            isolation: isolation::from_config(&config.jail, &config.interpreter),
            reaper: Reaper {
                grace: Duration::from_millis(config.runtime.grace_ms),
                drain: Duration::from_millis(config.runtime.drain_ms),
            },
        })
    }
    /// number of processes spawned so far
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Acquire)
    }
    /// Run `source` under `limits` in a fresh workspace
    ///
    /// `tag` prefixes the workspace name, usually the submission id. The
    /// workspace is gone when this returns, whatever the outcome.
    pub async fn run(
        &self,
        tag: &str,
        source: &str,
        limits: &ExecutionLimits,
        cancel: Option<CancelListener>,
    ) -> Result<RawOutcome, Error> {
        limits.validate()?;

        let name = format!(
            "{}-{}-{}",
            tag,
            self.id_counter.fetch_add(1, Ordering::AcqRel),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let workspace = ScratchWorkspace::create(&self.root, &name)
            .await
            .map_err(Error::Workspace)?;

        let result = self.run_in(&workspace, source, limits, cancel).await;
        workspace.destroy().await;
        result
    }
    async fn run_in(
        &self,
        workspace: &ScratchWorkspace,
        source: &str,
        limits: &ExecutionLimits,
        cancel: Option<CancelListener>,
    ) -> Result<RawOutcome, Error> {
        let source = workspace
            .write_source(&self.interpreter.source, source)
            .await
            .map_err(Error::Workspace)?;

        let cmd = self.isolation.command(&Launch {
            workspace: workspace.path(),
            source: &source,
            interpreter: &self.interpreter,
            limits,
        })
        .map_err(Error::Spawn)?;

        let watchdog = Watchdog::new(limits.wall_clock(), cancel);
        let process = Process::spawn(cmd, watchdog, limits.output_limit(), self.reaper)?;
        self.spawned.fetch_add(1, Ordering::AcqRel);

        process.wait().await
    }
}
