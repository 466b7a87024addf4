//! How the interpreter process is confined
//!
//! Every backend builds a [`Command`] that runs in the workspace, in its own
//! process group, with a cleared environment and piped output. What differs
//! is the mechanism enforcing resource limits, network and filesystem isolation.
mod direct;
mod filesystem;
mod nsjail;

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::init::config::{Interpreter, Jail};

use super::ExecutionLimits;

pub use direct::Direct;
pub use filesystem::{supported as landlock_supported, FilesystemIsolation};
pub use nsjail::NsJail;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    /// rlimits and namespaces applied in the forked child
    #[default]
    Direct,
    /// wrap the interpreter with an nsjail binary
    Nsjail,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NetworkIsolation {
    /// isolate when the host permits unprivileged namespaces, run anyway otherwise
    #[default]
    BestEffort,
    /// refuse to spawn without an isolated network namespace
    Required,
}

/// Everything a backend needs to build the command of one execution
pub struct Launch<'a> {
    pub workspace: &'a Path,
    pub source: &'a Path,
    pub interpreter: &'a Interpreter,
    pub limits: &'a ExecutionLimits,
}

impl<'a> Launch<'a> {
    /// command skeleton shared by backends
    fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(self.workspace)
            .env_clear()
            .envs(self.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        cmd
    }
    /// the only environment the interpreter gets to see
    fn env(&self) -> [(&'a OsStr, &'a OsStr); 3] {
        [
            (OsStr::new("PATH"), OsStr::new(self.interpreter.path.as_str())),
            (OsStr::new("HOME"), self.workspace.as_os_str()),
            (OsStr::new("LANG"), OsStr::new(self.interpreter.lang.as_str())),
        ]
    }
}

pub trait Isolation: Send + Sync {
    fn command(&self, launch: &Launch<'_>) -> io::Result<Command>;
}

/// Directories the interpreter may read: the configured system paths plus
/// the install prefix of the interpreter, missing ones left out
fn readable(jail: &Jail, interpreter: &Interpreter) -> Vec<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let prefix = which::which_in(&interpreter.program, Some(&interpreter.path), cwd)
        .ok()
        .and_then(|bin| bin.canonicalize().ok())
        .and_then(|bin| {
            let dir = bin.parent()?;
            match dir.parent() {
                // never widen to the whole filesystem for `/bin/x`
                Some(prefix) if prefix.parent().is_some() => Some(prefix.to_path_buf()),
                _ => Some(dir.to_path_buf()),
            }
        });
    let mut paths: Vec<_> = jail
        .read_only
        .iter()
        .cloned()
        .chain(prefix)
        .filter(|path| path.exists())
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

pub fn from_config(jail: &Jail, interpreter: &Interpreter) -> Box<dyn Isolation> {
    let read_only = readable(jail, interpreter);
    log::debug!("interpreter may read {:?}", read_only);
    match jail.backend {
        Backend::Direct => Box::new(Direct::new(jail.network, jail.filesystem, read_only)),
        Backend::Nsjail => Box::new(NsJail::new(&jail.nsjail, read_only)),
    }
}
