use std::{io, path::PathBuf};

use rustix::process::{getrlimit, setrlimit, Resource, Rlimit};
use tokio::process::Command;

use super::{
    filesystem::{Confinement, FilesystemIsolation},
    Isolation, Launch, NetworkIsolation,
};

/// Confine the interpreter from inside the forked child, before exec
pub struct Direct {
    network: NetworkIsolation,
    filesystem: FilesystemIsolation,
    read_only: Vec<PathBuf>,
}

impl Direct {
    pub fn new(
        network: NetworkIsolation,
        filesystem: FilesystemIsolation,
        read_only: Vec<PathBuf>,
    ) -> Self {
        Self {
            network,
            filesystem,
            read_only,
        }
    }
}

impl Isolation for Direct {
    fn command(&self, launch: &Launch<'_>) -> io::Result<Command> {
        let mut cmd = launch.command(&launch.interpreter.program);
        cmd.args(&launch.interpreter.args).arg(launch.source);

        let confine = Confine {
            cpu_seconds: launch.limits.cpu_seconds(),
            memory: match launch.limits.max_memory_bytes {
                0 => None,
                x => Some(x),
            },
            file_size: launch.limits.max_output_bytes,
            network: self.network,
        };
        let mut confinement = Confinement::new(launch.workspace, &self.read_only, self.filesystem)?;
        // SAFETY: the hook only issues raw syscalls, the Landlock ruleset was
        // built before fork
        unsafe {
            cmd.pre_exec(move || {
                confine.apply()?;
                confinement.apply()
            });
        }
        Ok(cmd)
    }
}

#[derive(Clone, Copy)]
struct Confine {
    cpu_seconds: u64,
    memory: Option<u64>,
    file_size: u64,
    network: NetworkIsolation,
}

impl Confine {
    fn apply(self) -> io::Result<()> {
        lower(Resource::Core, 0)?;
        // soft limit delivers SIGXCPU, the hard one a second later SIGKILL
        lower_soft_hard(Resource::Cpu, self.cpu_seconds, self.cpu_seconds + 1)?;
        lower(Resource::Fsize, self.file_size)?;
        if let Some(memory) = self.memory {
            lower(Resource::As, memory)?;
        }
        self.unshare_network()
    }
    #[cfg(target_os = "linux")]
    fn unshare_network(self) -> io::Result<()> {
        use rustix::thread::{unshare, UnshareFlags};
        // a fresh user namespace makes the network namespace unprivileged
        match unshare(UnshareFlags::NEWUSER | UnshareFlags::NEWNET) {
            Err(err) if self.network == NetworkIsolation::Required => Err(err.into()),
            _ => Ok(()),
        }
    }
    #[cfg(not(target_os = "linux"))]
    fn unshare_network(self) -> io::Result<()> {
        match self.network {
            NetworkIsolation::Required => Err(io::Error::from(io::ErrorKind::Unsupported)),
            NetworkIsolation::BestEffort => Ok(()),
        }
    }
}

fn lower(resource: Resource, value: u64) -> io::Result<()> {
    lower_soft_hard(resource, value, value)
}

/// Set a limit without ever raising the inherited hard limit
fn lower_soft_hard(resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
    let inherited = getrlimit(resource).maximum;
    let hard = inherited.map_or(hard, |max| max.min(hard));
    let soft = soft.min(hard);
    setrlimit(
        resource,
        Rlimit {
            current: Some(soft),
            maximum: Some(hard),
        },
    )?;
    Ok(())
}
