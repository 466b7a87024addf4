use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use tokio::process::Command;

use crate::sandbox::ExecutionLimits;

use super::{Isolation, Launch};

pub trait Argument {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>>;
}

#[derive(Default)]
pub struct ArgFactory {
    args: Vec<Cow<'static, OsStr>>,
}

impl ArgFactory {
    pub fn add(mut self, arg: impl Argument) -> Self {
        self.args.extend(arg.get_args());
        self
    }

    pub fn build(self) -> Vec<OsString> {
        self.args.into_iter().map(|x| x.into_owned()).collect()
    }
}

fn flag(x: &'static [u8]) -> Cow<'static, OsStr> {
    Cow::Borrowed(OsStr::from_bytes(x))
}

fn owned(x: impl Into<OsString>) -> Cow<'static, OsStr> {
    Cow::Owned(x.into())
}

/// run once, keep nsjail quiet, keep our process group
pub struct BaseArg;

impl Argument for BaseArg {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        vec![
            flag(b"-Mo"),
            flag(b"--quiet"),
            flag(b"--disable_clone_newcgroup"),
            flag(b"--skip_setsid"),
        ]
        .into_iter()
    }
}

/// empty root with `read_only` bound read-only and the workspace bound
/// writable, each at its host path
pub struct MountArg<'a> {
    pub workspace: &'a Path,
    pub read_only: &'a [PathBuf],
}

impl<'a> Argument for MountArg<'a> {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        let mut bind = self.workspace.as_os_str().to_owned();
        bind.push(":");
        bind.push(self.workspace.as_os_str());
        self.read_only
            .iter()
            .flat_map(|path| [flag(b"--bindmount_ro"), owned(path.as_os_str())])
            .chain([
                flag(b"--bindmount"),
                flag(b"/dev/null"),
                flag(b"--bindmount"),
                owned(bind),
                flag(b"--cwd"),
                owned(self.workspace.as_os_str()),
            ])
            .collect::<Vec<_>>()
            .into_iter()
    }
}

pub struct EnvArg<'a, I>
where
    I: Iterator<Item = (&'a OsStr, &'a OsStr)>,
{
    pub env: I,
}

impl<'a, I> Argument for EnvArg<'a, I>
where
    I: Iterator<Item = (&'a OsStr, &'a OsStr)>,
{
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        self.env.flat_map(|(key, value)| {
            let mut pair = key.to_owned();
            pair.push("=");
            pair.push(value);
            [flag(b"--env"), owned(pair)]
        })
    }
}

pub struct LimitArg<'a> {
    pub limits: &'a ExecutionLimits,
}

impl<'a> Argument for LimitArg<'a> {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        // nsjail takes sizes in MiB
        let fsize = self.limits.max_output_bytes.div_ceil(1024 * 1024).max(1);
        let memory = match self.limits.memory_mib() {
            Some(mib) => mib.to_string(),
            None => "inf".to_owned(),
        };
        vec![
            flag(b"--time_limit"),
            owned(self.limits.cpu_seconds().to_string()),
            flag(b"--rlimit_cpu"),
            owned(self.limits.cpu_seconds().to_string()),
            flag(b"--rlimit_as"),
            owned(memory),
            flag(b"--rlimit_fsize"),
            owned(fsize.to_string()),
            flag(b"--rlimit_core"),
            flag(b"0"),
        ]
        .into_iter()
    }
}

pub struct InnerProcessArg<'a, I>
where
    I: Iterator<Item = &'a OsStr>,
{
    pub inner_args: I,
}

impl<'a, I> Argument for InnerProcessArg<'a, I>
where
    I: Iterator<Item = &'a OsStr>,
{
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        vec![flag(b"--")]
            .into_iter()
            .chain(self.inner_args.map(|x| owned(x)))
    }
}

/// Delegate isolation to nsjail, which unshares the network namespace by default
pub struct NsJail {
    path: PathBuf,
    read_only: Vec<PathBuf>,
}

impl NsJail {
    pub fn new(path: impl AsRef<Path>, read_only: Vec<PathBuf>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            read_only,
        }
    }
    fn args(&self, launch: &Launch<'_>) -> Vec<OsString> {
        let interpreter = launch.interpreter;
        let inner = std::iter::once(OsStr::new(interpreter.program.as_str()))
            .chain(interpreter.args.iter().map(OsStr::new))
            .chain(std::iter::once(launch.source.as_os_str()));

        ArgFactory::default()
            .add(BaseArg)
            .add(MountArg {
                workspace: launch.workspace,
                read_only: &self.read_only,
            })
            .add(EnvArg {
                env: launch.env().into_iter(),
            })
            .add(LimitArg {
                limits: launch.limits,
            })
            .add(InnerProcessArg { inner_args: inner })
            .build()
    }
}

impl Isolation for NsJail {
    fn command(&self, launch: &Launch<'_>) -> io::Result<Command> {
        let mut cmd = launch.command(&self.path);
        cmd.args(self.args(launch));
        Ok(cmd)
    }
}
