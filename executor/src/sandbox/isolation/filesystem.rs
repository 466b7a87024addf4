use std::{
    io,
    path::{Path, PathBuf},
};

use landlock::{
    Access, AccessFs, BitFlags, CompatLevel, Compatible, PathBeneath, PathFd, Ruleset,
    RulesetAttr, RulesetCreated, RulesetCreatedAttr, RulesetStatus, ABI,
};
use rustix::io::Errno;
use serde::{Deserialize, Serialize};

const ABI_LEVEL: ABI = ABI::V5;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilesystemIsolation {
    /// run unconfined when the kernel has no Landlock support
    BestEffort,
    /// refuse to spawn unless the Landlock ruleset is enforced
    #[default]
    Required,
}

fn other(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// Access rights of `path`, narrowed to file rights when it is not a directory
fn access_of(path: &Path, access: BitFlags<AccessFs>) -> BitFlags<AccessFs> {
    if path.is_dir() {
        access
    } else {
        access & AccessFs::from_file(ABI_LEVEL)
    }
}

/// Landlock ruleset of one execution
///
/// Built in the parent so nothing allocates between fork and exec, then
/// enforced on the child by [`Confinement::apply`]. Read access is granted to
/// `read_only`, full access to the workspace and `/dev/null`, nothing else.
pub struct Confinement {
    ruleset: Option<RulesetCreated>,
    mode: FilesystemIsolation,
}

impl Confinement {
    pub fn new(
        workspace: &Path,
        read_only: &[PathBuf],
        mode: FilesystemIsolation,
    ) -> io::Result<Self> {
        match ruleset(workspace, read_only) {
            Ok(ruleset) => Ok(Self {
                ruleset: Some(ruleset),
                mode,
            }),
            Err(err) if mode == FilesystemIsolation::BestEffort => {
                log::warn!("filesystem confinement unavailable, running unconfined: {}", err);
                Ok(Self {
                    ruleset: None,
                    mode,
                })
            }
            Err(err) => Err(err),
        }
    }
    /// Restrict the calling process, run in `pre_exec`
    pub fn apply(&mut self) -> io::Result<()> {
        let required = self.mode == FilesystemIsolation::Required;
        let Some(ruleset) = self.ruleset.take() else {
            if required {
                return Err(Errno::OPNOTSUPP.into());
            }
            return Ok(());
        };
        match ruleset.restrict_self() {
            Ok(status) if required && status.ruleset == RulesetStatus::NotEnforced => {
                Err(Errno::OPNOTSUPP.into())
            }
            Ok(_) => Ok(()),
            Err(_) if required => Err(Errno::PERM.into()),
            Err(_) => Ok(()),
        }
    }
}

fn ruleset(workspace: &Path, read_only: &[PathBuf]) -> io::Result<RulesetCreated> {
    let all = AccessFs::from_all(ABI_LEVEL);
    let read = AccessFs::from_read(ABI_LEVEL);

    let mut ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(all)
        .map_err(other)?
        .create()
        .map_err(other)?;

    for path in read_only {
        // missing system directories differ between distributions
        let Ok(fd) = PathFd::new(path) else {
            continue;
        };
        ruleset = ruleset
            .add_rule(PathBeneath::new(fd, access_of(path, read)))
            .map_err(other)?;
    }
    let null = Path::new("/dev/null");
    if let Ok(fd) = PathFd::new(null) {
        ruleset = ruleset
            .add_rule(PathBeneath::new(fd, access_of(null, all)))
            .map_err(other)?;
    }
    let workspace = PathFd::new(workspace).map_err(other)?;
    ruleset
        .add_rule(PathBeneath::new(workspace, all))
        .map_err(other)
}

/// Whether this kernel enforces Landlock at all
pub fn supported() -> io::Result<()> {
    Ruleset::default()
        .set_compatibility(CompatLevel::HardRequirement)
        .handle_access(AccessFs::from_all(ABI::V1))
        .map_err(other)?
        .create()
        .map_err(other)?;
    Ok(())
}
