use std::fs;

use crate::{
    policy::Filter,
    sandbox::isolation::{landlock_supported, Backend, FilesystemIsolation},
};

use super::{config::GlobalConfig, Error};

/// Check the host can run what `config` asks for
///
/// Hard failures are returned, doubtful settings only logged.
pub fn check(config: &GlobalConfig) -> Result<(), Error> {
    let interpreter = &config.interpreter;
    let cwd = std::env::current_dir()?;
    which::which_in(&interpreter.program, Some(&interpreter.path), &cwd).map_err(|err| {
        Error::SystemIncapable(format!(
            "interpreter `{}` not found in {}: {}",
            interpreter.program, interpreter.path, err
        ))
    })?;

    if config.jail.backend == Backend::Direct {
        match (landlock_supported(), config.jail.filesystem) {
            (Ok(()), _) => {}
            (Err(err), FilesystemIsolation::Required) => {
                return Err(Error::SystemIncapable(format!(
                    "kernel does not enforce Landlock ({}), set jail.filesystem = \"bestEffort\" or use nsjail",
                    err
                )));
            }
            (Err(err), FilesystemIsolation::BestEffort) => {
                log::warn!("Landlock unavailable ({}), submissions can reach the host filesystem", err);
            }
        }
    }

    if config.jail.backend == Backend::Nsjail {
        if !config.jail.nsjail.is_file() {
            return Err(Error::SystemIncapable(format!(
                "nsjail binary {:?} not found",
                config.jail.nsjail
            )));
        }
        if !rustix::process::getuid().is_root() {
            log::warn!("nsjail backend without root, namespaces may fail to clone");
        }
    }

    fs::create_dir_all(&config.runtime.temp)?;
    if fs::metadata(&config.runtime.temp)?.permissions().readonly() {
        return Err(Error::SystemIncapable(format!(
            "scratch directory {:?} is readonly",
            config.runtime.temp
        )));
    }

    config.limits.validate()?;
    if config.admission.max_concurrent == 0 {
        return Err(Error::SystemIncapable(
            "admission.max_concurrent must be greater than zero".to_owned(),
        ));
    }

    let limits = &config.limits;
    if limits.max_memory_bytes != 0 && limits.max_output_bytes * 8 >= limits.max_memory_bytes {
        log::warn!("limits.max_output_bytes is consider too high for limits.max_memory_bytes");
    }
    if config.admission.per_submitter > config.admission.max_concurrent {
        log::warn!("admission.per_submitter exceeds admission.max_concurrent and has no effect");
    }

    Filter::new(config.policy.rules.clone())?;
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::policy::Rule;

    use super::*;

    fn config_in(dir: &std::path::Path) -> GlobalConfig {
        let mut config = GlobalConfig::default();
        config.runtime.temp = dir.join("scratch");
        config.interpreter.program = "sh".to_owned();
        config.jail.filesystem = FilesystemIsolation::BestEffort;
        config
    }

    #[test]
    fn sane_host() {
        let dir = tempfile::tempdir().unwrap();
        check(&config_in(dir.path())).unwrap();
        assert!(dir.path().join("scratch").is_dir());
    }

    #[test]
    fn missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.interpreter.program = "surely-not-an-interpreter".to_owned();
        assert!(matches!(check(&config), Err(Error::SystemIncapable(_))));
    }

    #[test]
    fn filesystem_confinement_follows_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.jail.filesystem = FilesystemIsolation::Required;
        match landlock_supported() {
            Ok(()) => check(&config).unwrap(),
            Err(_) => assert!(matches!(check(&config), Err(Error::SystemIncapable(_)))),
        }
    }

    #[test]
    fn missing_nsjail() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.jail.backend = Backend::Nsjail;
        config.jail.nsjail = dir.path().join("nsjail");
        assert!(matches!(check(&config), Err(Error::SystemIncapable(_))));
    }

    #[test]
    fn broken_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.policy.rules.push(Rule::new("(", "unbalanced"));
        assert!(matches!(check(&config), Err(Error::Policy(_))));
    }

    #[test]
    fn zero_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.admission.max_concurrent = 0;
        assert!(check(&config).is_err());
    }
}
