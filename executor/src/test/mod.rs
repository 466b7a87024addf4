
use std::{path::Path, time::Duration};

use crate::{
    init::config::{GlobalConfig, Interpreter},
    sandbox::isolation::FilesystemIsolation,
};

/// config running shell scripts out of `root/scratch`
///
/// Landlock is best effort so the suite also runs on kernels without it.
fn shell_config(root: &Path) -> GlobalConfig {
    let mut config = GlobalConfig::default();
    config.runtime.temp = root.join("scratch");
    config.jail.filesystem = FilesystemIsolation::BestEffort;
    config.interpreter = Interpreter {
        program: "sh".to_owned(),
        args: Vec::new(),
        source: "main.sh".to_owned(),
        ..Default::default()
    };
    config
}

fn python_config(root: &Path) -> Option<GlobalConfig> {
    which::which("python3").ok()?;
    let mut config = GlobalConfig::default();
    config.runtime.temp = root.join("scratch");
    config.jail.filesystem = FilesystemIsolation::BestEffort;
    Some(config)
}

/// whether the scratch root holds nothing but possibly itself
fn scratch_is_empty(config: &GlobalConfig) -> bool {
    match std::fs::read_dir(&config.runtime.temp) {
        Ok(mut dir) => dir.next().is_none(),
        Err(_) => true,
    }
}

/// running (not zombie) process with `pid` exists
fn alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(
            stat.rsplit(')').next().and_then(|x| x.trim_start().chars().next()),
            Some('Z' | 'X')
        ),
        Err(_) => false,
    }
}

async fn gone(pid: i32) -> bool {
    for _ in 0..40 {
        if !alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
