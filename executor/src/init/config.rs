use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::{fs, sync::OnceCell};

use crate::{
    policy::{default_rules, PolicyMode, Rule},
    sandbox::{
        isolation::{Backend, FilesystemIsolation, NetworkIsolation},
        ExecutionLimits,
    },
};

use super::Error;

pub static CONFIG: OnceCell<GlobalConfig> = OnceCell::const_new();

static CONFIG_PATH: &str = "config/config.toml";

/// path of the config file, `CONFIG_PATH` overrides the default
pub fn config_path() -> PathBuf {
    std::env::var_os("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH))
}

// config
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct GlobalConfig {
    /// 0 = trace, 4 = error
    pub log_level: usize,
    pub runtime: Runtime,
    pub interpreter: Interpreter,
    /// default limits, per-call overrides are merged over them
    pub limits: ExecutionLimits,
    pub admission: Admission,
    pub policy: Policy,
    pub jail: Jail,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: 2,
            runtime: Runtime::default(),
            interpreter: Interpreter::default(),
            limits: ExecutionLimits::default(),
            admission: Admission::default(),
            policy: Policy::default(),
            jail: Jail::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct Runtime {
    /// parent of every scratch workspace
    pub temp: PathBuf,
    /// milliseconds between SIGTERM and SIGKILL
    pub grace_ms: u64,
    /// milliseconds spent draining pipes after a kill
    pub drain_ms: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            temp: PathBuf::from(".temp"),
            grace_ms: 100,
            drain_ms: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    /// file name the source is written to
    pub source: String,
    /// `PATH` seen by the interpreter
    pub path: String,
    /// `LANG` seen by the interpreter
    pub lang: String,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            program: "python3".to_owned(),
            args: vec!["-I".to_owned(), "-B".to_owned(), "-u".to_owned()],
            source: "main.py".to_owned(),
            path: "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_owned(),
            lang: "C.UTF-8".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct Admission {
    pub max_concurrent: usize,
    /// zero disables the per-submitter ceiling
    pub per_submitter: usize,
}

impl Default for Admission {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            per_submitter: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct Policy {
    pub mode: PolicyMode,
    pub rules: Vec<Rule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
            rules: default_rules(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct Jail {
    pub backend: Backend,
    /// nsjail binary, only used by the nsjail backend
    pub nsjail: PathBuf,
    pub network: NetworkIsolation,
    /// Landlock enforcement of the direct backend
    pub filesystem: FilesystemIsolation,
    /// host paths the interpreter may read, the workspace is always writable
    pub read_only: Vec<PathBuf>,
}

impl Default for Jail {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            nsjail: PathBuf::from("./nsjail-3.1"),
            network: NetworkIsolation::default(),
            filesystem: FilesystemIsolation::default(),
            read_only: [
                "/usr", "/bin", "/sbin", "/lib", "/lib32", "/lib64", "/etc",
                "/dev/urandom", "/dev/zero",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

impl GlobalConfig {
    /// Read config from `path`, falling back to defaults if it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match fs::read_to_string(path).await {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Unable to find {:?}, using default config", path);
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }
    /// Write the config as TOML, creating parent directories
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, toml::to_string(self)?).await?;
        Ok(())
    }
}

pub async fn init() -> Result<&'static GlobalConfig, Error> {
    let config = GlobalConfig::load(config_path()).await?;
    CONFIG.set(config).map_err(|_| Error::AlreadySet)?;
    CONFIG.get().ok_or(Error::AlreadySet)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_is_default() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_level, 2);
        assert_eq!(config.admission.max_concurrent, 8);
        assert_eq!(config.admission.per_submitter, 1);
        assert_eq!(config.limits, ExecutionLimits::default());
        assert_eq!(config.policy.rules, default_rules());
        assert_eq!(config.jail.backend, Backend::Direct);
        assert_eq!(config.jail.filesystem, FilesystemIsolation::Required);
        assert!(config.jail.read_only.contains(&PathBuf::from("/usr")));
        assert!(!config.jail.read_only.iter().any(|x| x.starts_with("/tmp")));
    }

    #[test]
    fn partial_section() {
        let config: GlobalConfig = toml::from_str(
            r#"
            [limits]
            wall_clock_timeout_ms = 1000

            [jail]
            network = "required"
            filesystem = "bestEffort"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.wall_clock_timeout_ms, 1000);
        assert_eq!(config.limits.max_output_bytes, ExecutionLimits::default().max_output_bytes);
        assert_eq!(config.jail.network, NetworkIsolation::Required);
        assert_eq!(config.jail.filesystem, FilesystemIsolation::BestEffort);
        assert_eq!(config.jail.read_only, Jail::default().read_only);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(toml::from_str::<GlobalConfig>("[runtime]\nbind = \"0.0.0.0\"").is_err());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("config.toml");
        let mut config = GlobalConfig::default();
        config.admission.max_concurrent = 3;
        config.policy.mode = PolicyMode::Reject;
        config.save(&path).await.unwrap();

        let loaded = GlobalConfig::load(&path).await.unwrap();
        assert_eq!(loaded.admission.max_concurrent, 3);
        assert_eq!(loaded.policy.mode, PolicyMode::Reject);
        assert_eq!(loaded.policy.rules, config.policy.rules);
    }

    #[tokio::test]
    async fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GlobalConfig::load(dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.interpreter.program, "python3");
    }
}
