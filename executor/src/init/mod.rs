use thiserror::Error;

use crate::sandbox::LimitError;

pub mod check;
pub mod config;
pub mod logger;

/// Load the global config, start logging and check the host
pub async fn new() -> Result<&'static config::GlobalConfig, Error> {
    let config = config::init().await?;
    logger::init(config.log_level);
    check::check(config)?;
    Ok(config)
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Fail to read config: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("Fail to parse config: `{0}`")]
    Parse(#[from] toml::de::Error),
    #[error("Fail to serialize config: `{0}`")]
    Serialize(#[from] toml::ser::Error),
    #[error("config have been set twice")]
    AlreadySet,
    #[error("unmeet system requirements: {0}")]
    SystemIncapable(String),
    #[error("invalid default limits: {0}")]
    Limits(#[from] LimitError),
    #[error("invalid policy rule: {0}")]
    Policy(#[from] regex::Error),
}
