//! Bridge error types

use nether_resample::ConfigurationError;
use thiserror::Error;

use crate::config::ConfigFileError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid audio configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("config file error: {0}")]
    ConfigFile(#[from] ConfigFileError),

    #[error("invalid bridge setting: {0}")]
    InvalidSetting(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread is not running")]
    ThreadGone(&'static str),

    #[error("audio device error: {0}")]
    Device(String),
}
