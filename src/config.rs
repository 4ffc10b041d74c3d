use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;

/// Reference batch size for fact inserts.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default location of the retail export, relative to the working directory.
pub const DEFAULT_INPUT_PATH: &str = "data/online_retail.csv";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_INPUT_PATH),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub batch_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Loads `etl.toml` from the working directory when present, falling
    /// back to defaults otherwise. Warehouse credentials are environment
    /// variables, not file config.
    pub fn load() -> Result<Self> {
        let config_path = "etl.toml";
        match std::fs::read_to_string(config_path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(_) => Ok(Config::default()),
        }
    }
}
