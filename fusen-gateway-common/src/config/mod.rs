use std::{fs, path::Path};

use serde::de::DeserializeOwned;
use tracing::debug;
use self::toml::get_toml_by_context;
use self::yaml::get_yaml_by_context;

use crate::error::ConfigError;

pub mod toml;
pub mod yaml;

/// Reads a `.toml`, `.yaml`/`.yml` or `.json` file into `T`.
pub fn get_config_by_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    debug!("read config file {}", path.display());
    get_config_by_context(&contents, &file_type)
}

pub fn get_config_by_context<T: DeserializeOwned>(
    contents: &str,
    file_type: &str,
) -> Result<T, ConfigError> {
    match file_type {
        "toml" => get_toml_by_context(contents),
        "yaml" | "yml" => get_yaml_by_context(contents),
        "json" => Ok(serde_json::from_str(contents)?),
        file_type => Err(ConfigError::Unsupported(file_type.to_owned())),
    }
}
