use serde::de::DeserializeOwned;
use ::toml::Value;

use crate::error::ConfigError;

pub fn get_toml_by_context<T: DeserializeOwned>(toml_context: &str) -> Result<T, ConfigError> {
    // toml -> json
    let parsed_toml: Value = ::toml::from_str(toml_context)?;
    let json = serde_json::to_value(parsed_toml)?;
    Ok(T::deserialize(json)?)
}
