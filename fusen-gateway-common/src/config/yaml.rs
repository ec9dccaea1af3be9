use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::ConfigError;

pub fn get_yaml_by_context<T: DeserializeOwned>(yaml_context: &str) -> Result<T, ConfigError> {
    let parsed_yaml: Value = serde_yaml::from_str(yaml_context)?;
    Ok(T::deserialize(parsed_yaml)?)
}
