use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config file {path} : {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not support config file type : {0}")]
    Unsupported(String),

    #[error("toml error : {0}")]
    Toml(#[from] toml::de::Error),

    #[error("yaml error : {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error : {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config : {0}")]
    Invalid(String),
}
