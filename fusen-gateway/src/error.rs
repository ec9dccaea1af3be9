use fusen_gateway_common::error::ConfigError;
use fusen_gateway_register::error::RegisterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("url must not be empty")]
    EmptyUrl,

    #[error("compile schema {file} : {source}")]
    Schema {
        file: String,
        #[source]
        source: protox::Error,
    },

    #[error("Config : {0}")]
    Config(#[from] ConfigError),

    #[error("Register : {0}")]
    Register(#[from] RegisterError),

    #[error("Io : {0}")]
    Io(#[from] std::io::Error),

    #[error("Error : {0}")]
    Error(Box<dyn std::error::Error + Send + Sync>),
}
