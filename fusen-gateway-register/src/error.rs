use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Error : {0}")]
    Error(Box<dyn std::error::Error + Send + Sync>),

    #[error("not find node : {0}")]
    NotFound(String),

    #[error("decode service instance {path} : {message}")]
    Decode { path: String, message: String },
}
