//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Comment error: {0}")]
    Comment(String),

    #[error("Video generation error: {0}")]
    Generation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }
}
