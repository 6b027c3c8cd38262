use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Execution result without a usable image key (missing field, wrong type,
    /// empty string or error sentinel)
    #[error("Invalid execution result: {0}")]
    InvalidResult(String),

    #[error("Image fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("Render failure: {0}")]
    RenderFailure(String),

    /// The host node is missing something the preview expects
    #[error("Host contract violation: {0}")]
    HostContractViolation(String),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    StringError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
