//! Error types for the adapter.

use openapi_mcp_http_tools::HttpToolsError;
use openapi_mcp_tools::OpenApiToolsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// Configuration errors (unreadable file, invalid YAML, missing fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine errors (document pipeline, tool compilation, base URL)
    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),

    /// Outbound HTTP client setup errors
    #[error(transparent)]
    Http(#[from] HttpToolsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
