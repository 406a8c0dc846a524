//! Error types for `openapi-mcp-tools`.

use thiserror::Error;

/// Main error type for the compilation and synchronization engine.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid config, missing fields, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The document could not be read, parsed or resolved.
    #[error("Invalid OpenAPI specification '{location}': {}", .messages.join("; "))]
    InvalidSpecification {
        location: String,
        messages: Vec<String>,
    },

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A filter in the document filter chain failed; the pipeline run is aborted.
    #[error("OpenAPI spec filtering failed by filter: {filter}")]
    Filter {
        filter: String,
        #[source]
        source: Box<OpenApiToolsError>,
    },

    /// One operation could not be compiled into a tool; the whole catalog build fails.
    #[error(
        "Unable to register tool for operation: {method} {path}. Error determining tool name: {message}"
    )]
    ToolRegistration {
        method: String,
        path: String,
        message: String,
    },

    /// A naming strategy could not produce a name.
    #[error("{0}")]
    Naming(String),

    /// The downstream API base URL could not be determined.
    #[error("API base URL error: {0}")]
    BaseUrl(String),

    /// The tool-call chain ran out of links without producing a result.
    #[error("Tool call filter chain for '{0}' exhausted without a result")]
    ChainExhausted(String),

    /// HTTP errors (failed downstream calls).
    #[error("HTTP error: {0}")]
    Http(#[from] openapi_mcp_http_tools::HttpToolsError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OpenApiToolsError {
    pub(crate) fn invalid_spec(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            location: location.into(),
            messages: vec![message.into()],
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
