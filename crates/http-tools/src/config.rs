use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the outbound HTTP client used to call the downstream API.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    /// Connect timeout, in seconds.
    pub connect_timeout_secs: u64,

    /// Total request timeout (from send until the body is read), in seconds.
    pub read_timeout_secs: u64,

    /// `User-Agent` sent with every request. `None` sends no header.
    pub user_agent: Option<String>,

    /// Upper bound on downstream response bodies. `None` disables the limit.
    pub max_response_bytes: Option<usize>,
}

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_USER_AGENT: &str = "openapi-mcp";

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            max_response_bytes: None,
        }
    }
}

impl HttpClientConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
