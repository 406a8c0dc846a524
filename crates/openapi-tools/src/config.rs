use crate::error::{OpenApiToolsError, Result};
use openapi_mcp_http_tools::config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpClientConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr as _;

/// Top-level configuration for one `OpenAPI`-backed MCP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiMcpConfig {
    /// `OpenAPI` document location (http(s) URL, `file://` URL or file path).
    pub open_api_url: String,

    /// Downstream API base URL. See [`ApiBaseUrlConfig`].
    #[serde(default)]
    pub api_base_url: Option<ApiBaseUrlConfig>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub max_response_bytes: Option<usize>,

    /// Optional `sha256:<hex>` digest the fetched document must match.
    #[serde(default)]
    pub spec_hash: Option<String>,

    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Per-filter toggles keyed by filter name. Unlisted filters are enabled.
    #[serde(default)]
    pub filters: HashMap<String, bool>,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub live_reload: LiveReloadConfig,

    #[serde(default)]
    pub scope_discovery: ScopeDiscoveryConfig,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

#[allow(clippy::unnecessary_wraps)]
fn default_user_agent() -> Option<String> {
    Some(DEFAULT_USER_AGENT.to_string())
}

impl OpenApiMcpConfig {
    /// Config with defaults for everything except the document location.
    #[must_use]
    pub fn new(open_api_url: impl Into<String>) -> Self {
        Self {
            open_api_url: open_api_url.into(),
            api_base_url: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            max_response_bytes: None,
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            filters: HashMap::new(),
            tools: ToolsConfig::default(),
            live_reload: LiveReloadConfig::default(),
            scope_discovery: ScopeDiscoveryConfig::default(),
        }
    }

    #[must_use]
    pub fn is_filter_enabled(&self, filter_name: &str) -> bool {
        self.filters.get(filter_name).copied().unwrap_or(true)
    }

    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            connect_timeout_secs: self.connect_timeout,
            read_timeout_secs: self.read_timeout,
            user_agent: self.user_agent.clone(),
            max_response_bytes: self.max_response_bytes,
        }
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.open_api_url.trim().is_empty() {
            return Err(OpenApiToolsError::Config(
                "openApiUrl must not be empty".into(),
            ));
        }
        if self.tools.naming.max_length == Some(0) {
            return Err(OpenApiToolsError::Config(
                "tools.naming.maxLength must be greater than 0".into(),
            ));
        }
        let schema = &self.tools.schema;
        if schema.parameters_key.is_empty() || schema.request_body_key.is_empty() {
            return Err(OpenApiToolsError::Config(
                "tools.schema keys must not be empty".into(),
            ));
        }
        if schema.parameters_key == schema.request_body_key {
            return Err(OpenApiToolsError::Config(format!(
                "tools.schema.parametersKey and requestBodyKey must differ (both '{}')",
                schema.parameters_key
            )));
        }
        if self.live_reload.max_retries == 0 {
            return Err(OpenApiToolsError::Config(
                "liveReload.maxRetries must be greater than 0".into(),
            ));
        }
        self.live_reload.schedule()?;
        Ok(())
    }
}

/// How the downstream API base URL is chosen.
///
/// - a number: the i-th entry of the document's `servers` (0-indexed)
/// - a string: used as-is, unless it is all digits (then treated as an index)
/// - absent: the first `servers` entry
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApiBaseUrlConfig {
    ServerIndex(usize),
    Explicit(String),
}

impl ApiBaseUrlConfig {
    /// Parse a CLI/env style value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if let Ok(index) = trimmed.parse::<usize>() {
            Some(Self::ServerIndex(index))
        } else {
            Some(Self::Explicit(trimmed.to_string()))
        }
    }
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail the read if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    pub naming: NamingConfig,
    pub schema: SchemaConfig,
    /// Retry once with unwrapped JSON strings when the API answers 400.
    pub json_double_serialization_mitigation: bool,
    /// Render the summary as a markdown heading above the description.
    pub prepend_summary_to_description: bool,
    /// Answer tool calls from document examples instead of calling the API.
    pub mock: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            naming: NamingConfig::default(),
            schema: SchemaConfig::default(),
            json_double_serialization_mitigation: true,
            prepend_summary_to_description: true,
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NamingStrategyKind {
    /// The operation id, verbatim.
    OperationId,
    /// The operation id, lowercased with punctuation collapsed to `_`.
    #[default]
    SanitizedOperationId,
    /// `<method>_<path>`.
    Endpoint,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamingConfig {
    pub strategy: NamingStrategyKind,
    pub max_length: Option<usize>,
}

pub const DEFAULT_PARAMETERS_KEY: &str = "parameters";
pub const DEFAULT_REQUEST_BODY_KEY: &str = "requestBody";

/// Envelope keys used when a tool has both parameters and a body.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaConfig {
    pub parameters_key: String,
    pub request_body_key: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            parameters_key: DEFAULT_PARAMETERS_KEY.to_string(),
            request_body_key: DEFAULT_REQUEST_BODY_KEY.to_string(),
        }
    }
}

pub const DEFAULT_CRON_EXPRESSION: &str = "0 */10 * * * *";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveReloadConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first), evaluated in UTC.
    pub cron_expression: String,
    /// Attempts per scheduled run. The run stops at the first success.
    pub max_retries: u32,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron_expression: DEFAULT_CRON_EXPRESSION.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl LiveReloadConfig {
    /// Parse the cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] if the expression is not valid cron syntax.
    pub fn schedule(&self) -> Result<cron::Schedule> {
        cron::Schedule::from_str(&self.cron_expression).map_err(|e| {
            OpenApiToolsError::Config(format!(
                "liveReload.cronExpression '{}' is invalid: {e}",
                self.cron_expression
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScopeAlgorithm {
    /// Request every discovered scope.
    #[default]
    None,
    /// Greedy minimal covering set.
    Greedy,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeDiscoveryConfig {
    pub enabled: bool,
    /// Comma-separated vendor extensions to read scopes from, in priority order.
    pub scope_extensions: String,
    /// Comma-separated scopes that are always required.
    pub mandatory_scopes: String,
    pub calculate_minimal_scopes: ScopeAlgorithm,
}

impl ScopeDiscoveryConfig {
    #[must_use]
    pub fn scope_extension_names(&self) -> Vec<String> {
        split_comma_list(&self.scope_extensions)
    }

    #[must_use]
    pub fn mandatory_scope_list(&self) -> Vec<String> {
        split_comma_list(&self.mandatory_scopes)
    }
}

pub(crate) fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_minimal_yaml() {
        let cfg: OpenApiMcpConfig =
            serde_yaml::from_str("openApiUrl: https://api.example.com/openapi.json").unwrap();
        assert_eq!(cfg.connect_timeout, 5);
        assert_eq!(cfg.read_timeout, 5);
        assert_eq!(cfg.user_agent.as_deref(), Some("openapi-mcp"));
        assert_eq!(cfg.tools.naming.strategy, NamingStrategyKind::SanitizedOperationId);
        assert_eq!(cfg.tools.schema.parameters_key, "parameters");
        assert_eq!(cfg.tools.schema.request_body_key, "requestBody");
        assert!(cfg.tools.json_double_serialization_mitigation);
        assert!(cfg.tools.prepend_summary_to_description);
        assert!(!cfg.tools.mock);
        assert!(!cfg.live_reload.enabled);
        assert_eq!(cfg.live_reload.cron_expression, "0 */10 * * * *");
        assert_eq!(cfg.live_reload.max_retries, 3);
        assert_eq!(cfg.scope_discovery.calculate_minimal_scopes, ScopeAlgorithm::None);
        assert!(cfg.is_filter_enabled("DiscriminatorFlattener"));
        cfg.validate().unwrap();
    }

    #[test]
    fn nested_sections_parse() {
        let yaml = r#"
openApiUrl: ./spec.yaml
apiBaseUrl: 1
filters:
  PatternPropertyRemover: false
tools:
  naming:
    strategy: endpoint
    maxLength: 32
  schema:
    parametersKey: _params
    requestBodyKey: _body
  mock: true
liveReload:
  enabled: true
  cronExpression: "*/30 * * * * *"
  maxRetries: 5
scopeDiscovery:
  enabled: true
  scopeExtensions: x-scopes, x-required-scopes
  mandatoryScopes: openid
  calculateMinimalScopes: greedy
"#;
        let cfg: OpenApiMcpConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.api_base_url, Some(ApiBaseUrlConfig::ServerIndex(1)));
        assert!(!cfg.is_filter_enabled("PatternPropertyRemover"));
        assert_eq!(cfg.tools.naming.strategy, NamingStrategyKind::Endpoint);
        assert_eq!(cfg.tools.naming.max_length, Some(32));
        assert_eq!(cfg.tools.schema.parameters_key, "_params");
        assert!(cfg.tools.mock);
        assert_eq!(cfg.live_reload.max_retries, 5);
        assert_eq!(
            cfg.scope_discovery.scope_extension_names(),
            vec!["x-scopes".to_string(), "x-required-scopes".to_string()]
        );
        assert_eq!(cfg.scope_discovery.calculate_minimal_scopes, ScopeAlgorithm::Greedy);
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = OpenApiMcpConfig::new("spec.yaml");
        cfg.tools.naming.max_length = Some(0);
        assert!(cfg.validate().unwrap_err().to_string().contains("maxLength"));

        let mut cfg = OpenApiMcpConfig::new("spec.yaml");
        cfg.live_reload.max_retries = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("maxRetries"));

        let mut cfg = OpenApiMcpConfig::new("spec.yaml");
        cfg.live_reload.cron_expression = "not cron".into();
        assert!(cfg.validate().unwrap_err().to_string().contains("cronExpression"));

        let mut cfg = OpenApiMcpConfig::new("spec.yaml");
        cfg.tools.schema.request_body_key = "parameters".into();
        assert!(cfg.validate().is_err());

        assert!(OpenApiMcpConfig::new("  ").validate().is_err());
    }

    #[test]
    fn api_base_url_parse_distinguishes_index_and_url() {
        assert_eq!(ApiBaseUrlConfig::parse("2"), Some(ApiBaseUrlConfig::ServerIndex(2)));
        assert_eq!(
            ApiBaseUrlConfig::parse("https://api.example.com"),
            Some(ApiBaseUrlConfig::Explicit("https://api.example.com".into()))
        );
        assert_eq!(ApiBaseUrlConfig::parse(""), None);
    }
}
