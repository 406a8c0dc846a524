//! Adapter configuration file.

use crate::error::{AdapterError, Result};
use openapi_mcp_tools::config::OpenApiMcpConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How connected clients learn about catalog changes.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Sessions are tracked and receive `notifications/tools/list_changed`.
    #[default]
    Stateful,
    /// No sessions; clients re-list tools themselves.
    Stateless,
}

/// The engine configuration plus adapter-only knobs, all at the top level of one YAML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    #[serde(flatten)]
    pub engine: OpenApiMcpConfig,

    #[serde(default)]
    pub session_mode: SessionMode,
}

impl AdapterConfig {
    /// Read `path` (if any), apply the `spec` override and validate.
    ///
    /// Without a config file every setting takes its default and `spec` is required.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, no spec location is known, or
    /// the engine rejects the configuration.
    pub fn load(path: Option<&Path>, spec: Option<&str>) -> Result<Self> {
        let mut root = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AdapterError::Config(format!(
                        "failed to read config file '{}': {e}",
                        path.display()
                    ))
                })?;
                serde_yaml::from_str::<serde_yaml::Value>(&raw)?
            }
            None => serde_yaml::Value::Null,
        };
        if root.is_null() {
            root = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        let Some(map) = root.as_mapping_mut() else {
            return Err(AdapterError::Config(
                "config file must contain a YAML mapping".into(),
            ));
        };
        if let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) {
            map.insert(
                serde_yaml::Value::String("openApiUrl".into()),
                serde_yaml::Value::String(spec.to_string()),
            );
        }
        if map.get("openApiUrl").is_none() {
            return Err(AdapterError::Config(
                "openApiUrl is required (set it in the config file or pass --spec)".into(),
            ));
        }

        let config: Self = serde_yaml::from_value(root)?;
        config.engine.validate()?;
        Ok(config)
    }
}
