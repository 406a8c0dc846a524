//! Tool naming strategies.

use crate::config::{NamingConfig, NamingStrategyKind};
use crate::error::{OpenApiToolsError, Result};
use crate::operation::OperationRef;

/// Turns an operation into a tool identifier.
pub trait NamingStrategy: Send + Sync {
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Naming`] when the operation carries nothing usable.
    fn name(&self, operation: &OperationRef) -> Result<String>;
}

/// The `operationId`, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationIdStrategy;

impl NamingStrategy for OperationIdStrategy {
    fn name(&self, operation: &OperationRef) -> Result<String> {
        let id = require_operation_id(operation)?;
        if id.trim().is_empty() {
            return Err(OpenApiToolsError::Naming(
                "Operation ID is empty or contains only whitespace - cannot determine how to proceed with naming."
                    .into(),
            ));
        }
        Ok(id.to_string())
    }
}

/// The `operationId`, lowercased, with runs of non-alphanumerics collapsed into one `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizedOperationIdStrategy;

impl SanitizedOperationIdStrategy {
    #[must_use]
    pub fn sanitize(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c.is_alphanumeric() {
                out.extend(c.to_lowercase());
            } else if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        if out.ends_with('_') {
            out.pop();
        }
        out
    }
}

impl NamingStrategy for SanitizedOperationIdStrategy {
    fn name(&self, operation: &OperationRef) -> Result<String> {
        let id = require_operation_id(operation)?;
        let name = Self::sanitize(id);
        if name.is_empty() {
            return Err(OpenApiToolsError::Naming(format!(
                "Operation ID '{id}' contains no valid alphanumeric characters - cannot generate a valid name."
            )));
        }
        Ok(name)
    }
}

/// `{method}_{path}`: `/` and `-` become `_` (the leading slash is dropped), other
/// punctuation is removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointStrategy;

impl NamingStrategy for EndpointStrategy {
    fn name(&self, operation: &OperationRef) -> Result<String> {
        let method = operation.method.as_str().to_lowercase();
        let mut out = String::with_capacity(method.len() + operation.path.len() + 1);
        out.push_str(&method);
        out.push('_');
        for (i, c) in operation.path.chars().enumerate() {
            match c {
                '/' if i > 0 => out.push('_'),
                '/' => {}
                '-' => out.push('_'),
                c if c.is_alphanumeric() || c == '_' => out.extend(c.to_lowercase()),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Truncates the delegate's name to at most `max_length` characters.
pub struct TrimNamingStrategy {
    delegate: Box<dyn NamingStrategy>,
    max_length: usize,
}

impl TrimNamingStrategy {
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] if `max_length` is zero.
    pub fn new(delegate: Box<dyn NamingStrategy>, max_length: usize) -> Result<Self> {
        if max_length == 0 {
            return Err(OpenApiToolsError::Config(
                "Max length must be greater than 0".into(),
            ));
        }
        Ok(Self {
            delegate,
            max_length,
        })
    }
}

impl NamingStrategy for TrimNamingStrategy {
    fn name(&self, operation: &OperationRef) -> Result<String> {
        let name = self.delegate.name(operation)?;
        Ok(name.chars().take(self.max_length).collect())
    }
}

/// Build the strategy selected by `config`, trimmed when `maxLength` is set.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::Config`] for a zero `maxLength`.
pub fn naming_strategy(config: &NamingConfig) -> Result<Box<dyn NamingStrategy>> {
    let base: Box<dyn NamingStrategy> = match config.strategy {
        NamingStrategyKind::OperationId => Box::new(OperationIdStrategy),
        NamingStrategyKind::SanitizedOperationId => Box::new(SanitizedOperationIdStrategy),
        NamingStrategyKind::Endpoint => Box::new(EndpointStrategy),
    };
    match config.max_length {
        Some(max) => Ok(Box::new(TrimNamingStrategy::new(base, max)?)),
        None => Ok(base),
    }
}

fn require_operation_id(operation: &OperationRef) -> Result<&str> {
    operation.operation_id().ok_or_else(|| {
        OpenApiToolsError::Naming(
            "Operation ID is null - cannot determine how to proceed with naming.".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SpecDocument;
    use reqwest::Method;
    use serde_json::{Map, json};
    use std::sync::Arc;

    fn op(method: Method, path: &str, operation_id: Option<&str>) -> OperationRef {
        let operation = match operation_id {
            Some(id) => json!({"operationId": id}),
            None => json!({}),
        };
        OperationRef::new(
            path,
            method,
            &Map::new(),
            operation,
            Arc::new(SpecDocument::new(json!({}))),
        )
    }

    #[test]
    fn operation_id_is_verbatim_and_required() {
        let s = OperationIdStrategy;
        assert_eq!(s.name(&op(Method::GET, "/", Some("GetUser"))).unwrap(), "GetUser");
        assert!(s.name(&op(Method::GET, "/", None)).unwrap_err().to_string().contains("null"));
        assert!(s.name(&op(Method::GET, "/", Some("  "))).is_err());
    }

    #[test]
    fn sanitized_operation_id() {
        let s = SanitizedOperationIdStrategy;
        let name = |id| s.name(&op(Method::GET, "/", Some(id))).unwrap();
        assert_eq!(name("GetUserProfile"), "getuserprofile");
        assert_eq!(name("Create-User Profile"), "create_user_profile");
        assert_eq!(name("__Update__User__"), "update_user");
        assert_eq!(name("send_sms_message"), "send_sms_message");
        assert!(s.name(&op(Method::GET, "/", Some("--!!--"))).is_err());
    }

    #[test]
    fn sanitizing_is_idempotent() {
        for raw in ["Create-User Profile", "a..b", "x_1_y", "ÄpfelÜber-Straße"] {
            let once = SanitizedOperationIdStrategy::sanitize(raw);
            assert_eq!(SanitizedOperationIdStrategy::sanitize(&once), once, "{raw}");
        }
    }

    #[test]
    fn endpoint_names() {
        let s = EndpointStrategy;
        assert_eq!(s.name(&op(Method::POST, "/sms/3/messages", None)).unwrap(), "post_sms_3_messages");
        assert_eq!(s.name(&op(Method::GET, "/users/{id}/profile", None)).unwrap(), "get_users_id_profile");
        assert_eq!(
            s.name(&op(Method::DELETE, "/api/v1/user-accounts", None)).unwrap(),
            "delete_api_v1_user_accounts"
        );
    }

    #[test]
    fn trimming_takes_a_prefix() {
        let trimmed = TrimNamingStrategy::new(Box::new(OperationIdStrategy), 10).unwrap();
        assert_eq!(
            trimmed.name(&op(Method::GET, "/", Some("very_long_operation_name"))).unwrap(),
            "very_long_"
        );
        assert_eq!(trimmed.name(&op(Method::GET, "/", Some("short"))).unwrap(), "short");
        assert!(TrimNamingStrategy::new(Box::new(OperationIdStrategy), 0).is_err());
    }

    #[test]
    fn factory_honours_config() {
        let config = NamingConfig {
            strategy: NamingStrategyKind::Endpoint,
            max_length: Some(8),
        };
        let s = naming_strategy(&config).unwrap();
        assert_eq!(s.name(&op(Method::GET, "/users/{id}", None)).unwrap(), "get_user");
    }
}
