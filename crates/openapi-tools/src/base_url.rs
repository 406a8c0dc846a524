use crate::config::ApiBaseUrlConfig;
use crate::document::SpecDocument;
use crate::error::{OpenApiToolsError, Result};
use serde_json::Value;
use url::Url;

/// Base URL for downstream calls.
///
/// Server URLs have their `{variables}` replaced by the declared defaults. A relative server
/// URL is joined against the document location when the document came from http(s).
///
/// # Errors
///
/// Returns [`OpenApiToolsError::BaseUrl`] if the document has no usable server or the URL is
/// invalid.
pub fn resolve_api_base_url(
    config: Option<&ApiBaseUrlConfig>,
    document: &SpecDocument,
    spec_location: &str,
) -> Result<Url> {
    let raw = match config {
        Some(ApiBaseUrlConfig::Explicit(url)) => url.trim().to_string(),
        Some(ApiBaseUrlConfig::ServerIndex(index)) => server_url(document, *index)?,
        None => server_url(document, 0)?,
    };
    if raw.is_empty() {
        return Err(OpenApiToolsError::BaseUrl("API base URL is empty".into()));
    }

    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => Err(OpenApiToolsError::BaseUrl(format!(
            "Invalid URL: {raw}. Unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(url::ParseError::RelativeUrlWithoutBase) => join_relative(&raw, spec_location),
        Err(e) => Err(OpenApiToolsError::BaseUrl(format!("Invalid URL: {raw}. {e}"))),
    }
}

fn server_url(document: &SpecDocument, index: usize) -> Result<String> {
    let servers = document
        .value()
        .get("servers")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OpenApiToolsError::BaseUrl(
                "No servers defined in OpenAPI specification. Please either define servers in your OpenAPI spec or provide an explicit apiBaseUrl."
                    .into(),
            )
        })?;
    let server = servers.get(index).ok_or_else(|| {
        OpenApiToolsError::BaseUrl(format!(
            "Server index {index} is out of bounds. OpenAPI spec has {} server(s) defined. Valid indices are 0-{}.",
            servers.len(),
            servers.len() - 1
        ))
    })?;
    let url = server
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            OpenApiToolsError::BaseUrl(format!("Server at index {index} has no URL defined"))
        })?;
    Ok(substitute_variables(url, server.get("variables")))
}

fn substitute_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(variables) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };
    let mut out = url.to_string();
    for (name, variable) in variables {
        if let Some(default) = variable.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{name}}}"), default);
        }
    }
    out
}

fn join_relative(raw: &str, spec_location: &str) -> Result<Url> {
    if !(spec_location.starts_with("http://") || spec_location.starts_with("https://")) {
        return Err(OpenApiToolsError::BaseUrl(format!(
            "Invalid URL: {raw}. Relative server URLs need an http(s) spec location (set apiBaseUrl explicitly)"
        )));
    }
    let mut spec_url = Url::parse(spec_location)
        .map_err(|e| OpenApiToolsError::BaseUrl(format!("Invalid OpenAPI spec URL: {e}")))?;
    spec_url.set_fragment(None);
    spec_url
        .join(raw)
        .map_err(|e| OpenApiToolsError::BaseUrl(format!("Invalid URL: {raw}. {e}")))
}
