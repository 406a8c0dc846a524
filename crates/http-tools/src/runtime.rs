//! Executes [`OutboundRequest`]s against the downstream API.

use crate::config::HttpClientConfig;
use crate::request::OutboundRequest;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("http transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

const PREFERRED_ACCEPT: &str = "application/json";

/// Status, media type and text body of a downstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpOutcome {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Whether the response declares a JSON media type (`application/json` or `*+json`).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|m| {
                m.subtype() == mime::JSON || m.suffix().is_some_and(|s| s == mime::JSON)
            })
    }
}

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: Url,
    user_agent: Option<String>,
    max_response_bytes: Option<usize>,
}

impl HttpExecutor {
    /// Build an executor for one downstream base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &HttpClientConfig, base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout() + config.read_timeout())
            .build()
            .map_err(|e| HttpToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent.clone().filter(|ua| !ua.is_empty()),
            max_response_bytes: config.max_response_bytes,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full request URL: base URL path, then the rendered operation path, then the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be rendered or the result is not a valid URL.
    pub fn request_url(&self, request: &OutboundRequest) -> Result<Url> {
        let path = request.render_path()?;
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut raw = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        if let Some(query) = request.query_string() {
            raw.push('?');
            raw.push_str(&query);
        }
        Url::parse(&raw).map_err(|e| HttpToolsError::Runtime(format!("invalid request URL: {e}")))
    }

    /// Send the request. Any HTTP status is a successful outcome; only transport-level
    /// failures are errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, sent, or its body read.
    pub async fn execute(
        &self,
        request: &OutboundRequest,
        authorization: Option<&str>,
    ) -> Result<HttpOutcome> {
        let url = self.request_url(request)?;
        tracing::debug!(method = %request.method, url = %redact_url(&url), "calling downstream API");

        let mut builder = self.client.request(request.method.clone(), url);

        for (name, value) in request.header_pairs() {
            builder = builder.header(name, value);
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(auth) = authorization.map(str::trim).filter(|a| !a.is_empty()) {
            builder = builder.header(AUTHORIZATION, auth);
            tracing::debug!("forwarding Authorization header to downstream API");
        }
        if let Some(ua) = &self.user_agent {
            builder = builder.header(USER_AGENT, ua);
        }
        if !request.has_header(ACCEPT.as_str()) {
            builder = builder.header(ACCEPT, PREFERRED_ACCEPT);
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(&body.content)
                .map_err(|e| HttpToolsError::Runtime(format!("failed to encode body: {e}")))?;
            builder = builder.header(CONTENT_TYPE, &body.content_type).body(bytes);
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_response_body_limited(response, self.max_response_bytes).await?;

        Ok(HttpOutcome {
            status,
            content_type,
            body,
        })
    }
}

async fn read_response_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<String> {
    let Some(max) = max_bytes else {
        return Ok(response.text().await?);
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(HttpToolsError::Http(format!(
            "Response too large: {len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(HttpToolsError::Http(format!(
                "Response too large: exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }

    String::from_utf8(out).map_err(|_| HttpToolsError::Http("Response is not valid UTF-8".into()))
}

/// Drop credentials, query and fragment so URLs are safe to log.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
