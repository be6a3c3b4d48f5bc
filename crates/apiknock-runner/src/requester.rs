//! Outbound requests, credential injection, and the HTTP transport

use std::time::Duration;

use apiknock_core::{Credential, Response};
use serde_json::Value;

/// A fully resolved request, ready to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundRequest {
    /// Uppercase HTTP verb
    pub method: String,
    /// Absolute URL without query string
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OutboundRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.cookies, name)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

/// How a credential travels. One mode per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Raw credential in the named header
    Header(String),
    /// `Authorization: Bearer <credential>`
    Bearer,
    /// Credential as the named cookie
    Cookie(String),
    /// Credential as the named query parameter
    Query(String),
}

impl AuthMode {
    /// Inject `credential`, replacing any same-name entry the request already carries.
    pub fn apply(&self, request: &mut OutboundRequest, credential: &Credential) {
        let secret = credential.expose().to_string();
        match self {
            Self::Header(name) => {
                request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
                request.headers.push((name.clone(), secret));
            }
            Self::Bearer => {
                request
                    .headers
                    .retain(|(k, _)| !k.eq_ignore_ascii_case("authorization"));
                request
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {secret}")));
            }
            Self::Cookie(name) => {
                request.cookies.retain(|(k, _)| k != name);
                request.cookies.push((name.clone(), secret));
            }
            Self::Query(name) => {
                request.query.retain(|(k, _)| k != name);
                request.query.push((name.clone(), secret));
            }
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Header(name) => write!(f, "header {name}"),
            Self::Bearer => write!(f, "bearer"),
            Self::Cookie(name) => write!(f, "cookie {name}"),
            Self::Query(name) => write!(f, "query {name}"),
        }
    }
}

/// Sends one request and returns the observed response.
pub trait Requester {
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    fn dispatch(&mut self, request: &OutboundRequest) -> Result<Response, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Client(String),
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("header '{0}' has a value that is not valid HTTP header text")]
    InvalidHeader(String),
    #[error("{method} {url}: {reason}")]
    Send {
        method: String,
        url: String,
        reason: String,
    },
}

/// Blocking reqwest transport.
#[derive(Debug)]
pub struct HttpRequester {
    client: reqwest::blocking::Client,
}

/// Builder for [`HttpRequester`].
#[derive(Debug, Clone)]
pub struct HttpRequesterBuilder {
    verify_certs: bool,
    proxy: Option<String>,
    timeout: Duration,
}

impl Default for HttpRequesterBuilder {
    fn default() -> Self {
        Self {
            verify_certs: true,
            proxy: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpRequesterBuilder {
    #[must_use]
    pub fn with_verify_certs(mut self, verify: bool) -> Self {
        self.verify_certs = verify;
        self
    }

    /// Route both http and https traffic through `proxy`.
    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns error if the proxy URL is invalid or the client cannot be built.
    pub fn build(self) -> Result<HttpRequester, TransportError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_certs);
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::Client(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if !self.verify_certs {
            tracing::warn!("TLS certificate verification disabled");
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(HttpRequester { client })
    }
}

impl HttpRequester {
    #[must_use]
    pub fn builder() -> HttpRequesterBuilder {
        HttpRequesterBuilder::default()
    }
}

impl Requester for HttpRequester {
    fn dispatch(&mut self, request: &OutboundRequest) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.clone()))?;

        let mut req = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            // The value may be a credential: refuse rather than send without it.
            if reqwest::header::HeaderValue::from_str(value).is_err() {
                return Err(TransportError::InvalidHeader(name.clone()));
            }
            req = req.header(name, value);
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            req = req.header(reqwest::header::COOKIE, cookie);
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let send_error = |e: reqwest::Error| TransportError::Send {
            method: request.method.clone(),
            url: request.url.clone(),
            reason: e.to_string(),
        };
        let resp = req.send().map_err(send_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(send_error)?;
        Ok(Response { status, body })
    }
}
