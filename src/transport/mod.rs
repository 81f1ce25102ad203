//! Transport module: the network seam underneath the request gateway.
//!
//! [`Transport`] sends one fully prepared [`Request`] and returns the raw
//! [`Response`]; it applies no credential or status policy of its own.
//! [`HttpTransport`] wraps `reqwest::blocking::Client` against a base URL;
//! [`memory::MemoryTransport`] answers from scripted responses in-process.

pub mod memory;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::ClientError;

/// What a caller asks the gateway to send. Borrowed, never modified.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }
}

/// A request after the gateway has merged headers and injected credentials.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path and query relative to the server root, e.g. `/expenses`.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// JSON response with the given status code.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Self, ClientError> {
        let mut response = Self::new(status, serde_json::to_vec(body)?);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response, ClientError>;
}

/// HTTP transport for a single ExpenseOwl server.
///
/// Timeouts are reqwest's defaults.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://localhost:8080/`. Targets
    /// are resolved relative to it, so a path prefix on the base is kept.
    pub fn new(mut base_url: Url) -> Result<Self, ClientError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(ClientError::network)?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, target: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(target.trim_start_matches('/'))
            .map_err(ClientError::network)
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request) -> Result<Response, ClientError> {
        let url = self.resolve(&request.target)?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(ClientError::network)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(ClientError::network)?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
