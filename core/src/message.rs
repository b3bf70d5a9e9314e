//! HTTP request and response types exchanged with a `Transport`.
//!
//! # Design
//! Requests are plain data: the client builds an `HttpRequest` and hands it
//! to whatever `Transport` the caller injected. Methods, header names and
//! header values are the `http` crate's types, so anything that would not
//! survive on the wire is rejected while the request is built. Responses
//! come back with the body still unread so the executor decides how much of
//! it to buffer and when the stream is released (on drop).

use std::fmt;
use std::io::Read;

use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::error::ClientError;

/// Parse a method name. Any valid HTTP token is accepted; which methods can
/// actually be sent is up to the transport.
pub fn parse_method(method: &str) -> Result<Method, ClientError> {
    Method::from_bytes(method.as_bytes()).map_err(|source| ClientError::InvalidMethod {
        method: method.to_string(),
        source,
    })
}

/// Header map with ASCII case-insensitive names.
///
/// `set` replaces every value stored under a name, so the last write wins.
/// `append` keeps earlier values, which is how repeated response headers
/// such as `Set-Cookie` are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(HeaderMap);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ClientError> {
        let (name, value) = parse_header(name, value)?;
        self.0.insert(name, value);
        Ok(())
    }

    /// Add a value for `name` without dropping the ones already present.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), ClientError> {
        let (name, value) = parse_header(name, value)?;
        self.0.append(name, value);
        Ok(())
    }

    /// First value for `name`, if it is visible ASCII.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name)?.to_str().ok()
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .get_all(name)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> header::Iter<'_, HeaderValue> {
        self.0.iter()
    }

    /// Number of values, counting each repeated value separately.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_header_map(&self) -> &HeaderMap {
        &self.0
    }

    pub fn into_header_map(self) -> HeaderMap {
        self.0
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ClientError> {
    let invalid = |source: http::Error| ClientError::InvalidHeader {
        name: name.to_string(),
        source,
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.into()))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.into()))?;
    Ok((header_name, header_value))
}

/// An outbound request described as plain data.
///
/// Built by `Client::build*` methods and owned by the caller until it is
/// passed to `Client::execute` or `Client::execute_raw`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// A response as returned by a `Transport`, body not yet read.
///
/// The body stream is closed when this value is dropped.
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Box<dyn Read>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Read + 'static) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Box::new(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A fully buffered response returned by `Client::execute_raw`, whatever
/// its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}
