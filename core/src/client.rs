//! Request building and execution over an injected transport.
//!
//! # Design
//! `Client` owns a transport handle, an optional bearer token and the
//! `Correlation` values to propagate. All three are fixed at construction;
//! `with_correlation` derives a new client that shares the same transport.
//! Building and executing are separate steps: `build*` methods produce an
//! `HttpRequest` the caller can inspect or adjust, and `execute` /
//! `execute_raw` send it. The `do_request*` helpers chain the two.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::correlation::Correlation;
use crate::error::ClientError;
use crate::message::{parse_method, Headers, HttpRequest, RawResponse, TransportResponse};
use crate::multipart::{self, MultipartFile};
use crate::transport::Transport;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// HTTP client that stamps auth and correlation headers on every request.
pub struct Client<T> {
    transport: Arc<T>,
    bearer_token: Option<String>,
    correlation: Correlation,
}

/// Configures a `Client` before it is created.
pub struct ClientBuilder<T> {
    transport: T,
    bearer_token: Option<String>,
    correlation: Correlation,
}

impl<T: Transport> ClientBuilder<T> {
    /// Send `Authorization: Bearer <token>`. An empty token disables the
    /// header.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into()).filter(|t| !t.is_empty());
        self
    }

    pub fn correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn build(self) -> Client<T> {
        Client {
            transport: Arc::new(self.transport),
            bearer_token: self.bearer_token,
            correlation: self.correlation,
        }
    }
}

impl<T: Transport> Client<T> {
    /// A client without a token or correlation values.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder {
            transport,
            bearer_token: None,
            correlation: Correlation::default(),
        }
    }

    /// Same transport and token, different correlation values.
    pub fn with_correlation(&self, correlation: Correlation) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            bearer_token: self.bearer_token.clone(),
            correlation,
        }
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token.is_some()
    }

    pub fn build(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<HttpRequest, ClientError> {
        self.build_with_headers(method, url, body, std::iter::empty::<(&str, &str)>())
    }

    /// Build a request with the standard headers, then apply `extra_headers`
    /// on top. An extra header with the same name as a standard one
    /// replaces it.
    pub fn build_with_headers<I, K, V>(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
        extra_headers: I,
    ) -> Result<HttpRequest, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = self.new_request(method, url, body.into())?;
        for (name, value) in extra_headers {
            request.headers.set(name.as_ref(), value.as_ref())?;
        }
        Ok(request)
    }

    /// Build a request and set `Content-Type` unless `content_type` is empty.
    pub fn build_with_content_type(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<HttpRequest, ClientError> {
        let mut request = self.build(method, url, body)?;
        if !content_type.is_empty() {
            request.headers.set(CONTENT_TYPE_HEADER, content_type)?;
        }
        Ok(request)
    }

    pub fn build_json<S: Serialize + ?Sized>(
        &self,
        method: &str,
        url: &str,
        payload: &S,
    ) -> Result<HttpRequest, ClientError> {
        let body = serde_json::to_vec(payload)?;
        self.build_with_content_type(method, url, body, "application/json")
    }

    /// Build a `multipart/form-data` request from `fields` followed by one
    /// file part.
    ///
    /// The body is fully encoded before the request is returned. A failure
    /// while reading the file aborts the build.
    pub fn build_multipart<I, K, V, R>(
        &self,
        method: &str,
        url: &str,
        fields: I,
        mut file: MultipartFile<R>,
    ) -> Result<HttpRequest, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
        R: Read,
    {
        let mut request = self.new_request(method, url, Vec::new())?;

        let encoded = multipart::encode(fields, &mut file).map_err(ClientError::Multipart)?;
        request.headers.set(CONTENT_TYPE_HEADER, &encoded.content_type)?;
        request.body = encoded.body;
        Ok(request)
    }

    /// Send `request` and return the body of a 2xx response.
    ///
    /// Transport failures come back as `ClientError::Transport` holding the
    /// transport's own error. Any other status yields `ClientError::Status`
    /// with the body the server sent.
    pub fn execute(&self, request: HttpRequest) -> Result<Vec<u8>, ClientError> {
        let response = self.execute_raw(request)?;
        if !(200..300).contains(&response.status) {
            return Err(ClientError::Status {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }

    /// Send `request` and return status and body whatever the status is.
    pub fn execute_raw(&self, request: HttpRequest) -> Result<RawResponse, ClientError> {
        let response = self
            .transport
            .send(request)
            .map_err(ClientError::Transport)?;
        read_fully(response)
    }

    pub fn do_request(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        self.execute(self.build(method, url, body)?)
    }

    pub fn do_request_with_headers<I, K, V>(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
        extra_headers: I,
    ) -> Result<Vec<u8>, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.execute(self.build_with_headers(method, url, body, extra_headers)?)
    }

    pub fn do_request_with_content_type(
        &self,
        method: &str,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.execute(self.build_with_content_type(method, url, body, content_type)?)
    }

    fn new_request(
        &self,
        method: &str,
        url: &str,
        body: Vec<u8>,
    ) -> Result<HttpRequest, ClientError> {
        let method = parse_method(method)?;
        Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut headers = Headers::new();
        if let Some(token) = &self.bearer_token {
            headers.set(AUTHORIZATION_HEADER, &format!("Bearer {token}"))?;
        }
        self.correlation.apply(&mut headers)?;

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

/// Drain the body; the stream is released when `response` goes out of
/// scope, on the error path as well.
fn read_fully(mut response: TransportResponse) -> Result<RawResponse, ClientError> {
    let mut body = Vec::new();
    if let Err(source) = response.body.read_to_end(&mut body) {
        return Err(ClientError::BodyRead {
            status: response.status,
            partial: body,
            source,
        });
    }
    Ok(RawResponse {
        status: response.status,
        headers: response.headers,
        body,
    })
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            bearer_token: self.bearer_token.clone(),
            correlation: self.correlation.clone(),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("correlation", &self.correlation)
            .finish_non_exhaustive()
    }
}
