//! The pluggable transport behind `Client`.
//!
//! # Design
//! `Transport` is the only I/O seam: anything that can turn an `HttpRequest`
//! into a `TransportResponse` can back a client. Deadlines, proxies and TLS
//! are the transport's business. `UreqTransport` provides a blocking
//! implementation on top of `ureq`.

use std::sync::Arc;

use crate::error::TransportError;
use crate::message::{HttpRequest, TransportResponse};

/// Sends a request and returns the response, or the failure that prevented
/// one from arriving.
///
/// A response with a non-2xx status is still a response. Implementations
/// must not turn it into an error.
pub trait Transport {
    fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

pub use self::ureq_transport::UreqTransport;

mod ureq_transport {
    use std::time::Duration;

    use http::Method;
    use ureq::http::Response;
    use ureq::typestate::{WithBody, WithoutBody};
    use ureq::{Body, RequestBuilder};

    use super::Transport;
    use crate::error::TransportError;
    use crate::message::{Headers, HttpRequest, TransportResponse};

    /// Blocking transport backed by a `ureq::Agent`.
    ///
    /// Status codes are returned as data (`http_status_as_error` is off) so
    /// that the client decides what a non-2xx answer means. A body is sent
    /// whenever the request has one, including on `GET` and `DELETE`.
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new() -> Self {
            Self::build(None)
        }

        /// Every request fails once `timeout` has elapsed end to end.
        pub fn with_timeout(timeout: Duration) -> Self {
            Self::build(Some(timeout))
        }

        fn build(timeout: Option<Duration>) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Debug for UreqTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("UreqTransport").finish_non_exhaustive()
        }
    }

    impl Transport for UreqTransport {
        fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let url = url.as_str();
            let agent = &self.agent;

            let response = match method {
                Method::GET => optional_body(agent.get(url), &headers, &body),
                Method::HEAD => optional_body(agent.head(url), &headers, &body),
                Method::DELETE => optional_body(agent.delete(url), &headers, &body),
                Method::OPTIONS => optional_body(agent.options(url), &headers, &body),
                Method::TRACE => optional_body(agent.trace(url), &headers, &body),
                Method::POST => with_body(agent.post(url), &headers, &body),
                Method::PUT => with_body(agent.put(url), &headers, &body),
                Method::PATCH => with_body(agent.patch(url), &headers, &body),
                other => return Err(format!("method {other} is not supported by ureq").into()),
            }?;

            let status = response.status().as_u16();
            let headers = Headers::from(response.headers().clone());
            let body = response.into_body().into_reader();

            Ok(TransportResponse {
                status,
                headers,
                body: Box::new(body),
            })
        }
    }

    fn optional_body(
        builder: RequestBuilder<WithoutBody>,
        headers: &Headers,
        body: &[u8],
    ) -> Result<Response<Body>, ureq::Error> {
        let builder = with_headers(builder, headers);
        if body.is_empty() {
            builder.call()
        } else {
            builder.force_send_body().send(body)
        }
    }

    fn with_body(
        builder: RequestBuilder<WithBody>,
        headers: &Headers,
        body: &[u8],
    ) -> Result<Response<Body>, ureq::Error> {
        with_headers(builder, headers).send(body)
    }

    fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &Headers) -> RequestBuilder<B> {
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        builder
    }
}
