//! Error types for the request client.
//!
//! # Design
//! Two families share one enum. Construction errors come from malformed
//! caller input and are never retryable. Execution errors come from the
//! transport or from the server's answer: `Transport` passes the transport's
//! own error through untouched, `Status` carries the non-2xx code and the
//! body the server sent, and `BodyRead` covers a stream that broke after
//! the status line arrived.

use std::io;

/// Error produced by a `Transport` implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `Client` operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The method is not a valid HTTP token.
    #[error("invalid HTTP method {method:?}")]
    InvalidMethod {
        method: String,
        #[source]
        source: http::method::InvalidMethod,
    },

    /// The URL could not be parsed as an absolute URL.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value cannot be sent on the wire.
    #[error("invalid header {name:?}: {source}")]
    InvalidHeader {
        name: String,
        #[source]
        source: http::Error,
    },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encoding the multipart body failed, usually because the file stream
    /// returned an error.
    #[error("multipart encoding failed: {0}")]
    Multipart(#[source] io::Error),

    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(TransportError),

    /// The server answered with a status outside `200..300`.
    #[error("status {status}{}", body_message(.body))]
    Status { status: u16, body: Vec<u8> },

    /// The response body could not be read to the end.
    #[error("reading response body failed (status {status}): {source}")]
    BodyRead {
        status: u16,
        partial: Vec<u8>,
        #[source]
        source: io::Error,
    },
}

impl ClientError {
    /// True for errors raised while building a request.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidMethod { .. }
                | ClientError::InvalidUrl { .. }
                | ClientError::InvalidHeader { .. }
                | ClientError::Serialization(_)
                | ClientError::Multipart(_)
        )
    }

    /// The HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } | ClientError::BodyRead { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

fn body_message(body: &[u8]) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(", message {}", String::from_utf8_lossy(body))
    }
}
