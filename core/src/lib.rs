//! Outbound HTTP client shared by backend services.
//!
//! # Overview
//! Builds requests that carry the service's bearer token and correlation
//! headers, sends them through a caller-supplied `Transport`, and turns
//! non-2xx answers into errors that keep the server's response body.
//!
//! # Design
//! - `Client` is immutable after construction. The token and the
//!   `Correlation` values are passed in explicitly; nothing is read from the
//!   process environment behind the caller's back.
//! - Building (`build*`) and sending (`execute`, `execute_raw`) are split so
//!   requests can be inspected in tests without any I/O.
//! - The response stream is always drained and dropped inside the executor.
//! - No retries, no logging, no timeouts at this layer; the transport owns
//!   deadlines and the caller owns retry policy.

pub mod client;
pub mod correlation;
pub mod error;
pub mod message;
pub mod multipart;
pub mod query;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use correlation::Correlation;
pub use error::{ClientError, TransportError};
pub use message::{parse_method, Headers, HttpRequest, RawResponse, TransportResponse};
pub use multipart::{MultipartBody, MultipartFile};
pub use query::build_url;
pub use transport::{Transport, UreqTransport};

pub use http::Method;
