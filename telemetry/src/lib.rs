//! Observability helpers shared by backend services.
//!
//! # Overview
//! - [`context`]: request-scoped identity and environment values.
//! - [`logging`]: structured logging bound to a request context, emitted
//!   as `tracing` events.
//! - [`cloud`]: Cloud Logging JSON as a `tracing-subscriber` event format.
//! - [`trace`]: W3C trace parent handling and an OpenTelemetry tracer.
//! - [`errors`]: catalogue of identified service errors.
//! - [`subscriber`]: `tracing-subscriber` setup for the process.

pub mod cloud;
pub mod context;
pub mod errors;
pub mod logging;
pub mod subscriber;
pub mod trace;

pub use cloud::CloudFormat;
pub use context::RequestContext;
pub use errors::ServiceError;
pub use logging::{Logger, Record, Severity, TracingLogger};
pub use subscriber::{LogFormat, TelemetryConfig};
pub use trace::{extract_traceparent, HeaderSource, TraceParent, TraceParentError, Tracer};
