//! Structured logging bound to a `RequestContext`.
//!
//! # Design
//! A `Logger` receives the request context with every record, so request
//! id, flow id, root task id, service name and the active span end up on
//! each line without callers repeating them. A context may carry its own
//! logger; the free functions (`info`, `warn`, `error`, `report`) use it
//! when present and fall back to `TracingLogger` otherwise.
//!
//! `TracingLogger` only emits `tracing` events. Filtering and output format
//! belong to the subscriber (see `TelemetryConfig`); `LogFormat::Cloud`
//! renders these events in the Cloud Logging JSON format.

use std::backtrace::Backtrace;

use tracing::Level;

use crate::context::RequestContext;

/// Names of the event fields `TracingLogger` records.
pub mod fields {
    pub const APP: &str = "app";
    pub const REQUEST_ID: &str = "rid";
    pub const FLOW_ID: &str = "flow_id";
    pub const ROOT_TASK_ID: &str = "root_task_id";
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const TRACE_SAMPLED: &str = "trace_sampled";
    pub const STACK_TRACE: &str = "stack_trace";
}

/// Severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl From<Severity> for Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Level::INFO,
            Severity::Warning => Level::WARN,
            Severity::Error => Level::ERROR,
        }
    }
}

/// One log entry before it is bound to a context.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub severity: Severity,
    pub message: &'a str,
    /// Set for error reports.
    pub stack_trace: Option<&'a str>,
}

impl<'a> Record<'a> {
    pub fn new(severity: Severity, message: &'a str) -> Self {
        Self {
            severity,
            message,
            stack_trace: None,
        }
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, ctx: &RequestContext, record: &Record<'_>);

    fn info(&self, ctx: &RequestContext, message: &str) {
        self.log(ctx, &Record::new(Severity::Info, message));
    }

    fn warn(&self, ctx: &RequestContext, message: &str) {
        self.log(ctx, &Record::new(Severity::Warning, message));
    }

    fn error(&self, ctx: &RequestContext, message: &str) {
        self.log(ctx, &Record::new(Severity::Error, message));
    }
}

/// Forwards records to the `tracing` subscriber installed by the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

macro_rules! emit {
    ($level:expr, $ctx:expr, $record:expr) => {{
        let span_context = $ctx.span_context();
        tracing::event!(
            $level,
            app = $ctx.service_name(),
            rid = $ctx.request_id(),
            flow_id = $ctx.flow_id(),
            root_task_id = $ctx.root_task_id(),
            trace_id = span_context.map(|sc| sc.trace_id().to_string()),
            span_id = span_context.map(|sc| sc.span_id().to_string()),
            trace_sampled = span_context.map(|sc| sc.is_sampled()),
            stack_trace = $record.stack_trace,
            "{}",
            $record.message
        )
    }};
}

impl Logger for TracingLogger {
    fn log(&self, ctx: &RequestContext, record: &Record<'_>) {
        match record.severity {
            Severity::Info => emit!(Level::INFO, ctx, record),
            Severity::Warning => emit!(Level::WARN, ctx, record),
            Severity::Error => emit!(Level::ERROR, ctx, record),
        }
    }
}

fn resolve(ctx: &RequestContext) -> &dyn Logger {
    match ctx.logger() {
        Some(logger) => &**logger,
        None => &TracingLogger,
    }
}

pub fn info(ctx: &RequestContext, message: &str) {
    resolve(ctx).info(ctx, message);
}

pub fn warn(ctx: &RequestContext, message: &str) {
    resolve(ctx).warn(ctx, message);
}

pub fn error(ctx: &RequestContext, message: &str) {
    resolve(ctx).error(ctx, message);
}

/// Log an error together with the current stack trace.
pub fn report(ctx: &RequestContext, message: &str) {
    let stack_trace = Backtrace::force_capture().to_string();
    resolve(ctx).log(
        ctx,
        &Record {
            severity: Severity::Error,
            message,
            stack_trace: Some(&stack_trace),
        },
    );
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use serde_json::Value;

    use super::*;
    use crate::cloud::{CloudFormat, REPORTED_ERROR_EVENT_TYPE};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Lines written while `f` runs under a Cloud-formatted subscriber.
    fn cloud_lines(f: impl FnOnce()) -> Vec<Value> {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(CloudFormat::new("proper-base"))
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn request_context() -> RequestContext {
        RequestContext::new()
            .with_service_name("ledgerlord")
            .with_request_id("rid-1")
            .with_flow_id("flow-1")
            .with_root_task_id("root-1")
    }

    /// Keeps every record it receives.
    #[derive(Default)]
    struct RecordingLogger(Mutex<Vec<(Severity, String)>>);

    impl Logger for RecordingLogger {
        fn log(&self, _ctx: &RequestContext, record: &Record<'_>) {
            self.0
                .lock()
                .unwrap()
                .push((record.severity, record.message.to_string()));
        }
    }

    #[test]
    fn tracing_logger_is_the_fallback() {
        let ctx = request_context();

        let lines = cloud_lines(|| warn(&ctx, "disk almost full"));

        assert_eq!(lines.len(), 1);
        let entry = &lines[0];
        assert_eq!(entry["severity"], "WARNING");
        assert_eq!(entry["message"], "disk almost full");
        assert_eq!(entry["app"], "ledgerlord");
        assert_eq!(entry["rid"], "rid-1");
        assert_eq!(entry["flow-id"], "flow-1");
        assert_eq!(entry["root-task-id"], "root-1");
        assert!(entry.get("@type").is_none());
        assert!(entry.get("logging.googleapis.com/trace").is_none());
    }

    #[test]
    fn report_adds_error_reporting_fields() {
        let ctx = request_context();

        let lines = cloud_lines(|| report(&ctx, "test"));

        let entry = &lines[0];
        assert_eq!(entry["severity"], "ERROR");
        assert_eq!(entry["message"], "test");
        assert_eq!(entry["@type"], REPORTED_ERROR_EVENT_TYPE);
        assert!(!entry["stack_trace"].as_str().unwrap().is_empty());
    }

    #[test]
    fn span_context_adds_trace_fields() {
        let span_context = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let ctx = request_context().with_span_context(span_context);

        let lines = cloud_lines(|| info(&ctx, "traced"));

        let entry = &lines[0];
        assert_eq!(
            entry["logging.googleapis.com/trace"],
            "projects/proper-base/traces/4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(entry["logging.googleapis.com/spanId"], "00f067aa0ba902b7");
        assert_eq!(entry["logging.googleapis.com/trace_sampled"], true);
    }

    #[test]
    fn unset_context_fields_are_empty_strings() {
        let lines = cloud_lines(|| error(&RequestContext::new(), "boom"));

        let entry = &lines[0];
        assert_eq!(entry["severity"], "ERROR");
        assert_eq!(entry["app"], "");
        assert_eq!(entry["flow-id"], "");
    }

    #[test]
    fn context_logger_takes_precedence() {
        let logger = Arc::new(RecordingLogger::default());
        let ctx = request_context().with_logger(logger.clone());

        let lines = cloud_lines(|| {
            info(&ctx, "one");
            error(&ctx, "two");
        });

        assert!(lines.is_empty());
        let records = logger.0.lock().unwrap();
        assert_eq!(
            *records,
            [
                (Severity::Info, "one".to_string()),
                (Severity::Error, "two".to_string())
            ]
        );
    }

    #[test]
    fn severity_maps_to_level() {
        assert_eq!(Level::from(Severity::Info), Level::INFO);
        assert_eq!(Level::from(Severity::Warning), Level::WARN);
        assert_eq!(Level::from(Severity::Error), Level::ERROR);
    }
}
