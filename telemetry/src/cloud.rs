//! Cloud Logging structured JSON as a `tracing-subscriber` event format.
//!
//! Each event becomes one JSON line with `severity`, `message`, `timestamp`
//! and the request fields `app`, `rid`, `flow-id`, `root-task-id`. Events
//! carrying `trace_id` / `span_id` get the `logging.googleapis.com/*` trace
//! keys, and events carrying `stack_trace` are tagged for Error Reporting.
//! Any other event field is passed through under its own name.

use std::error::Error;
use std::fmt::{self, Write as _};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::logging::fields;
use crate::trace::project_id_from_env;

/// `@type` that routes a log entry to Error Reporting.
pub const REPORTED_ERROR_EVENT_TYPE: &str =
    "type.googleapis.com/google.devtools.clouderrorreporting.v1beta1.ReportedErrorEvent";

pub const TRACE_KEY: &str = "logging.googleapis.com/trace";
pub const SPAN_ID_KEY: &str = "logging.googleapis.com/spanId";
pub const TRACE_SAMPLED_KEY: &str = "logging.googleapis.com/trace_sampled";

/// Event field name to Cloud Logging key, for the request fields written on
/// every entry.
const REQUEST_KEYS: [(&str, &str); 4] = [
    (fields::APP, "app"),
    (fields::REQUEST_ID, "rid"),
    (fields::FLOW_ID, "flow-id"),
    (fields::ROOT_TASK_ID, "root-task-id"),
];

/// Formats events as Cloud Logging entries for `project_id`.
#[derive(Debug, Clone)]
pub struct CloudFormat {
    project_id: String,
}

impl CloudFormat {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// Project from `GCP_PROJECT_ID`, see [`project_id_from_env`].
    pub fn from_env() -> Self {
        Self::new(project_id_from_env())
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn entry(
        &self,
        metadata: &Metadata<'_>,
        mut event_fields: Map<String, Value>,
        now: SystemTime,
    ) -> Map<String, Value> {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();

        let mut entry = Map::new();
        entry.insert("severity".into(), json!(severity(metadata.level())));
        entry.insert(
            "message".into(),
            event_fields.remove("message").unwrap_or_else(|| json!("")),
        );
        entry.insert(
            "timestamp".into(),
            json!({ "seconds": since_epoch.as_secs(), "nanos": since_epoch.subsec_nanos() }),
        );

        if let Some(trace_id) = event_fields.remove(fields::TRACE_ID) {
            let trace_id = trace_id.as_str().unwrap_or_default();
            entry.insert(
                TRACE_KEY.into(),
                json!(format!("projects/{}/traces/{trace_id}", self.project_id)),
            );
        }
        if let Some(span_id) = event_fields.remove(fields::SPAN_ID) {
            entry.insert(SPAN_ID_KEY.into(), span_id);
        }
        if let Some(sampled) = event_fields.remove(fields::TRACE_SAMPLED) {
            entry.insert(TRACE_SAMPLED_KEY.into(), sampled);
        }

        for (field, key) in REQUEST_KEYS {
            let value = event_fields.remove(field).unwrap_or_else(|| json!(""));
            entry.insert(key.into(), value);
        }

        if let Some(stack_trace) = event_fields.remove(fields::STACK_TRACE) {
            entry.insert("@type".into(), json!(REPORTED_ERROR_EVENT_TYPE));
            entry.insert("stack_trace".into(), stack_trace);
        }

        for (key, value) in event_fields {
            entry.entry(key).or_insert(value);
        }
        entry
    }
}

impl<S, N> FormatEvent<S, N> for CloudFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = JsonFields::default();
        event.record(&mut visitor);
        let entry = self.entry(event.metadata(), visitor.0, SystemTime::now());
        let line = serde_json::to_string(&entry).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Cloud Logging severity for a `tracing` level.
pub fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        _ => "DEBUG",
    }
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl JsonFields {
    fn insert(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, json!(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.insert(field, json!(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, json!(format!("{value:?}")));
    }
}
