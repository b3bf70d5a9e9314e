//! Distributed tracing on top of the OpenTelemetry SDK.
//!
//! # Design
//! Inbound requests carry a W3C trace parent either in `traceparent` or,
//! when a proxy in front of the service rewrites that header, in
//! `proper-referer`. `extract_traceparent` checks the latter first.
//! The resulting span context travels inside `RequestContext`, where the
//! logger and `Tracer::trace` pick it up.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt as _, TraceFlags, TraceId, TraceState, Tracer as _,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::trace::{Sampler, TracerProvider as SdkTracerProvider};
use opentelemetry_sdk::Resource;

use crate::context::RequestContext;

pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Copy of `traceparent` that survives proxies which overwrite the original.
pub const PROPER_REFERER_HEADER: &str = "proper-referer";

pub const PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";
pub const DEFAULT_PROJECT_ID: &str = "proper-base";

/// Prefix of every tracer name handed out by `Tracer::new`.
const TRACER_NAME_PREFIX: &str = "monitor/";

/// Cloud project that owns traces and logs: `GCP_PROJECT_ID`, or
/// `proper-base` when unset.
pub fn project_id_from_env() -> String {
    std::env::var(PROJECT_ID_ENV)
        .ok()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceParentError {
    #[error("no traceparent header present")]
    Missing,
    #[error("malformed traceparent: {0:?}")]
    Malformed(String),
    #[error("traceparent version ff is invalid")]
    InvalidVersion,
    #[error("traceparent trace id is all zeroes")]
    ZeroTraceId,
    #[error("traceparent parent id is all zeroes")]
    ZeroSpanId,
}

/// A parsed W3C `traceparent` value: `version-traceid-parentid-flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub version: u8,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: TraceFlags,
}

impl TraceParent {
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Remote span context for continuing this trace locally.
    pub fn to_span_context(&self) -> SpanContext {
        SpanContext::new(
            self.trace_id,
            self.span_id,
            self.flags,
            true,
            TraceState::default(),
        )
    }

    /// Trace parent pointing at `span_context`, for outbound propagation.
    pub fn from_span_context(span_context: &SpanContext) -> Option<Self> {
        span_context.is_valid().then(|| Self {
            version: 0,
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            flags: span_context.trace_flags(),
        })
    }
}

impl FromStr for TraceParent {
    type Err = TraceParentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TraceParentError::Malformed(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() < 4 {
            return Err(malformed());
        }

        let (version, trace_id, span_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
        if !is_lower_hex(version, 2)
            || !is_lower_hex(trace_id, 32)
            || !is_lower_hex(span_id, 16)
            || !is_lower_hex(flags, 2)
        {
            return Err(malformed());
        }

        let version = u8::from_str_radix(version, 16).map_err(|_| malformed())?;
        if version == 0xff {
            return Err(TraceParentError::InvalidVersion);
        }
        // Version 00 has exactly four fields; later versions may append more.
        if version == 0 && parts.len() != 4 {
            return Err(malformed());
        }

        let trace_id = TraceId::from_hex(trace_id).map_err(|_| malformed())?;
        if trace_id == TraceId::INVALID {
            return Err(TraceParentError::ZeroTraceId);
        }
        let span_id = SpanId::from_hex(span_id).map_err(|_| malformed())?;
        if span_id == SpanId::INVALID {
            return Err(TraceParentError::ZeroSpanId);
        }
        let flags = u8::from_str_radix(flags, 16).map_err(|_| malformed())?;

        Ok(Self {
            version,
            trace_id,
            span_id,
            flags: TraceFlags::new(flags),
        })
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            self.trace_id,
            self.span_id,
            self.flags.to_u8()
        )
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Read access to inbound request headers.
pub trait HeaderSource {
    /// Value of `name`, compared ASCII case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        find_header(self.iter(), name)
    }
}

impl HeaderSource for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        find_header(self.iter(), name)
    }
}

impl HeaderSource for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

fn find_header<'a>(
    mut entries: impl Iterator<Item = (&'a String, &'a String)>,
    name: &str,
) -> Option<&'a str> {
    entries
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Trace parent of an inbound request, preferring `proper-referer` over
/// `traceparent`.
pub fn extract_traceparent<H: HeaderSource + ?Sized>(
    headers: &H,
) -> Result<TraceParent, TraceParentError> {
    if let Some(Ok(traceparent)) = headers
        .header(PROPER_REFERER_HEADER)
        .map(str::parse::<TraceParent>)
    {
        return Ok(traceparent);
    }
    headers
        .header(TRACEPARENT_HEADER)
        .ok_or(TraceParentError::Missing)?
        .parse()
}

/// Continue the trace `trace_id`/`span_id` (hex) inside `ctx`.
///
/// Unparsable ids leave the context unchanged; the failure is logged at
/// info level.
pub fn with_remote_span_context(
    ctx: &RequestContext,
    trace_id: &str,
    span_id: &str,
) -> RequestContext {
    let trace_id = match TraceId::from_hex(trace_id) {
        Ok(id) if id != TraceId::INVALID => id,
        _ => {
            tracing::info!(trace_id, "failed to parse trace id");
            return ctx.clone();
        }
    };
    let span_id = match SpanId::from_hex(span_id) {
        Ok(id) if id != SpanId::INVALID => id,
        _ => {
            tracing::info!(span_id, "failed to parse span id");
            return ctx.clone();
        }
    };
    let trace_state = TraceState::default()
        .insert("client_command", "run-app")
        .unwrap_or_default();

    ctx.with_span_context(SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        true,
        trace_state,
    ))
}

/// Service tracer backed by an SDK tracer provider.
///
/// Every span is sampled. Spans are handed to the exporter as they end and
/// `trace` force-flushes the provider afterwards.
pub struct Tracer {
    tracer: opentelemetry_sdk::trace::Tracer,
    provider: SdkTracerProvider,
}

impl Tracer {
    pub fn new<E>(service_name: &str, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let provider = SdkTracerProvider::builder()
            .with_resource(Resource::new([KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .with_sampler(Sampler::AlwaysOn)
            .with_simple_exporter(exporter)
            .build();
        let tracer = provider.tracer(format!("{TRACER_NAME_PREFIX}{service_name}"));
        Self { tracer, provider }
    }

    /// Start a span named `name` as a child of the context's span (if any)
    /// and return the OpenTelemetry context that owns it.
    pub fn start(&self, ctx: &RequestContext, name: &str) -> Context {
        let parent = match ctx.span_context() {
            Some(sc) => parent_context(sc),
            None => Context::new(),
        };
        let span = self.tracer.start_with_context(name.to_string(), &parent);
        parent.with_span(span)
    }

    /// Run `f` inside a new span.
    ///
    /// `f` receives a copy of `ctx` pointing at the new span. Once `f`
    /// returns, the span is renamed to the context's service name (when
    /// set), ended, and the provider is flushed.
    pub fn trace<F, R>(&self, ctx: &RequestContext, name: &str, f: F) -> R
    where
        F: FnOnce(&RequestContext) -> R,
    {
        let cx = self.start(ctx, name);
        let span = cx.span();
        let child = ctx.with_span_context(span.span_context().clone());

        let result = f(&child);

        if !ctx.service_name().is_empty() {
            span.update_name(ctx.service_name().to_string());
        }
        span.end();
        self.flush();
        result
    }

    pub fn flush(&self) {
        for result in self.provider.force_flush() {
            if let Err(err) = result {
                tracing::warn!(%err, "failed to flush spans");
            }
        }
    }
}

/// Non-recording parent carrying `sc` as is.
///
/// `is_remote` comes from `sc` itself: contexts built from an inbound trace
/// parent are remote, spans started by `Tracer` are local. Nested `trace`
/// calls therefore parent on a local span.
fn parent_context(sc: &SpanContext) -> Context {
    Context::new().with_remote_span_context(sc.clone())
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TP: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn parses_and_formats_traceparent() {
        let tp: TraceParent = TP.parse().unwrap();
        assert_eq!(tp.version, 0);
        assert_eq!(
            tp.trace_id,
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert_eq!(tp.span_id, SpanId::from_hex("00f067aa0ba902b7").unwrap());
        assert!(tp.is_sampled());
        assert_eq!(tp.to_string(), TP);
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in [
            "",
            "00-abc-def-01",
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
            "0-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ] {
            assert!(
                matches!(bad.parse::<TraceParent>(), Err(TraceParentError::Malformed(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn rejects_zero_ids_and_version_ff() {
        assert_eq!(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01".parse::<TraceParent>(),
            Err(TraceParentError::ZeroTraceId)
        );
        assert_eq!(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01".parse::<TraceParent>(),
            Err(TraceParentError::ZeroSpanId)
        );
        assert_eq!(
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".parse::<TraceParent>(),
            Err(TraceParentError::InvalidVersion)
        );
    }

    #[test]
    fn future_versions_may_carry_extra_fields() {
        let tp: TraceParent = "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00-more"
            .parse()
            .unwrap();
        assert_eq!(tp.version, 1);
        assert!(!tp.is_sampled());
    }

    #[test]
    fn proper_referer_wins_over_traceparent() {
        let other = "00-11111111111111111111111111111111-2222222222222222-00";
        let headers = HashMap::from([
            ("Proper-Referer".to_string(), TP.to_string()),
            ("traceparent".to_string(), other.to_string()),
        ]);
        assert_eq!(extract_traceparent(&headers).unwrap().to_string(), TP);
    }

    #[test]
    fn falls_back_to_traceparent_when_referer_is_garbage() {
        let headers: &[(&str, &str)] = &[("proper-referer", "https://example.com"), ("traceparent", TP)];
        assert_eq!(extract_traceparent(headers).unwrap().to_string(), TP);
    }

    #[test]
    fn missing_headers_are_reported() {
        let headers = BTreeMap::<String, String>::new();
        assert_eq!(extract_traceparent(&headers), Err(TraceParentError::Missing));
    }

    #[test]
    fn remote_span_context_is_attached() {
        let ctx = with_remote_span_context(
            &RequestContext::new(),
            "4bf92f3577b34da6a3ce929d0e0e4736",
            "00f067aa0ba902b7",
        );
        let sc = ctx.span_context().unwrap();
        assert!(sc.is_remote());
        assert_eq!(sc.trace_state().get("client_command"), Some("run-app"));
        assert_eq!(sc.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn bad_ids_leave_context_unchanged() {
        let ctx = RequestContext::new().with_flow_id("f");
        let out = with_remote_span_context(&ctx, "not-hex", "00f067aa0ba902b7");
        assert!(out.span_context().is_none());
        assert_eq!(out.flow_id(), "f");

        let out = with_remote_span_context(&ctx, "4bf92f3577b34da6a3ce929d0e0e4736", "");
        assert!(out.span_context().is_none());
    }

    #[test]
    fn span_context_round_trips_through_traceparent() {
        let tp: TraceParent = TP.parse().unwrap();
        let back = TraceParent::from_span_context(&tp.to_span_context()).unwrap();
        assert_eq!(back, tp);
        assert!(TraceParent::from_span_context(&SpanContext::empty_context()).is_none());
    }

    #[test]
    fn parent_context_keeps_the_remote_flag() {
        let local = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let cx = parent_context(&local);
        assert!(!cx.span().span_context().is_remote());

        let remote: TraceParent = TP.parse().unwrap();
        let cx = parent_context(&remote.to_span_context());
        assert!(cx.span().span_context().is_remote());
    }

    #[test]
    fn project_id_has_a_default() {
        // Only meaningful when the variable is not set in the test environment.
        if std::env::var(PROJECT_ID_ENV).is_err() {
            assert_eq!(project_id_from_env(), DEFAULT_PROJECT_ID);
        }
    }
}
