//! Correlation metadata stamped on every outbound request.
//!
//! The client never reads the process environment on its own. Callers build
//! a `Correlation` explicitly, or take a one-time snapshot with
//! `Correlation::from_env`, and hand it to the client.

use crate::error::ClientError;
use crate::message::Headers;

/// Environment variable holding the flow id.
pub const FLOW_ENV: &str = "FLOW";
/// Environment variable holding the W3C trace parent.
pub const TRACEPARENT_ENV: &str = "traceparent";

pub const FLOW_ID_HEADER: &str = "X-Flow-Id";
/// Carries the trace parent through proxies that rewrite `traceparent`.
pub const PROPER_REFERER_HEADER: &str = "proper-referer";
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Flow id and trace parent propagated to downstream services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub flow_id: Option<String>,
    pub traceparent: Option<String>,
}

impl Correlation {
    pub fn new(flow_id: Option<String>, traceparent: Option<String>) -> Self {
        Self {
            flow_id: flow_id.filter(|v| !v.is_empty()),
            traceparent: traceparent.filter(|v| !v.is_empty()),
        }
    }

    /// Snapshot `FLOW` and `traceparent` from the process environment.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(FLOW_ENV).ok(),
            std::env::var(TRACEPARENT_ENV).ok(),
        )
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into()).filter(|v| !v.is_empty());
        self
    }

    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into()).filter(|v| !v.is_empty());
        self
    }

    /// Write `X-Flow-Id`, `proper-referer` and `traceparent` for the values
    /// that are present. Both trace headers get the same value. A value that
    /// is not a valid header value is an error, never silently dropped.
    pub(crate) fn apply(&self, headers: &mut Headers) -> Result<(), ClientError> {
        if let Some(flow_id) = &self.flow_id {
            headers.set(FLOW_ID_HEADER, flow_id)?;
        }
        if let Some(traceparent) = &self.traceparent {
            headers.set(PROPER_REFERER_HEADER, traceparent)?;
            headers.set(TRACEPARENT_HEADER, traceparent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TP: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn empty_values_count_as_absent() {
        let c = Correlation::new(Some(String::new()), Some(String::new()));
        assert_eq!(c, Correlation::default());
    }

    #[test]
    fn apply_writes_both_trace_headers() {
        let c = Correlation::default()
            .with_flow_id("flow-1")
            .with_traceparent(TP);
        let mut headers = Headers::new();
        c.apply(&mut headers).unwrap();
        assert_eq!(headers.get("X-Flow-Id"), Some("flow-1"));
        assert_eq!(headers.get("proper-referer"), Some(TP));
        assert_eq!(headers.get("traceparent"), Some(TP));
    }

    #[test]
    fn apply_skips_missing_values() {
        let mut headers = Headers::new();
        Correlation::default().apply(&mut headers).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn unsendable_traceparent_is_rejected() {
        let mut headers = Headers::new();
        let err = Correlation::default()
            .with_traceparent("00-\u{e9}")
            .apply(&mut headers)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader { ref name, .. } if name == PROPER_REFERER_HEADER));
    }
}
