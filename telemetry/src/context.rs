//! Request-scoped values threaded through a service call.
//!
//! # Design
//! `RequestContext` is an immutable value. Every `with_*` method returns an
//! updated copy, so a context handed to another task can never change
//! underneath it. Accessors return `""` for values that were never set,
//! which lets log fields be emitted unconditionally.

use std::fmt;
use std::sync::Arc;

use opentelemetry::trace::SpanContext;

use crate::logging::Logger;

/// Identity, environment and tracing metadata for one request.
#[derive(Clone, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    flow_id: Option<String>,
    root_task_id: Option<String>,
    debug: Option<String>,
    env: Option<String>,
    service_name: Option<String>,
    aws_task_id: Option<String>,
    bot_name: Option<String>,
    logger: Option<Arc<dyn Logger>>,
    span_context: Option<SpanContext>,
}

macro_rules! string_field {
    ($field:ident, $with:ident) => {
        pub fn $field(&self) -> &str {
            self.$field.as_deref().unwrap_or_default()
        }

        pub fn $with(&self, value: impl Into<String>) -> Self {
            Self {
                $field: Some(value.into()),
                ..self.clone()
            }
        }
    };
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    string_field!(request_id, with_request_id);
    string_field!(flow_id, with_flow_id);
    string_field!(root_task_id, with_root_task_id);
    string_field!(debug, with_debug);
    string_field!(env, with_env);
    string_field!(service_name, with_service_name);
    string_field!(aws_task_id, with_aws_task_id);
    string_field!(bot_name, with_bot_name);

    /// True when the environment is `prod`.
    pub fn is_prod(&self) -> bool {
        self.env() == "prod"
    }

    /// True when debug is explicitly on or the service runs locally.
    pub fn is_debug_on(&self) -> bool {
        self.debug() == "true" || self.env() == "local"
    }

    pub fn with_debug_on(&self) -> Self {
        self.with_debug("true")
    }

    /// Logger used by the free logging functions for this context.
    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    pub fn with_logger(&self, logger: Arc<dyn Logger>) -> Self {
        Self {
            logger: Some(logger),
            ..self.clone()
        }
    }

    /// Span context of the trace this request belongs to, if any.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_ref().filter(|sc| sc.is_valid())
    }

    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Self {
            span_context: Some(span_context),
            ..self.clone()
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("flow_id", &self.flow_id)
            .field("root_task_id", &self.root_task_id)
            .field("debug", &self.debug)
            .field("env", &self.env)
            .field("service_name", &self.service_name)
            .field("aws_task_id", &self.aws_task_id)
            .field("bot_name", &self.bot_name)
            .field("logger", &self.logger.is_some())
            .field("span_context", &self.span_context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_id_is_read_back() {
        let ctx = RequestContext::new().with_flow_id("test-flow");
        assert_eq!(ctx.flow_id(), "test-flow");
    }

    #[test]
    fn request_id_is_read_back() {
        let ctx = RequestContext::new().with_request_id("asd-123");
        assert_eq!(ctx.request_id(), "asd-123");
    }

    #[test]
    fn unset_values_read_as_empty() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.service_name(), "");
        assert_eq!(ctx.root_task_id(), "");
        assert!(ctx.logger().is_none());
        assert!(ctx.span_context().is_none());
    }

    #[test]
    fn with_returns_a_copy() {
        let base = RequestContext::new().with_service_name("ledgerlord");
        let derived = base.with_aws_task_id("11111").with_bot_name("bot-a");
        assert_eq!(base.aws_task_id(), "");
        assert_eq!(derived.aws_task_id(), "11111");
        assert_eq!(derived.bot_name(), "bot-a");
        assert_eq!(derived.service_name(), "ledgerlord");
    }

    #[test]
    fn is_prod_only_for_prod_env() {
        assert!(RequestContext::new().with_env("prod").is_prod());
        assert!(!RequestContext::new().with_env("dev").is_prod());
        assert!(!RequestContext::new().is_prod());
    }

    #[test]
    fn debug_on_when_set() {
        assert!(RequestContext::new().with_debug_on().is_debug_on());
    }

    #[test]
    fn debug_off_when_false_or_missing() {
        assert!(!RequestContext::new().with_debug("false").is_debug_on());
        assert!(!RequestContext::new().is_debug_on());
    }

    #[test]
    fn debug_on_in_local_env() {
        assert!(RequestContext::new().with_env("local").is_debug_on());
    }

    #[test]
    fn invalid_span_context_is_hidden() {
        let ctx = RequestContext::new().with_span_context(SpanContext::empty_context());
        assert!(ctx.span_context().is_none());
    }
}
