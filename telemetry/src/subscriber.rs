//! Process-wide `tracing` subscriber setup.
//!
//! Start with [`TelemetryConfig::new()`], adjust, then call `init` once at
//! the top of `main`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

use crate::cloud::CloudFormat;
use crate::trace::project_id_from_env;

/// Output format of the installed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log collectors.
    #[default]
    Json,
    /// Human readable, for terminals.
    Pretty,
    /// Cloud Logging entries on stdout, see [`CloudFormat`].
    Cloud,
}

#[derive(Debug)]
pub struct TelemetryConfig {
    global_filter: EnvFilter,
    format: LogFormat,
    project_id: String,
}

impl TelemetryConfig {
    /// INFO and above, overridable through `RUST_LOG`. JSON output. The
    /// Cloud project comes from `GCP_PROJECT_ID`.
    #[expect(clippy::new_without_default, reason = "filter is read from the environment")]
    #[must_use]
    pub fn new() -> Self {
        Self {
            global_filter: EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
            format: LogFormat::default(),
            project_id: project_id_from_env(),
        }
    }

    #[must_use]
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    /// Replace the `RUST_LOG`-derived filter.
    #[must_use]
    pub fn with_global_filter(self, filter: EnvFilter) -> Self {
        Self {
            global_filter: filter,
            ..self
        }
    }

    /// Project used for the trace keys of `LogFormat::Cloud`.
    #[must_use]
    pub fn with_project_id(self, project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..self
        }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        let json_layer = (self.format == LogFormat::Json).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        });
        let pretty_layer = (self.format == LogFormat::Pretty)
            .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        let cloud_layer = (self.format == LogFormat::Cloud).then(|| {
            tracing_subscriber::fmt::layer()
                .event_format(CloudFormat::new(self.project_id))
                .with_writer(std::io::stdout)
        });

        tracing_subscriber::registry()
            .with(json_layer)
            .with(pretty_layer)
            .with(cloud_layer)
            .with(self.global_filter)
            .try_init()
    }

    /// Install the subscriber.
    ///
    /// Panics when called twice or when another subscriber is already set.
    pub fn init(self) {
        self.try_init()
            .expect("failed to initialize the tracing subscriber");
    }
}
