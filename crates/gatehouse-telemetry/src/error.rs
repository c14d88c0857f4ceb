//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::string::FromUtf8Error;

use prometheus::Error as PrometheusError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Step at which a Prometheus collector failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector could not be built or registered at startup.
    Collector {
        /// Metric family name.
        name: &'static str,
        /// Step that failed.
        stage: CollectorStage,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// The `/metrics` exposition could not be produced.
    Exposition {
        /// Encoder failure or non UTF-8 output.
        source: ExpositionFailure,
    },
}

/// Reason a metrics exposition failed.
#[derive(Debug)]
pub enum ExpositionFailure {
    /// The text encoder rejected a metric family.
    Encode(PrometheusError),
    /// The encoder produced bytes that are not UTF-8.
    NotUtf8(FromUtf8Error),
}

impl TelemetryError {
    pub(crate) const fn collector(
        name: &'static str,
        stage: CollectorStage,
        source: PrometheusError,
    ) -> Self {
        Self::Collector {
            name,
            stage,
            source,
        }
    }
}

impl From<ExpositionFailure> for TelemetryError {
    fn from(source: ExpositionFailure) -> Self {
        Self::Exposition { source }
    }
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
            Self::Collector {
                name,
                stage: CollectorStage::Build,
                ..
            } => write!(formatter, "failed to build metric `{name}`"),
            Self::Collector {
                name,
                stage: CollectorStage::Register,
                ..
            } => write!(formatter, "failed to register metric `{name}`"),
            Self::Exposition { .. } => formatter.write_str("failed to render metrics"),
        }
    }
}

impl Display for ExpositionFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(_) => formatter.write_str("text encoding failed"),
            Self::NotUtf8(_) => formatter.write_str("encoded output was not valid utf-8"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInstall { source } => Some(source),
            Self::Collector { source, .. } => Some(source),
            Self::Exposition { source } => Some(source),
        }
    }
}

impl Error for ExpositionFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(source) => Some(source),
            Self::NotUtf8(source) => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_failures_name_the_metric_and_stage() {
        let built = TelemetryError::collector(
            "logins_total",
            CollectorStage::Build,
            PrometheusError::Msg("bad opts".to_string()),
        );
        assert_eq!(built.to_string(), "failed to build metric `logins_total`");
        assert!(built.source().is_some());

        let registered = TelemetryError::collector(
            "live_sessions",
            CollectorStage::Register,
            PrometheusError::AlreadyReg,
        );
        assert_eq!(
            registered.to_string(),
            "failed to register metric `live_sessions`"
        );
    }

    #[test]
    fn exposition_failures_chain_to_the_root_cause() -> std::result::Result<(), Box<dyn Error>> {
        let utf8_error = String::from_utf8(vec![0, 159])
            .err()
            .ok_or_else(|| std::io::Error::other("expected utf8 error"))?;
        let err = TelemetryError::from(ExpositionFailure::NotUtf8(utf8_error));
        assert_eq!(err.to_string(), "failed to render metrics");

        let failure = err.source().ok_or("missing exposition source")?;
        assert_eq!(failure.to_string(), "encoded output was not valid utf-8");
        assert!(failure.source().is_some());
        Ok(())
    }
}
