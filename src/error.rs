use crate::quota::Quota;

/// Errors surfaced by the registry, sensors, and stats.
///
/// All of these are synchronous; the library never retries internally. A
/// [`MetricsError::QuotaViolation`] is raised after the offending value has
/// already been recorded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("metric '{0}' is already registered")]
    DuplicateMetricName(String),
    #[error("illegal sensor hierarchy: {0}")]
    IllegalSensorHierarchy(String),
    #[error("metric '{name}' violated its {quota} with recorded value {value}")]
    QuotaViolation {
        name: String,
        quota: Quota,
        value: f64,
    },
    #[error("metric '{0}' not found")]
    MetricNotFound(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("the metrics registry has been closed")]
    RegistryClosed,
}
