use std::fmt;
use std::sync::Arc;

use crate::{clock::Clock, config::MetricConfig};

/// The capability a metric binds to: something that can produce a current
/// value given a config and the current time.
///
/// Stats implement this through a locked adapter; free-standing measurables
/// (gauge-style callbacks) can implement it directly and be registered with
/// [`Metrics::add_metric`](crate::Metrics::add_metric).
pub trait Measurable: Send + Sync {
    fn measure(&self, config: &MetricConfig, now_ms: i64) -> f64;
}

impl<F> Measurable for F
where
    F: Fn(&MetricConfig, i64) -> f64 + Send + Sync,
{
    fn measure(&self, config: &MetricConfig, now_ms: i64) -> f64 {
        self(config, now_ms)
    }
}

/// A named, read-only view over a [`Measurable`] with its effective config.
///
/// Metrics are cheap handles; cloning one shares the underlying state.
#[derive(Clone)]
pub struct Metric {
    name: Arc<str>,
    config: MetricConfig,
    measurable: Arc<dyn Measurable>,
    clock: Arc<dyn Clock>,
}

impl Metric {
    pub(crate) fn new(
        name: &str,
        measurable: Arc<dyn Measurable>,
        config: MetricConfig,
        clock: Arc<dyn Clock>,
    ) -> Metric {
        Metric {
            name: Arc::from(name),
            config,
            measurable,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Computes the metric's current value against the registry clock.
    pub fn value(&self) -> f64 {
        self.value_at(self.clock.now_ms())
    }

    pub(crate) fn value_at(&self, now_ms: i64) -> f64 {
        self.measurable.measure(&self.config, now_ms)
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
