use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::MetricConfig;
use crate::error::MetricsError;
use crate::metric::{Measurable, Metric};
use crate::registry::Shared;
use crate::stats::{CompoundStat, MeasurableStat};

/// A named recording endpoint.
///
/// A sensor owns its stats; recording a value updates every owned stat and
/// then propagates to every parent sensor. Parents are held weakly — the
/// registry is the sole owner of all sensors.
pub struct Sensor {
    name: String,
    clock: Arc<dyn Clock>,
    config: MetricConfig,
    parents: Vec<Weak<Sensor>>,
    registry: Weak<Shared>,
    inner: Mutex<Inner>,
}

struct Inner {
    stats: Vec<StatEntry>,
    metrics: Vec<Metric>,
    last_record_ms: i64,
}

/// A stat together with the config it was bound under; recording and
/// measuring always use the same config.
struct StatEntry {
    stat: Arc<Mutex<dyn MeasurableStat>>,
    config: MetricConfig,
}

/// Adapts a locked stat into the read capability a metric binds to.
struct StatMeasurable(Arc<Mutex<dyn MeasurableStat>>);

impl Measurable for StatMeasurable {
    fn measure(&self, config: &MetricConfig, now_ms: i64) -> f64 {
        self.0.lock().measure(config, now_ms)
    }
}

impl Sensor {
    pub(crate) fn new(
        name: &str,
        parents: Vec<Weak<Sensor>>,
        config: MetricConfig,
        clock: Arc<dyn Clock>,
        registry: Weak<Shared>,
    ) -> Sensor {
        Sensor {
            name: name.to_owned(),
            clock,
            config,
            parents,
            registry,
            inner: Mutex::new(Inner {
                stats: Vec::new(),
                metrics: Vec::new(),
                last_record_ms: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Timestamp of the most recent record at this sensor.
    pub fn last_record_ms(&self) -> i64 {
        self.inner.lock().last_record_ms
    }

    pub(crate) fn parents(&self) -> &[Weak<Sensor>] {
        &self.parents
    }

    /// Registers a metric named `name` over `stat`, bound with this sensor's
    /// config. Fails if the name is taken anywhere in the registry.
    pub fn add<S>(&self, name: &str, stat: S) -> Result<Metric, MetricsError>
    where
        S: MeasurableStat + 'static,
    {
        self.add_with_config(name, stat, self.config.clone())
    }

    /// Registers a metric over `stat` with an explicit config, typically to
    /// attach a quota or different windowing than the sensor's default.
    pub fn add_with_config<S>(
        &self,
        name: &str,
        stat: S,
        config: MetricConfig,
    ) -> Result<Metric, MetricsError>
    where
        S: MeasurableStat + 'static,
    {
        config.validate()?;
        let registry = self.registry.upgrade().ok_or(MetricsError::RegistryClosed)?;

        let stat: Arc<Mutex<dyn MeasurableStat>> = Arc::new(Mutex::new(stat));
        let metric = Metric::new(
            name,
            Arc::new(StatMeasurable(Arc::clone(&stat))),
            config.clone(),
            self.clock.clone(),
        );
        registry.register_metrics(std::slice::from_ref(&metric))?;

        let mut inner = self.inner.lock();
        inner.stats.push(StatEntry { stat, config });
        inner.metrics.push(metric.clone());
        Ok(metric)
    }

    /// Registers a compound stat, yielding one metric per named measurable
    /// while sharing a single underlying state. All-or-nothing: if any
    /// sub-name collides, nothing is registered.
    pub fn add_compound<S>(&self, stat: S) -> Result<Vec<Metric>, MetricsError>
    where
        S: CompoundStat + 'static,
    {
        self.add_compound_with_config(stat, self.config.clone())
    }

    pub fn add_compound_with_config<S>(
        &self,
        stat: S,
        config: MetricConfig,
    ) -> Result<Vec<Metric>, MetricsError>
    where
        S: CompoundStat + 'static,
    {
        config.validate()?;
        let registry = self.registry.upgrade().ok_or(MetricsError::RegistryClosed)?;

        let shared = Arc::new(Mutex::new(stat));
        let metrics: Vec<Metric> = S::named_measurables(&shared)
            .into_iter()
            .map(|(name, measurable)| {
                Metric::new(&name, measurable, config.clone(), self.clock.clone())
            })
            .collect();
        registry.register_metrics(&metrics)?;

        let stat: Arc<Mutex<dyn MeasurableStat>> = shared;
        let mut inner = self.inner.lock();
        inner.stats.push(StatEntry { stat, config });
        inner.metrics.extend(metrics.iter().cloned());
        Ok(metrics)
    }

    /// Records a bare occurrence, equivalent to `record(1.0)`.
    pub fn record_occurrence(&self) -> Result<(), MetricsError> {
        self.record(1.0)
    }

    /// Records `value` at this sensor and every ancestor.
    ///
    /// Quotas attached to this sensor's metrics are evaluated after the stats
    /// have been updated: a violation is raised but the observation stays
    /// recorded. A violation also stops propagation to parents.
    pub fn record(&self, value: f64) -> Result<(), MetricsError> {
        let now_ms = self.clock.now_ms();
        let mut seen = Vec::new();
        self.record_at(value, now_ms, &mut seen)
    }

    fn record_at(
        &self,
        value: f64,
        now_ms: i64,
        seen: &mut Vec<*const Sensor>,
    ) -> Result<(), MetricsError> {
        let identity = self as *const Sensor;
        if seen.contains(&identity) {
            return Ok(());
        }
        seen.push(identity);

        {
            let mut inner = self.inner.lock();
            inner.last_record_ms = now_ms;
            for entry in &inner.stats {
                entry.stat.lock().record(&entry.config, value, now_ms);
            }
            check_quotas(&inner.metrics, now_ms)?;
        }

        for parent in &self.parents {
            if let Some(parent) = parent.upgrade() {
                parent.record_at(value, now_ms, seen)?;
            }
        }
        Ok(())
    }
}

fn check_quotas(metrics: &[Metric], now_ms: i64) -> Result<(), MetricsError> {
    for metric in metrics {
        if let Some(quota) = metric.config().get_quota() {
            let value = metric.value_at(now_ms);
            if !quota.acceptable(value) {
                return Err(MetricsError::QuotaViolation {
                    name: metric.name().to_owned(),
                    quota,
                    value,
                });
            }
        }
    }
    Ok(())
}
