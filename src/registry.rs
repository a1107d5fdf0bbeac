use std::sync::{Arc, Weak};

use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, Monotonic};
use crate::config::MetricConfig;
use crate::error::MetricsError;
use crate::metric::{Measurable, Metric};
use crate::reporter::MetricsReporter;
use crate::sensor::Sensor;
use crate::snapshot::{Snapshot, SnapshotBuilder};

/// Point-in-time copy of the registered metrics, keyed by name.
pub type MetricMap = HashMap<String, Metric, FnvBuildHasher>;

pub(crate) struct Shared {
    clock: Arc<dyn Clock>,
    default_config: MetricConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    sensors: HashMap<String, Arc<Sensor>, FnvBuildHasher>,
    metrics: MetricMap,
    reporters: Vec<Box<dyn MetricsReporter>>,
    closed: bool,
}

impl Shared {
    /// Registers a batch of metrics atomically: either every name is free and
    /// all of them land, or nothing changes.
    pub(crate) fn register_metrics(&self, metrics: &[Metric]) -> Result<(), MetricsError> {
        let mut inner = self.inner.lock();
        for (index, metric) in metrics.iter().enumerate() {
            let duplicate = inner.metrics.contains_key(metric.name())
                || metrics[..index].iter().any(|m| m.name() == metric.name());
            if duplicate {
                return Err(MetricsError::DuplicateMetricName(metric.name().to_owned()));
            }
        }

        for metric in metrics {
            debug!(name = metric.name(), "registered metric");
            inner
                .metrics
                .insert(metric.name().to_owned(), metric.clone());
        }
        for metric in metrics {
            for reporter in inner.reporters.iter_mut() {
                reporter.metric_change(metric);
            }
        }
        Ok(())
    }
}

/// The metrics registry: sole owner of all sensors and metrics, host of the
/// reporters, and holder of the clock every component consults.
///
/// Each `Metrics` instance is independently scoped; there is no process-global
/// registry.
pub struct Metrics {
    shared: Arc<Shared>,
}

impl Metrics {
    /// Creates a registry with the default config and the production clock.
    pub fn new() -> Metrics {
        Metrics {
            shared: Arc::new(Shared {
                clock: Arc::new(Monotonic::new()),
                default_config: MetricConfig::default(),
                inner: Mutex::new(Inner::new()),
            }),
        }
    }

    /// Gets a builder to configure a registry with.
    pub fn builder() -> MetricsBuilder {
        MetricsBuilder::new()
    }

    /// Gets or creates the sensor named `name` with no parents and the
    /// registry's default config.
    pub fn sensor(&self, name: &str) -> Result<Arc<Sensor>, MetricsError> {
        self.sensor_with(name, &[], None)
    }

    /// Gets or creates a sensor.
    ///
    /// Re-requesting an existing name reuses the sensor if the request is
    /// equivalent; a differing non-empty parent set or a differing explicit
    /// config is an error. Creation fails if two supplied parents share a
    /// common ancestor, which would double-record every observation there.
    pub fn sensor_with(
        &self,
        name: &str,
        parents: &[Arc<Sensor>],
        config: Option<MetricConfig>,
    ) -> Result<Arc<Sensor>, MetricsError> {
        let mut inner = self.shared.inner.lock();
        if let Some(existing) = inner.sensors.get(name) {
            if !parents.is_empty() && !same_parents(existing.parents(), parents) {
                return Err(MetricsError::IllegalSensorHierarchy(format!(
                    "sensor '{}' already exists with a different parent set",
                    name
                )));
            }
            if let Some(config) = &config {
                if config != existing.config() {
                    return Err(MetricsError::InvalidConfig(format!(
                        "sensor '{}' already exists with a different config",
                        name
                    )));
                }
            }
            return Ok(Arc::clone(existing));
        }

        let config = config.unwrap_or_else(|| self.shared.default_config.clone());
        config.validate()?;
        check_forest(name, parents)?;

        let sensor = Arc::new(Sensor::new(
            name,
            parents.iter().map(Arc::downgrade).collect(),
            config,
            self.shared.clock.clone(),
            Arc::downgrade(&self.shared),
        ));
        inner.sensors.insert(name.to_owned(), Arc::clone(&sensor));
        debug!(sensor = name, "created sensor");
        Ok(sensor)
    }

    /// Looks up an existing sensor by name.
    pub fn get_sensor(&self, name: &str) -> Option<Arc<Sensor>> {
        self.shared.inner.lock().sensors.get(name).cloned()
    }

    /// Registers a free-standing measurable under `name` with the default
    /// config. Fails if the name is taken.
    pub fn add_metric<M>(&self, name: &str, measurable: M) -> Result<Metric, MetricsError>
    where
        M: Measurable + 'static,
    {
        self.add_metric_with_config(name, measurable, self.shared.default_config.clone())
    }

    pub fn add_metric_with_config<M>(
        &self,
        name: &str,
        measurable: M,
        config: MetricConfig,
    ) -> Result<Metric, MetricsError>
    where
        M: Measurable + 'static,
    {
        config.validate()?;
        let metric = Metric::new(name, Arc::new(measurable), config, self.shared.clock.clone());
        self.shared.register_metrics(std::slice::from_ref(&metric))?;
        Ok(metric)
    }

    /// Looks up a metric by name.
    pub fn get_metric(&self, name: &str) -> Result<Metric, MetricsError> {
        self.shared
            .inner
            .lock()
            .metrics
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(name.to_owned()))
    }

    /// Removes a metric by name, notifying reporters.
    ///
    /// Handles to the removed metric keep working; only the registry entry and
    /// reporter visibility go away.
    pub fn remove_metric(&self, name: &str) -> Result<Metric, MetricsError> {
        let mut inner = self.shared.inner.lock();
        let metric = inner
            .metrics
            .remove(name)
            .ok_or_else(|| MetricsError::MetricNotFound(name.to_owned()))?;
        debug!(name = metric.name(), "removed metric");
        for reporter in inner.reporters.iter_mut() {
            reporter.metric_removal(&metric);
        }
        Ok(metric)
    }

    /// Gets a point-in-time copy of the registered metrics.
    pub fn metrics(&self) -> MetricMap {
        self.shared.inner.lock().metrics.clone()
    }

    /// Computes every registered metric's current value.
    pub fn snapshot(&self) -> Snapshot {
        let metrics: Vec<Metric> = self.shared.inner.lock().metrics.values().cloned().collect();
        let mut builder = SnapshotBuilder::new();
        for metric in &metrics {
            builder.set(metric.name(), metric.value(), metric.config().get_unit());
        }
        builder.into_inner()
    }

    /// Attaches a reporter, initializing it with the current metric set.
    pub fn add_reporter<R>(&self, reporter: R)
    where
        R: MetricsReporter + 'static,
    {
        let mut reporter = Box::new(reporter);
        let mut inner = self.shared.inner.lock();
        let metrics: Vec<Metric> = inner.metrics.values().cloned().collect();
        reporter.init(&metrics);
        inner.reporters.push(reporter);
    }

    /// Shuts down the reporters. Also runs on drop; safe to call twice.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for reporter in inner.reporters.iter_mut() {
            reporter.close();
        }
    }
}

impl Default for Metrics {
    fn default() -> Metrics {
        Metrics::new()
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn new() -> Inner {
        Inner {
            sensors: HashMap::default(),
            metrics: HashMap::default(),
            reporters: Vec::new(),
            closed: false,
        }
    }
}

fn same_parents(existing: &[Weak<Sensor>], requested: &[Arc<Sensor>]) -> bool {
    existing.len() == requested.len()
        && requested
            .iter()
            .all(|r| existing.iter().any(|e| e.as_ptr() == Arc::as_ptr(r)))
}

/// Walks the ancestor closure of every supplied parent; any sensor reachable
/// twice means the new sensor would record there twice per observation.
fn check_forest(name: &str, parents: &[Arc<Sensor>]) -> Result<(), MetricsError> {
    fn visit(
        sensor: &Arc<Sensor>,
        seen: &mut Vec<*const Sensor>,
        name: &str,
    ) -> Result<(), MetricsError> {
        let identity = Arc::as_ptr(sensor);
        if seen.contains(&identity) {
            return Err(MetricsError::IllegalSensorHierarchy(format!(
                "sensor '{}' would reach ancestor '{}' more than once",
                name,
                sensor.name()
            )));
        }
        seen.push(identity);
        for parent in sensor.parents() {
            if let Some(parent) = parent.upgrade() {
                visit(&parent, seen, name)?;
            }
        }
        Ok(())
    }

    let mut seen = Vec::new();
    for parent in parents {
        visit(parent, &mut seen, name)?;
    }
    Ok(())
}

/// A configuration builder for [`Metrics`].
pub struct MetricsBuilder {
    config: MetricConfig,
    clock: Arc<dyn Clock>,
    reporters: Vec<Box<dyn MetricsReporter>>,
}

impl MetricsBuilder {
    fn new() -> MetricsBuilder {
        MetricsBuilder {
            config: MetricConfig::default(),
            clock: Arc::new(Monotonic::new()),
            reporters: Vec::new(),
        }
    }

    /// Sets the default config handed to sensors created without one.
    pub fn config(mut self, config: MetricConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock every sensor and stat will consult.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Attaches a reporter at construction time.
    pub fn reporter<R>(mut self, reporter: R) -> Self
    where
        R: MetricsReporter + 'static,
    {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Creates a registry based on this configuration.
    pub fn build(self) -> Result<Metrics, MetricsError> {
        self.config.validate()?;
        let metrics = Metrics {
            shared: Arc::new(Shared {
                clock: self.clock,
                default_config: self.config,
                inner: Mutex::new(Inner::new()),
            }),
        };
        {
            let mut inner = metrics.shared.inner.lock();
            for mut reporter in self.reporters {
                reporter.init(&[]);
                inner.reporters.push(reporter);
            }
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::Metrics;
    use crate::clock::{Clock, Mock};
    use crate::config::{MetricConfig, TimeUnit};
    use crate::error::MetricsError;
    use crate::metric::Metric;
    use crate::quota::Quota;
    use crate::reporter::MetricsReporter;
    use crate::stats::{
        Avg, BucketSizing, Max, Min, OccurrenceRate, Percentile, Percentiles, Rate, SampledCount,
        Total,
    };

    const EPS: f64 = 1e-6;

    fn mock_metrics() -> (Arc<Mock>, Metrics) {
        let clock = Arc::new(Mock::new(0));
        let metrics = Metrics::builder()
            .clock(Arc::clone(&clock))
            .build()
            .unwrap();
        (clock, metrics)
    }

    #[test]
    fn test_simple_stats() {
        let (clock, metrics) = mock_metrics();
        metrics
            .add_metric("direct.measurable", |_: &MetricConfig, _: i64| 5.0)
            .unwrap();

        let s = metrics.sensor("test.sensor").unwrap();
        s.add("test.avg", Avg::new()).unwrap();
        s.add("test.max", Max::new()).unwrap();
        s.add("test.min", Min::new()).unwrap();
        s.add("test.rate", Rate::new(TimeUnit::Seconds)).unwrap();
        s.add(
            "test.occurrences",
            OccurrenceRate::with_unit(TimeUnit::Seconds),
        )
        .unwrap();
        s.add("test.count", SampledCount::new()).unwrap();
        s.add_compound(
            Percentiles::new(
                100,
                -100.0,
                100.0,
                BucketSizing::Constant,
                vec![
                    Percentile::new("test.median", 50.0),
                    Percentile::new("test.perc99_9", 99.9),
                ],
            )
            .unwrap(),
        )
        .unwrap();

        let s2 = metrics.sensor("test.sensor2").unwrap();
        s2.add("s2.total", Total::new()).unwrap();
        s2.record(5.0).unwrap();

        for i in 0..10 {
            s.record(i as f64).unwrap();
        }

        // Pretend two seconds passed.
        clock.sleep(2000);

        let value = |name: &str| metrics.get_metric(name).unwrap().value();
        assert!((value("direct.measurable") - 5.0).abs() < EPS);
        assert!((value("s2.total") - 5.0).abs() < EPS);
        assert!((value("test.avg") - 4.5).abs() < EPS);
        assert!((value("test.max") - 9.0).abs() < EPS);
        assert!((value("test.min") - 0.0).abs() < EPS);
        assert!((value("test.rate") - 22.5).abs() < EPS);
        assert!((value("test.occurrences") - 5.0).abs() < EPS);
        assert!((value("test.count") - 10.0).abs() < EPS);
    }

    #[test]
    fn test_hierarchical_sensors() {
        let (_clock, metrics) = mock_metrics();
        let parent1 = metrics.sensor("test.parent1").unwrap();
        let parent1_count = parent1.add("test.parent1.count", SampledCount::new()).unwrap();
        let parent2 = metrics.sensor("test.parent2").unwrap();
        let parent2_count = parent2.add("test.parent2.count", SampledCount::new()).unwrap();
        let child1 = metrics
            .sensor_with(
                "test.child1",
                &[Arc::clone(&parent1), Arc::clone(&parent2)],
                None,
            )
            .unwrap();
        let child1_count = child1.add("test.child1.count", SampledCount::new()).unwrap();
        let child2 = metrics
            .sensor_with("test.child2", &[Arc::clone(&parent1)], None)
            .unwrap();
        let child2_count = child2.add("test.child2.count", SampledCount::new()).unwrap();
        let grandchild = metrics
            .sensor_with("test.grandchild", &[Arc::clone(&child1)], None)
            .unwrap();
        let grandchild_count = grandchild
            .add("test.grandchild.count", SampledCount::new())
            .unwrap();

        // Increment each sensor one time.
        parent1.record_occurrence().unwrap();
        parent2.record_occurrence().unwrap();
        child1.record_occurrence().unwrap();
        child2.record_occurrence().unwrap();
        grandchild.record_occurrence().unwrap();

        let p1 = parent1_count.value();
        let p2 = parent2_count.value();
        let c1 = child1_count.value();
        let c2 = child2_count.value();
        let gc = grandchild_count.value();

        // Each count equals one plus its children's counts.
        assert!((gc - 1.0).abs() < EPS);
        assert!((c1 - (1.0 + gc)).abs() < EPS);
        assert!((c2 - 1.0).abs() < EPS);
        assert!((p2 - (1.0 + c1)).abs() < EPS);
        assert!((p1 - (1.0 + c1 + c2)).abs() < EPS);
    }

    #[test]
    fn test_bad_sensor_hierarchy() {
        let (_clock, metrics) = mock_metrics();
        let parent = metrics.sensor("parent").unwrap();
        let child1 = metrics
            .sensor_with("child1", &[Arc::clone(&parent)], None)
            .unwrap();
        let child2 = metrics
            .sensor_with("child2", &[Arc::clone(&parent)], None)
            .unwrap();

        let result = metrics.sensor_with("gc", &[child1, child2], None);
        assert!(matches!(
            result,
            Err(MetricsError::IllegalSensorHierarchy(_))
        ));
    }

    #[test]
    fn test_sensor_reuse_and_conflicts() {
        let (_clock, metrics) = mock_metrics();
        let parent = metrics.sensor("test.parent").unwrap();
        let first = metrics
            .sensor_with("test.child", &[Arc::clone(&parent)], None)
            .unwrap();
        let again = metrics
            .sensor_with("test.child", &[Arc::clone(&parent)], None)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = metrics.sensor("test.other").unwrap();
        assert!(matches!(
            metrics.sensor_with("test.child", &[other], None),
            Err(MetricsError::IllegalSensorHierarchy(_))
        ));
        assert!(matches!(
            metrics.sensor_with("test.child", &[], Some(MetricConfig::new().samples(7))),
            Err(MetricsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duplicate_metric_name() {
        let (_clock, metrics) = mock_metrics();
        metrics
            .sensor("test")
            .unwrap()
            .add("test", Avg::new())
            .unwrap();
        let result = metrics.sensor("test2").unwrap().add("test", Total::new());
        assert!(matches!(
            result,
            Err(MetricsError::DuplicateMetricName(name)) if name == "test"
        ));
    }

    #[test]
    fn test_compound_registration_is_atomic() {
        let (_clock, metrics) = mock_metrics();
        metrics
            .add_metric("test.p50", |_: &MetricConfig, _: i64| 0.0)
            .unwrap();

        let sensor = metrics.sensor("test.sensor").unwrap();
        let result = sensor.add_compound(
            Percentiles::new(
                10,
                0.0,
                1.0,
                BucketSizing::Constant,
                vec![
                    Percentile::new("test.p99", 99.0),
                    Percentile::new("test.p50", 50.0),
                ],
            )
            .unwrap(),
        );
        assert!(matches!(
            result,
            Err(MetricsError::DuplicateMetricName(_))
        ));

        // The non-colliding sibling must not have landed either.
        assert!(matches!(
            metrics.get_metric("test.p99"),
            Err(MetricsError::MetricNotFound(_))
        ));
    }

    #[test]
    fn test_quotas() {
        let (_clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        sensor
            .add_with_config(
                "test1.total",
                Total::new(),
                MetricConfig::new().quota(Quota::less_than(5.0)),
            )
            .unwrap();
        sensor
            .add_with_config(
                "test2.total",
                Total::new(),
                MetricConfig::new().quota(Quota::more_than(0.0)),
            )
            .unwrap();

        sensor.record(5.0).unwrap();
        let violation = sensor.record(1.0);
        match violation {
            Err(MetricsError::QuotaViolation { name, value, .. }) => {
                assert_eq!(name, "test1.total");
                assert!((value - 6.0).abs() < EPS);
            }
            other => panic!("expected a quota violation, got {:?}", other),
        }

        // The violating observation is persisted.
        let total = metrics.metrics().get("test1.total").unwrap().value();
        assert!((total - 6.0).abs() < EPS);

        sensor.record(-6.0).unwrap();
        assert!(matches!(
            sensor.record(-1.0),
            Err(MetricsError::QuotaViolation { .. })
        ));
    }

    #[test]
    fn test_percentiles_end_to_end() {
        let (_clock, metrics) = mock_metrics();
        let buckets = 100;
        let percs = Percentiles::new(
            4 * buckets,
            0.0,
            100.0,
            BucketSizing::Constant,
            vec![
                Percentile::new("test.p25", 25.0),
                Percentile::new("test.p50", 50.0),
                Percentile::new("test.p75", 75.0),
            ],
        )
        .unwrap();
        let config = MetricConfig::new().event_window(50).samples(2);
        let sensor = metrics.sensor_with("test", &[], Some(config)).unwrap();
        sensor.add_compound(percs).unwrap();

        let p25 = metrics.get_metric("test.p25").unwrap();
        let p50 = metrics.get_metric("test.p50").unwrap();
        let p75 = metrics.get_metric("test.p75").unwrap();

        // Two windows worth of sequential values.
        for i in 0..buckets {
            sensor.record(i as f64).unwrap();
        }
        assert!((p25.value() - 25.0).abs() <= 1.0);
        assert!((p50.value() - 50.0).abs() <= 1.0);
        assert!((p75.value() - 75.0).abs() <= 1.0);

        for _ in 0..buckets {
            sensor.record(0.0).unwrap();
        }
        assert!(p25.value().abs() <= 1.0);
        assert!(p50.value().abs() <= 1.0);
        assert!(p75.value().abs() <= 1.0);
    }

    #[test]
    fn test_all_samples_purged() {
        let (clock, metrics) = mock_metrics();
        let time_window = 10_000;
        let config = MetricConfig::new().time_window_ms(time_window).samples(2);
        let sensor = metrics
            .sensor_with("test.purged", &[], Some(config))
            .unwrap();
        let rate = sensor.add("test.purged.qps", OccurrenceRate::new()).unwrap();

        sensor.record(12_345.0).unwrap();
        clock.sleep(1000);
        assert_eq!(rate.value(), 1.0);

        // All samples purge on the next measurement: zero, not NaN.
        clock.sleep(2 * time_window as u64);
        assert_eq!(rate.value(), 0.0);
    }

    #[test]
    fn test_get_metric_not_found() {
        let (_clock, metrics) = mock_metrics();
        assert!(matches!(
            metrics.get_metric("nope"),
            Err(MetricsError::MetricNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_snapshot_reports_values_and_units() {
        let (_clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        sensor.add("test.count", SampledCount::new()).unwrap();
        sensor
            .add_with_config(
                "test.rate",
                Rate::new(TimeUnit::Minutes),
                MetricConfig::new().unit(TimeUnit::Minutes),
            )
            .unwrap();
        sensor.record(3.0).unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.value("test.count"), Some(1.0));
        assert_eq!(snapshot.unit("test.rate"), Some(TimeUnit::Minutes));
    }

    #[derive(Default)]
    struct Counts {
        init: AtomicUsize,
        changed: AtomicUsize,
        removed: AtomicUsize,
        closed: AtomicUsize,
    }

    struct CountingReporter(Arc<Counts>);

    impl MetricsReporter for CountingReporter {
        fn init(&mut self, metrics: &[Metric]) {
            self.0.init.fetch_add(metrics.len(), Ordering::SeqCst);
        }

        fn metric_change(&mut self, _metric: &Metric) {
            self.0.changed.fetch_add(1, Ordering::SeqCst);
        }

        fn metric_removal(&mut self, _metric: &Metric) {
            self.0.removed.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_reporter_lifecycle() {
        let (_clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        sensor.add("test.before", Total::new()).unwrap();

        let counts = Arc::new(Counts::default());
        metrics.add_reporter(CountingReporter(Arc::clone(&counts)));
        assert_eq!(counts.init.load(Ordering::SeqCst), 1);

        sensor.add("test.after", Total::new()).unwrap();
        assert_eq!(counts.changed.load(Ordering::SeqCst), 1);

        metrics.remove_metric("test.after").unwrap();
        assert_eq!(counts.removed.load(Ordering::SeqCst), 1);

        drop(metrics);
        assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sensor_outliving_registry_cannot_add() {
        let (_clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        drop(metrics);
        assert!(matches!(
            sensor.add("test.count", SampledCount::new()),
            Err(MetricsError::RegistryClosed)
        ));
    }

    #[test]
    fn test_measure_is_stable_without_records() {
        let (clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        let avg = sensor.add("test.avg", Avg::new()).unwrap();
        for i in 0..4 {
            sensor.record(i as f64).unwrap();
        }
        clock.sleep(100);
        let first = avg.value();
        let second = avg.value();
        assert_eq!(first, second);
        assert!((first - 1.5).abs() < EPS);
    }

    #[test]
    fn test_last_record_timestamp_is_cached() {
        let (clock, metrics) = mock_metrics();
        let sensor = metrics.sensor("test").unwrap();
        clock.sleep(500);
        sensor.record(1.0).unwrap();
        assert_eq!(sensor.last_record_ms(), 500);
        assert!(metrics.get_sensor("test").is_some());
        assert!(metrics.get_sensor("missing").is_none());
    }
}
