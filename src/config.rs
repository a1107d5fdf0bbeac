use std::time::Duration;

use crate::{error::MetricsError, quota::Quota};

/// Time unit used to normalize rates and label metric values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts a millisecond span into this unit.
    pub(crate) fn convert_ms(&self, ms: i64) -> f64 {
        let ms = ms as f64;
        match self {
            TimeUnit::Nanoseconds => ms * 1_000_000.0,
            TimeUnit::Microseconds => ms * 1_000.0,
            TimeUnit::Milliseconds => ms,
            TimeUnit::Seconds => ms / 1_000.0,
            TimeUnit::Minutes => ms / 60_000.0,
            TimeUnit::Hours => ms / 3_600_000.0,
            TimeUnit::Days => ms / 86_400_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

/// Configuration bundle for a sensor or an individual stat.
///
/// Built fluently and frozen once bound; changing a sensor's config later never
/// resizes sample arrays that stats have already allocated.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricConfig {
    quota: Option<Quota>,
    samples: usize,
    event_window: u64,
    time_window_ms: i64,
    unit: TimeUnit,
}

impl Default for MetricConfig {
    fn default() -> MetricConfig {
        MetricConfig {
            quota: None,
            samples: 2,
            event_window: u64::MAX,
            time_window_ms: 30_000,
            unit: TimeUnit::Seconds,
        }
    }
}

impl MetricConfig {
    /// Creates a config with the default values.
    ///
    /// Defaults to 2 samples over 30 second windows, an effectively unbounded
    /// event window, no quota, and seconds as the rate unit.
    pub fn new() -> MetricConfig {
        Default::default()
    }

    /// Sets the quota checked after every record.
    pub fn quota(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Sets the number of samples retained for windowed stats.
    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Sets the maximum number of events a single sample may hold.
    pub fn event_window(mut self, events: u64) -> Self {
        self.event_window = events;
        self
    }

    /// Sets the time span of a single sample.
    pub fn time_window(self, window: Duration) -> Self {
        self.time_window_ms(window.as_millis() as i64)
    }

    /// Sets the time span of a single sample, in milliseconds.
    pub fn time_window_ms(mut self, ms: i64) -> Self {
        self.time_window_ms = ms;
        self
    }

    /// Sets the unit used to normalize rates computed under this config.
    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn get_quota(&self) -> Option<Quota> {
        self.quota
    }

    pub fn get_samples(&self) -> usize {
        self.samples
    }

    pub fn get_event_window(&self) -> u64 {
        self.event_window
    }

    pub fn get_time_window_ms(&self) -> i64 {
        self.time_window_ms
    }

    pub fn get_unit(&self) -> TimeUnit {
        self.unit
    }

    /// Rejects configs no stat can operate under.
    ///
    /// Runs when the config is bound (registry build, sensor creation, metric
    /// addition) rather than in the setters, so fluent chains stay infallible.
    pub(crate) fn validate(&self) -> Result<(), MetricsError> {
        if self.samples == 0 {
            return Err(MetricsError::InvalidConfig(
                "samples must be at least 1".to_owned(),
            ));
        }
        if self.event_window == 0 {
            return Err(MetricsError::InvalidConfig(
                "event window must be positive".to_owned(),
            ));
        }
        if self.time_window_ms <= 0 {
            return Err(MetricsError::InvalidConfig(
                "time window must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
