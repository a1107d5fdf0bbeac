use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MetricConfig;
use crate::metric::Measurable;

mod percentiles;
mod rate;
mod sampled;
mod total;
mod window;

pub use self::{
    percentiles::{BucketSizing, Percentile, Percentiles},
    rate::{OccurrenceRate, Rate},
    sampled::{Avg, Max, Min, SampledCount, SampledTotal},
    total::Total,
};

/// An algorithm that consumes observations recorded at a sensor.
pub trait Stat: Send {
    fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64);
}

/// A stat that also exposes a single measured value, making it bindable to a
/// named metric.
pub trait MeasurableStat: Stat {
    fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64;
}

/// A stat that registers several named metrics sharing one underlying state,
/// such as the quantile targets of a [`Percentiles`] histogram.
///
/// When added to a sensor, the sensor wraps the stat once and asks it for the
/// `(name, measurable)` pairs to register; registration is all-or-nothing.
pub trait CompoundStat: MeasurableStat + Sized {
    fn named_measurables(shared: &Arc<Mutex<Self>>) -> Vec<(String, Arc<dyn Measurable>)>;
}
