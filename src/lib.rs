//! Process-embedded metrics: record observations against named sensors,
//! fold them through windowed stats, and expose the results as named,
//! quota-checked metrics.

pub mod clock;
mod config;
mod error;
mod metric;
mod quota;
mod registry;
mod reporter;
mod sensor;
mod snapshot;
mod stats;

pub use self::{
    config::{MetricConfig, TimeUnit},
    error::MetricsError,
    metric::{Measurable, Metric},
    quota::Quota,
    registry::{MetricMap, Metrics, MetricsBuilder},
    reporter::{ChannelReporter, MetricEvent, MetricsReporter},
    sensor::Sensor,
    snapshot::Snapshot,
    stats::{
        Avg, BucketSizing, CompoundStat, Max, MeasurableStat, Min, OccurrenceRate, Percentile,
        Percentiles, Rate, SampledCount, SampledTotal, Stat, Total,
    },
};
