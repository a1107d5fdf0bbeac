use crate::config::{MetricConfig, TimeUnit};

use super::sampled::{SampleKind, SampledStat};
use super::{MeasurableStat, Stat};

/// The rate at which values accumulate: the windowed sum of recorded values
/// divided by the elapsed window duration in the requested unit.
///
/// The denominator is the span from the oldest retained sample's window start
/// to `now`, taken after purging. When everything has been purged the span is
/// empty and the rate is 0.0 rather than NaN.
pub struct Rate {
    unit: TimeUnit,
    stat: SampledStat,
}

impl Rate {
    pub fn new(unit: TimeUnit) -> Rate {
        Rate {
            unit,
            stat: SampledStat::new(SampleKind::Sum),
        }
    }

    pub(crate) fn occurrences(unit: TimeUnit) -> Rate {
        Rate {
            unit,
            stat: SampledStat::new(SampleKind::Count),
        }
    }
}

impl Default for Rate {
    fn default() -> Rate {
        Rate::new(TimeUnit::Seconds)
    }
}

impl Stat for Rate {
    fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64) {
        self.stat.record(config, value, now_ms);
    }
}

impl MeasurableStat for Rate {
    fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64 {
        let value = self.stat.measure(config, now_ms);
        let elapsed = self
            .unit
            .convert_ms(now_ms - self.stat.oldest_start_ms(now_ms));
        if elapsed <= 0.0 {
            0.0
        } else {
            value / elapsed
        }
    }
}

/// The rate of events regardless of their values: a [`Rate`] over the windowed
/// event count.
pub struct OccurrenceRate(Rate);

impl OccurrenceRate {
    pub fn new() -> OccurrenceRate {
        OccurrenceRate::with_unit(TimeUnit::Seconds)
    }

    pub fn with_unit(unit: TimeUnit) -> OccurrenceRate {
        OccurrenceRate(Rate::occurrences(unit))
    }
}

impl Default for OccurrenceRate {
    fn default() -> OccurrenceRate {
        OccurrenceRate::new()
    }
}

impl Stat for OccurrenceRate {
    fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64) {
        self.0.record(config, value, now_ms);
    }
}

impl MeasurableStat for OccurrenceRate {
    fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64 {
        self.0.measure(config, now_ms)
    }
}
