use crate::config::MetricConfig;

use super::window::SampleWindow;
use super::{MeasurableStat, Stat};

/// How the shared engine folds observations into a sample and samples into a
/// measured value.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SampleKind {
    Sum,
    Count,
    Max,
    Min,
    Avg,
}

impl SampleKind {
    fn identity(&self) -> f64 {
        match self {
            SampleKind::Sum | SampleKind::Count | SampleKind::Avg => 0.0,
            SampleKind::Max => f64::NEG_INFINITY,
            SampleKind::Min => f64::INFINITY,
        }
    }
}

/// Scalar windowed-stat engine: one rotation implementation, a tagged kind for
/// the per-sample update and the cross-sample combine.
pub(crate) struct SampledStat {
    kind: SampleKind,
    window: SampleWindow<f64>,
}

impl SampledStat {
    pub(crate) fn new(kind: SampleKind) -> SampledStat {
        SampledStat {
            window: SampleWindow::new(kind.identity()),
            kind,
        }
    }

    pub(crate) fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64) {
        let kind = self.kind;
        self.window.record(config, now_ms, |state| match kind {
            SampleKind::Sum | SampleKind::Avg => *state += value,
            SampleKind::Count => *state += 1.0,
            SampleKind::Max => *state = state.max(value),
            SampleKind::Min => *state = state.min(value),
        });
    }

    /// Purges stale samples, then combines the survivors. With everything
    /// purged this yields the kind's identity, never NaN.
    pub(crate) fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64 {
        self.window.purge(config, now_ms);
        let samples = self.window.samples();
        match self.kind {
            SampleKind::Sum | SampleKind::Count => samples.iter().map(|s| s.state).sum(),
            SampleKind::Max => samples
                .iter()
                .map(|s| s.state)
                .fold(f64::NEG_INFINITY, f64::max),
            SampleKind::Min => samples.iter().map(|s| s.state).fold(f64::INFINITY, f64::min),
            SampleKind::Avg => {
                let events = self.window.event_total();
                if events == 0 {
                    0.0
                } else {
                    samples.iter().map(|s| s.state).sum::<f64>() / events as f64
                }
            }
        }
    }

    pub(crate) fn oldest_start_ms(&self, now_ms: i64) -> i64 {
        self.window.oldest_start_ms(now_ms)
    }
}

/// Average of the values recorded in the sample window.
pub struct Avg(SampledStat);

impl Avg {
    pub fn new() -> Avg {
        Avg(SampledStat::new(SampleKind::Avg))
    }
}

/// Largest value recorded in the sample window; negative infinity when the
/// window is empty.
pub struct Max(SampledStat);

impl Max {
    pub fn new() -> Max {
        Max(SampledStat::new(SampleKind::Max))
    }
}

/// Smallest value recorded in the sample window; positive infinity when the
/// window is empty.
pub struct Min(SampledStat);

impl Min {
    pub fn new() -> Min {
        Min(SampledStat::new(SampleKind::Min))
    }
}

/// Number of events recorded in the sample window, regardless of their values.
pub struct SampledCount(SampledStat);

impl SampledCount {
    pub fn new() -> SampledCount {
        SampledCount(SampledStat::new(SampleKind::Count))
    }
}

/// Sum of the values recorded in the sample window.
///
/// Unlike [`Total`](crate::Total) this forgets values as their samples age
/// out.
pub struct SampledTotal(SampledStat);

impl SampledTotal {
    pub fn new() -> SampledTotal {
        SampledTotal(SampledStat::new(SampleKind::Sum))
    }
}

macro_rules! delegate_stat {
    ($name:ident) => {
        impl Default for $name {
            fn default() -> $name {
                $name::new()
            }
        }

        impl Stat for $name {
            fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64) {
                self.0.record(config, value, now_ms)
            }
        }

        impl MeasurableStat for $name {
            fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64 {
                self.0.measure(config, now_ms)
            }
        }
    };
}

delegate_stat!(Avg);
delegate_stat!(Max);
delegate_stat!(Min);
delegate_stat!(SampledCount);
delegate_stat!(SampledTotal);
