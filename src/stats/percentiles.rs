use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MetricConfig;
use crate::error::MetricsError;
use crate::metric::Measurable;

use super::window::SampleWindow;
use super::{CompoundStat, MeasurableStat, Stat};

/// A labeled quantile target, with the quantile expressed in [0, 100].
#[derive(Clone, Debug)]
pub struct Percentile {
    name: String,
    quantile: f64,
}

impl Percentile {
    pub fn new(name: impl Into<String>, quantile: f64) -> Percentile {
        Percentile {
            name: name.into(),
            quantile: quantile.clamp(0.0, 100.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }
}

/// Bucket layout of the histogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketSizing {
    /// Uniform bins over `[min, max]`.
    Constant,
    /// Bin widths grow linearly, giving finer resolution near `min`.
    Linear,
}

#[derive(Clone, Debug)]
enum BinScheme {
    Constant { bins: usize, min: f64, max: f64 },
    Linear { bins: usize, min: f64, max: f64 },
}

impl BinScheme {
    fn bins(&self) -> usize {
        match self {
            BinScheme::Constant { bins, .. } | BinScheme::Linear { bins, .. } => *bins,
        }
    }

    fn min(&self) -> f64 {
        match self {
            BinScheme::Constant { min, .. } | BinScheme::Linear { min, .. } => *min,
        }
    }

    /// Maps a value to its bin, clamping out-of-range values into the end
    /// bins.
    fn to_bin(&self, value: f64) -> usize {
        match *self {
            BinScheme::Constant { bins, min, max } => {
                if value <= min {
                    0
                } else if value >= max {
                    bins - 1
                } else {
                    let idx = ((value - min) / (max - min) * bins as f64).floor() as usize;
                    idx.min(bins - 1)
                }
            }
            BinScheme::Linear { bins, min, max } => {
                if value <= min {
                    0
                } else if value >= max {
                    bins - 1
                } else {
                    // Invert boundary(k) = min + span * k(k+1) / (n(n+1)).
                    let scaled = (value - min) / (max - min) * (bins * (bins + 1)) as f64;
                    let bin = ((1.0 + 4.0 * scaled).sqrt() - 1.0) / 2.0;
                    (bin.floor() as usize).min(bins - 1)
                }
            }
        }
    }

    /// Midpoint value of a bin, reported as the percentile estimate.
    fn midpoint(&self, bin: usize) -> f64 {
        match *self {
            BinScheme::Constant { bins, min, max } => {
                min + (bin as f64 + 0.5) * (max - min) / bins as f64
            }
            BinScheme::Linear { .. } => {
                (self.linear_boundary(bin) + self.linear_boundary(bin + 1)) / 2.0
            }
        }
    }

    fn linear_boundary(&self, k: usize) -> f64 {
        match *self {
            BinScheme::Linear { bins, min, max } => {
                min + (max - min) * (k * (k + 1)) as f64 / (bins * (bins + 1)) as f64
            }
            BinScheme::Constant { .. } => unreachable!(),
        }
    }
}

#[derive(Clone)]
struct Histogram {
    counts: Vec<u64>,
}

/// A bucketed, sample-windowed quantile estimator.
///
/// One histogram window backs every requested [`Percentile`]; adding the stat
/// to a sensor registers one metric per target, all-or-nothing. Measured
/// directly (rather than through a target) it reports the median.
pub struct Percentiles {
    scheme: BinScheme,
    targets: Vec<Percentile>,
    window: SampleWindow<Histogram>,
}

impl Percentiles {
    pub fn new(
        bin_count: usize,
        min: f64,
        max: f64,
        sizing: BucketSizing,
        percentiles: Vec<Percentile>,
    ) -> Result<Percentiles, MetricsError> {
        if bin_count == 0 {
            return Err(MetricsError::InvalidConfig(
                "histogram needs at least one bin".to_owned(),
            ));
        }
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(MetricsError::InvalidConfig(format!(
                "histogram range [{}, {}] is not a valid interval",
                min, max
            )));
        }

        let scheme = match sizing {
            BucketSizing::Constant => BinScheme::Constant {
                bins: bin_count,
                min,
                max,
            },
            BucketSizing::Linear => BinScheme::Linear {
                bins: bin_count,
                min,
                max,
            },
        };

        Ok(Percentiles {
            scheme,
            targets: percentiles,
            window: SampleWindow::new(Histogram {
                counts: vec![0; bin_count],
            }),
        })
    }

    /// Estimates the value at `quantile` from the combined histogram of all
    /// retained samples. An empty histogram reports the range minimum.
    fn value(&mut self, config: &MetricConfig, now_ms: i64, quantile: f64) -> f64 {
        self.window.purge(config, now_ms);
        let samples = self.window.samples();

        let total: u64 = samples
            .iter()
            .map(|s| s.state.counts.iter().sum::<u64>())
            .sum();
        if total == 0 {
            return self.scheme.min();
        }

        let threshold = quantile / 100.0 * total as f64;
        let mut cumulative = 0u64;
        for bin in 0..self.scheme.bins() {
            cumulative += samples.iter().map(|s| s.state.counts[bin]).sum::<u64>();
            if cumulative as f64 >= threshold {
                return self.scheme.midpoint(bin);
            }
        }
        self.scheme.midpoint(self.scheme.bins() - 1)
    }
}

impl Stat for Percentiles {
    fn record(&mut self, config: &MetricConfig, value: f64, now_ms: i64) {
        let bin = self.scheme.to_bin(value);
        self.window.record(config, now_ms, |histogram| {
            histogram.counts[bin] += 1;
        });
    }
}

impl MeasurableStat for Percentiles {
    fn measure(&mut self, config: &MetricConfig, now_ms: i64) -> f64 {
        self.value(config, now_ms, 50.0)
    }
}

impl CompoundStat for Percentiles {
    fn named_measurables(shared: &Arc<Mutex<Self>>) -> Vec<(String, Arc<dyn Measurable>)> {
        let targets = shared.lock().targets.clone();
        targets
            .into_iter()
            .map(|target| {
                let measurable: Arc<dyn Measurable> = Arc::new(PercentileMeasurable {
                    stat: Arc::clone(shared),
                    quantile: target.quantile,
                });
                (target.name, measurable)
            })
            .collect()
    }
}

/// Read capability for one quantile of a shared histogram.
struct PercentileMeasurable {
    stat: Arc<Mutex<Percentiles>>,
    quantile: f64,
}

impl Measurable for PercentileMeasurable {
    fn measure(&self, config: &MetricConfig, now_ms: i64) -> f64 {
        self.stat.lock().value(config, now_ms, self.quantile)
    }
}
