use crate::config::MetricConfig;

use super::{MeasurableStat, Stat};

/// A running sum over the sensor's whole lifetime, unaffected by windowing.
pub struct Total {
    total: f64,
}

impl Total {
    pub fn new() -> Total {
        Total { total: 0.0 }
    }
}

impl Default for Total {
    fn default() -> Total {
        Total::new()
    }
}

impl Stat for Total {
    fn record(&mut self, _config: &MetricConfig, value: f64, _now_ms: i64) {
        self.total += value;
    }
}

impl MeasurableStat for Total {
    fn measure(&mut self, _config: &MetricConfig, _now_ms: i64) -> f64 {
        self.total
    }
}
