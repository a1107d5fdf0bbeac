use crate::config::MetricConfig;

/// One cell of a windowed stat's rotating buffer.
pub(crate) struct Sample<S> {
    pub state: S,
    pub event_count: u64,
    pub window_start_ms: i64,
}

impl<S> Sample<S> {
    /// Whether this sample, as the current one, should rotate before the next
    /// record: it has seen a full event window or a full time window.
    fn complete(&self, config: &MetricConfig, now_ms: i64) -> bool {
        self.event_count >= config.get_event_window()
            || now_ms - self.window_start_ms >= config.get_time_window_ms()
    }
}

/// The rotation machinery shared by every windowed stat.
///
/// Holds a fixed-length array of samples and the index of the current one.
/// The array is allocated on first use with the prevailing config's sample
/// count and never resized afterward. Rotation recycles the next cell when the
/// current sample completes; purging resets any sample older than the whole
/// window span (`time_window_ms * samples`) back to the identity state, so a
/// sample is only discarded once it is at least `samples` windows old.
pub(crate) struct SampleWindow<S: Clone> {
    identity: S,
    samples: Vec<Sample<S>>,
    current: usize,
}

impl<S: Clone> SampleWindow<S> {
    pub fn new(identity: S) -> SampleWindow<S> {
        SampleWindow {
            identity,
            samples: Vec::new(),
            current: 0,
        }
    }

    fn ensure_allocated(&mut self, config: &MetricConfig, now_ms: i64) {
        if self.samples.is_empty() {
            let count = config.get_samples().max(1);
            self.samples = (0..count)
                .map(|_| Sample {
                    state: self.identity.clone(),
                    event_count: 0,
                    window_start_ms: now_ms,
                })
                .collect();
        }
    }

    /// Applies one observation to the current sample, rotating first if it has
    /// completed its window.
    pub fn record<F>(&mut self, config: &MetricConfig, now_ms: i64, update: F)
    where
        F: FnOnce(&mut S),
    {
        self.ensure_allocated(config, now_ms);
        if self.samples[self.current].complete(config, now_ms) {
            self.advance(now_ms);
        }

        let sample = &mut self.samples[self.current];
        update(&mut sample.state);
        sample.event_count += 1;
        if sample.event_count == 1 {
            sample.window_start_ms = now_ms;
        }
    }

    fn advance(&mut self, now_ms: i64) {
        self.current = (self.current + 1) % self.samples.len();
        self.reset_at(self.current, now_ms);
    }

    fn reset_at(&mut self, index: usize, now_ms: i64) {
        let identity = self.identity.clone();
        let sample = &mut self.samples[index];
        sample.state = identity;
        sample.event_count = 0;
        sample.window_start_ms = now_ms;
    }

    /// Resets every sample that has aged past the whole window span.
    pub fn purge(&mut self, config: &MetricConfig, now_ms: i64) {
        self.ensure_allocated(config, now_ms);
        let span = config
            .get_time_window_ms()
            .saturating_mul(config.get_samples() as i64);
        for index in 0..self.samples.len() {
            if now_ms - self.samples[index].window_start_ms >= span {
                self.reset_at(index, now_ms);
            }
        }
    }

    pub fn samples(&self) -> &[Sample<S>] {
        &self.samples
    }

    pub fn event_total(&self) -> u64 {
        self.samples.iter().map(|s| s.event_count).sum()
    }

    /// Window start of the oldest retained sample; `now_ms` if nothing has
    /// been allocated yet.
    pub fn oldest_start_ms(&self, now_ms: i64) -> i64 {
        self.samples
            .iter()
            .map(|s| s.window_start_ms)
            .min()
            .unwrap_or(now_ms)
    }
}
