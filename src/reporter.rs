use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use crate::metric::Metric;

/// Callback surface invoked as metrics come and go.
///
/// Callbacks run on the thread mutating the registry, with the registry lock
/// held — implementations must not block. Anything slow belongs on the far
/// side of a channel (see [`ChannelReporter`]).
pub trait MetricsReporter: Send {
    /// Called once when the reporter is attached, with the metrics registered
    /// so far.
    fn init(&mut self, metrics: &[Metric]);

    /// Called for every newly registered metric.
    fn metric_change(&mut self, metric: &Metric);

    /// Called for every removed metric.
    fn metric_removal(&mut self, metric: &Metric);

    /// Called when the registry shuts down.
    fn close(&mut self);
}

/// A registry lifecycle event, as forwarded by [`ChannelReporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricEvent {
    Added(String),
    Removed(String),
    Closed,
}

/// A reporter that offloads events into a bounded channel.
///
/// Sends never block: when the consumer falls behind, events are dropped and
/// logged instead of stalling registration.
pub struct ChannelReporter {
    events_tx: Sender<MetricEvent>,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving half its consumer drains.
    pub fn new(capacity: usize) -> (ChannelReporter, Receiver<MetricEvent>) {
        let (events_tx, events_rx) = bounded(capacity);
        (ChannelReporter { events_tx }, events_rx)
    }

    fn send(&self, event: MetricEvent) {
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            warn!(?event, "reporter channel full, dropping event");
        }
    }
}

impl MetricsReporter for ChannelReporter {
    fn init(&mut self, metrics: &[Metric]) {
        for metric in metrics {
            self.send(MetricEvent::Added(metric.name().to_owned()));
        }
    }

    fn metric_change(&mut self, metric: &Metric) {
        self.send(MetricEvent::Added(metric.name().to_owned()));
    }

    fn metric_removal(&mut self, metric: &Metric) {
        self.send(MetricEvent::Removed(metric.name().to_owned()));
    }

    fn close(&mut self) {
        self.send(MetricEvent::Closed);
    }
}
