//! Reading metrics recorded through a `DebuggingRecorder`.
//!
//! [`Snapshotter::snapshot`] drains what it reports, so take one
//! [`snapshot`] per assertion block and query that.

use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// One recorded metric as reported by a snapshot.
pub type MetricEntry = (CompositeKey, Option<Unit>, Option<SharedString>, DebugValue);

/// Create a debugging recorder and its snapshotter.
///
/// Install the recorder for a closure with [`metrics::with_local_recorder`].
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Take a single snapshot of everything recorded so far.
#[must_use]
pub fn snapshot(snapshotter: &Snapshotter) -> Vec<MetricEntry> { snapshotter.snapshot().into_vec() }

/// Value of counter `name` carrying `label`, if it was recorded.
#[must_use]
pub fn counter_value(metrics: &[MetricEntry], name: &str, label: (&str, &str)) -> Option<u64> {
    metrics.iter().find_map(|(key, _, _, value)| {
        let matches = key.key().name() == name
            && key
                .key()
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1);
        match value {
            DebugValue::Counter(count) if matches => Some(*count),
            _ => None,
        }
    })
}

/// Value of gauge `name`, if it was recorded.
#[must_use]
pub fn gauge_value(metrics: &[MetricEntry], name: &str) -> Option<f64> {
    metrics.iter().find_map(|(key, _, _, value)| match value {
        DebugValue::Gauge(gauge) if key.key().name() == name => Some(gauge.into_inner()),
        _ => None,
    })
}
