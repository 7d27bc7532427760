use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

/// Controller-wide counters and latency histograms, exported over `/metrics`
/// when the `metrics` feature is enabled.
#[derive(Clone)]
pub struct ControllerMetrics {
    pub reconciliations: IntCounterVec,
    pub reconcile_errors: IntCounterVec,
    pub actions: IntCounterVec,
    pub reconcile_duration: HistogramVec,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self {
            reconciliations: register_int_counter_vec!(
                "ark_operator_reconciliations_total",
                "Number of times a cluster was reconciled",
                &["cluster"]
            )
            .expect("metric registration"),
            reconcile_errors: register_int_counter_vec!(
                "ark_operator_reconcile_errors_total",
                "Number of reconciliations that ended in an error",
                &["cluster", "kind"]
            )
            .expect("metric registration"),
            actions: register_int_counter_vec!(
                "ark_operator_actions_total",
                "Number of actions taken by the reconciler",
                &["cluster", "action"]
            )
            .expect("metric registration"),
            reconcile_duration: register_histogram_vec!(
                "ark_operator_reconcile_duration_seconds",
                "Time spent handling a single reconcile call",
                &["cluster"]
            )
            .expect("metric registration"),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
