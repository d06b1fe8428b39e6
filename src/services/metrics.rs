use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

use crate::models::{RejectReason, StreamKind};

lazy_static! {
    static ref RESOLUTIONS: IntCounterVec = register_int_counter_vec!(
        "resolver_resolutions_total",
        "Resolutions by outcome",
        &["outcome"]
    )
    .expect("resolver_resolutions_total registers once");

    static ref FILTER_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "resolver_filter_rejections_total",
        "Candidate URLs dropped by the filter chain",
        &["reason"]
    )
    .expect("resolver_filter_rejections_total registers once");

    static ref DISPATCHES: IntCounterVec = register_int_counter_vec!(
        "resolver_dispatch_total",
        "Playlist URLs handed to a stream parser",
        &["kind", "result"]
    )
    .expect("resolver_dispatch_total registers once");
}

pub fn record_resolution(outcome: &str) {
    RESOLUTIONS.with_label_values(&[outcome]).inc();
}

pub fn record_rejection(reason: RejectReason) {
    FILTER_REJECTIONS.with_label_values(&[reason.code()]).inc();
}

pub fn record_dispatch(kind: StreamKind, result: &str) {
    DISPATCHES.with_label_values(&[kind.as_str(), result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_gathered() {
        record_rejection(RejectReason::Ads);
        record_dispatch(StreamKind::Hls, "ok");
        record_resolution("streams");

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"resolver_filter_rejections_total".to_string()));
        assert!(names.contains(&"resolver_dispatch_total".to_string()));
        assert!(names.contains(&"resolver_resolutions_total".to_string()));
    }
}
