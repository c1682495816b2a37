//! Metrics declaration and initialization.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Cache status metrics

    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "restbox_cache_hit_total",
            "Total number of requests served from the response cache."
        );
        "restbox_cache_hit_total"
    };
    /// Track number of requests coalesced onto an in-flight request.
    pub static ref CACHE_FUTURE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "restbox_cache_future_hit_total",
            "Total number of requests coalesced onto an identical in-flight request."
        );
        "restbox_cache_future_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "restbox_cache_miss_total",
            "Total number of cacheable requests that went to the network."
        );
        "restbox_cache_miss_total"
    };
    /// Track number of evicted entries, labelled by reason.
    pub static ref CACHE_EVICTED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "restbox_cache_evicted_total",
            "Total number of entries evicted from the response cache."
        );
        "restbox_cache_evicted_total"
    };

    // Upstream metrics

    /// Track number of requests handed to the transport.
    pub static ref UPSTREAM_REQUESTS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "restbox_upstream_requests_total",
            "Total number of requests sent through the transport."
        );
        "restbox_upstream_requests_total"
    };
    /// Histogram of transport round-trip timings.
    pub static ref UPSTREAM_DURATION_HISTOGRAM: &'static str = {
        metrics::describe_histogram!(
            "restbox_upstream_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of upstream requests in seconds."
        );
        "restbox_upstream_duration_seconds"
    };
}

/// Record one transport round-trip.
///
/// `outcome` is the status code as text, or `"error"` when the transport
/// failed. When the `metrics` feature is disabled this is a no-op.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_upstream(method: &http::Method, outcome: &str, duration: Duration) {
    metrics::counter!(
        *UPSTREAM_REQUESTS_COUNTER,
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(*UPSTREAM_DURATION_HISTOGRAM, "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_upstream(_method: &http::Method, _outcome: &str, _duration: Duration) {}
