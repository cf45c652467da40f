//! Metrics definitions for the correlator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CALLBACKS_RECEIVED: MetricDef = MetricDef {
    name: "callbacks.received",
    metric_type: MetricType::Counter,
    description: "Callback deliveries accepted by the webhook",
};

pub const CALLBACKS_REJECTED: MetricDef = MetricDef {
    name: "callbacks.rejected",
    metric_type: MetricType::Counter,
    description: "Callback deliveries rejected by the webhook. Tagged with reason.",
};

pub const CALLBACKS_OVERWRITTEN: MetricDef = MetricDef {
    name: "callbacks.overwritten",
    metric_type: MetricType::Counter,
    description: "Deliveries that replaced a value which had not been taken yet",
};

pub const CALLBACKS_PENDING: MetricDef = MetricDef {
    name: "callbacks.pending",
    metric_type: MetricType::Gauge,
    description: "Delivered values waiting to be taken",
};

pub const DISPATCH_DURATION: MetricDef = MetricDef {
    name: "dispatch.duration",
    metric_type: MetricType::Histogram,
    description: "Outbound request duration in seconds, excluding retrieval. Tagged with kind, outcome.",
};

pub const RETRIEVAL_ATTEMPTS: MetricDef = MetricDef {
    name: "retrieval.attempts",
    metric_type: MetricType::Histogram,
    description: "Scheduled lookups performed by a retrieval. Tagged with outcome.",
};

pub const RETRIEVAL_TIMEOUTS: MetricDef = MetricDef {
    name: "retrieval.timeouts",
    metric_type: MetricType::Counter,
    description: "Retrievals that exhausted their attempts without a value",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CALLBACKS_RECEIVED,
    CALLBACKS_REJECTED,
    CALLBACKS_OVERWRITTEN,
    CALLBACKS_PENDING,
    DISPATCH_DURATION,
    RETRIEVAL_ATTEMPTS,
    RETRIEVAL_TIMEOUTS,
];
