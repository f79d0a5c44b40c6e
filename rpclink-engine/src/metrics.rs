//! Link metrics
//!
//! OpenTelemetry instruments recording traffic on a link. Exported through
//! whatever meter provider is installed globally, normally the one set up by
//! `rpclink_core::init_observability`. Without a provider the instruments
//! are no-ops.
//!
//! # Metrics Collected
//!
//! - **requests_sent**: outgoing requests issued with `Link::request` (counter)
//! - **request_duration**: round-trip time of outgoing requests (histogram)
//! - **requests_handled**: inbound requests answered by local handlers (counter)
//! - **handler_duration**: local handler run time (histogram)
//! - **notifications_sent** / **notifications_handled** (counters)
//! - **pending**: outgoing requests awaiting a response, summed over every
//!   link sharing the instruments (up-down counter)
//! - **errors_total**: protocol, correlation and transport errors (counter)
//!
//! Create one instance per service and share it with every link through
//! `LinkBuilder::metrics`:
//!
//! ```rust,no_run
//! use rpclink_engine::{LineTransport, LinkMetrics, Rpc};
//! use std::sync::Arc;
//!
//! # async fn accept(rpc: Rpc, listener: tokio::net::TcpListener) -> rpclink_core::Result<()> {
//! let metrics = Arc::new(LinkMetrics::new("editor-bridge"));
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let link = rpc
//!         .link(LineTransport::new(stream))
//!         .metrics(Arc::clone(&metrics))
//!         .attach()?;
//!     tokio::spawn(async move { link.run().await });
//! }
//! # }
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
    InstrumentationScope, KeyValue,
};

/// Instruments for one or more links, all prefixed `rpclink.link.*`
pub struct LinkMetrics {
    /// Outgoing requests
    pub requests_sent: Counter<u64>,
    /// Outgoing request round-trip time in seconds
    pub request_duration: Histogram<f64>,
    /// Inbound requests handled
    pub requests_handled: Counter<u64>,
    /// Handler run time in seconds
    pub handler_duration: Histogram<f64>,
    /// Outgoing notifications
    pub notifications_sent: Counter<u64>,
    /// Inbound notifications handled
    pub notifications_handled: Counter<u64>,
    /// Outgoing requests awaiting a response
    pub pending: UpDownCounter<i64>,
    /// Errors by type
    pub errors_total: Counter<u64>,
}

impl LinkMetrics {
    /// Create instruments on the global meter named `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into()).build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create instruments on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_sent: meter
                .u64_counter("rpclink.link.requests.sent")
                .with_description("Requests sent to the peer")
                .build(),
            request_duration: meter
                .f64_histogram("rpclink.link.request.duration")
                .with_description("Round-trip time of outgoing requests in seconds")
                .build(),
            requests_handled: meter
                .u64_counter("rpclink.link.requests.handled")
                .with_description("Requests from the peer answered locally")
                .build(),
            handler_duration: meter
                .f64_histogram("rpclink.link.handler.duration")
                .with_description("Local handler run time in seconds")
                .build(),
            notifications_sent: meter
                .u64_counter("rpclink.link.notifications.sent")
                .with_description("Notifications sent to the peer")
                .build(),
            notifications_handled: meter
                .u64_counter("rpclink.link.notifications.handled")
                .with_description("Notifications from the peer handled locally")
                .build(),
            pending: meter
                .i64_up_down_counter("rpclink.link.pending")
                .with_description("Outgoing requests awaiting a response")
                .build(),
            errors_total: meter
                .u64_counter("rpclink.link.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    /// Record a completed outgoing request
    pub fn record_sent(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_sent.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    /// Record an inbound request answered by a local handler
    pub fn record_handled(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_handled.add(1, attributes);
        self.handler_duration.record(duration_secs, attributes);
    }

    /// Record an outgoing notification
    pub fn record_notification_sent(&self, method: &str) {
        let attributes = &[KeyValue::new("method", method.to_string())];
        self.notifications_sent.add(1, attributes);
    }

    /// Record an inbound notification
    pub fn record_notification_handled(&self, method: &str, status: &str) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.notifications_handled.add(1, attributes);
    }

    /// Adjust the pending request count by `delta`
    pub fn pending_changed(&self, delta: i64) {
        if delta != 0 {
            self.pending.add(delta, &[]);
        }
    }

    /// Record an error
    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }
}
