//! Builder pattern for link configuration
//!
//! [`LinkBuilder`] is returned by `Rpc::link(transport)` and sets the
//! per-link options before the link is created.
//!
//! # Configuration Options
//!
//! - **User context**: any value, handed back by `Link::user_context`
//! - **Pool**: share one envelope pool between several links
//! - **Unknown responses**: close the link (default) or ignore them
//! - **Metrics**: OpenTelemetry instruments, shared between links or
//!   created for this one
//! - **Observability**: initialize logging/OTLP export on attach
//!
//! # Examples
//!
//! ```rust,no_run
//! use rpclink_engine::{LineTransport, Rpc, UnknownResponse};
//!
//! #[tokio::main]
//! async fn main() -> rpclink_core::Result<()> {
//!     let (a, _b) = tokio::io::duplex(64 * 1024);
//!
//!     let link = Rpc::new()
//!         .link(LineTransport::new(a))
//!         .user_context(String::from("session-42"))
//!         .unknown_response(UnknownResponse::Ignore)
//!         .with_metrics("editor-bridge")
//!         .attach()?;
//!
//!     link.run().await
//! }
//! ```

use crate::link::{Link, LinkConfig};
use crate::metrics::LinkMetrics;
use crate::rpc::Rpc;
use crate::transport::Transport;
use rpclink_core::{Envelope, Error, MessagePool, ObservabilityConfig, Result};
use std::any::Any;
use std::sync::Arc;

/// What a link does with a response whose id matches no pending request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownResponse {
    /// Terminate the link; `run` returns `Error::UnknownResponse`
    #[default]
    Close,
    /// Log and drop the response
    Ignore,
}

/// Builder for configuring a link
pub struct LinkBuilder<T> {
    rpc: Rpc,
    transport: T,
    config: LinkConfig,
    metrics_service: Option<String>,
    observability_config: Option<ObservabilityConfig>,
}

impl<T: Transport> LinkBuilder<T> {
    pub(crate) fn new(rpc: Rpc, transport: T) -> Self {
        Self {
            rpc,
            transport,
            config: LinkConfig::default(),
            metrics_service: None,
            observability_config: None,
        }
    }

    /// Attach an opaque value for handlers to retrieve
    pub fn user_context<U: Any + Send + Sync>(mut self, context: U) -> Self {
        self.config.user_context = Arc::new(context);
        self
    }

    /// Recycle inbound envelopes through a shared pool
    pub fn pool(mut self, pool: Arc<MessagePool<Envelope>>) -> Self {
        self.config.pool = Some(pool);
        self
    }

    /// Set the policy for responses to unknown ids
    pub fn unknown_response(mut self, policy: UnknownResponse) -> Self {
        self.config.unknown_response = policy;
        self
    }

    /// Record into instruments shared with other links
    ///
    /// Takes precedence over [`LinkBuilder::with_metrics`]. Acceptors should
    /// create one [`LinkMetrics`] up front and pass it to every link.
    pub fn metrics(mut self, metrics: Arc<LinkMetrics>) -> Self {
        self.config.metrics = Some(metrics);
        self
    }

    /// Record OpenTelemetry metrics under `service_name`
    ///
    /// Creates a fresh set of instruments for this link alone.
    pub fn with_metrics(mut self, service_name: impl Into<String>) -> Self {
        self.metrics_service = Some(service_name.into());
        self
    }

    /// Initialize observability on attach and record metrics
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Initialize observability with the default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Create the link
    ///
    /// Fails only when observability was requested and cannot be
    /// initialized.
    pub fn attach(mut self) -> Result<Link> {
        if let Some(config) = self.observability_config {
            let service_name = config.service_name.clone();
            rpclink_core::init_observability(config).map_err(|e| {
                Error::Observability(format!("Failed to initialize observability: {}", e))
            })?;
            self.metrics_service.get_or_insert(service_name);
        }

        if self.config.metrics.is_none() {
            if let Some(name) = self.metrics_service {
                self.config.metrics = Some(Arc::new(LinkMetrics::new(name)));
            }
        }

        Ok(Link::new(self.rpc, self.transport, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::idle_transport;

    #[tokio::test]
    async fn test_builder_defaults() {
        let link = Rpc::new().link(idle_transport()).attach().unwrap();
        assert_eq!(link.inner.unknown_response, UnknownResponse::Close);
        assert!(link.inner.metrics.is_none());
        assert!(link.user_context::<()>().is_some());
    }

    #[tokio::test]
    async fn test_builder_options() {
        let pool = Arc::new(MessagePool::new());
        let link = Rpc::new()
            .link(idle_transport())
            .user_context(7u32)
            .pool(Arc::clone(&pool))
            .unknown_response(UnknownResponse::Ignore)
            .with_metrics("builder-test")
            .attach()
            .unwrap();

        assert_eq!(link.user_context::<u32>().as_deref(), Some(&7));
        assert_eq!(link.inner.unknown_response, UnknownResponse::Ignore);
        assert!(link.inner.metrics.is_some());
        assert!(Arc::ptr_eq(&link.inner.pool, &pool));
    }

    #[tokio::test]
    async fn test_shared_metrics() {
        let metrics = Arc::new(LinkMetrics::new("shared-test"));
        let rpc = Rpc::new();

        let links: Vec<Link> = (0..3)
            .map(|_| {
                rpc.link(idle_transport())
                    .metrics(Arc::clone(&metrics))
                    .with_metrics("ignored")
                    .attach()
                    .unwrap()
            })
            .collect();

        for link in &links {
            let used = link.inner.metrics.as_ref().unwrap();
            assert!(Arc::ptr_eq(used, &metrics));
        }
        assert_eq!(Arc::strong_count(&metrics), 4);
    }
}
