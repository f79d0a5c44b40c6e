//! Per-connection session
//!
//! A [`Link`] is one end of a connection. It can call the peer
//! ([`Link::request`], [`Link::notify`]) and, while [`Link::run`] drives the
//! connection loop, answers the peer's calls from the registry it was
//! attached to.
//!
//! # Lifecycle
//!
//! 1. **Attach**: `Rpc::attach` or `Rpc::link(..).attach()` splits the
//!    transport and creates the link
//! 2. **Run**: one task awaits `run()`, which reads envelopes in order,
//!    completes responses in place and spawns a dispatch task for every
//!    other envelope
//! 3. **Use**: any task calls `request`/`notify` on a clone of the link
//! 4. **Terminate**: end of stream, a transport error, a fatal correlation
//!    error or `close()`; pending requests then fail with
//!    `Error::ConnectionClosed`
//!
//! `request` only completes while `run` is being polled somewhere, since
//! responses arrive through the connection loop.
//!
//! # Cloning
//!
//! `Link` is a handle around an `Arc`; clones share the connection, the
//! correlation table and the writer.

use crate::builder::UnknownResponse;
use crate::metrics::LinkMetrics;
use crate::pending::PendingTable;
use crate::rpc::Rpc;
use crate::transport::{EnvelopeSink, EnvelopeSource, Transport};
use rpclink_core::{codec, Envelope, EnvelopeKind, Error, MessagePool, Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex, Notify};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Options fixed at attach time
pub(crate) struct LinkConfig {
    pub(crate) pool: Option<Arc<MessagePool<Envelope>>>,
    pub(crate) user_context: Arc<dyn Any + Send + Sync>,
    pub(crate) unknown_response: UnknownResponse,
    pub(crate) metrics: Option<Arc<LinkMetrics>>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pool: None,
            user_context: Arc::new(()),
            unknown_response: UnknownResponse::default(),
            metrics: None,
        }
    }
}

pub(crate) struct LinkInner {
    id: u64,
    pub(crate) rpc: Rpc,
    pub(crate) pending: PendingTable,
    sink: Mutex<Box<dyn EnvelopeSink>>,
    source: std::sync::Mutex<Option<Box<dyn EnvelopeSource>>>,
    shutdown: Notify,
    closed: AtomicBool,
    failure: std::sync::Mutex<Option<Error>>,
    pub(crate) pool: Arc<MessagePool<Envelope>>,
    user_context: Arc<dyn Any + Send + Sync>,
    pub(crate) unknown_response: UnknownResponse,
    pub(crate) metrics: Option<Arc<LinkMetrics>>,
}

/// One end of a bidirectional RPC connection
#[derive(Clone)]
pub struct Link {
    pub(crate) inner: Arc<LinkInner>,
}

impl Link {
    pub(crate) fn new<T: Transport>(rpc: Rpc, transport: T, config: LinkConfig) -> Self {
        let (source, sink) = transport.split();
        let id = NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(link_id = id, "Link attached");

        Self {
            inner: Arc::new(LinkInner {
                id,
                rpc,
                pending: PendingTable::new(),
                sink: Mutex::new(sink),
                source: std::sync::Mutex::new(Some(source)),
                shutdown: Notify::new(),
                closed: AtomicBool::new(false),
                failure: std::sync::Mutex::new(None),
                pool: config.pool.unwrap_or_else(|| Arc::new(MessagePool::new())),
                user_context: config.user_context,
                unknown_response: config.unknown_response,
                metrics: config.metrics,
            }),
        }
    }

    /// Process-unique link id, used in log fields
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The registry answering this link's inbound calls
    pub fn rpc(&self) -> &Rpc {
        &self.inner.rpc
    }

    /// The value passed as user context at attach time, if it is a `T`
    pub fn user_context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner.user_context).downcast::<T>().ok()
    }

    /// Outgoing requests still waiting for a response
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.len().await
    }

    /// True once the link has terminated or been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Build an RPC error for a handler to return
    pub fn error(&self, code: i64, message: impl Into<String>) -> RpcError {
        RpcError::new(code, message)
    }

    /// Call `method` on the peer and wait for its result
    ///
    /// Fails with `Error::Rpc` when the peer answers with an error,
    /// `Error::ConnectionClosed` when the link terminates first, and
    /// `Error::Serialization` when the result does not decode into `R`.
    /// There is no built-in timeout; wrap the call in
    /// `tokio::time::timeout` if needed.
    #[tracing::instrument(skip(self, params), fields(link_id = self.inner.id))]
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let params = payload(params)?;

        let (seq, rx) = self.inner.pending.register(method).await?;
        self.pending_changed(1);

        let envelope = Envelope::request(method, params, seq);
        if let Err(e) = self.send(&envelope).await {
            if self.inner.pending.take(seq).await.is_some() {
                self.pending_changed(-1);
            }
            tracing::warn!(id = seq, error = %e, "Failed to send request");
            return Err(e);
        }
        tracing::debug!(id = seq, "Request sent, waiting for response");

        let outcome = rx.await.map_err(|_| Error::ConnectionClosed)?;
        let duration = start.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                if let Some(ref m) = self.inner.metrics {
                    m.record_sent(method, "success", duration);
                }
                tracing::debug!(id = seq, duration_secs = duration, "Request completed");
                codec::from_payload(result)
            }
            Err(e) => {
                if let Some(ref m) = self.inner.metrics {
                    m.record_sent(method, "error", duration);
                }
                tracing::debug!(id = seq, error = %e, "Request failed");
                Err(e)
            }
        }
    }

    /// Send a notification to the peer
    ///
    /// Only local encode or write failures are reported; the peer never
    /// answers a notification.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let envelope = Envelope::notification(method, payload(params)?);
        self.send(&envelope).await?;

        if let Some(ref m) = self.inner.metrics {
            m.record_notification_sent(method);
        }
        Ok(())
    }

    /// Drive the connection until it terminates
    ///
    /// Reads envelopes in arrival order and dispatches each on its own task.
    /// Returns `Ok(())` on a clean end of stream or after [`Link::close`],
    /// and the cause otherwise. A link runs at most once; later calls
    /// return `Error::AlreadyRunning`.
    #[tracing::instrument(skip(self), fields(link_id = self.inner.id))]
    pub async fn run(&self) -> Result<()> {
        let source = self
            .inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut source = source.ok_or(Error::AlreadyRunning)?;

        tracing::info!("Link running");
        let outcome = self.read_loop(source.as_mut()).await;

        self.inner.closed.store(true, Ordering::Release);
        let failed = self.inner.pending.close(Error::ConnectionClosed).await;
        self.pending_changed(-(failed as i64));

        match &outcome {
            Ok(()) => tracing::info!(failed_requests = failed, "Link finished"),
            Err(e) => {
                if let Some(ref m) = self.inner.metrics {
                    m.record_error("link_terminated");
                }
                tracing::warn!(error = %e, failed_requests = failed, "Link terminated");
            }
        }
        outcome
    }

    async fn read_loop(&self, source: &mut dyn EnvelopeSource) -> Result<()> {
        loop {
            if self.is_closed() {
                return self.take_failure();
            }

            let mut envelope = self.inner.pool.acquire();
            let received = tokio::select! {
                received = source.recv(&mut envelope) => Some(received),
                _ = self.inner.shutdown.notified() => None,
            };

            match received {
                Some(Ok(())) => match envelope.kind() {
                    // Completed before the next read, so a response followed
                    // by end of stream still reaches its waiter.
                    EnvelopeKind::Response(id) => self.accept_response(id, envelope).await,
                    _ => {
                        let link = self.clone();
                        tokio::spawn(async move { link.dispatch(envelope).await });
                    }
                },
                Some(Err(Error::ConnectionClosed)) => {
                    tracing::debug!("Peer closed the connection");
                    return self.take_failure();
                }
                Some(Err(e)) => return Err(e),
                None => return self.take_failure(),
            }
        }
    }

    fn take_failure(&self) -> Result<()> {
        match self
            .inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop the link
    ///
    /// Wakes the connection loop, fails every pending request with
    /// `Error::ConnectionClosed` and closes the write direction.
    pub async fn close(&self) {
        self.shutdown(None).await;
        if let Err(e) = self.inner.sink.lock().await.close().await {
            tracing::debug!(link_id = self.inner.id, error = %e, "Closing sink failed");
        }
    }

    /// Terminate the connection loop, optionally with an error for `run`
    pub(crate) async fn shutdown(&self, failure: Option<Error>) {
        if let Some(err) = failure {
            let mut slot = self
                .inner
                .failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
        }

        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.notify_one();

        let failed = self.inner.pending.close(Error::ConnectionClosed).await;
        if failed > 0 {
            tracing::debug!(link_id = self.inner.id, failed, "Failed pending requests");
        }
        self.pending_changed(-(failed as i64));
    }

    /// Write one envelope; concurrent senders never interleave
    pub(crate) async fn send(&self, envelope: &Envelope) -> Result<()> {
        let mut sink = self.inner.sink.lock().await;
        sink.send(envelope).await
    }

    pub(crate) fn pending_changed(&self, delta: i64) {
        if let Some(ref m) = self.inner.metrics {
            m.pending_changed(delta);
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Encode call params; `null` is left off the wire
fn payload<P: Serialize>(params: P) -> Result<Option<Value>> {
    match codec::to_payload(params)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::detached_link;

    #[test]
    fn test_payload_drops_null() {
        assert_eq!(payload(()).unwrap(), None);
        assert_eq!(payload(Option::<i32>::None).unwrap(), None);
        assert_eq!(payload([1, 2]).unwrap(), Some(serde_json::json!([1, 2])));
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let a = detached_link();
        let b = detached_link();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[tokio::test]
    async fn test_user_context_downcast() {
        let link = Rpc::new().attach(crate::testing::idle_transport(), String::from("alice"));
        assert_eq!(link.user_context::<String>().as_deref(), Some(&"alice".to_string()));
        assert!(link.user_context::<u32>().is_none());

        assert!(detached_link().user_context::<()>().is_some());
    }

    #[tokio::test]
    async fn test_error_helper() {
        let err = detached_link().error(4000, "nope");
        assert_eq!(err.code(), 4000);
        assert_eq!(err.message(), "nope");
    }

    #[tokio::test]
    async fn test_run_twice() {
        let link = detached_link();
        link.close().await;
        assert!(link.run().await.is_ok());
        assert!(matches!(link.run().await, Err(Error::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_request_after_close() {
        let link = detached_link();
        link.close().await;
        assert!(link.is_closed());

        let result: Result<i64> = link.request("Math.Add", (2, 3)).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(matches!(
            link.notify("Log.Line", "x").await,
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(link.pending_count().await, 0);
    }
}
