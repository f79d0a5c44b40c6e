//! Dispatch of one inbound envelope
//!
//! The connection loop hands every decoded request and notification to
//! [`Link::dispatch`] on its own task; responses go through
//! `Link::accept_response` on the loop itself. What happens depends on the
//! envelope's kind:
//!
//! | kind | action |
//! |---|---|
//! | malformed | answer -32600 with a null id |
//! | response | complete the matching pending request |
//! | notification | run the notify handler, never answer |
//! | request | run the request handler, answer exactly once |
//!
//! Shape mismatches are answered with Invalid Request: a notification for a
//! request method gets a null id (there is nothing to correlate with), a
//! request for a notify method keeps its id. Handler panics are caught; a
//! panicking request handler is answered with -32603.
//!
//! The pooled envelope is released as soon as its fields have been moved
//! out, before any handler runs.

use crate::builder::UnknownResponse;
use crate::handler::{NotifyHandler, RequestHandler};
use crate::link::Link;
use futures::FutureExt;
use rpclink_core::{Envelope, EnvelopeKind, Error, Pooled, RpcError};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

impl Link {
    pub(crate) async fn dispatch(&self, mut envelope: Pooled<Envelope>) {
        match envelope.kind() {
            EnvelopeKind::Malformed => {
                drop(envelope);
                tracing::warn!(link_id = self.id(), "Envelope has neither method nor id");
                self.record_error("invalid_request");
                self.reply(Envelope::failure(None, RpcError::invalid_request()))
                    .await;
            }
            EnvelopeKind::Response(id) => self.accept_response(id, envelope).await,
            EnvelopeKind::Notification => {
                let method = std::mem::take(&mut envelope.method);
                let params = envelope.params.take();
                drop(envelope);
                self.handle_notification(method, params).await;
            }
            EnvelopeKind::Request(id) => {
                let method = std::mem::take(&mut envelope.method);
                let params = envelope.params.take();
                drop(envelope);
                let response = self.handle_request(id, &method, params).await;
                self.reply(response).await;
            }
        }
    }

    /// Hand a response to the request waiting on `id`
    ///
    /// Never waits on a handler, so the connection loop calls it directly.
    pub(crate) async fn accept_response(&self, id: u64, mut envelope: Pooled<Envelope>) {
        let result = envelope.result.take();
        let error = envelope.error.take();
        drop(envelope);
        self.complete_response(id, result, error).await;
    }

    async fn complete_response(&self, id: u64, result: Option<Value>, error: Option<RpcError>) {
        let Some(pending) = self.inner.pending.take(id).await else {
            tracing::warn!(link_id = self.id(), id, "Response for unknown request id");
            self.record_error("unknown_response");
            if self.inner.unknown_response == UnknownResponse::Close {
                self.shutdown(Some(Error::UnknownResponse(id))).await;
            }
            return;
        };

        tracing::debug!(
            link_id = self.id(),
            id,
            method = %pending.method,
            elapsed_secs = pending.started.elapsed().as_secs_f64(),
            "Response received"
        );
        let outcome = match error {
            Some(error) => Err(Error::Rpc(error)),
            None => Ok(result),
        };
        pending.complete(outcome);
        self.pending_changed(-1);
    }

    async fn handle_request(&self, id: u64, method: &str, params: Option<Value>) -> Envelope {
        let tree = self.inner.rpc.snapshot();
        let Some(descriptor) = tree.lookup(method) else {
            tracing::debug!(link_id = self.id(), id, method, "Method not found");
            self.record_error("method_not_found");
            return Envelope::failure(Some(id), RpcError::method_not_found(method));
        };
        let Some(handler) = descriptor.request_handler() else {
            tracing::warn!(link_id = self.id(), id, method, "Request sent to a notify method");
            self.record_error("invalid_request");
            return Envelope::failure(Some(id), RpcError::invalid_request());
        };

        descriptor.record_call();
        let start = Instant::now();
        let outcome = self.invoke_request(handler, params).await;
        let duration = start.elapsed().as_secs_f64();

        match outcome {
            Ok(value) => {
                tracing::debug!(link_id = self.id(), id, method, duration_secs = duration, "Request handled");
                if let Some(ref m) = self.inner.metrics {
                    m.record_handled(method, "success", duration);
                }
                Envelope::success(Some(id), value)
            }
            Err(error) => {
                tracing::debug!(link_id = self.id(), id, method, code = error.code, "Request failed");
                if let Some(ref m) = self.inner.metrics {
                    m.record_handled(method, "error", duration);
                }
                Envelope::failure(Some(id), error)
            }
        }
    }

    async fn handle_notification(&self, method: String, params: Option<Value>) {
        let tree = self.inner.rpc.snapshot();
        let Some(descriptor) = tree.lookup(&method) else {
            tracing::debug!(link_id = self.id(), method = %method, "Dropping notification for unknown method");
            return;
        };
        let Some(handler) = descriptor.notify_handler() else {
            tracing::warn!(link_id = self.id(), method = %method, "Notification sent to a request method");
            self.record_error("invalid_request");
            self.reply(Envelope::failure(None, RpcError::invalid_request()))
                .await;
            return;
        };

        descriptor.record_call();
        let status = match self.invoke_notify(handler, params).await {
            Ok(()) => "success",
            Err(error) => {
                tracing::warn!(link_id = self.id(), method = %method, error = %error, "Notification handler failed");
                "error"
            }
        };
        if let Some(ref m) = self.inner.metrics {
            m.record_notification_handled(&method, status);
        }
    }

    async fn invoke_request(
        &self,
        handler: Arc<dyn RequestHandler>,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        let link = self.clone();
        let call = async move { handler.handle(link, params).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(link_id = self.id(), panic = message, "Request handler panicked");
                self.record_error("handler_panic");
                Err(RpcError::internal_error(format!("Handler panicked: {}", message)))
            }
        }
    }

    async fn invoke_notify(
        &self,
        handler: Arc<dyn NotifyHandler>,
        params: Option<Value>,
    ) -> Result<(), RpcError> {
        let link = self.clone();
        let call = async move { handler.handle(link, params).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.record_error("handler_panic");
                Err(RpcError::internal_error(format!("Handler panicked: {}", message)))
            }
        }
    }

    async fn reply(&self, response: Envelope) {
        if let Err(e) = self.send(&response).await {
            tracing::debug!(link_id = self.id(), id = ?response.id, error = %e, "Failed to send response");
        }
    }

    fn record_error(&self, error_type: &str) {
        if let Some(ref m) = self.inner.metrics {
            m.record_error(error_type);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
