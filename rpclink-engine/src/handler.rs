//! Handler traits and typed adapters
//!
//! A method on a link is backed by one of two handler kinds:
//!
//! - [`RequestHandler`]: receives params, produces a result or an
//!   [`RpcError`]; the engine sends exactly one response
//! - [`NotifyHandler`]: receives params, produces nothing; the engine never
//!   responds
//!
//! Both receive the [`Link`] the call arrived on, so a handler can call back
//! into the peer while it runs.
//!
//! Handlers are type-erased over `serde_json::Value`. The [`request_fn`] and
//! [`notify_fn`] adapters wrap typed async closures and take care of
//! decoding params and encoding results:
//!
//! ```rust
//! use rpclink_engine::{request_fn, notify_fn, Link};
//! use rpclink_core::RpcError;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddArgs { a: i64, b: i64 }
//!
//! let add = request_fn(|_link: Link, args: AddArgs| async move {
//!     Ok::<_, RpcError>(args.a + args.b)
//! });
//!
//! let log = notify_fn(|_link: Link, line: String| async move {
//!     println!("{line}");
//! });
//! ```

use crate::link::Link;
use rpclink_core::{codec, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by request handlers
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;

/// Boxed future returned by notify handlers
///
/// An `Err` only reports a local failure (usually params that did not
/// decode); it is logged and never sent to the peer.
pub type NotifyResult = Pin<Box<dyn Future<Output = Result<(), RpcError>> + Send>>;

/// Handler for request methods
pub trait RequestHandler: Send + Sync {
    /// Handle one call; `params` is `None` when the envelope had none
    fn handle(&self, link: Link, params: Option<Value>) -> HandlerResult;
}

/// Handler for notify methods
pub trait NotifyHandler: Send + Sync {
    /// Handle one notification
    fn handle(&self, link: Link, params: Option<Value>) -> NotifyResult;
}

/// Typed request handler built by [`request_fn`]
pub struct TypedRequest<F, P, R> {
    func: F,
    _marker: PhantomData<fn(P) -> R>,
}

impl<F, Fut, P, R> RequestHandler for TypedRequest<F, P, R>
where
    F: Fn(Link, P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
    P: DeserializeOwned,
    R: Serialize,
{
    fn handle(&self, link: Link, params: Option<Value>) -> HandlerResult {
        let params: P = match codec::from_payload(params) {
            Ok(params) => params,
            Err(e) => {
                let err = RpcError::invalid_params(format!("Invalid params: {}", e));
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.func)(link, params);
        Box::pin(async move {
            let result = fut.await?;
            codec::to_payload(result)
                .map_err(|e| RpcError::internal_error(format!("Failed to encode result: {}", e)))
        })
    }
}

/// Typed notify handler built by [`notify_fn`]
pub struct TypedNotify<F, P> {
    func: F,
    _marker: PhantomData<fn(P)>,
}

impl<F, Fut, P> NotifyHandler for TypedNotify<F, P>
where
    F: Fn(Link, P) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
    P: DeserializeOwned,
{
    fn handle(&self, link: Link, params: Option<Value>) -> NotifyResult {
        match codec::from_payload::<P>(params) {
            Ok(params) => {
                let fut = (self.func)(link, params);
                Box::pin(async move {
                    fut.await;
                    Ok(())
                })
            }
            Err(e) => {
                let err = RpcError::invalid_params(format!("Invalid params: {}", e));
                Box::pin(async move { Err(err) })
            }
        }
    }
}

/// Wrap a typed async function as a request handler
///
/// - params that fail to decode into `P` are answered with -32602
/// - a result that fails to encode is answered with -32603
/// - an `Err(RpcError)` from the function is sent back verbatim
pub fn request_fn<P, R, F, Fut>(func: F) -> Arc<dyn RequestHandler>
where
    P: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(Link, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
{
    Arc::new(TypedRequest {
        func,
        _marker: PhantomData,
    })
}

/// Wrap a typed async function as a notify handler
pub fn notify_fn<P, F, Fut>(func: F) -> Arc<dyn NotifyHandler>
where
    P: DeserializeOwned + 'static,
    F: Fn(Link, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(TypedNotify {
        func,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::detached_link;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn test_typed_request() {
        let handler = request_fn(|_link: Link, args: AddArgs| async move {
            Ok::<_, RpcError>(args.a + args.b)
        });

        let result = handler
            .handle(detached_link(), Some(json!({"a": 2, "b": 3})))
            .await
            .unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn test_typed_request_invalid_params() {
        let handler = request_fn(|_link: Link, args: AddArgs| async move {
            Ok::<_, RpcError>(args.a + args.b)
        });

        let err = handler
            .handle(detached_link(), Some(json!({"a": "two"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, rpclink_core::error::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_typed_request_passes_handler_error_through() {
        let handler = request_fn(|_link: Link, _: ()| async move {
            Err::<(), _>(RpcError::new(4001, "quota exceeded"))
        });

        let err = handler.handle(detached_link(), None).await.unwrap_err();
        assert_eq!(err, RpcError::new(4001, "quota exceeded"));
    }

    #[tokio::test]
    async fn test_typed_request_empty_collections() {
        let handler = request_fn(|_link: Link, _: ()| async move {
            Ok::<Vec<String>, RpcError>(Vec::new())
        });
        assert_eq!(handler.handle(detached_link(), None).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_typed_notify() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler = notify_fn(move |_link: Link, n: usize| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(n, Ordering::SeqCst);
            }
        });

        handler.handle(detached_link(), Some(json!(3))).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        assert!(handler.handle(detached_link(), Some(json!("x"))).await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
