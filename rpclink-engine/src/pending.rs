//! Correlation table for outgoing requests
//!
//! Every `Link::request` registers a [`PendingRequest`] under a fresh
//! sequence number and waits on a oneshot receiver. The connection loop
//! takes the entry out and completes it when the matching response arrives.
//!
//! Sequence numbers start at 0 and grow by one per request. Allocation and
//! insertion happen under one lock, so two requests can never share an id.
//!
//! When the link terminates the table is closed: every waiter receives the
//! termination error and later registrations fail immediately.

use rpclink_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};

/// Completion delivered to a waiting `Link::request`
pub(crate) type Completion = Result<Option<Value>>;

/// One outgoing request awaiting its response
pub(crate) struct PendingRequest {
    pub(crate) method: String,
    pub(crate) started: Instant,
    tx: oneshot::Sender<Completion>,
}

impl PendingRequest {
    /// Hand the outcome to the waiter
    ///
    /// The waiter may have been dropped (cancelled caller); that is a no-op.
    pub(crate) fn complete(self, outcome: Completion) {
        let _ = self.tx.send(outcome);
    }
}

struct State {
    next_seq: u64,
    entries: HashMap<u64, PendingRequest>,
    closed: Option<Error>,
}

/// Pending requests of one link
pub(crate) struct PendingTable {
    state: Mutex<State>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_seq: 0,
                entries: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocate the next sequence number and register a waiter for it
    pub(crate) async fn register(
        &self,
        method: &str,
    ) -> Result<(u64, oneshot::Receiver<Completion>)> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        let (tx, rx) = oneshot::channel();
        state.entries.insert(
            seq,
            PendingRequest {
                method: method.to_string(),
                started: Instant::now(),
                tx,
            },
        );
        Ok((seq, rx))
    }

    /// Remove the entry for `seq`, if any
    pub(crate) async fn take(&self, seq: u64) -> Option<PendingRequest> {
        self.state.lock().await.entries.remove(&seq)
    }

    /// Fail every waiter with `err` and refuse new registrations
    ///
    /// Returns how many waiters were failed. Closing twice keeps the first
    /// error.
    pub(crate) async fn close(&self, err: Error) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.state.lock().await;
            if state.closed.is_none() {
                state.closed = Some(err.clone());
            }
            state.entries.drain().map(|(_, p)| p).collect()
        };

        let count = drained.len();
        for pending in drained {
            pending.complete(Err(err.clone()));
        }
        count
    }

    pub(crate) async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sequence_starts_at_zero() {
        let table = PendingTable::new();
        let (a, _ra) = table.register("A").await.unwrap();
        let (b, _rb) = table.register("B").await.unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn test_complete_delivers_to_waiter() {
        let table = PendingTable::new();
        let (seq, rx) = table.register("Math.Add").await.unwrap();

        let pending = table.take(seq).await.unwrap();
        assert_eq!(pending.method, "Math.Add");
        pending.complete(Ok(Some(json!(5))));

        assert_eq!(rx.await.unwrap().unwrap(), Some(json!(5)));
        assert!(table.take(seq).await.is_none());
    }

    #[tokio::test]
    async fn test_complete_after_waiter_dropped() {
        let table = PendingTable::new();
        let (seq, rx) = table.register("Slow").await.unwrap();
        drop(rx);
        table.take(seq).await.unwrap().complete(Ok(None));
    }

    #[tokio::test]
    async fn test_close_fails_waiters_and_new_registrations() {
        let table = PendingTable::new();
        let (_, r1) = table.register("A").await.unwrap();
        let (_, r2) = table.register("B").await.unwrap();

        assert_eq!(table.close(Error::ConnectionClosed).await, 2);
        assert!(matches!(r1.await.unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(r2.await.unwrap(), Err(Error::ConnectionClosed)));

        assert!(matches!(
            table.register("C").await,
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(table.close(Error::AlreadyRunning).await, 0);
        assert!(matches!(
            table.register("D").await,
            Err(Error::ConnectionClosed)
        ));
    }
}
