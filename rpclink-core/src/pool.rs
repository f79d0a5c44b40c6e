//! Free-list pool for inbound message buffers
//!
//! A link decodes every inbound envelope into a buffer taken from a
//! [`MessagePool`] and hands the buffer to a dispatch task. When that task
//! finishes the [`Pooled`] guard drops and the buffer goes back on the free
//! list, so a busy link stops allocating envelopes once it reaches a steady
//! state.
//!
//! Reuse is invisible to callers: values are cleared through [`Recycle`]
//! both when they are returned and again when they are handed out.
//!
//! ```rust
//! use std::sync::Arc;
//! use rpclink_core::{Envelope, MessagePool};
//!
//! let pool = Arc::new(MessagePool::<Envelope>::new());
//! {
//!     let mut env = pool.acquire();
//!     env.method.push_str("Math.Add");
//! }
//! assert_eq!(pool.available(), 1);
//! assert!(pool.acquire().method.is_empty());
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Values that can be reset to an empty state for reuse
pub trait Recycle {
    /// Clear all observable state, keeping allocations where useful
    fn recycle(&mut self);
}

impl Recycle for String {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Recycle for Vec<u8> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Unbounded (optionally capped) free list guarded by a single mutex
pub struct MessagePool<T> {
    free: Mutex<Vec<Box<T>>>,
    limit: Option<usize>,
    allocated: AtomicUsize,
}

impl<T: Recycle + Default> MessagePool<T> {
    /// Create an empty, unbounded pool
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            limit: None,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Create a pool that keeps at most `limit` idle buffers
    ///
    /// Buffers released while the free list is full are dropped.
    pub fn with_capacity_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Take a cleared buffer, reusing a released one when possible
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let value = self.take();
        Pooled {
            value: Some(value),
            pool: Arc::clone(self),
        }
    }

    /// Take a cleared buffer without a return-on-drop guard
    pub fn take(&self) -> Box<T> {
        let reused = self.lock().pop();
        match reused {
            Some(mut value) => {
                value.recycle();
                value
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        }
    }

    /// Return a buffer to the free list
    pub fn release(&self, mut value: Box<T>) {
        value.recycle();
        let mut free = self.lock();
        if self.limit.map_or(true, |limit| free.len() < limit) {
            free.push(value);
        }
    }

    /// Number of idle buffers on the free list
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Number of buffers this pool has allocated since creation
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<T>>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Recycle + Default> Default for MessagePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MessagePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePool")
            .field("limit", &self.limit)
            .field("allocated", &self.allocated.load(Ordering::Relaxed))
            .finish()
    }
}

/// A pooled buffer that returns itself to its pool on drop
pub struct Pooled<T: Recycle + Default> {
    value: Option<Box<T>>,
    pool: Arc<MessagePool<T>>,
}

impl<T: Recycle + Default> Pooled<T> {
    /// Detach the buffer from the pool; it will not be returned
    pub fn into_inner(mut self) -> Box<T> {
        self.value.take().unwrap_or_default()
    }
}

impl<T: Recycle + Default> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `into_inner` and `drop` empty the slot, and both consume the guard.
        self.value.as_deref().expect("pooled value present until drop")
    }
}

impl<T: Recycle + Default> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().expect("pooled value present until drop")
    }
}

impl<T: Recycle + Default> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Recycle + Default + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, RpcError};
    use serde_json::json;

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = Arc::new(MessagePool::<Envelope>::new());
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_reused_buffer_has_no_residual_data() {
        let pool = Arc::new(MessagePool::<Envelope>::new());
        {
            let mut env = pool.acquire();
            env.method.push_str("Files.Read");
            env.params = Some(json!({"path": "/etc"}));
            env.id = Some(41);
            env.result = Some(json!("data"));
            env.error = Some(RpcError::new(5, "nope"));
        }

        let env = pool.acquire();
        assert_eq!(pool.allocated(), 1);
        assert_eq!(*env, Envelope::default());
    }

    #[test]
    fn test_take_clears_values_pushed_by_release() {
        let pool = MessagePool::<String>::new();
        let mut s = pool.take();
        s.push_str("stale");
        pool.release(s);
        assert_eq!(*pool.take(), "");
    }

    #[test]
    fn test_capacity_limit_drops_extra_buffers() {
        let pool = Arc::new(MessagePool::<Vec<u8>>::with_capacity_limit(1));
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool = Arc::new(MessagePool::<String>::new());
        let mut s = pool.acquire();
        s.push_str("kept");
        let owned = s.into_inner();
        assert_eq!(*owned, "kept");
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(MessagePool::<Envelope>::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for n in 0..100u64 {
                        let mut env = pool.acquire();
                        assert!(env.method.is_empty());
                        assert!(env.id.is_none());
                        env.method.push_str("m");
                        env.id = Some(i * 1000 + n);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.allocated() <= 8);
    }
}
