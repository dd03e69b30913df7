/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! `SafeQueue<T>`: a bounded, closable, single-producer-friendly FIFO.
//!
//! Grounded on the bounded work-queue pattern in
//! `other_examples/02f44294_monokrome-foiacquire__crates-foia-src-work_queue-pipeline.rs.rs`,
//! adapted to the closed-queue semantics spec section 4.1 requires: `push`
//! after `close` is a silent no-op (never blocks, never panics), and `pop`
//! drains whatever remains before reporting closed.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO queue used between two adjacent pipeline stages.
///
/// Every `push`/`pop` suspends the calling task rather than blocking a
/// thread; no caller may hold this queue's lock across another suspension
/// point (spec section 5).
pub struct SafeQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> SafeQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Pushes a value, blocking until space is available. If the queue has
    /// already been closed the value is dropped and this returns
    /// immediately — late stragglers from a producer tearing down must
    /// never deadlock or panic.
    pub async fn push(&self, value: T) {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.closed {
                    return;
                }
                if guard.items.len() < self.capacity {
                    guard.items.push_back(value);
                    drop(guard);
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Pops a value, blocking until one is available or the queue closes.
    /// Returns `None` exactly when the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(value) = guard.items.pop_front() {
                    drop(guard);
                    self.not_full.notify_one();
                    return Some(value);
                }
                if guard.closed {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Idempotent. After close, no further push succeeds, and pending
    /// pops drain remaining items before returning `None`.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return;
        }
        guard.closed = true;
        drop(guard);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn push_pop_order_preserved() {
        let q = SafeQueue::new(4);
        q.push(1).await;
        q.push(2).await;
        q.push(3).await;
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, Some(3));
    }

    #[tokio::test]
    async fn push_blocks_on_full_queue_until_pop() {
        let q = Arc::new(SafeQueue::new(1));
        q.push(1).await;

        let q2 = q.clone();
        let handle = tokio::spawn(async move {
            q2.push(2).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        assert_eq!(q.pop().await, Some(1));
        handle.await.unwrap();
        assert_eq!(q.pop().await, Some(2));
    }

    #[tokio::test]
    async fn close_is_a_noop_for_further_pushes() {
        let q = SafeQueue::new(4);
        q.push(1).await;
        q.close().await;
        q.push(2).await; // silently dropped, must not block or panic
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test]
    async fn close_drains_buffered_items_then_reports_closed() {
        let q = SafeQueue::new(4);
        q.push(1).await;
        q.push(2).await;
        q.close().await;
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, None);
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let q: SafeQueue<i32> = SafeQueue::new(2);
        q.close().await;
        q.close().await;
        assert!(q.is_closed().await);
    }

    #[tokio::test]
    async fn pending_pop_wakes_on_close() {
        let q = Arc::new(SafeQueue::<i32>::new(2));
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.close().await;
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("pop should wake after close")
            .unwrap();
        assert_eq!(result, None);
    }
}
