//! Bounded async FIFO used as the queue's delivery buffer.
//!
//! Push suspends while the buffer is full, pop suspends while it is empty,
//! and close wakes every waiter on both sides. Items already buffered at
//! close time are still handed out; pop reports `Closed` only once the
//! buffer is drained.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::{Error, Result};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub(crate) struct BoundedBuffer<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    space_free: Notify,
    items_ready: Notify,
}

impl<T> BoundedBuffer<T> {
    /// Panics if `capacity` is zero.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be greater than zero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            space_free: Notify::new(),
            items_ready: Notify::new(),
        }
    }

    /// Append an item, suspending while the buffer is full.
    ///
    /// Returns `Closed` if the buffer is closed before the item lands; the
    /// item is dropped in that case.
    pub(crate) async fn push(&self, item: T) -> Result<()> {
        let notified = self.space_free.notified();
        tokio::pin!(notified);
        loop {
            // Register interest before checking state, so a wake between
            // the check and the await is not lost.
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.closed {
                    return Err(Error::Closed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.items_ready.notify_one();
                    return Ok(());
                }
            }
            notified.as_mut().await;
            notified.set(self.space_free.notified());
        }
    }

    /// Take the front item, suspending while the buffer is empty.
    ///
    /// After close, keeps yielding whatever is still buffered and returns
    /// `Closed` only once nothing remains.
    pub(crate) async fn pop(&self) -> Result<T> {
        let notified = self.items_ready.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.space_free.notify_one();
                    return Ok(item);
                }
                if inner.closed {
                    return Err(Error::Closed);
                }
            }
            notified.as_mut().await;
            notified.set(self.items_ready.notified());
        }
    }

    /// Close the buffer and wake every blocked push and pop. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
        }
        self.space_free.notify_waiters();
        self.items_ready.notify_waiters();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().items.is_empty()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
