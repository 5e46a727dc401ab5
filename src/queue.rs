//! Deduplicating bounded work queue.
//!
//! A `SetQueue` holds item identities waiting to be processed. Submitting an
//! identity the queue already owns fails fast instead of queueing a second
//! copy; submitting into a full buffer suspends the producer. Delivery hands
//! exactly one identity to a caller-supplied handler and automatically
//! requeues it if the handler fails.

use std::fmt;
use std::future::Future;
use std::hash::Hash;

use tracing::{debug, warn};

use crate::buffer::BoundedBuffer;
use crate::error::{Error, HandlerError, Result};
use crate::map::ConcurrentMap;

/// Buffer capacity used by `QueueConfig::default`.
pub const DEFAULT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// When the membership marker for an identity is released during delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleasePolicy {
    /// Release before the handler runs. The identity can be resubmitted
    /// immediately, even from inside the handler. At most one copy is ever
    /// buffered, but a second handler for the same identity may start while
    /// the first is still running.
    #[default]
    BeforeHandler,
    /// Release after the handler finishes (on failure, right before the
    /// automatic resubmission). Resubmitting an identity while its handler
    /// runs is rejected as a duplicate, so at most one handler per identity
    /// runs at a time.
    AfterHandler,
}

/// Queue construction knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of undelivered identities. Submissions past it
    /// suspend the producer.
    pub capacity: usize,
    /// Marker release timing, see [`ReleasePolicy`].
    pub release: ReleasePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            release: ReleasePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// A bounded FIFO of item identities with set semantics: an identity the
/// queue already owns (buffered, or mid-delivery under
/// [`ReleasePolicy::AfterHandler`]) is rejected on submission rather than
/// queued twice.
///
/// Producers call [`submit`](SetQueue::submit) from any number of tasks;
/// consumers call [`deliver`](SetQueue::deliver), usually in a loop, also
/// from any number of tasks. Share an instance with `Arc`.
pub struct SetQueue<T> {
    owned: ConcurrentMap<T, ()>,
    buffer: BoundedBuffer<T>,
    release: ReleasePolicy,
}

/// Removes a membership marker on drop unless defused.
///
/// Armed whenever a marker exists for an identity that is not yet buffered
/// (or, under [`ReleasePolicy::AfterHandler`], is out for delivery), so a
/// future dropped mid-suspension cannot strand the marker.
struct MarkerGuard<'a, T: Eq + Hash> {
    owned: &'a ConcurrentMap<T, ()>,
    key: Option<T>,
}

impl<'a, T: Eq + Hash> MarkerGuard<'a, T> {
    fn new(owned: &'a ConcurrentMap<T, ()>, key: T) -> Self {
        Self {
            owned,
            key: Some(key),
        }
    }

    /// Keep the marker: it now belongs to the buffered identity.
    fn defuse(mut self) {
        self.key = None;
    }
}

impl<T: Eq + Hash> Drop for MarkerGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.owned.remove(&key);
        }
    }
}

impl<T> SetQueue<T>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    /// Create a queue buffering at most `capacity` undelivered identities,
    /// with the default release policy.
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(QueueConfig {
            capacity,
            ..QueueConfig::default()
        })
    }

    /// Create a queue from explicit configuration.
    ///
    /// Panics if `config.capacity` is zero.
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            owned: ConcurrentMap::new(),
            buffer: BoundedBuffer::new(config.capacity),
            release: config.release,
        }
    }

    /// Submit an identity for delivery.
    ///
    /// Fails with [`Error::Duplicate`] if the queue already owns the
    /// identity, without blocking on capacity. Otherwise the identity is
    /// marked owned and pushed into the buffer, suspending while the buffer
    /// is full. If the queue closes while this call waits for space, the
    /// marker is rolled back and [`Error::Closed`] is returned. Dropping a
    /// suspended `submit` future (a timeout, a lost `select!` arm) rolls
    /// the marker back the same way, so an abandoned attempt never leaves
    /// its identity blocked.
    pub async fn submit(&self, identity: T) -> Result<()> {
        if self.buffer.is_closed() {
            return Err(Error::Closed);
        }
        // The mark must be one atomic step: two concurrent submits of the
        // same identity must not both pass.
        if !self.owned.insert_if_absent(identity.clone(), ()) {
            debug!(identity = ?identity, "submission rejected, identity already owned");
            return Err(Error::Duplicate);
        }
        // The marker must not outlive this attempt. The guard removes it
        // again if the push fails on a closed queue or this future is
        // dropped while suspended on a full buffer.
        let guard = MarkerGuard::new(&self.owned, identity.clone());
        self.buffer.push(identity).await?;
        guard.defuse();
        Ok(())
    }

    /// Deliver exactly one identity to `handler`, suspending until an item
    /// is available or the queue is closed.
    ///
    /// The membership marker is released according to the queue's
    /// [`ReleasePolicy`]. If the handler fails, the identity is resubmitted
    /// at the current tail and [`Error::Process`] carries the handler's
    /// error; if that resubmission itself fails, its error is returned
    /// instead so a lost retry is never silent.
    ///
    /// Processing one item per call leaves retry pacing, shutdown, and loop
    /// control to the caller. The automatic resubmission goes through the
    /// normal backpressure path and can suspend while the buffer is full,
    /// which is one reason the handler must not call `deliver` on the same
    /// queue reentrantly. Dropping this future before an item arrives takes
    /// nothing from the queue; dropping it mid-handler abandons that
    /// delivery attempt and still releases the marker.
    pub async fn deliver<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), HandlerError>>,
    {
        let identity = self.buffer.pop().await?;

        // Under AfterHandler a guard holds the marker for the handler's
        // span, so even an abandoned delivery releases it.
        let held = match self.release {
            ReleasePolicy::BeforeHandler => {
                self.owned.remove(&identity);
                None
            }
            ReleasePolicy::AfterHandler => {
                Some(MarkerGuard::new(&self.owned, identity.clone()))
            }
        };

        let retry = identity.clone();
        match handler(identity).await {
            Ok(()) => {
                drop(held);
                Ok(())
            }
            Err(cause) => {
                // Release first; the resubmission below re-marks.
                drop(held);
                warn!(identity = ?retry, error = %cause, "handler failed, requeueing");
                match self.submit(retry).await {
                    Ok(()) => Err(Error::Process(cause)),
                    Err(err) => {
                        warn!(error = %err, "failed identity could not be requeued");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Close the queue. Blocked submissions wake with [`Error::Closed`];
    /// consumers drain whatever is already buffered, then observe
    /// [`Error::Closed`]. The membership set is cleared. Idempotent.
    pub fn close(&self) {
        debug!("queue closing");
        self.buffer.close();
        self.owned.clear();
    }

    /// Whether the queue currently owns `identity`.
    pub fn contains(&self, identity: &T) -> bool {
        self.owned.contains_key(identity)
    }

    /// Number of identities waiting in the buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}
