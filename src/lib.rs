//! # setq
//!
//! Deduplicating in-process work queue with bounded backpressure.
//!
//! Provides a concurrency-safe generic map ([`map::ConcurrentMap`]) and a
//! bounded FIFO with set semantics built on it ([`queue::SetQueue`]).
//! Submitting an identity the queue already owns fails fast, and a full
//! buffer throttles producers instead of growing or dropping work. Failed
//! deliveries are requeued for another attempt.

mod buffer;
pub mod error;
pub mod map;
pub mod queue;
