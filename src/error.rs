//! Error types for setq.

use thiserror::Error;

/// Failure reported by a delivery handler. Boxed so handlers can surface any
/// error type without the queue caring about it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate identity: already queued or in flight")]
    Duplicate,

    #[error("queue is closed")]
    Closed,

    #[error("processing failed: {0}")]
    Process(#[source] HandlerError),
}

pub type Result<T> = std::result::Result<T, Error>;
