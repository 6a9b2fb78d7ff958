//! The change stream consumer: one CDC subscription per logical stream.

use crate::error::SyncResult;
use crate::transport::{ShapeSource, ShapeSubscription};
use shapesync_protocol::{ShapeBatch, StreamKind, SubscribeRequest};
use tracing::debug;

/// Wraps one shape subscription and delivers its batches in order.
///
/// Exactly one subscription is held per stream kind; `close` is
/// idempotent and a closed stream silently discards anything the
/// subscription might still deliver.
pub struct ShapeStream {
    kind: StreamKind,
    subscription: Option<Box<dyn ShapeSubscription>>,
}

impl ShapeStream {
    /// Opens a subscription via the source.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::SyncError::StreamOpen`] from the source; the
    /// caller treats this as a connection failure.
    pub fn open(
        kind: StreamKind,
        source: &dyn ShapeSource,
        request: &SubscribeRequest,
    ) -> SyncResult<Self> {
        debug!(stream = kind.name(), url = %request.url, resuming = request.resume.is_some(), "opening shape stream");
        let subscription = source.subscribe(request)?;
        Ok(Self {
            kind,
            subscription: Some(subscription),
        })
    }

    /// The logical stream this consumer serves.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Returns true while the subscription is open.
    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Delivers the next ordered batch, or `None` at the live edge or
    /// after close.
    pub fn poll_batch(&mut self) -> SyncResult<Option<ShapeBatch>> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next_batch(),
            None => Ok(None),
        }
    }

    /// Tears down the subscription. Safe to call repeatedly or if the
    /// stream was never successfully opened.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            debug!(stream = self.kind.name(), "closing shape stream");
            subscription.close();
        }
    }
}

impl Drop for ShapeStream {
    fn drop(&mut self) {
        self.close();
    }
}
