//! Resume cursors for change-data-capture subscriptions.

use serde::{Deserialize, Serialize};

/// An opaque position within a shape stream.
///
/// Offsets are assigned by the feed and are only meaningful to it; the
/// client treats them as tokens to hand back when resuming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeOffset(pub String);

impl ShapeOffset {
    /// Creates an offset from any displayable token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw offset token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one server-side subscription incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub String);

impl SubscriptionHandle {
    /// Creates a handle from any displayable token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw handle token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A resumable position in a shape stream: offset plus the subscription
/// it belongs to. Handing this back on `subscribe` continues delivery
/// after the offset instead of replaying history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// Opaque stream position.
    pub offset: ShapeOffset,
    /// Subscription the offset belongs to.
    pub handle: SubscriptionHandle,
}

impl ResumeCursor {
    /// Creates a cursor from offset and handle tokens.
    pub fn new(offset: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            offset: ShapeOffset::new(offset),
            handle: SubscriptionHandle::new(handle),
        }
    }
}

/// The logical streams a provider consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// CRDT document operations.
    Operations,
    /// Ephemeral presence broadcasts.
    Awareness,
}

impl StreamKind {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Operations => "operations",
            StreamKind::Awareness => "awareness",
        }
    }
}

/// Tracks the last-consumed cursor per logical stream.
///
/// Batches are processed in delivery order, so each recorded cursor is
/// for a position at or after the previous one; cursors are never
/// rolled back. Storage is in-memory only; durable persistence is an
/// external concern.
#[derive(Debug, Clone, Default)]
pub struct CursorStore {
    operations: Option<ResumeCursor>,
    awareness: Option<ResumeCursor>,
}

impl CursorStore {
    /// Creates an empty store (no stream has been consumed).
    pub fn new() -> Self {
        Self::default()
    }

    /// The cursor to resume the given stream from, if any.
    pub fn get(&self, kind: StreamKind) -> Option<&ResumeCursor> {
        match kind {
            StreamKind::Operations => self.operations.as_ref(),
            StreamKind::Awareness => self.awareness.as_ref(),
        }
    }

    /// Records the cursor delivered with the latest batch.
    pub fn record(&mut self, kind: StreamKind, cursor: ResumeCursor) {
        match kind {
            StreamKind::Operations => self.operations = Some(cursor),
            StreamKind::Awareness => self.awareness = Some(cursor),
        }
    }

    /// Forgets the cursor for a stream.
    pub fn clear(&mut self, kind: StreamKind) {
        match kind {
            StreamKind::Operations => self.operations = None,
            StreamKind::Awareness => self.awareness = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_starts_empty() {
        let store = CursorStore::new();
        assert!(store.get(StreamKind::Operations).is_none());
        assert!(store.get(StreamKind::Awareness).is_none());
    }

    #[test]
    fn record_and_get_per_stream() {
        let mut store = CursorStore::new();
        store.record(StreamKind::Operations, ResumeCursor::new("5", "sub-a"));
        store.record(StreamKind::Awareness, ResumeCursor::new("2", "sub-b"));

        assert_eq!(
            store.get(StreamKind::Operations).unwrap().offset.as_str(),
            "5"
        );
        assert_eq!(
            store.get(StreamKind::Awareness).unwrap().handle.as_str(),
            "sub-b"
        );
    }

    #[test]
    fn record_replaces() {
        let mut store = CursorStore::new();
        store.record(StreamKind::Operations, ResumeCursor::new("1", "s"));
        store.record(StreamKind::Operations, ResumeCursor::new("2", "s"));
        assert_eq!(
            store.get(StreamKind::Operations).unwrap().offset.as_str(),
            "2"
        );
    }

    #[test]
    fn clear_forgets() {
        let mut store = CursorStore::new();
        store.record(StreamKind::Operations, ResumeCursor::new("1", "s"));
        store.clear(StreamKind::Operations);
        assert!(store.get(StreamKind::Operations).is_none());
    }
}
