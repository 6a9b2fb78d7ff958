//! In-memory shape log: an ordered, cursor-addressable room feed.
//!
//! This is the reference feed implementation used by tests and by hosts
//! that bridge a real CDC backend into the engine. Entries are appended
//! in commit order and polled from a cursor position, the same contract
//! a remote shape store provides.

use crate::cursor::{ResumeCursor, SubscriptionHandle};
use crate::messages::ChangeMessage;
use std::time::SystemTime;
use uuid::Uuid;

/// One committed record in a shape log.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEntry {
    /// Monotonically increasing position, starting at 1.
    pub offset: u64,
    /// The change record at this position.
    pub message: ChangeMessage,
}

/// An append-only feed for one room and one logical stream.
///
/// The log:
/// - preserves append order
/// - can be polled from a cursor position
/// - carries a stable subscription handle; a cursor minted under a
///   different handle is treated as void and delivery restarts from
///   the beginning
#[derive(Debug)]
pub struct ShapeLog {
    entries: Vec<ShapeEntry>,
    next_offset: u64,
    handle: SubscriptionHandle,
}

impl ShapeLog {
    /// Creates an empty log with a fresh subscription handle.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_offset: 1,
            handle: SubscriptionHandle::new(Uuid::new_v4().to_string()),
        }
    }

    /// The handle cursors minted from this log carry.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Appends a change record, assigning the next offset.
    pub fn append(&mut self, message: ChangeMessage) -> u64 {
        let offset = self.next_offset;
        self.next_offset += 1;
        self.entries.push(ShapeEntry { offset, message });
        offset
    }

    /// Appends an operation frame.
    pub fn append_operation(&mut self, frame: impl Into<String>) -> u64 {
        self.append(ChangeMessage::operation(frame))
    }

    /// Appends an awareness frame stamped with the current time.
    pub fn append_awareness(
        &mut self,
        frame: impl Into<String>,
        client_id: impl Into<String>,
    ) -> u64 {
        self.append(ChangeMessage::awareness(
            frame,
            client_id,
            SystemTime::now(),
        ))
    }

    /// Entries after the cursor position, up to `limit`.
    ///
    /// With no cursor, or a cursor minted under a different handle,
    /// delivery starts from the beginning.
    pub fn poll(&self, cursor: Option<&ResumeCursor>, limit: usize) -> Vec<ShapeEntry> {
        let after = cursor
            .filter(|c| c.handle == self.handle)
            .and_then(|c| c.offset.as_str().parse::<u64>().ok())
            .unwrap_or(0);

        self.entries
            .iter()
            .filter(|e| e.offset > after)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The highest assigned offset, 0 if empty.
    pub fn latest_offset(&self) -> u64 {
        self.next_offset.saturating_sub(1)
    }

    /// Mints a resume cursor for the given offset.
    pub fn cursor_at(&self, offset: u64) -> ResumeCursor {
        ResumeCursor {
            offset: crate::cursor::ShapeOffset::new(offset.to_string()),
            handle: self.handle.clone(),
        }
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ShapeLog {
    fn default() -> Self {
        Self::new()
    }
}
