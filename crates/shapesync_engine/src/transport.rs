//! Transport seams: shape subscriptions and HTTP submission.
//!
//! The traits abstract the network layer so hosts can plug in any HTTP
//! or CDC client. The in-memory implementations back the tests and
//! double as a loopback "server" for hosts that embed the feed.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use shapesync_protocol::{
    ChangeMessage, ControlMessage, ResumeCursor, ShapeBatch, ShapeLog, ShapeMessage,
    SubscribeRequest,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum messages delivered per in-memory batch.
const BATCH_LIMIT: usize = 64;

/// One open shape subscription.
pub trait ShapeSubscription: Send {
    /// Returns the next ordered batch, or `None` when the stream is at
    /// the live edge with nothing new.
    fn next_batch(&mut self) -> SyncResult<Option<ShapeBatch>>;

    /// Tears down the subscription. Must be idempotent.
    fn close(&mut self);
}

/// Opens shape subscriptions against a CDC feed.
pub trait ShapeSource: Send + Sync {
    /// Opens one subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StreamOpen`] when the subscription cannot
    /// be established (network, DNS, auth).
    fn subscribe(&self, request: &SubscribeRequest) -> SyncResult<Box<dyn ShapeSubscription>>;
}

/// Submits operation and awareness messages to the backend.
pub trait SubmitClient: Send + Sync {
    /// Submits one operation frame for a room.
    fn submit_operation(&self, room: &str, frame: &str) -> SyncResult<()>;

    /// Submits one awareness frame for a room on behalf of a client.
    fn submit_awareness(&self, room: &str, client_id: &str, frame: &str) -> SyncResult<()>;
}

#[derive(Default)]
struct MemorySourceInner {
    logs: HashMap<String, Arc<RwLock<ShapeLog>>>,
    fail_subscribe: bool,
}

/// An in-memory [`ShapeSource`] keyed by endpoint URL and room filter.
///
/// Each `(url, where_clause)` pair gets its own [`ShapeLog`]; appending
/// to a log makes the entries visible to every subscription on it.
#[derive(Clone, Default)]
pub struct MemoryShapeSource {
    inner: Arc<RwLock<MemorySourceInner>>,
}

impl MemoryShapeSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// The log backing `(url, where_clause)`, created on demand.
    pub fn log(&self, url: &str, where_clause: &str) -> Arc<RwLock<ShapeLog>> {
        let key = format!("{url}?{where_clause}");
        self.inner
            .write()
            .logs
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(ShapeLog::new())))
            .clone()
    }

    /// Makes subsequent `subscribe` calls fail, simulating an
    /// unreachable feed.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.write().fail_subscribe = fail;
    }
}

impl ShapeSource for MemoryShapeSource {
    fn subscribe(&self, request: &SubscribeRequest) -> SyncResult<Box<dyn ShapeSubscription>> {
        if self.inner.read().fail_subscribe {
            return Err(SyncError::stream_open("feed unreachable"));
        }
        let log = self.log(&request.url, &request.where_clause);
        Ok(Box::new(MemorySubscription {
            log,
            position: request.resume.clone(),
            signaled_current: false,
            closed: false,
        }))
    }
}

struct MemorySubscription {
    log: Arc<RwLock<ShapeLog>>,
    position: Option<ResumeCursor>,
    signaled_current: bool,
    closed: bool,
}

impl ShapeSubscription for MemorySubscription {
    fn next_batch(&mut self) -> SyncResult<Option<ShapeBatch>> {
        if self.closed {
            return Ok(None);
        }
        let log = self.log.read();
        let entries = log.poll(self.position.as_ref(), BATCH_LIMIT);

        if entries.is_empty() {
            // An empty feed still signals the live edge once.
            if self.signaled_current {
                return Ok(None);
            }
            self.signaled_current = true;
            let cursor = self
                .position
                .clone()
                .unwrap_or_else(|| log.cursor_at(log.latest_offset()));
            return Ok(Some(ShapeBatch {
                messages: vec![ShapeMessage::Control(ControlMessage::UpToDate)],
                cursor,
            }));
        }

        let last_offset = entries.last().map(|e| e.offset).unwrap_or(0);
        let at_edge = last_offset == log.latest_offset();
        let count = entries.len();

        let mut messages: Vec<ShapeMessage> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut message: ChangeMessage = entry.message;
                message.last = at_edge && i + 1 == count;
                ShapeMessage::Change(message)
            })
            .collect();
        if at_edge {
            messages.push(ShapeMessage::Control(ControlMessage::UpToDate));
            self.signaled_current = true;
        }

        let cursor = log.cursor_at(last_offset);
        self.position = Some(cursor.clone());
        Ok(Some(ShapeBatch { messages, cursor }))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Default)]
struct MockSubmitInner {
    operations: Vec<(String, String)>,
    awareness: Vec<(String, String, String)>,
    fail_operations: bool,
    fail_awareness: bool,
}

/// A [`SubmitClient`] that records submissions, for tests.
#[derive(Clone, Default)]
pub struct MockSubmitClient {
    inner: Arc<RwLock<MockSubmitInner>>,
}

impl MockSubmitClient {
    /// Creates a recording client that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(room, frame)` operation submissions.
    pub fn operations(&self) -> Vec<(String, String)> {
        self.inner.read().operations.clone()
    }

    /// Recorded `(room, client_id, frame)` awareness submissions.
    pub fn awareness(&self) -> Vec<(String, String, String)> {
        self.inner.read().awareness.clone()
    }

    /// Makes operation submissions fail.
    pub fn set_fail_operations(&self, fail: bool) {
        self.inner.write().fail_operations = fail;
    }

    /// Makes awareness submissions fail.
    pub fn set_fail_awareness(&self, fail: bool) {
        self.inner.write().fail_awareness = fail;
    }
}

impl SubmitClient for MockSubmitClient {
    fn submit_operation(&self, room: &str, frame: &str) -> SyncResult<()> {
        let mut inner = self.inner.write();
        if inner.fail_operations {
            return Err(SyncError::submission_retryable("operation rejected"));
        }
        inner.operations.push((room.to_string(), frame.to_string()));
        Ok(())
    }

    fn submit_awareness(&self, room: &str, client_id: &str, frame: &str) -> SyncResult<()> {
        let mut inner = self.inner.write();
        if inner.fail_awareness {
            return Err(SyncError::submission_retryable("awareness rejected"));
        }
        inner
            .awareness
            .push((room.to_string(), client_id.to_string(), frame.to_string()));
        Ok(())
    }
}

/// A [`SubmitClient`] that appends straight into an in-memory source's
/// logs, acting as the backend: submitted operations and awareness
/// frames become feed entries visible to every subscriber.
pub struct LoopbackSubmitter {
    operations: Arc<RwLock<ShapeLog>>,
    awareness: Arc<RwLock<ShapeLog>>,
}

impl LoopbackSubmitter {
    /// Creates a submitter writing to the given logs.
    pub fn new(operations: Arc<RwLock<ShapeLog>>, awareness: Arc<RwLock<ShapeLog>>) -> Self {
        Self {
            operations,
            awareness,
        }
    }
}

impl SubmitClient for LoopbackSubmitter {
    fn submit_operation(&self, _room: &str, frame: &str) -> SyncResult<()> {
        self.operations.write().append_operation(frame);
        Ok(())
    }

    fn submit_awareness(&self, _room: &str, client_id: &str, frame: &str) -> SyncResult<()> {
        self.awareness.write().append_awareness(frame, client_id);
        Ok(())
    }
}
