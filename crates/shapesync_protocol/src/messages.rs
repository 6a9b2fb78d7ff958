//! Messages delivered by a shape subscription.

use crate::cursor::ResumeCursor;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Parameters for opening one shape subscription.
///
/// Mirrors the CDC subscription contract: a feed URL, a server-side row
/// filter scoping the shape to one room, live-tail mode, and an
/// optional cursor to continue from instead of replaying history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Feed endpoint URL.
    pub url: String,
    /// Server-side filter, e.g. `document_id = 'room-1'`.
    pub where_clause: String,
    /// Keep the subscription open at the live edge.
    pub subscribe: bool,
    /// Continue from this cursor rather than the beginning.
    pub resume: Option<ResumeCursor>,
}

impl SubscribeRequest {
    /// Creates a live subscription request with no resume cursor.
    pub fn new(url: impl Into<String>, where_clause: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            where_clause: where_clause.into(),
            subscribe: true,
            resume: None,
        }
    }

    /// Sets the resume cursor.
    pub fn with_resume(mut self, resume: Option<ResumeCursor>) -> Self {
        self.resume = resume;
        self
    }
}

/// A message on a shape stream, tagged once at the deserialization
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeMessage {
    /// A change record carrying a payload.
    Change(ChangeMessage),
    /// A stream control signal.
    Control(ControlMessage),
}

/// One change record from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMessage {
    /// Base64 wire frame (sync-protocol or awareness envelope).
    pub op: String,
    /// Originating client, present on awareness records.
    pub client_id: Option<String>,
    /// Server-side commit time, present on awareness records.
    pub updated: Option<SystemTime>,
    /// True when this is the last change before the stream is current.
    pub last: bool,
}

impl ChangeMessage {
    /// Creates a plain operation change record.
    pub fn operation(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            client_id: None,
            updated: None,
            last: false,
        }
    }

    /// Creates an awareness change record.
    pub fn awareness(
        op: impl Into<String>,
        client_id: impl Into<String>,
        updated: SystemTime,
    ) -> Self {
        Self {
            op: op.into(),
            client_id: Some(client_id.into()),
            updated: Some(updated),
            last: false,
        }
    }
}

/// Control signals a shape stream can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The consumer has caught up to the live edge of the feed.
    UpToDate,
}

/// An ordered batch of shape messages plus the cursor to persist for
/// resumption. A batch must be fully applied before the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeBatch {
    /// Messages in delivery order.
    pub messages: Vec<ShapeMessage>,
    /// Position to resume from after this batch.
    pub cursor: ResumeCursor,
}

impl ShapeBatch {
    /// Returns true if the batch carries an up-to-date control signal.
    pub fn is_up_to_date(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, ShapeMessage::Control(ControlMessage::UpToDate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_builder() {
        let request = SubscribeRequest::new("http://feed/v1/document-operations", "document_id = 'r1'")
            .with_resume(Some(ResumeCursor::new("7", "sub")));
        assert!(request.subscribe);
        assert_eq!(request.resume.unwrap().offset.as_str(), "7");
    }

    #[test]
    fn batch_up_to_date_detection() {
        let batch = ShapeBatch {
            messages: vec![
                ShapeMessage::Change(ChangeMessage::operation("AAE=")),
                ShapeMessage::Control(ControlMessage::UpToDate),
            ],
            cursor: ResumeCursor::new("1", "s"),
        };
        assert!(batch.is_up_to_date());

        let batch = ShapeBatch {
            messages: vec![ShapeMessage::Change(ChangeMessage::operation("AAE="))],
            cursor: ResumeCursor::new("2", "s"),
        };
        assert!(!batch.is_up_to_date());
    }
}
