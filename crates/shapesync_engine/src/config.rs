//! Configuration for a room provider.

use std::time::Duration;

/// Policy for expiring presence entries that stop broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceExpiry {
    /// Entries are only removed by explicit tombstone broadcasts.
    #[default]
    Never,
    /// Entries unseen for longer than the heartbeat interval are
    /// tombstoned, and inbound presence older than the interval is
    /// discarded.
    AfterHeartbeat,
}

/// Configuration for one room's sync provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the backend, e.g. `https://sync.example.com`.
    pub base_url: String,
    /// Room identifier this provider synchronizes.
    pub room: String,
    /// Kind of room, used to derive endpoint and filter names
    /// (`document` yields `/v1/document-operations` and
    /// `document_id = '<room>'`).
    pub room_kind: String,
    /// The local CRDT client id, sent with awareness submissions.
    pub client_id: u64,
    /// Presence heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Presence staleness policy.
    pub presence_expiry: PresenceExpiry,
}

impl ProviderConfig {
    /// Creates a configuration with default room kind `document`,
    /// a 30 second heartbeat, and no presence expiry.
    pub fn new(base_url: impl Into<String>, room: impl Into<String>, client_id: u64) -> Self {
        Self {
            base_url: base_url.into(),
            room: room.into(),
            room_kind: "document".into(),
            client_id,
            heartbeat_interval: Duration::from_secs(30),
            presence_expiry: PresenceExpiry::Never,
        }
    }

    /// Sets the room kind.
    pub fn with_room_kind(mut self, kind: impl Into<String>) -> Self {
        self.room_kind = kind.into();
        self
    }

    /// Sets the presence heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the presence staleness policy.
    pub fn with_presence_expiry(mut self, expiry: PresenceExpiry) -> Self {
        self.presence_expiry = expiry;
        self
    }

    /// Subscription and submission endpoint for document operations.
    pub fn operations_url(&self) -> String {
        format!("{}/v1/{}-operations", self.base_url, self.room_kind)
    }

    /// Subscription endpoint for awareness broadcasts.
    pub fn awareness_url(&self) -> String {
        format!("{}/v1/awareness", self.base_url)
    }

    /// Server-side row filter scoping a shape to this room.
    pub fn where_clause(&self) -> String {
        format!("{}_id = '{}'", self.room_kind.replace('-', "_"), self.room)
    }

    /// JSON body key naming the room, e.g. `documentId`.
    pub fn room_id_key(&self) -> String {
        let mut key = String::new();
        for (i, part) in self.room_kind.split(['-', '_']).enumerate() {
            if i == 0 {
                key.push_str(part);
            } else {
                let mut chars = part.chars();
                if let Some(first) = chars.next() {
                    key.extend(first.to_uppercase());
                    key.push_str(chars.as_str());
                }
            }
        }
        key.push_str("Id");
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints() {
        let config = ProviderConfig::new("https://sync.example.com", "room-1", 7);
        assert_eq!(
            config.operations_url(),
            "https://sync.example.com/v1/document-operations"
        );
        assert_eq!(config.awareness_url(), "https://sync.example.com/v1/awareness");
        assert_eq!(config.where_clause(), "document_id = 'room-1'");
        assert_eq!(config.room_id_key(), "documentId");
    }

    #[test]
    fn hyphenated_room_kind() {
        let config = ProviderConfig::new("http://h", "r", 1).with_room_kind("thoughts-document");
        assert_eq!(config.operations_url(), "http://h/v1/thoughts-document-operations");
        assert_eq!(config.where_clause(), "thoughts_document_id = 'r'");
        assert_eq!(config.room_id_key(), "thoughtsDocumentId");
    }

    #[test]
    fn builder_options() {
        let config = ProviderConfig::new("http://h", "r", 1)
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_presence_expiry(PresenceExpiry::AfterHeartbeat);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.presence_expiry, PresenceExpiry::AfterHeartbeat);
    }
}
