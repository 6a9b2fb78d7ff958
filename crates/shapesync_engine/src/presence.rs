//! The presence broadcaster: local awareness changes out, remote
//! broadcasts in.
//!
//! Presence is best-effort by design: updates made while disconnected
//! are dropped rather than buffered, since stale presence is harmless
//! and the local state re-broadcasts on reconnect.

use crate::config::{PresenceExpiry, ProviderConfig};
use crate::error::SyncResult;
use crate::transport::SubmitClient;
use parking_lot::RwLock;
use shapesync_protocol::{
    decode_awareness_frame, encode_awareness_frame, Awareness, AwarenessChange, ShapeBatch,
    ShapeMessage,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Translates between the shared awareness registry and the wire.
pub struct PresenceBroadcaster {
    awareness: Arc<RwLock<Awareness>>,
    room: String,
    client_id: String,
    heartbeat_interval: Duration,
    expiry: PresenceExpiry,
}

impl PresenceBroadcaster {
    /// Creates a broadcaster over the shared registry.
    pub fn new(config: &ProviderConfig, awareness: Arc<RwLock<Awareness>>) -> Self {
        Self {
            awareness,
            room: config.room.clone(),
            client_id: config.client_id.to_string(),
            heartbeat_interval: config.heartbeat_interval,
            expiry: config.presence_expiry,
        }
    }

    /// The shared registry.
    pub fn awareness(&self) -> &Arc<RwLock<Awareness>> {
        &self.awareness
    }

    /// Broadcasts a local awareness change.
    ///
    /// When not connected the update is dropped. Submission failures
    /// are logged and swallowed: presence is never worth failing over.
    pub fn broadcast_local_change(
        &self,
        change: &AwarenessChange,
        client: &dyn SubmitClient,
        connected: bool,
    ) {
        if change.is_empty() {
            return;
        }
        if !connected {
            return;
        }
        let update = self
            .awareness
            .read()
            .encode_update(&change.changed_clients());
        let frame = match encode_awareness_frame(&update) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode awareness update");
                return;
            }
        };
        if let Err(e) = client.submit_awareness(&self.room, &self.client_id, &frame) {
            warn!(error = %e, "awareness submission failed, dropping");
        }
    }

    /// Merges a batch of remote awareness messages into the registry.
    ///
    /// Undecodable messages are logged and skipped so one corrupt
    /// record does not break the subscription. Returns the accumulated
    /// change.
    pub fn apply_remote_batch(&self, batch: &ShapeBatch) -> AwarenessChange {
        let mut total = AwarenessChange::default();
        for message in &batch.messages {
            let change = match message {
                ShapeMessage::Change(change) => change,
                ShapeMessage::Control(_) => continue,
            };
            if self.is_stale(change.updated) {
                continue;
            }
            match decode_awareness_frame(&change.op) {
                Ok(update) => {
                    let applied = self.awareness.write().apply_update(&update);
                    total.added.extend(applied.added);
                    total.updated.extend(applied.updated);
                    total.removed.extend(applied.removed);
                }
                Err(e) => {
                    warn!(error = %e, "skipping undecodable awareness message");
                }
            }
        }
        total
    }

    /// Tombstones entries unseen for longer than the heartbeat
    /// interval, when the expiry policy says so. Returns the removed
    /// client ids.
    pub fn expire_stale(&self) -> Vec<u64> {
        match self.expiry {
            PresenceExpiry::Never => Vec::new(),
            PresenceExpiry::AfterHeartbeat => {
                self.awareness.write().prune_stale(self.heartbeat_interval)
            }
        }
    }

    /// Broadcasts the local tombstone, best-effort, for disconnect.
    pub fn announce_departure(&self, client: &dyn SubmitClient) -> SyncResult<()> {
        let change = self.awareness.write().set_local_state(None);
        if change.is_empty() {
            return Ok(());
        }
        let update = self
            .awareness
            .read()
            .encode_update(&change.changed_clients());
        let frame = encode_awareness_frame(&update)?;
        client.submit_awareness(&self.room, &self.client_id, &frame)
    }

    fn is_stale(&self, updated: Option<SystemTime>) -> bool {
        if self.expiry != PresenceExpiry::AfterHeartbeat {
            return false;
        }
        let Some(updated) = updated else {
            return false;
        };
        match SystemTime::now().duration_since(updated) {
            Ok(age) => age > self.heartbeat_interval,
            // A timestamp from the future is not stale.
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockSubmitClient;
    use shapesync_protocol::{ChangeMessage, ResumeCursor};
    use serde_json::json;

    fn config() -> ProviderConfig {
        ProviderConfig::new("http://h", "room-1", 7)
    }

    fn broadcaster(config: &ProviderConfig) -> PresenceBroadcaster {
        PresenceBroadcaster::new(config, Arc::new(RwLock::new(Awareness::new(7))))
    }

    fn state(v: &str) -> shapesync_protocol::StateMap {
        let mut map = shapesync_protocol::StateMap::new();
        map.insert("cursor".into(), json!(v));
        map
    }

    fn batch_with_frame(frame: &str) -> ShapeBatch {
        ShapeBatch {
            messages: vec![ShapeMessage::Change(ChangeMessage::awareness(
                frame,
                "9",
                SystemTime::now(),
            ))],
            cursor: ResumeCursor::new("1", "s"),
        }
    }

    #[test]
    fn local_change_submits_when_connected() {
        let config = config();
        let presence = broadcaster(&config);
        let client = MockSubmitClient::new();

        let change = presence.awareness().write().set_local_state(Some(state("1:1")));
        presence.broadcast_local_change(&change, &client, true);

        let sent = client.awareness();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "room-1");
        assert_eq!(sent[0].1, "7");

        let update = decode_awareness_frame(&sent[0].2).unwrap();
        assert_eq!(update.clients.len(), 1);
        assert_eq!(update.clients[0].client_id, 7);
    }

    #[test]
    fn local_change_dropped_when_disconnected() {
        let config = config();
        let presence = broadcaster(&config);
        let client = MockSubmitClient::new();

        let change = presence.awareness().write().set_local_state(Some(state("1:1")));
        presence.broadcast_local_change(&change, &client, false);
        assert!(client.awareness().is_empty());
    }

    #[test]
    fn submission_failure_is_swallowed() {
        let config = config();
        let presence = broadcaster(&config);
        let client = MockSubmitClient::new();
        client.set_fail_awareness(true);

        let change = presence.awareness().write().set_local_state(Some(state("1:1")));
        presence.broadcast_local_change(&change, &client, true);
        assert!(client.awareness().is_empty());
    }

    #[test]
    fn remote_batch_merges_into_registry() {
        let config = config();
        let presence = broadcaster(&config);

        let mut remote = Awareness::new(9);
        let change = remote.set_local_state(Some(state("2:4")));
        let frame = encode_awareness_frame(&remote.encode_update(&change.changed_clients()))
            .unwrap();

        let applied = presence.apply_remote_batch(&batch_with_frame(&frame));
        assert_eq!(applied.added, vec![9]);
        assert!(presence.awareness().read().entry(9).is_some());
    }

    #[test]
    fn corrupt_message_skipped_valid_message_applied() {
        let config = config();
        let presence = broadcaster(&config);

        let mut remote = Awareness::new(9);
        let change = remote.set_local_state(Some(state("2:4")));
        let good = encode_awareness_frame(&remote.encode_update(&change.changed_clients()))
            .unwrap();

        let batch = ShapeBatch {
            messages: vec![
                ShapeMessage::Change(ChangeMessage::awareness(
                    "@@garbage@@",
                    "9",
                    SystemTime::now(),
                )),
                ShapeMessage::Change(ChangeMessage::awareness("9", "9", SystemTime::now())),
                ShapeMessage::Change(ChangeMessage::awareness(good, "9", SystemTime::now())),
            ],
            cursor: ResumeCursor::new("3", "s"),
        };

        let applied = presence.apply_remote_batch(&batch);
        assert_eq!(applied.added, vec![9]);
    }

    #[test]
    fn stale_inbound_presence_skipped_under_expiry_policy() {
        let config = config().with_presence_expiry(PresenceExpiry::AfterHeartbeat);
        let presence = broadcaster(&config);

        let mut remote = Awareness::new(9);
        let change = remote.set_local_state(Some(state("2:4")));
        let frame = encode_awareness_frame(&remote.encode_update(&change.changed_clients()))
            .unwrap();

        let old = SystemTime::now() - Duration::from_secs(3600);
        let batch = ShapeBatch {
            messages: vec![ShapeMessage::Change(ChangeMessage::awareness(
                frame, "9", old,
            ))],
            cursor: ResumeCursor::new("1", "s"),
        };

        let applied = presence.apply_remote_batch(&batch);
        assert!(applied.is_empty());
        assert!(presence.awareness().read().entry(9).is_none());
    }

    #[test]
    fn expire_stale_respects_policy() {
        let never = broadcaster(&config());
        never
            .awareness()
            .write()
            .apply_update(&shapesync_protocol::AwarenessUpdate {
                clients: vec![shapesync_protocol::AwarenessClientUpdate {
                    client_id: 9,
                    clock: 1,
                    state: Some(state("x")),
                }],
            });
        assert!(never.expire_stale().is_empty());

        let config = config()
            .with_presence_expiry(PresenceExpiry::AfterHeartbeat)
            .with_heartbeat_interval(Duration::ZERO);
        let expiring = broadcaster(&config);
        expiring
            .awareness()
            .write()
            .apply_update(&shapesync_protocol::AwarenessUpdate {
                clients: vec![shapesync_protocol::AwarenessClientUpdate {
                    client_id: 9,
                    clock: 1,
                    state: Some(state("x")),
                }],
            });
        assert_eq!(expiring.expire_stale(), vec![9]);
    }

    #[test]
    fn departure_announces_tombstone() {
        let config = config();
        let presence = broadcaster(&config);
        let client = MockSubmitClient::new();

        presence.awareness().write().set_local_state(Some(state("1:1")));
        presence.announce_departure(&client).unwrap();

        let sent = client.awareness();
        assert_eq!(sent.len(), 1);
        let update = decode_awareness_frame(&sent[0].2).unwrap();
        assert!(update.clients[0].state.is_none());
        assert!(presence.awareness().read().local_state().is_none());
    }
}
