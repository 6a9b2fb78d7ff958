//! The connection lifecycle controller for one room.
//!
//! Owns the two change stream consumers and all cross-cutting mutable
//! state: connection state, the offline buffer flags, and resume
//! cursors. All mutation happens on the host's single logical task per
//! room; the engine takes `&mut self` instead of locking.

use crate::config::ProviderConfig;
use crate::doc::{DocumentReplica, Origin};
use crate::error::SyncResult;
use crate::events::{ConnectionStatus, ProviderEvent, ProviderObserver};
use crate::presence::PresenceBroadcaster;
use crate::stream::ShapeStream;
use crate::transport::{ShapeSource, SubmitClient};
use parking_lot::RwLock;
use shapesync_protocol::{
    decode_operation_frame, encode_operation_frame, Awareness, AwarenessChange, ControlMessage,
    CursorStore, ResumeCursor, ShapeBatch, ShapeMessage, StateMap, StreamKind, SubscribeRequest,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No streams are open.
    Disconnected,
    /// Streams are open, waiting for the first operations batch.
    Connecting,
    /// The operations stream is delivering, not yet at the live edge.
    Connected,
    /// Caught up to the live edge of the feed.
    Synced,
}

impl ConnectionState {
    /// Returns true when operations can be submitted directly.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Synced)
    }
}

/// Synchronizes one CRDT document replica with a shape-stream backed
/// room, broadcasting presence alongside.
pub struct ShapeProvider<D: DocumentReplica, S: ShapeSource, C: SubmitClient> {
    config: ProviderConfig,
    doc: Arc<RwLock<D>>,
    source: Arc<S>,
    client: Arc<C>,
    presence: Option<PresenceBroadcaster>,

    state: ConnectionState,
    should_connect: bool,
    synced: bool,

    modified_while_offline: bool,
    last_synced_state_vector: Option<shapesync_protocol::StateVector>,
    stashed_awareness: Option<StateMap>,

    cursors: CursorStore,
    operations_stream: Option<ShapeStream>,
    awareness_stream: Option<ShapeStream>,

    observers: Vec<Box<dyn ProviderObserver>>,
}

impl<D: DocumentReplica, S: ShapeSource, C: SubmitClient> ShapeProvider<D, S, C> {
    /// Creates a disconnected provider for the configured room.
    pub fn new(config: ProviderConfig, doc: Arc<RwLock<D>>, source: Arc<S>, client: Arc<C>) -> Self {
        Self {
            config,
            doc,
            source,
            client,
            presence: None,
            state: ConnectionState::Disconnected,
            should_connect: false,
            synced: false,
            modified_while_offline: false,
            last_synced_state_vector: None,
            stashed_awareness: None,
            cursors: CursorStore::new(),
            operations_stream: None,
            awareness_stream: None,
            observers: Vec::new(),
        }
    }

    /// Attaches the shared awareness registry, enabling presence.
    pub fn with_awareness(mut self, awareness: Arc<RwLock<Awareness>>) -> Self {
        self.presence = Some(PresenceBroadcaster::new(&self.config, awareness));
        self
    }

    /// Registers an observer for the event surface.
    pub fn observe(&mut self, observer: Box<dyn ProviderObserver>) {
        self.observers.push(observer);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once caught up to the live edge.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Whether a local edit happened while disconnected and has not
    /// been replayed yet.
    pub fn modified_while_offline(&self) -> bool {
        self.modified_while_offline
    }

    /// The resume cursor recorded for a stream, if any.
    pub fn resume_cursor(&self, kind: StreamKind) -> Option<&ResumeCursor> {
        self.cursors.get(kind)
    }

    /// The shared document handle.
    pub fn doc(&self) -> &Arc<RwLock<D>> {
        &self.doc
    }

    /// The shared awareness registry, when presence is enabled.
    pub fn awareness(&self) -> Option<&Arc<RwLock<Awareness>>> {
        self.presence.as_ref().map(|p| p.awareness())
    }

    /// Opens both shape streams and starts connecting.
    ///
    /// Idempotent: calling while already connecting or connected is a
    /// no-op. On open failure nothing is left half-open and the
    /// provider stays [`ConnectionState::Disconnected`].
    pub fn connect(&mut self) -> SyncResult<()> {
        self.should_connect = true;
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }

        // Restore the local presence stashed at disconnect; it is
        // re-announced once the connection is up.
        if let (Some(presence), Some(stash)) = (&self.presence, self.stashed_awareness.take()) {
            presence.awareness().write().set_local_state(Some(stash));
        }

        let operations_request =
            SubscribeRequest::new(self.config.operations_url(), self.config.where_clause())
                .with_resume(self.cursors.get(StreamKind::Operations).cloned());
        let operations = ShapeStream::open(
            StreamKind::Operations,
            self.source.as_ref(),
            &operations_request,
        )?;

        let awareness_request =
            SubscribeRequest::new(self.config.awareness_url(), self.config.where_clause())
                .with_resume(self.cursors.get(StreamKind::Awareness).cloned());
        let awareness = match ShapeStream::open(
            StreamKind::Awareness,
            self.source.as_ref(),
            &awareness_request,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                // Half-open is worse than closed.
                let mut operations = operations;
                operations.close();
                return Err(e);
            }
        };

        self.operations_stream = Some(operations);
        self.awareness_stream = Some(awareness);
        self.state = ConnectionState::Connecting;
        debug!(room = %self.config.room, "connecting");
        self.emit(ProviderEvent::Status(ConnectionStatus::Connecting));
        Ok(())
    }

    /// Tears the connection down and marks the intent to stay offline.
    ///
    /// Best-effort: peers are notified that local presence has gone
    /// away, but a failed notification is not fatal.
    pub fn disconnect(&mut self) {
        self.should_connect = false;
        if self.state == ConnectionState::Disconnected {
            return;
        }

        if let Some(presence) = &self.presence {
            if self.state.is_connected() {
                self.stashed_awareness = presence.awareness().read().local_state().cloned();

                let local = presence.awareness().read().local_client();
                let remote: Vec<u64> = presence
                    .awareness()
                    .read()
                    .states()
                    .map(|(id, _)| id)
                    .filter(|&id| id != local)
                    .collect();
                presence.awareness().write().remove_states(&remote);

                if let Err(e) = presence.announce_departure(self.client.as_ref()) {
                    warn!(error = %e, "failed to announce departure, peers will see stale presence");
                }
            }
        }

        self.teardown();
    }

    /// Disconnects and drops all observers. The provider is inert
    /// afterwards until `connect` is called again.
    pub fn destroy(&mut self) {
        self.disconnect();
        self.observers.clear();
    }

    /// Feeds a document mutation into the engine.
    ///
    /// The host wires its document's update observer to this method.
    /// Updates the engine itself applied carry [`Origin::Provider`]
    /// and are ignored, which breaks the echo feedback loop.
    pub fn document_updated(&mut self, update: &[u8], origin: Origin) {
        if origin == Origin::Provider {
            return;
        }
        if self.state.is_connected() {
            let frame = encode_operation_frame(update);
            if let Err(e) = self.client.submit_operation(&self.config.room, &frame) {
                warn!(error = %e, "operation submission failed, will replay on reconnect");
                self.modified_while_offline = true;
            }
        } else {
            self.modified_while_offline = true;
        }
    }

    /// Feeds a local awareness mutation into the engine.
    ///
    /// Remote-origin changes were already merged by the engine and are
    /// not re-broadcast. While disconnected presence is dropped, not
    /// buffered.
    pub fn awareness_updated(&mut self, change: &AwarenessChange, origin: Origin) {
        if origin != Origin::Local {
            return;
        }
        if let Some(presence) = &self.presence {
            presence.broadcast_local_change(
                change,
                self.client.as_ref(),
                self.state.is_connected(),
            );
        }
    }

    /// Pumps both streams: drains every available batch in order,
    /// fully applying one batch before the next.
    ///
    /// Stream failures transition to disconnected rather than
    /// propagate; per-message decode failures are logged and skipped.
    pub fn poll(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        loop {
            let polled = match self.operations_stream.as_mut() {
                Some(stream) => stream.poll_batch(),
                None => break,
            };
            match polled {
                Ok(Some(batch)) => self.process_operations_batch(batch),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "operations stream failed");
                    self.teardown();
                    return;
                }
            }
        }

        loop {
            let polled = match self.awareness_stream.as_mut() {
                Some(stream) => stream.poll_batch(),
                None => break,
            };
            match polled {
                Ok(Some(batch)) => self.process_awareness_batch(batch),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "awareness stream failed");
                    self.teardown();
                    return;
                }
            }
        }

        if let Some(presence) = &self.presence {
            let expired = presence.expire_stale();
            if !expired.is_empty() {
                debug!(?expired, "expired stale presence entries");
            }
        }
    }

    fn process_operations_batch(&mut self, batch: ShapeBatch) {
        self.cursors.record(StreamKind::Operations, batch.cursor.clone());

        // The first delivered batch is the signal that the
        // subscription is live.
        if self.state == ConnectionState::Connecting {
            self.enter_connected();
        }

        for message in &batch.messages {
            match message {
                ShapeMessage::Change(change) => match decode_operation_frame(&change.op) {
                    Ok(update) => {
                        let result = self.doc.write().apply_update(&update, Origin::Provider);
                        if let Err(e) = result {
                            warn!(error = %e, "skipping unappliable operation");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable change message");
                    }
                },
                ShapeMessage::Control(ControlMessage::UpToDate) => {
                    self.set_synced(true);
                }
            }
        }
    }

    fn process_awareness_batch(&mut self, batch: ShapeBatch) {
        self.cursors.record(StreamKind::Awareness, batch.cursor.clone());
        if let Some(presence) = &self.presence {
            presence.apply_remote_batch(&batch);
        }
    }

    fn enter_connected(&mut self) {
        self.state = ConnectionState::Connected;
        debug!(room = %self.config.room, "connected");

        if self.modified_while_offline {
            let delta = self
                .doc
                .read()
                .encode_update_since(self.last_synced_state_vector.as_ref());
            let frame = encode_operation_frame(&delta);
            match self.client.submit_operation(&self.config.room, &frame) {
                Ok(()) => {
                    self.modified_while_offline = false;
                    self.last_synced_state_vector = None;
                }
                Err(e) => {
                    // The flag stays set so a later reconnect retries;
                    // clearing it here would silently drop edits.
                    warn!(error = %e, "offline replay failed, keeping buffer");
                }
            }
        }

        self.emit(ProviderEvent::Status(ConnectionStatus::Connected));

        // Re-announce local presence to peers who saw our tombstone.
        if let Some(presence) = &self.presence {
            let local = presence.awareness().read().local_client();
            if presence.awareness().read().local_state().is_some() {
                let change = AwarenessChange {
                    added: vec![local],
                    ..AwarenessChange::default()
                };
                presence.broadcast_local_change(&change, self.client.as_ref(), true);
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut stream) = self.operations_stream.take() {
            stream.close();
        }
        if let Some(mut stream) = self.awareness_stream.take() {
            stream.close();
        }

        if self.state.is_connected() {
            // Snapshot for the replay delta, unless an earlier offline
            // period is still unflushed; overwriting that snapshot
            // would exclude its edits from the next replay.
            if !self.modified_while_offline {
                let sv = self.doc.read().state_vector();
                self.last_synced_state_vector = Some(sv);
            }
            self.set_synced(false);
            self.state = ConnectionState::Disconnected;
            self.emit(ProviderEvent::Status(ConnectionStatus::Disconnected));
        } else {
            self.state = ConnectionState::Disconnected;
        }
        self.emit(ProviderEvent::ConnectionClose);
    }

    fn set_synced(&mut self, synced: bool) {
        if synced && self.state == ConnectionState::Connected {
            self.state = ConnectionState::Synced;
        }
        if self.synced == synced {
            return;
        }
        self.synced = synced;
        self.emit(ProviderEvent::Sync(synced));
        self.emit(ProviderEvent::Synced(synced));
    }

    fn emit(&mut self, event: ProviderEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::MemoryDocument;
    use crate::events::EventLog;
    use crate::transport::{MemoryShapeSource, MockSubmitClient};

    type TestProvider = ShapeProvider<MemoryDocument, MemoryShapeSource, MockSubmitClient>;

    struct Harness {
        provider: TestProvider,
        source: MemoryShapeSource,
        client: MockSubmitClient,
        events: EventLog,
        config: ProviderConfig,
    }

    fn harness() -> Harness {
        let config = ProviderConfig::new("http://backend", "room-1", 7);
        let source = MemoryShapeSource::new();
        let client = MockSubmitClient::new();
        let doc = Arc::new(RwLock::new(MemoryDocument::new(7)));
        let mut provider = ShapeProvider::new(
            config.clone(),
            doc,
            Arc::new(source.clone()),
            Arc::new(client.clone()),
        );
        let events = EventLog::new();
        provider.observe(Box::new(events.clone()));
        Harness {
            provider,
            source,
            client,
            events,
            config,
        }
    }

    fn ops_log(h: &Harness) -> Arc<RwLock<shapesync_protocol::ShapeLog>> {
        h.source
            .log(&h.config.operations_url(), &h.config.where_clause())
    }

    #[test]
    fn clean_round_trip() {
        let mut h = harness();
        assert_eq!(h.provider.state(), ConnectionState::Disconnected);

        h.provider.connect().unwrap();
        assert_eq!(h.provider.state(), ConnectionState::Connecting);

        h.provider.poll();
        assert_eq!(h.provider.state(), ConnectionState::Synced);
        assert!(h.provider.is_synced());

        assert_eq!(
            h.events.statuses(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
        let events = h.events.events();
        let syncs: Vec<&ProviderEvent> = events
            .iter()
            .filter(|e| matches!(e, ProviderEvent::Sync(_)))
            .collect();
        assert_eq!(syncs, vec![&ProviderEvent::Sync(true)]);
        assert!(events.contains(&ProviderEvent::Synced(true)));
    }

    #[test]
    fn connect_is_idempotent() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.connect().unwrap();
        h.provider.poll();
        h.provider.connect().unwrap();

        // Only one connecting transition was emitted.
        assert_eq!(
            h.events.statuses(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn open_failure_leaves_disconnected() {
        let mut h = harness();
        h.source.set_fail_subscribe(true);
        assert!(h.provider.connect().is_err());
        assert_eq!(h.provider.state(), ConnectionState::Disconnected);
        assert!(h.events.events().is_empty());

        // A later attempt succeeds cleanly.
        h.source.set_fail_subscribe(false);
        h.provider.connect().unwrap();
        h.provider.poll();
        assert_eq!(h.provider.state(), ConnectionState::Synced);
    }

    #[test]
    fn remote_operations_apply_to_document() {
        let mut h = harness();

        let mut remote = MemoryDocument::new(9);
        let update = remote.insert("hello");
        ops_log(&h)
            .write()
            .append_operation(encode_operation_frame(&update));

        h.provider.connect().unwrap();
        h.provider.poll();

        let doc = h.provider.doc().read();
        assert_eq!(doc.snapshot(), vec![(9, 1, "hello".to_string())]);
    }

    #[test]
    fn offline_edit_sets_flag_and_replays_on_reconnect() {
        let mut h = harness();

        // Edit while disconnected.
        let update = h.provider.doc().write().insert("offline-edit");
        h.provider.document_updated(&update, Origin::Local);
        assert!(h.provider.modified_while_offline());
        assert!(h.client.operations().is_empty());

        // Reconnect: exactly one submission carrying the delta.
        h.provider.connect().unwrap();
        h.provider.poll();
        let sent = h.client.operations();
        assert_eq!(sent.len(), 1);
        let delta = decode_operation_frame(&sent[0].1).unwrap();
        let mut verify = MemoryDocument::new(99);
        verify.apply_update(&delta, Origin::Provider).unwrap();
        assert_eq!(verify.snapshot(), vec![(7, 1, "offline-edit".to_string())]);
        assert!(!h.provider.modified_while_offline());
    }

    #[test]
    fn failed_replay_keeps_flag_for_retry() {
        let mut h = harness();
        let update = h.provider.doc().write().insert("x");
        h.provider.document_updated(&update, Origin::Local);

        h.client.set_fail_operations(true);
        h.provider.connect().unwrap();
        h.provider.poll();
        assert!(h.provider.modified_while_offline());

        // Next reconnect retries and succeeds.
        h.provider.disconnect();
        h.client.set_fail_operations(false);
        h.provider.connect().unwrap();
        h.provider.poll();
        assert!(!h.provider.modified_while_offline());
        assert_eq!(h.client.operations().len(), 1);
    }

    #[test]
    fn live_edit_submits_immediately() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.poll();

        let update = h.provider.doc().write().insert("live");
        h.provider.document_updated(&update, Origin::Local);
        assert_eq!(h.client.operations().len(), 1);
        assert!(!h.provider.modified_while_offline());
    }

    #[test]
    fn failed_live_edit_marks_offline_buffer() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.poll();

        h.client.set_fail_operations(true);
        let update = h.provider.doc().write().insert("lossy");
        h.provider.document_updated(&update, Origin::Local);
        assert!(h.provider.modified_while_offline());
    }

    #[test]
    fn provider_origin_updates_are_ignored() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.poll();

        let update = h.provider.doc().write().insert("echo");
        h.provider.document_updated(&update, Origin::Provider);
        assert!(h.client.operations().is_empty());
        assert!(!h.provider.modified_while_offline());
    }

    #[test]
    fn malformed_message_does_not_break_stream() {
        let mut h = harness();
        let log = ops_log(&h);
        log.write().append_operation("@@corrupt@@");

        let mut remote = MemoryDocument::new(9);
        let update = remote.insert("survives");
        log.write()
            .append_operation(encode_operation_frame(&update));

        h.provider.connect().unwrap();
        h.provider.poll();

        assert_eq!(h.provider.state(), ConnectionState::Synced);
        assert_eq!(
            h.provider.doc().read().snapshot(),
            vec![(9, 1, "survives".to_string())]
        );
    }

    #[test]
    fn disconnect_snapshots_state_vector_and_emits_close() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.poll();

        h.provider.disconnect();
        assert_eq!(h.provider.state(), ConnectionState::Disconnected);
        let events = h.events.events();
        assert!(events.contains(&ProviderEvent::Status(ConnectionStatus::Disconnected)));
        assert!(events.contains(&ProviderEvent::ConnectionClose));
        assert!(events.contains(&ProviderEvent::Sync(false)));
    }

    #[test]
    fn reconnect_resumes_from_recorded_cursor() {
        let mut h = harness();
        let log = ops_log(&h);

        let mut remote = MemoryDocument::new(9);
        log.write()
            .append_operation(encode_operation_frame(&remote.insert("first")));

        h.provider.connect().unwrap();
        h.provider.poll();
        let cursor = h
            .provider
            .resume_cursor(StreamKind::Operations)
            .cloned()
            .unwrap();
        assert_eq!(cursor.offset.as_str(), "1");

        h.provider.disconnect();

        // New entry lands while offline.
        log.write()
            .append_operation(encode_operation_frame(&remote.insert("second")));

        h.provider.connect().unwrap();
        h.provider.poll();

        // Both entries present, none lost, duplicate apply harmless.
        assert_eq!(h.provider.doc().read().len(), 2);
        assert_eq!(
            h.provider
                .resume_cursor(StreamKind::Operations)
                .unwrap()
                .offset
                .as_str(),
            "2"
        );
    }

    #[test]
    fn destroy_drops_observers() {
        let mut h = harness();
        h.provider.connect().unwrap();
        h.provider.poll();
        h.provider.destroy();
        let count = h.events.events().len();

        // No further events after destroy.
        h.provider.connect().unwrap();
        h.provider.poll();
        assert_eq!(h.events.events().len(), count);
    }
}
