//! Ephemeral per-client presence ("awareness") state.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The JSON object a client publishes as its presence state.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// One client's presence entry.
#[derive(Debug, Clone)]
pub struct AwarenessEntry {
    /// Update counter for this client. Higher clocks win.
    pub clock: u64,
    /// Current state; `None` never appears in the live registry
    /// (tombstones remove the entry) but is kept for symmetry with
    /// [`AwarenessClientUpdate`].
    pub state: Option<StateMap>,
    /// When this entry was last touched by a broadcast.
    pub last_seen: Instant,
}

/// A decoded awareness broadcast: one clocked snapshot per client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwarenessUpdate {
    /// Per-client snapshots carried by the broadcast.
    pub clients: Vec<AwarenessClientUpdate>,
}

/// One client's snapshot inside an [`AwarenessUpdate`].
///
/// `state: None` is a tombstone announcing the client has gone away;
/// removal is always broadcast, never inferred from silence.
#[derive(Debug, Clone, PartialEq)]
pub struct AwarenessClientUpdate {
    /// Originating client.
    pub client_id: u64,
    /// The client's update counter at snapshot time.
    pub clock: u64,
    /// Presence state, or `None` for a tombstone.
    pub state: Option<StateMap>,
}

/// The effect of applying a local or remote awareness mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChange {
    /// Clients that appeared.
    pub added: Vec<u64>,
    /// Clients whose state changed.
    pub updated: Vec<u64>,
    /// Clients that were tombstoned.
    pub removed: Vec<u64>,
}

impl AwarenessChange {
    /// All clients touched by the change, in added/updated/removed order.
    pub fn changed_clients(&self) -> Vec<u64> {
        let mut all = self.added.clone();
        all.extend(&self.updated);
        all.extend(&self.removed);
        all
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// The shared awareness registry for one room.
///
/// Owned by the host application; the sync engine reads it to broadcast
/// local changes and writes remote entries on receipt. Entries are
/// removed by tombstone broadcasts, not by silent deletion. Clocks are
/// retained after removal so a stale re-delivery cannot resurrect a
/// departed client.
#[derive(Debug)]
pub struct Awareness {
    local_client: u64,
    entries: BTreeMap<u64, AwarenessEntry>,
    clocks: BTreeMap<u64, u64>,
}

impl Awareness {
    /// Creates a registry for the given local client, with no state set.
    pub fn new(local_client: u64) -> Self {
        Self {
            local_client,
            entries: BTreeMap::new(),
            clocks: BTreeMap::new(),
        }
    }

    /// The local client id.
    pub fn local_client(&self) -> u64 {
        self.local_client
    }

    /// The local client's current state, if set.
    pub fn local_state(&self) -> Option<&StateMap> {
        self.entries
            .get(&self.local_client)
            .and_then(|e| e.state.as_ref())
    }

    /// Sets (or with `None`, tombstones) the local client's state.
    pub fn set_local_state(&mut self, state: Option<StateMap>) -> AwarenessChange {
        let clock = self.bump_clock(self.local_client);
        self.apply_client(self.local_client, clock, state)
    }

    /// Clients with live state, in id order.
    pub fn states(&self) -> impl Iterator<Item = (u64, &StateMap)> + '_ {
        self.entries
            .iter()
            .filter_map(|(&id, e)| e.state.as_ref().map(|s| (id, s)))
    }

    /// The entry for a client, if present.
    pub fn entry(&self, client_id: u64) -> Option<&AwarenessEntry> {
        self.entries.get(&client_id)
    }

    /// Number of clients with live state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no client has live state.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges a decoded broadcast into the registry.
    ///
    /// Snapshots with a clock at or below the known clock are ignored,
    /// except that a tombstone at the known clock still removes the
    /// entry (a departure races its own last update).
    pub fn apply_update(&mut self, update: &AwarenessUpdate) -> AwarenessChange {
        let mut change = AwarenessChange::default();
        for client in &update.clients {
            let known = self.clocks.get(&client.client_id).copied().unwrap_or(0);
            let applies = match client.state {
                Some(_) => client.clock > known,
                None => client.clock >= known,
            };
            if !applies {
                continue;
            }
            self.clocks.insert(client.client_id, client.clock);
            let partial =
                self.apply_client(client.client_id, client.clock, client.state.clone());
            change.added.extend(partial.added);
            change.updated.extend(partial.updated);
            change.removed.extend(partial.removed);
        }
        change
    }

    /// Snapshots the named clients for broadcasting.
    ///
    /// Clients without a live entry are encoded as tombstones at their
    /// last known clock, so peers learn of the removal.
    pub fn encode_update(&self, client_ids: &[u64]) -> AwarenessUpdate {
        let clients = client_ids
            .iter()
            .map(|&id| match self.entries.get(&id) {
                Some(entry) => AwarenessClientUpdate {
                    client_id: id,
                    clock: entry.clock,
                    state: entry.state.clone(),
                },
                None => AwarenessClientUpdate {
                    client_id: id,
                    clock: self.clocks.get(&id).copied().unwrap_or(0),
                    state: None,
                },
            })
            .collect();
        AwarenessUpdate { clients }
    }

    /// Tombstones the given clients locally.
    pub fn remove_states(&mut self, client_ids: &[u64]) -> AwarenessChange {
        let mut change = AwarenessChange::default();
        for &id in client_ids {
            let clock = self.bump_clock(id);
            let partial = self.apply_client(id, clock, None);
            change.removed.extend(partial.removed);
        }
        change
    }

    /// Tombstones non-local entries whose `last_seen` exceeds `max_age`.
    ///
    /// Returns the removed client ids.
    pub fn prune_stale(&mut self, max_age: Duration) -> Vec<u64> {
        let now = Instant::now();
        let stale: Vec<u64> = self
            .entries
            .iter()
            .filter(|(&id, e)| {
                id != self.local_client && now.duration_since(e.last_seen) >= max_age
            })
            .map(|(&id, _)| id)
            .collect();
        if !stale.is_empty() {
            self.remove_states(&stale);
        }
        stale
    }

    fn bump_clock(&mut self, client_id: u64) -> u64 {
        let clock = self.clocks.entry(client_id).or_insert(0);
        *clock += 1;
        *clock
    }

    fn apply_client(
        &mut self,
        client_id: u64,
        clock: u64,
        state: Option<StateMap>,
    ) -> AwarenessChange {
        let mut change = AwarenessChange::default();
        match state {
            Some(state) => {
                let existed = self.entries.contains_key(&client_id);
                self.entries.insert(
                    client_id,
                    AwarenessEntry {
                        clock,
                        state: Some(state),
                        last_seen: Instant::now(),
                    },
                );
                if existed {
                    change.updated.push(client_id);
                } else {
                    change.added.push(client_id);
                }
            }
            None => {
                if self.entries.remove(&client_id).is_some() {
                    change.removed.push(client_id);
                }
            }
        }
        change
    }
}
