//! The seam to the CRDT document replica.
//!
//! The engine never reimplements CRDT merge logic; it orchestrates
//! *when* updates are applied and sent through the [`DocumentReplica`]
//! trait. [`MemoryDocument`] is a small op-set CRDT used by tests and
//! in-memory hosts.

use shapesync_codec::{CodecResult, Decoder, Encoder};
use shapesync_protocol::StateVector;
use std::collections::BTreeMap;

/// Origin tag attached to a document mutation.
///
/// Used to prevent feedback loops: updates the engine itself applies
/// carry [`Origin::Provider`], and the engine ignores them when they
/// re-enter through [`crate::ShapeProvider::document_updated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The local user edited the document.
    Local,
    /// The engine applied a remote or replayed operation.
    Provider,
}

/// A CRDT document replica, owned by the host and borrowed by the
/// engine.
///
/// Implementations must guarantee CRDT semantics: applying updates in
/// any order, any number of times at least once, converges to the same
/// state (commutativity plus idempotence). The engine relies on this
/// and never orders or deduplicates on the apply side.
pub trait DocumentReplica: Send {
    /// Summary of causally-known operations per originating client.
    fn state_vector(&self) -> StateVector;

    /// Merges an encoded update into the replica. Must be idempotent
    /// under duplicate delivery.
    fn apply_update(&mut self, update: &[u8], origin: Origin) -> CodecResult<()>;

    /// Encodes the minimal update representing everything not yet
    /// known to `since`. `None` means encode the full document.
    fn encode_update_since(&self, since: Option<&StateVector>) -> Vec<u8>;
}

/// An in-memory op-set CRDT document.
///
/// State is a grow-only set of `(client, seq, value)` operations;
/// merging is set union, so applies commute and duplicates are no-ops.
/// Updates encode as `[varuint count]([varuint client][varuint seq]
/// [string value])*`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    client_id: u64,
    ops: BTreeMap<(u64, u64), String>,
}

impl MemoryDocument {
    /// Creates an empty replica for the given local client.
    pub fn new(client_id: u64) -> Self {
        Self {
            client_id,
            ops: BTreeMap::new(),
        }
    }

    /// The local client id.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Applies a local edit and returns the encoded update carrying
    /// just that operation, for the host to hand to the provider.
    pub fn insert(&mut self, value: impl Into<String>) -> Vec<u8> {
        let seq = self.state_vector().get(self.client_id) + 1;
        let value = value.into();
        self.ops.insert((self.client_id, seq), value.clone());
        encode_ops(&[(self.client_id, seq, value)])
    }

    /// The converged contents: all operations in `(client, seq)` order.
    pub fn snapshot(&self) -> Vec<(u64, u64, String)> {
        self.ops
            .iter()
            .map(|(&(c, s), v)| (c, s, v.clone()))
            .collect()
    }

    /// Number of operations in the set.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if no operation has been applied.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl DocumentReplica for MemoryDocument {
    fn state_vector(&self) -> StateVector {
        let mut sv = StateVector::new();
        for &(client, seq) in self.ops.keys() {
            sv.observe(client, seq);
        }
        sv
    }

    fn apply_update(&mut self, update: &[u8], _origin: Origin) -> CodecResult<()> {
        for (client, seq, value) in decode_ops(update)? {
            self.ops.insert((client, seq), value);
        }
        Ok(())
    }

    fn encode_update_since(&self, since: Option<&StateVector>) -> Vec<u8> {
        let ops: Vec<(u64, u64, String)> = self
            .ops
            .iter()
            .filter(|(&(client, seq), _)| match since {
                Some(sv) => !sv.contains(client, seq),
                None => true,
            })
            .map(|(&(c, s), v)| (c, s, v.clone()))
            .collect();
        encode_ops(&ops)
    }
}

fn encode_ops(ops: &[(u64, u64, String)]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_var_u64(ops.len() as u64);
    for (client, seq, value) in ops {
        enc.write_var_u64(*client);
        enc.write_var_u64(*seq);
        enc.write_string(value);
    }
    enc.into_vec()
}

fn decode_ops(bytes: &[u8]) -> CodecResult<Vec<(u64, u64, String)>> {
    let mut dec = Decoder::new(bytes);
    let count = dec.read_var_u64()?;
    let mut ops = Vec::new();
    for _ in 0..count {
        let client = dec.read_var_u64()?;
        let seq = dec.read_var_u64()?;
        let value = dec.read_string()?.to_string();
        ops.push((client, seq, value));
    }
    Ok(ops)
}
