//! State vectors: per-client summaries of known operations.

use shapesync_codec::{CodecResult, Decoder, Encoder};
use std::collections::BTreeMap;

/// A compact summary of which operations a replica has incorporated,
/// as the highest known clock per originating client.
///
/// Clocks are monotonically non-decreasing; merging two vectors takes
/// the per-client maximum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateVector {
    clocks: BTreeMap<u64, u64>,
}

impl StateVector {
    /// Creates an empty state vector (knows nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest known clock for a client, 0 if unknown.
    pub fn get(&self, client_id: u64) -> u64 {
        self.clocks.get(&client_id).copied().unwrap_or(0)
    }

    /// Raises the clock for a client. Lower values are ignored.
    pub fn observe(&mut self, client_id: u64, clock: u64) {
        let entry = self.clocks.entry(client_id).or_insert(0);
        if clock > *entry {
            *entry = clock;
        }
    }

    /// Merges another vector into this one, keeping per-client maxima.
    pub fn merge(&mut self, other: &StateVector) {
        for (&client, &clock) in &other.clocks {
            self.observe(client, clock);
        }
    }

    /// Returns true if this vector already covers `(client_id, clock)`.
    pub fn contains(&self, client_id: u64, clock: u64) -> bool {
        self.get(client_id) >= clock
    }

    /// Iterates over `(client_id, clock)` pairs in client order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.clocks.iter().map(|(&c, &k)| (c, k))
    }

    /// Number of clients with a known clock.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns true if no client is known.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Encodes the vector as `[varuint count]([varuint client][varuint clock])*`.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(1 + self.clocks.len() * 4);
        enc.write_var_u64(self.clocks.len() as u64);
        for (&client, &clock) in &self.clocks {
            enc.write_var_u64(client);
            enc.write_var_u64(clock);
        }
        enc.into_vec()
    }

    /// Decodes a vector produced by [`StateVector::encode`].
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut dec = Decoder::new(bytes);
        let count = dec.read_var_u64()?;
        let mut vector = StateVector::new();
        for _ in 0..count {
            let client = dec.read_var_u64()?;
            let clock = dec.read_var_u64()?;
            vector.observe(client, clock);
        }
        Ok(vector)
    }
}
