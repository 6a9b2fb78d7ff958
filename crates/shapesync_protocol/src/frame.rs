//! Wire frames: the sync-protocol envelope and the awareness envelope.
//!
//! Frames travel as base64 strings inside JSON bodies and change
//! records. The binary layout is varint-based:
//!
//! - operation frame: `[varuint MESSAGE_SYNC][varuint SYNC_UPDATE][var_bytes update]`
//! - awareness frame: `[var_bytes awareness_update]` where the inner
//!   update is `[varuint count]` then per client
//!   `[varuint client_id][varuint clock][string json_state]`
//!   (the JSON literal `null` marks a tombstone)

use crate::awareness::{AwarenessClientUpdate, AwarenessUpdate, StateMap};
use shapesync_codec::{from_base64, to_base64, CodecError, CodecResult, Decoder, Encoder};

/// Envelope tag for sync-protocol messages.
pub const MESSAGE_SYNC: u64 = 0;

/// Sync-protocol tag for a document update.
pub const SYNC_UPDATE: u64 = 2;

/// Encodes one CRDT update as a transport-ready operation frame.
pub fn encode_operation_frame(update: &[u8]) -> String {
    let mut enc = Encoder::with_capacity(update.len() + 8);
    enc.write_var_u64(MESSAGE_SYNC);
    enc.write_var_u64(SYNC_UPDATE);
    enc.write_var_bytes(update);
    to_base64(&enc.into_vec())
}

/// Decodes an operation frame back to the raw CRDT update bytes.
///
/// # Errors
///
/// Fails with a [`CodecError`] on bad base64, truncated input, or an
/// unexpected envelope tag. Callers catch this per message so one bad
/// record never tears down the subscription.
pub fn decode_operation_frame(frame: &str) -> CodecResult<Vec<u8>> {
    let bytes = from_base64(frame)?;
    let mut dec = Decoder::new(&bytes);

    let envelope = dec.read_var_u64()?;
    if envelope != MESSAGE_SYNC {
        return Err(CodecError::invalid_frame(format!(
            "expected sync envelope {MESSAGE_SYNC}, got {envelope}"
        )));
    }
    let kind = dec.read_var_u64()?;
    if kind != SYNC_UPDATE {
        return Err(CodecError::invalid_frame(format!(
            "expected update message {SYNC_UPDATE}, got {kind}"
        )));
    }
    let update = dec.read_var_bytes()?.to_vec();
    if !dec.is_empty() {
        return Err(CodecError::invalid_frame("trailing bytes after update"));
    }
    Ok(update)
}

/// Encodes an awareness update as a transport-ready frame.
///
/// # Errors
///
/// Fails if a client's state map cannot be serialized to JSON.
pub fn encode_awareness_frame(update: &AwarenessUpdate) -> CodecResult<String> {
    let mut inner = Encoder::new();
    inner.write_var_u64(update.clients.len() as u64);
    for client in &update.clients {
        inner.write_var_u64(client.client_id);
        inner.write_var_u64(client.clock);
        let json = match &client.state {
            Some(state) => serde_json::to_string(state)
                .map_err(|e| CodecError::invalid_frame(e.to_string()))?,
            None => "null".to_string(),
        };
        inner.write_string(&json);
    }

    let mut outer = Encoder::with_capacity(inner.len() + 8);
    outer.write_var_bytes(&inner.into_vec());
    Ok(to_base64(&outer.into_vec()))
}

/// Decodes an awareness frame.
///
/// # Errors
///
/// Fails with a [`CodecError`] on bad base64, truncation, or state
/// payloads that are neither a JSON object nor `null`.
pub fn decode_awareness_frame(frame: &str) -> CodecResult<AwarenessUpdate> {
    let bytes = from_base64(frame)?;
    let mut outer = Decoder::new(&bytes);
    let inner_bytes = outer.read_var_bytes()?;
    let mut dec = Decoder::new(inner_bytes);

    let count = dec.read_var_u64()?;
    let mut clients = Vec::new();
    for _ in 0..count {
        let client_id = dec.read_var_u64()?;
        let clock = dec.read_var_u64()?;
        let json = dec.read_string()?;
        let state = parse_state(json)?;
        clients.push(AwarenessClientUpdate {
            client_id,
            clock,
            state,
        });
    }
    Ok(AwarenessUpdate { clients })
}

fn parse_state(json: &str) -> CodecResult<Option<StateMap>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CodecError::invalid_frame(format!("bad state json: {e}")))?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        other => Err(CodecError::invalid_frame(format!(
            "state must be an object or null, got {other}"
        ))),
    }
}
