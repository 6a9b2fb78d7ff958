//! # shapesync Protocol
//!
//! Wire protocol types for shapesync.
//!
//! This crate provides:
//! - `StateVector` summaries of causally-known operations
//! - Sync-protocol and awareness frame encoding/decoding
//! - `Awareness` registry with clocked, tombstone-removed entries
//! - Resume cursors for change-data-capture subscriptions
//! - Tagged shape messages (`Change`/`Control`) and batches
//! - `ShapeLog`, an in-memory ordered room feed
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod awareness;
mod cursor;
mod feed;
mod frame;
mod messages;
mod state_vector;

pub use awareness::{Awareness, AwarenessChange, AwarenessClientUpdate, AwarenessUpdate, StateMap};
pub use cursor::{CursorStore, ResumeCursor, ShapeOffset, StreamKind, SubscriptionHandle};
pub use feed::{ShapeEntry, ShapeLog};
pub use frame::{
    decode_awareness_frame, decode_operation_frame, encode_awareness_frame,
    encode_operation_frame, MESSAGE_SYNC, SYNC_UPDATE,
};
pub use messages::{ChangeMessage, ControlMessage, ShapeBatch, ShapeMessage, SubscribeRequest};
pub use state_vector::StateVector;
