//! # shapesync Engine
//!
//! The synchronization engine: keeps a CRDT document replica and its
//! presence registry converged with a room served over change-data-
//! capture shape streams.
//!
//! The engine is transport-agnostic and synchronous. Hosts implement
//! [`ShapeSource`] and [`SubmitClient`] (or [`HttpClient`] for the
//! stock JSON-POST submitter), hand the provider a [`DocumentReplica`],
//! and pump [`ShapeProvider::poll`] from their own loop.
//!
//! ```
//! use parking_lot::RwLock;
//! use std::sync::Arc;
//! use shapesync_engine::{
//!     MemoryDocument, MemoryShapeSource, MockSubmitClient, Origin, ProviderConfig,
//!     ShapeProvider,
//! };
//!
//! let config = ProviderConfig::new("http://localhost:3000", "room-1", 7);
//! let doc = Arc::new(RwLock::new(MemoryDocument::new(7)));
//! let source = Arc::new(MemoryShapeSource::new());
//! let client = Arc::new(MockSubmitClient::new());
//!
//! let mut provider = ShapeProvider::new(config, doc.clone(), source, client);
//! provider.connect()?;
//! provider.poll();
//! assert!(provider.is_synced());
//!
//! let update = doc.write().insert("hello");
//! provider.document_updated(&update, Origin::Local);
//! # Ok::<(), shapesync_engine::SyncError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod doc;
mod error;
mod events;
mod http;
mod presence;
mod provider;
mod registry;
mod stream;
mod transport;

pub use config::{PresenceExpiry, ProviderConfig};
pub use doc::{DocumentReplica, MemoryDocument, Origin};
pub use error::{SyncError, SyncResult};
pub use events::{ConnectionStatus, EventLog, ProviderEvent, ProviderObserver};
pub use http::{HttpClient, HttpSubmitter};
pub use presence::PresenceBroadcaster;
pub use provider::{ConnectionState, ShapeProvider};
pub use registry::ProviderRegistry;
pub use stream::ShapeStream;
pub use transport::{
    LoopbackSubmitter, MemoryShapeSource, MockSubmitClient, ShapeSource, ShapeSubscription,
    SubmitClient,
};
