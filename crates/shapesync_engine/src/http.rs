//! HTTP submission transport.
//!
//! The actual HTTP client is abstracted via a trait so hosts can plug
//! in any library (reqwest, hyper, ureq) or a loopback for tests. The
//! submitter owns the endpoint and body layout:
//!
//! ```text
//! POST /v1/<room-kind>-operations
//! { "<roomKind>Id": "<room>", "op": "<base64 frame>" }
//! ```
//!
//! with awareness submissions adding `"clientId"`.

use crate::config::ProviderConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SubmitClient;
use serde_json::json;

/// HTTP client abstraction.
///
/// Implement this to provide the actual transport. The engine only
/// needs fire-and-forget JSON POSTs; the response body is ignored.
pub trait HttpClient: Send + Sync {
    /// Sends a POST with a JSON body, returning an error description
    /// on failure.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<(), String>;
}

/// A [`SubmitClient`] that POSTs JSON bodies through an [`HttpClient`].
pub struct HttpSubmitter<C: HttpClient> {
    endpoint: String,
    room_key: String,
    client: C,
}

impl<C: HttpClient> HttpSubmitter<C> {
    /// Creates a submitter for the configured room kind and base URL.
    pub fn new(config: &ProviderConfig, client: C) -> Self {
        Self {
            endpoint: config.operations_url(),
            room_key: config.room_id_key(),
            client,
        }
    }

    /// The submission endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post_json(&self, body: serde_json::Value) -> SyncResult<()> {
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| SyncError::submission_fatal(e.to_string()))?;
        self.client
            .post(&self.endpoint, bytes)
            .map_err(SyncError::submission_retryable)
    }

    fn body(&self, room: &str, frame: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut body = serde_json::Map::new();
        body.insert(self.room_key.clone(), json!(room));
        body.insert("op".into(), json!(frame));
        body
    }
}

impl<C: HttpClient> SubmitClient for HttpSubmitter<C> {
    fn submit_operation(&self, room: &str, frame: &str) -> SyncResult<()> {
        self.post_json(self.body(room, frame).into())
    }

    fn submit_awareness(&self, room: &str, client_id: &str, frame: &str) -> SyncResult<()> {
        let mut body = self.body(room, frame);
        body.insert("clientId".into(), json!(client_id));
        self.post_json(body.into())
    }
}
