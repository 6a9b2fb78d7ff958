//! Keeps one provider per room.

use crate::doc::DocumentReplica;
use crate::provider::ShapeProvider;
use crate::transport::{ShapeSource, SubmitClient};
use std::collections::HashMap;

/// Owns the live providers of a host, keyed by room identifier.
///
/// At most one provider exists per room; inserting for an occupied room
/// destroys the previous provider first so its streams are closed and
/// its departure announced.
pub struct ProviderRegistry<D: DocumentReplica, S: ShapeSource, C: SubmitClient> {
    providers: HashMap<String, ShapeProvider<D, S, C>>,
}

impl<D: DocumentReplica, S: ShapeSource, C: SubmitClient> Default for ProviderRegistry<D, S, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DocumentReplica, S: ShapeSource, C: SubmitClient> ProviderRegistry<D, S, C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers a provider for a room, replacing (and destroying) any
    /// previous one.
    pub fn insert(&mut self, room: impl Into<String>, provider: ShapeProvider<D, S, C>) {
        let room = room.into();
        if let Some(mut previous) = self.providers.insert(room, provider) {
            previous.destroy();
        }
    }

    /// The provider for a room, if registered.
    pub fn get(&self, room: &str) -> Option<&ShapeProvider<D, S, C>> {
        self.providers.get(room)
    }

    /// Mutable access to a room's provider, for connect/poll/disconnect.
    pub fn get_mut(&mut self, room: &str) -> Option<&mut ShapeProvider<D, S, C>> {
        self.providers.get_mut(room)
    }

    /// Destroys and removes a room's provider. Returns true if one was
    /// registered.
    pub fn destroy(&mut self, room: &str) -> bool {
        match self.providers.remove(room) {
            Some(mut provider) => {
                provider.destroy();
                true
            }
            None => false,
        }
    }

    /// Pumps every registered provider once.
    pub fn poll_all(&mut self) {
        for provider in self.providers.values_mut() {
            provider.poll();
        }
    }

    /// Registered room identifiers, in no particular order.
    pub fn rooms(&self) -> impl Iterator<Item = &str> + '_ {
        self.providers.keys().map(String::as_str)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true when no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl<D: DocumentReplica, S: ShapeSource, C: SubmitClient> Drop for ProviderRegistry<D, S, C> {
    fn drop(&mut self) {
        for provider in self.providers.values_mut() {
            provider.destroy();
        }
    }
}
