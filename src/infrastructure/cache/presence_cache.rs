//! Presence Cache
//!
//! Set of peers currently online. Rebuilt from live events after every
//! reconnect; never persisted.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct PresenceCache {
    online: HashSet<String>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the peer was not already online.
    pub fn mark_online(&mut self, peer_id: &str) -> bool {
        self.online.insert(peer_id.to_string())
    }

    /// Returns `true` if the peer was online.
    pub fn mark_offline(&mut self, peer_id: &str) -> bool {
        self.online.remove(peer_id)
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.online.contains(peer_id)
    }

    /// Online peers, sorted
    pub fn online_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.online.iter().cloned().collect();
        peers.sort();
        peers
    }

    /// Forget everyone, returning who was online (sorted).
    pub fn clear(&mut self) -> Vec<String> {
        let mut peers: Vec<String> = self.online.drain().collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
