//! Typing Indicator Cache
//!
//! Per-peer typing flags that expire after a fixed TTL. Expiry is driven by
//! the caller passing the current instant, so the cache itself never sleeps.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Typing flags keyed by peer id
#[derive(Debug, Clone)]
pub struct TypingCache {
    ttl: Duration,
    deadlines: HashMap<String, Instant>,
}

impl TypingCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            deadlines: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set or refresh the flag for `peer_id`.
    ///
    /// Returns `true` when the peer was not already typing.
    pub fn arm(&mut self, peer_id: &str, now: Instant) -> bool {
        self.deadlines
            .insert(peer_id.to_string(), now + self.ttl)
            .is_none()
    }

    /// Returns `true` when a flag was cleared.
    pub fn clear(&mut self, peer_id: &str) -> bool {
        self.deadlines.remove(peer_id).is_some()
    }

    pub fn is_active(&self, peer_id: &str) -> bool {
        self.deadlines.contains_key(peer_id)
    }

    /// Remove every flag whose deadline has passed, returning those peers.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(peer, _)| peer.clone())
            .collect();
        expired.sort();

        for peer in &expired {
            self.deadlines.remove(peer);
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove every flag, returning the peers that were active.
    pub fn clear_all(&mut self) -> Vec<String> {
        let mut peers: Vec<String> = self.deadlines.drain().map(|(peer, _)| peer).collect();
        peers.sort();
        peers
    }

    pub fn active_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.deadlines.keys().cloned().collect();
        peers.sort();
        peers
    }
}
