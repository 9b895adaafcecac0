//! `seenIds` duplicate-suppression table (spec §3, §4.7, §4.8).
//!
//! Modeled exactly like `styrene-rns-transport::transport::packet_cache::PacketCache`:
//! a flat map from id to first-seen time, swept for staleness on tick.

use crate::seq::PacketId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct SeenIds {
    map: HashMap<PacketId, Instant>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Records `id` as seen. Returns `true` if this is the first time we've
    /// seen it (the caller should process it / forward it); `false` if it's
    /// a duplicate (the caller should drop it, but may still ack it).
    pub fn observe(&mut self, id: PacketId) -> bool {
        if self.map.contains_key(&id) {
            false
        } else {
            self.map.insert(id, Instant::now());
            true
        }
    }

    pub fn evict_expired(&mut self, drop_time: Duration) {
        let now = Instant::now();
        self.map.retain(|_, first_seen| now.duration_since(*first_seen) <= drop_time);
    }
}

impl Default for SeenIds {
    fn default() -> Self {
        Self::new()
    }
}
