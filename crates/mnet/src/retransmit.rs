//! Retransmit manager (spec §4.6, §4.9): per-packet resend until ack or
//! drop-timeout, mirroring the retry/timeout bookkeeping
//! `styrene-rns-transport::transport::announce_table::AnnounceEntry` uses
//! for announce retransmission, generalized to arbitrary reliable sends.

use crate::flags::Flags;
use crate::host::HostId;
use crate::seq::{PacketId, Seq};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct SentEntry {
    pub first_sent: Instant,
    pub last_sent: Instant,
    pub last_id: PacketId,
    pub flags: Flags,
    pub dest_host: HostId,
    pub port: u16,
    pub payload: Vec<u8>,
}

/// What `tick` wants the caller to do with an expired or due entry. The
/// caller (not this module) owns packet-id allocation, since that counter
/// lives on the transport state this map is itself a field of.
pub enum TickAction {
    /// Resend due; same sequence and original flags, caller mints a fresh
    /// packet id and reports it back via [`RetransmitManager::record_resent_id`].
    Resend { host: HostId, seq: Seq, flags: Flags, port: u16, payload: Vec<u8> },
    /// The entry aged past `dropTime` without an ack; report failure.
    Drop { host: HostId, port: u16, payload: Vec<u8> },
}

pub struct RetransmitManager {
    sent: HashMap<(HostId, Seq), SentEntry>,
}

impl RetransmitManager {
    pub fn new() -> Self {
        Self { sent: HashMap::new() }
    }

    /// Records a freshly-sent reliable packet, flags and all — spec §3's
    /// `sentPackets` value is `(firstSent, lastId, flags, payload, destHost)`.
    pub fn track(&mut self, host: HostId, seq: Seq, id: PacketId, flags: Flags, port: u16, payload: Vec<u8>) {
        let now = Instant::now();
        self.sent.insert(
            (host.clone(), seq),
            SentEntry { first_sent: now, last_sent: now, last_id: id, flags, dest_host: host, port, payload },
        );
    }

    pub fn is_pending(&self, host: &HostId, seq: Seq) -> bool {
        self.sent.contains_key(&(host.clone(), seq))
    }

    /// Records the fresh packet id minted for a resend (spec §4.6: "The new
    /// id is recorded in `sentPackets` for the entry."). A no-op if the
    /// entry was already acknowledged or dropped between `tick` returning
    /// the resend action and the caller reporting the new id back.
    pub fn record_resent_id(&mut self, host: &HostId, seq: Seq, id: PacketId) {
        if let Some(entry) = self.sent.get_mut(&(host.clone(), seq)) {
            entry.last_id = id;
        }
    }

    /// Clears every entry for `host` whose sequence is `<= ack_seq`
    /// (modulo wrap) — spec §4.6, §4.3.
    pub fn acknowledge(&mut self, host: &HostId, ack_seq: Seq) {
        self.sent.retain(|(h, seq), _| h != host || (*seq != ack_seq && !ack_seq.is_after(*seq)));
    }

    /// One tick of housekeeping (spec §4.6's table / §4.9's state machine):
    /// purge anything past `drop_time`, else resend anything past
    /// `retransmit_time`. The caller mints the fresh packet id for each
    /// [`TickAction::Resend`] and reports it back via
    /// [`RetransmitManager::record_resent_id`].
    pub fn tick(&mut self, retransmit_time: Duration, drop_time: Duration) -> Vec<TickAction> {
        let now = Instant::now();
        let mut actions = Vec::new();
        let mut drop_keys = Vec::new();

        for (key, entry) in self.sent.iter_mut() {
            if now.duration_since(entry.first_sent) > drop_time {
                drop_keys.push(key.clone());
                continue;
            }
            if now.duration_since(entry.last_sent) > retransmit_time {
                entry.last_sent = now;
                actions.push(TickAction::Resend {
                    host: key.0.clone(),
                    seq: key.1,
                    flags: entry.flags.clone(),
                    port: entry.port,
                    payload: entry.payload.clone(),
                });
            }
        }

        for key in drop_keys {
            if let Some(entry) = self.sent.remove(&key) {
                actions.push(TickAction::Drop { host: entry.dest_host, port: entry.port, payload: entry.payload });
            }
        }

        actions
    }
}

impl Default for RetransmitManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_clears_entries_at_or_below_ack_seq() {
        let mut mgr = RetransmitManager::new();
        let host = HostId::new("h2");
        mgr.track(host.clone(), Seq::new(5), PacketId::new(1), Flags::default(), 10, b"a".to_vec());
        mgr.track(host.clone(), Seq::new(6), PacketId::new(2), Flags::default(), 10, b"b".to_vec());
        mgr.track(host.clone(), Seq::new(7), PacketId::new(3), Flags::default(), 10, b"c".to_vec());

        mgr.acknowledge(&host, Seq::new(6));

        assert!(!mgr.is_pending(&host, Seq::new(5)));
        assert!(!mgr.is_pending(&host, Seq::new(6)));
        assert!(mgr.is_pending(&host, Seq::new(7)));
    }

    #[test]
    fn tick_drops_after_drop_time_even_if_also_past_retransmit_time() {
        let mut mgr = RetransmitManager::new();
        let host = HostId::new("h2");
        mgr.track(host.clone(), Seq::new(1), PacketId::new(1), Flags::default(), 10, b"x".to_vec());
        let actions = mgr.tick(Duration::from_secs(0), Duration::from_secs(0));
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], TickAction::Drop { .. }));
        assert!(!mgr.is_pending(&host, Seq::new(1)));
    }

    #[test]
    fn tick_resend_carries_the_original_flags_and_records_the_new_id() {
        let mut mgr = RetransmitManager::new();
        let host = HostId::new("h2");
        let flags = Flags { syn: true, reliable: true, ack: false, frag: Some(0), extra: vec![] };
        mgr.track(host.clone(), Seq::new(1), PacketId::new(1), flags.clone(), 10, b"x".to_vec());

        let actions = mgr.tick(Duration::from_secs(0), Duration::from_secs(60));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            TickAction::Resend { flags: resent_flags, .. } => assert_eq!(*resent_flags, flags),
            _ => panic!("expected a resend"),
        }

        mgr.record_resent_id(&host, Seq::new(1), PacketId::new(99));
        assert_eq!(mgr.sent.get(&(host, Seq::new(1))).unwrap().last_id, PacketId::new(99));
    }
}
