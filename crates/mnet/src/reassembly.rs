//! Reassembly & ordering buffer (spec §4.5): per-sender `receivedPackets`
//! buffer keyed by `(host, sequence)`, fragment join, and lazy delivery via
//! a `pendingDelivery` cursor.
//!
//! Like [`crate::route::RouteTable`], this is two flat maps rather than an
//! object graph with back-pointers (spec §9's cyclic-reference note):
//! `received` holds raw arrivals; `last_delivered` is the contiguity
//! high-water mark from spec §4.5, and `next_to_deliver` is the
//! `pendingDelivery` cursor the application actually drains from, one
//! message (or fragment group) per call.

use crate::flags::Flags;
use crate::host::HostId;
use crate::seq::Seq;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

struct ReceivedEntry {
    arrived: Instant,
    flags: Flags,
    port: u16,
    payload: Vec<u8>,
}

pub struct ReassemblyBuffer {
    received: HashMap<(HostId, Seq), ReceivedEntry>,
    last_delivered: HashMap<HostId, Seq>,
    next_to_deliver: HashMap<HostId, Seq>,
    unreliable_queue: VecDeque<(HostId, u16, Vec<u8>)>,
    /// Hosts that may have a deliverable group buffered; `pop_ready` only
    /// has to scan these, not every host ever seen.
    dirty: BTreeSet<HostId>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self {
            received: HashMap::new(),
            last_delivered: HashMap::new(),
            next_to_deliver: HashMap::new(),
            unreliable_queue: VecDeque::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn last_delivered(&self, src: &HostId) -> Seq {
        self.last_delivered.get(src).copied().unwrap_or(Seq::NONE)
    }

    /// Records a reliable arrival and advances `last_delivered[src]`
    /// according to the three-branch rule in spec §4.5. Any `s1` resets the
    /// delivery cursor to the arriving sequence, matching spec §9's
    /// resolution of the synchronize-reemission open question: any `s1`
    /// means "the receiver's delivery cursor for this source is now this
    /// sequence", whether this is the first packet of the stream or a
    /// mid-stream resync.
    pub fn push_reliable(&mut self, src: HostId, seq: Seq, flags: Flags, port: u16, payload: Vec<u8>) {
        if flags.syn {
            self.last_delivered.insert(src.clone(), seq);
            self.next_to_deliver.insert(src.clone(), seq);
        } else if let Some(cursor) = self.last_delivered.get(&src).copied() {
            if seq == cursor.next() {
                let mut advanced = seq;
                self.last_delivered.insert(src.clone(), advanced);
                while self.received.contains_key(&(src.clone(), advanced.next())) {
                    advanced = advanced.next();
                    self.last_delivered.insert(src.clone(), advanced);
                }
            }
            // else: out of order, buffered below without advancing the cursor.
        }
        // A reliable packet before any `s1` for this source has no stream
        // context yet; it's buffered and will join a group once a `s1`
        // establishes the cursor.

        self.received.insert(
            (src.clone(), seq),
            ReceivedEntry { arrived: Instant::now(), flags, port, payload },
        );
        self.dirty.insert(src);
    }

    /// Unreliable packets skip ordering entirely (spec §4.5) — queued in
    /// arrival order for immediate delivery.
    pub fn push_unreliable(&mut self, src: HostId, port: u16, payload: Vec<u8>) {
        self.unreliable_queue.push_back((src, port, payload));
    }

    /// Pops the next deliverable message: the oldest queued unreliable
    /// packet, or the next complete, contiguous, in-order reliable message
    /// (a fragment group is delivered atomically or not at all — spec §3).
    pub fn pop_ready(&mut self) -> Option<(HostId, u16, Vec<u8>)> {
        if let Some(item) = self.unreliable_queue.pop_front() {
            return Some(item);
        }

        for host in self.dirty.clone() {
            if let Some(message) = self.try_pop_group(&host) {
                if !self.has_buffered_entries(&host) {
                    self.dirty.remove(&host);
                }
                return Some(message);
            }
        }
        None
    }

    fn has_buffered_entries(&self, host: &HostId) -> bool {
        self.received.keys().any(|(h, _)| h == host)
    }

    /// Walks forward from the next undelivered sequence, collecting a
    /// complete fragment group if one is ready: contiguous through a final
    /// fragment, and within the confirmed `last_delivered` high-water mark.
    fn try_pop_group(&mut self, host: &HostId) -> Option<(HostId, u16, Vec<u8>)> {
        let last = *self.last_delivered.get(host)?;
        let start = *self.next_to_deliver.get(host)?;
        if start != last && !last.is_after(start) {
            return None;
        }

        let mut seqs = Vec::new();
        let mut cur = start;
        loop {
            if cur != last && !last.is_after_or_eq(cur) {
                return None; // not yet confirmed contiguous this far
            }
            if !self.received.contains_key(&(host.clone(), cur)) {
                return None;
            }
            let is_final = {
                let entry = &self.received[&(host.clone(), cur)];
                entry.flags.is_final_fragment() || entry.flags.frag.is_none()
            };
            seqs.push(cur);
            if is_final {
                break;
            }
            cur = cur.next();
        }

        let mut payload = Vec::new();
        let mut port = 0;
        for seq in &seqs {
            let entry = self.received.remove(&(host.clone(), *seq))?;
            port = entry.port;
            payload.extend_from_slice(&entry.payload);
        }
        let delivered_through = *seqs.last().unwrap();
        self.next_to_deliver.insert(host.clone(), delivered_through.next());
        Some((host.clone(), port, payload))
    }

    /// Evicts buffered (not-yet-delivered) entries older than `drop_time`.
    pub fn evict_expired(&mut self, drop_time: Duration) {
        let now = Instant::now();
        self.received.retain(|_, entry| now.duration_since(entry.arrived) <= drop_time);
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(syn: bool, frag: Option<u32>) -> Flags {
        Flags { syn, reliable: true, ack: false, frag, extra: vec![] }
    }

    #[test]
    fn single_fragment_stream_delivers_in_order() {
        let mut buf = ReassemblyBuffer::new();
        let host = HostId::new("h1");
        let start = Seq::new(100);
        buf.push_reliable(host.clone(), start, flags(true, Some(1)), 10, b"one".to_vec());
        buf.push_reliable(host.clone(), start.next(), flags(false, Some(1)), 10, b"two".to_vec());

        let (h, _, p1) = buf.pop_ready().unwrap();
        assert_eq!(h, host);
        assert_eq!(p1, b"one");
        let (_, _, p2) = buf.pop_ready().unwrap();
        assert_eq!(p2, b"two");
        assert!(buf.pop_ready().is_none());
    }

    #[test]
    fn out_of_order_arrival_buffers_until_gap_fills() {
        let mut buf = ReassemblyBuffer::new();
        let host = HostId::new("h1");
        let start = Seq::new(5);
        buf.push_reliable(host.clone(), start, flags(true, Some(1)), 10, b"A".to_vec());
        // seq 7 arrives before seq 6: shouldn't advance or be deliverable yet.
        buf.push_reliable(host.clone(), start.next().next(), flags(false, Some(1)), 10, b"C".to_vec());
        let (_, _, first) = buf.pop_ready().unwrap();
        assert_eq!(first, b"A");
        assert!(buf.pop_ready().is_none(), "C should not be deliverable before B arrives");

        buf.push_reliable(host.clone(), start.next(), flags(false, Some(1)), 10, b"B".to_vec());
        let (_, _, second) = buf.pop_ready().unwrap();
        assert_eq!(second, b"B");
        let (_, _, third) = buf.pop_ready().unwrap();
        assert_eq!(third, b"C");
    }

    #[test]
    fn fragment_group_delivered_atomically() {
        let mut buf = ReassemblyBuffer::new();
        let host = HostId::new("h1");
        let start = Seq::new(1);
        buf.push_reliable(host.clone(), start, flags(true, Some(0)), 10, b"ab".to_vec());
        buf.push_reliable(host.clone(), start.next(), flags(false, Some(0)), 10, b"cd".to_vec());
        assert!(buf.pop_ready().is_none(), "group incomplete, nothing should deliver");
        buf.push_reliable(host.clone(), start.next().next(), flags(false, Some(3)), 10, b"ef".to_vec());
        let (_, _, payload) = buf.pop_ready().unwrap();
        assert_eq!(payload, b"abcdef");
    }

    #[test]
    fn unreliable_packets_deliver_in_arrival_order_ahead_of_reliable() {
        let mut buf = ReassemblyBuffer::new();
        buf.push_unreliable(HostId::new("h1"), 9, b"x".to_vec());
        buf.push_unreliable(HostId::new("h1"), 9, b"y".to_vec());
        assert_eq!(buf.pop_ready().unwrap().2, b"x");
        assert_eq!(buf.pop_ready().unwrap().2, b"y");
    }
}
