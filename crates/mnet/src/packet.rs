//! On-wire packet fields and codec (spec §3, §4.2).
//!
//! Fields are framed as a MessagePack array (not a map) via `rmp-serde`,
//! mirroring the compact tuple-struct wire frames `styrene-rns-transport`
//! uses for its resource-transfer control messages — short fields, no key
//! names on the wire.

use crate::flags::Flags;
use crate::host::HostId;
use crate::seq::{PacketId, Seq};
use serde::{Deserialize, Serialize};

/// Per-hop header overhead subtracted from the smallest device MTU to get
/// the effective payload budget (spec §4.1).
pub const HEADER_OVERHEAD: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: PacketId,
    pub sequence: Seq,
    pub flags: Flags,
    pub dest_host: HostId,
    pub src_host: HostId,
    pub port: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn is_reliable(&self) -> bool {
        self.flags.reliable
    }

    pub fn is_ack(&self) -> bool {
        self.flags.ack
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest_host.is_broadcast()
    }

    pub fn encode(&self) -> Vec<u8> {
        let frame = WireFrame(
            self.id.value(),
            self.sequence.value(),
            self.flags.render(),
            self.dest_host.as_str().to_string(),
            self.src_host.as_str().to_string(),
            self.port,
            self.payload.clone(),
        );
        // Positional array encoding never fails for owned, finite inputs.
        rmp_serde::to_vec(&frame).unwrap_or_default()
    }

    /// Decodes a wire frame. Malformed frames are dropped silently (spec
    /// §4.2, §7) by returning `None` rather than an error.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let frame: WireFrame = rmp_serde::from_slice(bytes).ok()?;
        Some(Self {
            id: PacketId::new(frame.0),
            sequence: Seq::new(frame.1),
            flags: Flags::parse(&frame.2),
            dest_host: HostId::new(frame.3),
            src_host: HostId::new(frame.4),
            port: frame.5,
            payload: frame.6,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame(
    u32,
    u32,
    String,
    String,
    String,
    u16,
    #[serde(with = "serde_bytes")] Vec<u8>,
);

/// Splits `payload` into `ceil(len / mtu)` chunks, each at most `mtu` bytes.
/// An empty payload still produces one (empty) chunk, so zero-length
/// application messages round-trip.
pub fn fragment_payload(payload: &[u8], mtu: usize) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![Vec::new()];
    }
    payload.chunks(mtu.max(1)).map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flags;

    fn sample_packet() -> Packet {
        Packet {
            id: PacketId::new(42),
            sequence: Seq::new(7),
            flags: Flags::parse("s1,r1,f1"),
            dest_host: HostId::new("h2"),
            src_host: HostId::new("h1"),
            port: 530,
            payload: b"hello".to_vec(),
        }
    }

    #[test]
    fn round_trips_through_wire_encoding() {
        let packet = sample_packet();
        let decoded = Packet::decode(&packet.encode()).expect("decodes");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Packet::decode(&[0xc1, 0xff, 0x00]).is_none());
    }

    #[test]
    fn fragment_payload_at_exact_boundary() {
        let payload = vec![0u8; 20];
        let chunks = fragment_payload(&payload, 10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn fragment_payload_matches_spec_s2_example() {
        let payload = b"abcdefghijklmnopqrstuvwxyz abcdefghijklmnopqrstuvwxyz";
        assert_eq!(payload.len(), 53);
        let chunks = fragment_payload(payload, 10);
        assert_eq!(chunks.len(), 6);
        let rejoined: Vec<u8> = chunks.concat();
        assert_eq!(rejoined, payload);
    }
}
