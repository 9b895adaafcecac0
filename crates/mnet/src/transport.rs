//! Core state machine (spec §4.7–§4.9): drives `send`, `receive`, tick,
//! ack, and forward.
//!
//! The whole mutable state lives behind one `tokio::sync::Mutex`, the same
//! shape `styrene-rns-transport::transport::jobs::manage_transport` uses for
//! its `Arc<Mutex<TransportHandler>>` — device I/O may run on its own
//! tokio task, but every table mutation is serialized through this lock
//! (spec §5's concurrency model).

use crate::config::Config;
use crate::dedup::SeenIds;
use crate::device::{Arrival, Device, DeviceRegistry};
use crate::error::Error;
use crate::flags::Flags;
use crate::host::HostId;
use crate::lossy::LossyShim;
use crate::packet::{fragment_payload, Packet};
use crate::reassembly::ReassemblyBuffer;
use crate::retransmit::{RetransmitManager, TickAction};
use crate::route::{RouteEntry, RouteTable};
use crate::seq::{PacketId, Reliability, Seq};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout, Instant};

/// Identifies one in-flight reliable stream; returned by `send` and passed
/// to `onDrop` callbacks (spec §4.7, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
    pub host: HostId,
    pub seq: Seq,
}

struct TransportState {
    config: Config,
    devices: DeviceRegistry,
    lossy_shims: Vec<Arc<LossyShim>>,
    routes: RouteTable,
    seen_ids: SeenIds,
    reassembly: ReassemblyBuffer,
    retransmit: RetransmitManager,
    last_sent_seq: HashMap<(HostId, Reliability), Seq>,
    next_packet_id: PacketId,
}

impl TransportState {
    fn local_host(&self) -> HostId {
        HostId::new(self.config.hostname.clone())
    }

    fn effective_mtu(&self) -> usize {
        self.config.mtu_override.unwrap_or_else(|| self.devices.effective_mtu())
    }

    fn allocate_packet_id(&mut self) -> PacketId {
        let id = self.next_packet_id;
        self.next_packet_id = id.next();
        id
    }

    fn destined_to_me(&self, dest: &HostId) -> bool {
        *dest == self.local_host() || dest.is_local_alias() || dest.is_broadcast()
    }
}

pub struct Transport {
    state: Mutex<TransportState>,
    arrivals_rx: Mutex<mpsc::UnboundedReceiver<Arrival>>,
    arrivals_tx: mpsc::UnboundedSender<Arrival>,
}

impl Transport {
    pub fn new(config: Config) -> Arc<Self> {
        let (arrivals_tx, arrivals_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Mutex::new(TransportState {
                config,
                devices: DeviceRegistry::new(),
                lossy_shims: Vec::new(),
                routes: RouteTable::new(),
                seen_ids: SeenIds::new(),
                reassembly: ReassemblyBuffer::new(),
                retransmit: RetransmitManager::new(),
                last_sent_seq: HashMap::new(),
                next_packet_id: PacketId::random(),
            }),
            arrivals_rx: Mutex::new(arrivals_rx),
            arrivals_tx,
        })
    }

    /// The channel a [`Device`] pushes [`Arrival`]s into; pass this to
    /// device constructors before registering them.
    pub fn arrivals_sender(&self) -> mpsc::UnboundedSender<Arrival> {
        self.arrivals_tx.clone()
    }

    /// `registerDevice(handle, proxy)` (spec §6) — always the explicit-proxy
    /// form; this crate has no OS-level device discovery to fall back to.
    /// The device is wrapped in a [`LossyShim`] (initially transparent) so
    /// `debugEnableLossy` can toggle loss/reorder on every registered
    /// device uniformly.
    pub async fn register_device(&self, handle: impl Into<String>, device: Arc<dyn Device>) -> Result<(), Error> {
        let handle = handle.into();
        let shim = Arc::new(LossyShim::new(device));
        let mut state = self.state.lock().await;
        let port = state.config.port;
        shim.open(port).await?;
        state.devices.register(handle, shim.clone());
        state.lossy_shims.push(shim);
        Ok(())
    }

    pub async fn add_static_route(&self, host: HostId, device: impl Into<String>, address: impl Into<String>) {
        self.state.lock().await.routes.add_static(host, device, address);
    }

    pub async fn get_devices(&self) -> Vec<String> {
        self.state.lock().await.devices.handles()
    }

    pub async fn get_static_routes(&self) -> HashMap<HostId, RouteEntry> {
        self.state.lock().await.routes.static_routes().clone()
    }

    pub async fn debug_enable_lossy(&self, enabled: bool, drop_percent: u32, reorder_window: u32) {
        let state = self.state.lock().await;
        for shim in &state.lossy_shims {
            shim.set_enabled(enabled);
            shim.set_drop_percent(drop_percent);
            shim.set_reorder_window(reorder_window);
        }
    }

    pub async fn debug_set_small_mtu(&self, enabled: bool, small_mtu: usize) {
        let mut state = self.state.lock().await;
        state.config.mtu_override = if enabled { Some(small_mtu) } else { None };
    }

    /// `send(destHost, port, payload, reliable, waitForAck) -> streamKey | nil` (spec §4.7).
    pub async fn send(
        &self,
        dest_host: HostId,
        port: u16,
        payload: Vec<u8>,
        reliable: bool,
        wait_for_ack: bool,
    ) -> Result<Option<StreamKey>, Error> {
        if dest_host.is_broadcast() && reliable {
            return Err(Error::ReliableBroadcast);
        }

        let mut state = self.state.lock().await;
        if dest_host == state.local_host() || dest_host.is_local_alias() {
            // Self-addressed send: straight into the local delivery path,
            // no device involved, reliability is moot (spec §4.7, §8).
            let local = state.local_host();
            state.reassembly.push_unreliable(local, port, payload);
            return Ok(None);
        }

        let mtu = state.effective_mtu().max(1);
        let chunks = fragment_payload(&payload, mtu);
        let total = chunks.len() as u32;

        let reliability = if reliable { Reliability::Reliable } else { Reliability::Unreliable };
        let key = (dest_host.clone(), reliability);
        let had_prior = state.last_sent_seq.contains_key(&key);
        let start_seq = if had_prior { state.last_sent_seq[&key].next() } else { Seq::random_nonzero() };

        let mut seq = start_seq;
        let mut last_seq = start_seq;
        for (i, chunk) in chunks.iter().enumerate() {
            let is_last = i + 1 == chunks.len();
            let flags = Flags {
                syn: i == 0 && !had_prior,
                reliable,
                ack: false,
                frag: Some(if is_last { total } else { 0 }),
                extra: vec![],
            };
            let id = state.allocate_packet_id();
            let packet = Packet {
                id,
                sequence: seq,
                flags,
                dest_host: dest_host.clone(),
                src_host: state.local_host(),
                port,
                payload: chunk.clone(),
            };

            if reliable {
                state.retransmit.track(dest_host.clone(), seq, id, packet.flags.clone(), port, chunk.clone());
            }
            route_and_send(&mut state, &dest_host, port, packet.encode()).await?;

            last_seq = seq;
            seq = seq.next();
        }
        state.last_sent_seq.insert(key, last_seq);

        let stream_key = StreamKey { host: dest_host.clone(), seq: last_seq };

        if reliable && wait_for_ack {
            drop(state);
            let fragment_seqs: Vec<Seq> = {
                let mut s = start_seq;
                let mut out = vec![];
                loop {
                    out.push(s);
                    if s == last_seq {
                        break;
                    }
                    s = s.next();
                }
                out
            };
            return Ok(self.wait_for_ack(&dest_host, &fragment_seqs).await.then_some(stream_key));
        }

        Ok(Some(stream_key))
    }

    async fn wait_for_ack(&self, host: &HostId, seqs: &[Seq]) -> bool {
        let drop_time = { self.state.lock().await.config.drop_time };
        let deadline = Instant::now() + drop_time;
        loop {
            {
                let state = self.state.lock().await;
                if seqs.iter().all(|s| !state.retransmit.is_pending(host, *s)) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    /// `receive(timeout, onDrop?) -> (srcHost, port, payload) | nil` (spec §4.7).
    pub async fn receive(
        &self,
        wait: Duration,
        mut on_drop: Option<impl FnMut(StreamKey, u16, Vec<u8>)>,
    ) -> Option<(HostId, u16, Vec<u8>)> {
        let deadline = Instant::now() + wait;

        self.tick(&mut on_drop).await;
        if let Some(msg) = self.state.lock().await.reassembly.pop_ready() {
            return Some(msg);
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            let arrival = {
                let mut rx = self.arrivals_rx.lock().await;
                match timeout(remaining, rx.recv()).await {
                    Ok(Some(a)) => a,
                    Ok(None) | Err(_) => return None,
                }
            };

            self.handle_arrival(arrival).await;

            if let Some(msg) = self.state.lock().await.reassembly.pop_ready() {
                return Some(msg);
            }
        }
    }

    /// One tick of housekeeping: purge aged state, retransmit due packets
    /// (spec §4.7's first step of `receive`).
    async fn tick(&self, on_drop: &mut Option<impl FnMut(StreamKey, u16, Vec<u8>)>) {
        let mut state = self.state.lock().await;
        let route_time = state.config.route_time;
        let drop_time = state.config.drop_time;
        let retransmit_time = state.config.retransmit_time;

        state.routes.evict_expired(route_time);
        state.seen_ids.evict_expired(drop_time);
        state.reassembly.evict_expired(drop_time);

        let actions = state.retransmit.tick(retransmit_time, drop_time);

        for action in actions {
            match action {
                TickAction::Resend { host, seq, flags, port, payload } => {
                    // Same packet as originally sent — syn, reliable, and
                    // frag markers all preserved — only the id changes
                    // (spec §4.6, §4.9).
                    let id = state.allocate_packet_id();
                    let local = state.local_host();
                    let packet = Packet {
                        id,
                        sequence: seq,
                        flags,
                        dest_host: host.clone(),
                        src_host: local,
                        port,
                        payload: payload.clone(),
                    };
                    state.retransmit.record_resent_id(&host, seq, id);
                    log::debug!("mnet: resending {host}:{seq} with new id {id}");
                    let _ = route_and_send(&mut state, &host, port, packet.encode()).await;
                }
                TickAction::Drop { host, port, payload } => {
                    log::warn!("mnet: dropping undelivered packet to {host} on port {port}");
                    if let Some(cb) = on_drop.as_mut() {
                        cb(StreamKey { host, seq: Seq::NONE }, port, payload);
                    }
                }
            }
        }
    }

    async fn handle_arrival(&self, arrival: Arrival) {
        let Some(packet) = Packet::decode(&arrival.bytes) else {
            log::debug!("mnet: dropping malformed frame from device {}", arrival.device);
            return;
        };

        let mut state = self.state.lock().await;
        let is_new = state.seen_ids.observe(packet.id);
        // Keyed by the packet's logical origin, but the address is whoever
        // physically handed us the frame — our immediate next hop back
        // towards that origin, not the origin itself once a relay is
        // involved (spec §4.4, §4.8).
        state.routes.learn(packet.src_host.clone(), arrival.device.clone(), arrival.from.as_str());

        let destined_to_me = state.destined_to_me(&packet.dest_host);

        if !is_new {
            log::debug!(
                "mnet: dropping duplicate packet id={} src={} dst={}",
                packet.id, packet.src_host, packet.dest_host
            );
            if destined_to_me && packet.is_reliable() && !packet.is_ack() {
                self.send_ack(&mut state, &packet).await;
            }
            return;
        }

        if packet.dest_host.is_broadcast() {
            if state.config.route {
                let port = packet.port;
                let bytes = packet.encode();
                let _ = state.devices.broadcast_all(port, bytes).await;
            }
            state.reassembly.push_unreliable(packet.src_host.clone(), packet.port, packet.payload.clone());
            return;
        }

        if destined_to_me {
            if packet.is_ack() {
                state.retransmit.acknowledge(&packet.src_host, packet.sequence);
            } else if packet.is_reliable() {
                state.reassembly.push_reliable(
                    packet.src_host.clone(),
                    packet.sequence,
                    packet.flags.clone(),
                    packet.port,
                    packet.payload.clone(),
                );
                self.send_ack(&mut state, &packet).await;
            } else {
                state.reassembly.push_unreliable(packet.src_host.clone(), packet.port, packet.payload.clone());
            }
            return;
        }

        // Forwarding (spec §4.8): neither self nor broadcast, route if enabled.
        if state.config.route {
            let dest = packet.dest_host.clone();
            let port = packet.port;
            let bytes = packet.encode();
            let _ = route_and_send(&mut state, &dest, port, bytes).await;
        }
    }

    async fn send_ack(&self, state: &mut TransportState, packet: &Packet) {
        let ack_seq = state.reassembly.last_delivered(&packet.src_host);
        let id = state.allocate_packet_id();
        let ack = Packet {
            id,
            sequence: ack_seq,
            flags: Flags { syn: false, reliable: false, ack: true, frag: None, extra: vec![] },
            dest_host: packet.src_host.clone(),
            src_host: state.local_host(),
            port: packet.port,
            payload: Vec::new(),
        };
        let dest = packet.src_host.clone();
        let port = packet.port;
        let bytes = ack.encode();
        let _ = route_and_send(state, &dest, port, bytes).await;
    }
}

/// Route lookup → device send, shared by `send`, forwarding, and ack
/// emission (spec §4.4's lookup precedence: `routeCache` → `staticRoutes` →
/// broadcast on all devices).
async fn route_and_send(state: &mut TransportState, dest: &HostId, port: u16, bytes: Vec<u8>) -> Result<(), Error> {
    let route = state.routes.lookup(dest).cloned();
    if let Some(route) = route {
        if let Some(device) = state.devices.get(&route.device).cloned() {
            return device.send(&route.address, port, bytes).await;
        }
    }
    state.devices.broadcast_all(port, bytes).await
}
