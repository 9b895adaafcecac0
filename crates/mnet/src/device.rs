//! Device abstraction (spec §4.1): a uniform `open`/`close`/`send`/
//! `broadcast` surface over broadcast radios and point-to-point tunnels.
//!
//! The `async fn` trait boundary uses `async-trait`, the same crate
//! `styrene-ipc`'s `DaemonMessaging` trait uses for its daemon boundary.
//! Concrete devices here ride an in-process [`Medium`] (a broadcast bus)
//! rather than real sockets or serial lines — this is the "pure software"
//! device any host can register without hardware, and it's what the
//! integration tests in `tests/` wire hosts together with.

use crate::error::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// A frame that arrived on some device, destined for the local core to
/// process (spec §4.7: "device event" in the receive-loop data flow).
#[derive(Debug, Clone)]
pub struct Arrival {
    /// The device handle the frame arrived on (used to learn routes).
    pub device: String,
    /// The device-level address of whoever handed us this frame — the
    /// immediate previous hop, which may differ from the packet's logical
    /// `src_host` once a relay is involved. Route learning keys on
    /// `src_host` but points at this address (spec §4.4, §4.8).
    pub from: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Device: Send + Sync {
    /// Maximum payload capacity this device can carry in one transmission.
    fn mtu(&self) -> usize;

    async fn open(&self, port: u16) -> Result<(), Error>;
    async fn close(&self, port: u16) -> Result<(), Error>;

    /// Sends to a specific device-level address. Broadcast devices use this
    /// to target one peer; tunnels ignore `address` since they have exactly
    /// one remote endpoint.
    async fn send(&self, address: &str, port: u16, frame: Vec<u8>) -> Result<(), Error>;

    /// True one-to-many send (broadcast devices) or the tunnel's single
    /// remote (tunnel devices) — spec §4.1.
    async fn broadcast(&self, port: u16, frame: Vec<u8>) -> Result<(), Error>;
}

/// An in-process broadcast bus simulating a shared physical medium.
/// Multiple [`BroadcastDevice`]s or [`TunnelDevice`]s can attach to the same
/// `Medium` to exchange frames without any real transport underneath.
#[derive(Clone)]
pub struct Medium {
    tx: broadcast::Sender<MediumFrame>,
}

#[derive(Debug, Clone)]
struct MediumFrame {
    from: String,
    /// `None` means "delivered to every subscriber except the sender".
    to: Option<String>,
    bytes: Vec<u8>,
}

impl Medium {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    fn subscribe(&self) -> broadcast::Receiver<MediumFrame> {
        self.tx.subscribe()
    }

    fn publish(&self, frame: MediumFrame) {
        // No subscribers is not an error: a lone host on a medium still
        // gets to "broadcast" into the void.
        let _ = self.tx.send(frame);
    }
}

impl Default for Medium {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_arrival_pump(
    handle: String,
    medium: Medium,
    arrivals_tx: mpsc::UnboundedSender<Arrival>,
    accept: impl Fn(&MediumFrame) -> bool + Send + 'static,
) {
    let mut rx = medium.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) if frame.from != handle && accept(&frame) => {
                    let _ = arrivals_tx.send(Arrival {
                        device: handle.clone(),
                        from: frame.from.clone(),
                        bytes: frame.bytes,
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// An unreliable, range-limited device that reaches every peer attached to
/// the same [`Medium`].
pub struct BroadcastDevice {
    handle: String,
    medium: Medium,
    mtu: usize,
}

impl BroadcastDevice {
    pub fn new(handle: impl Into<String>, medium: Medium, mtu: usize, arrivals_tx: mpsc::UnboundedSender<Arrival>) -> Self {
        let handle = handle.into();
        let self_handle = handle.clone();
        spawn_arrival_pump(handle.clone(), medium.clone(), arrivals_tx, move |frame| {
            frame.to.is_none() || frame.to.as_deref() == Some(self_handle.as_str())
        });
        Self { handle, medium, mtu }
    }
}

#[async_trait]
impl Device for BroadcastDevice {
    fn mtu(&self) -> usize {
        self.mtu
    }

    async fn open(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn send(&self, address: &str, _port: u16, bytes: Vec<u8>) -> Result<(), Error> {
        self.medium.publish(MediumFrame {
            from: self.handle.clone(),
            to: Some(address.to_string()),
            bytes,
        });
        Ok(())
    }

    async fn broadcast(&self, _port: u16, bytes: Vec<u8>) -> Result<(), Error> {
        self.medium.publish(MediumFrame { from: self.handle.clone(), to: None, bytes });
        Ok(())
    }
}

/// A point-to-point link with a preconfigured remote endpoint; `send` and
/// `broadcast` both go to that single remote (spec §4.1).
pub struct TunnelDevice {
    handle: String,
    remote: String,
    medium: Medium,
    mtu: usize,
}

impl TunnelDevice {
    pub fn new(
        handle: impl Into<String>,
        remote: impl Into<String>,
        medium: Medium,
        mtu: usize,
        arrivals_tx: mpsc::UnboundedSender<Arrival>,
    ) -> Self {
        let handle = handle.into();
        let remote = remote.into();
        let expected_from = remote.clone();
        spawn_arrival_pump(handle.clone(), medium.clone(), arrivals_tx, move |frame| {
            frame.from == expected_from
        });
        Self { handle, remote, medium, mtu }
    }
}

#[async_trait]
impl Device for TunnelDevice {
    fn mtu(&self) -> usize {
        self.mtu
    }

    async fn open(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn send(&self, _address: &str, _port: u16, bytes: Vec<u8>) -> Result<(), Error> {
        self.medium.publish(MediumFrame {
            from: self.handle.clone(),
            to: Some(self.remote.clone()),
            bytes,
        });
        Ok(())
    }

    async fn broadcast(&self, port: u16, bytes: Vec<u8>) -> Result<(), Error> {
        self.send(&self.remote.clone(), port, bytes).await
    }
}

/// The set of devices registered on this host (spec §4.1's `devices[deviceHandle]`).
pub struct DeviceRegistry {
    devices: std::collections::HashMap<String, Arc<dyn Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { devices: std::collections::HashMap::new() }
    }

    pub fn register(&mut self, handle: impl Into<String>, device: Arc<dyn Device>) {
        self.devices.insert(handle.into(), device);
    }

    pub fn get(&self, handle: &str) -> Option<&Arc<dyn Device>> {
        self.devices.get(handle)
    }

    pub fn handles(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Effective MTU: the minimum across every registered device, minus the
    /// per-hop header overhead (spec §4.1).
    pub fn effective_mtu(&self) -> usize {
        self.devices
            .values()
            .map(|d| d.mtu())
            .min()
            .unwrap_or(0)
            .saturating_sub(crate::packet::HEADER_OVERHEAD)
    }

    pub async fn open_all(&self, port: u16) -> Result<(), Error> {
        for device in self.devices.values() {
            device.open(port).await?;
        }
        Ok(())
    }

    pub async fn close_all(&self, port: u16) -> Result<(), Error> {
        for device in self.devices.values() {
            device.close(port).await?;
        }
        Ok(())
    }

    pub async fn broadcast_all(&self, port: u16, bytes: Vec<u8>) -> Result<(), Error> {
        for device in self.devices.values() {
            device.broadcast(port, bytes.clone()).await?;
        }
        Ok(())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
