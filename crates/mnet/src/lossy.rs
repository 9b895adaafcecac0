//! Lossy shim (spec §4.1, §8): wraps a [`Device`] to probabilistically drop
//! or reorder outgoing packets for testing. Transparent when disabled.

use crate::device::Device;
use crate::error::Error;
use async_trait::async_trait;
use rand_core::{OsRng, RngCore};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Outgoing frames held back so the next `reorder_within` sends can jump
/// ahead of them.
struct Held {
    address: String,
    port: u16,
    frame: Vec<u8>,
    is_broadcast: bool,
}

pub struct LossyShim {
    inner: Arc<dyn Device>,
    enabled: AtomicBool,
    /// Probability (0–100) of dropping an outgoing frame.
    drop_percent: AtomicU32,
    /// When reordering is active, hold the next N sends and flush them
    /// after a subsequent send goes through first.
    reorder_window: AtomicU32,
    held: Mutex<Vec<Held>>,
}

impl LossyShim {
    pub fn new(inner: Arc<dyn Device>) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(false),
            drop_percent: AtomicU32::new(0),
            reorder_window: AtomicU32::new(0),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_drop_percent(&self, percent: u32) {
        self.drop_percent.store(percent.min(100), Ordering::SeqCst);
    }

    /// Reorders each outgoing packet with the next `window` transmissions
    /// that follow it (spec §8 scenario S4).
    pub fn set_reorder_window(&self, window: u32) {
        self.reorder_window.store(window, Ordering::SeqCst);
    }

    fn should_drop(&self) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let pct = self.drop_percent.load(Ordering::SeqCst);
        pct > 0 && (OsRng.next_u32() % 100) < pct
    }

    async fn dispatch(&self, address: &str, port: u16, frame: Vec<u8>, is_broadcast: bool) -> Result<(), Error> {
        if self.should_drop() {
            return Ok(());
        }

        if self.enabled.load(Ordering::SeqCst) && self.reorder_window.load(Ordering::SeqCst) > 0 {
            let mut held = self.held.lock().expect("lossy shim mutex poisoned");
            held.push(Held { address: address.to_string(), port, frame, is_broadcast });
            if held.len() as u32 <= self.reorder_window.load(Ordering::SeqCst) {
                return Ok(());
            }
            // Flush the oldest held frame now that enough newer ones queued
            // behind it — the oldest arrives after its successors.
            let next = held.remove(0);
            drop(held);
            return self.send_now(&next).await;
        }

        self.send_now(&Held { address: address.to_string(), port, frame, is_broadcast }).await
    }

    async fn send_now(&self, held: &Held) -> Result<(), Error> {
        if held.is_broadcast {
            self.inner.broadcast(held.port, held.frame.clone()).await
        } else {
            self.inner.send(&held.address, held.port, held.frame.clone()).await
        }
    }
}

#[async_trait]
impl Device for LossyShim {
    fn mtu(&self) -> usize {
        self.inner.mtu()
    }

    async fn open(&self, port: u16) -> Result<(), Error> {
        self.inner.open(port).await
    }

    async fn close(&self, port: u16) -> Result<(), Error> {
        self.inner.close(port).await
    }

    async fn send(&self, address: &str, port: u16, frame: Vec<u8>) -> Result<(), Error> {
        self.dispatch(address, port, frame, false).await
    }

    async fn broadcast(&self, port: u16, frame: Vec<u8>) -> Result<(), Error> {
        self.dispatch("", port, frame, true).await
    }
}
