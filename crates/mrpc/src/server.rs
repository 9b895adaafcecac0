//! The RPC server object (spec §4.10, §6): declarations, handler registry,
//! and the three call modes, all riding one `mnet::Transport`.

use crate::declare::{validate, FunctionDecl};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::value::RpcValue;
use async_trait::async_trait;
use mnet::{HostId, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout as tokio_timeout;

/// A registered RPC function handler (spec §4.10: `functions.<name> = handler`).
///
/// Invoked with the caller's host and the validated argument list; the
/// spec's `receiverObj` — whatever state a handler needs — is simply
/// whatever `self` the implementing type owns.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, from: HostId, args: Vec<RpcValue>) -> Vec<RpcValue>;
}

/// The server's bound port, the shared transport it rides, its
/// declarations and handlers, and any sync calls awaiting a reply.
pub struct RpcServer {
    transport: Arc<Transport>,
    port: u16,
    drop_time: Duration,
    declarations: Mutex<HashMap<String, FunctionDecl>>,
    handlers: Mutex<HashMap<String, Arc<dyn Handler>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Vec<RpcValue>>>>,
    next_token: AtomicU64,
}

impl RpcServer {
    /// `newServer(port, sharePort?)` (spec §6). This crate has no notion of
    /// exclusively owning a port — `mnet::Transport::receive` isn't
    /// port-demultiplexed — so "sharing a port" falls naturally out of
    /// driving several `RpcServer`s off the same `Transport` and calling
    /// `handle_message` on each until one claims it; `sharePort` itself
    /// isn't a distinct mode to implement.
    pub fn new(transport: Arc<Transport>, port: u16, drop_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            transport,
            port,
            drop_time,
            declarations: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn declare_function(&self, decl: FunctionDecl) {
        self.declarations.lock().await.insert(decl.name.clone(), decl);
    }

    pub async fn add_declarations(&self, decls: Vec<FunctionDecl>) {
        let mut table = self.declarations.lock().await;
        for decl in decls {
            table.insert(decl.name.clone(), decl);
        }
    }

    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.lock().await.insert(name.into(), handler);
    }

    async fn decl_for(&self, name: &str) -> Result<FunctionDecl, Error> {
        self.declarations
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndeclaredFunction { name: name.to_string() })
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// **async** mode — fire-and-forget; may target `HostId::broadcast()`.
    pub async fn call_async(&self, name: &str, host: HostId, args: Vec<RpcValue>) -> Result<(), Error> {
        let decl = self.decl_for(name).await?;
        validate(name, &decl.args, &args, false)?;
        let envelope = Envelope::Call { name: name.to_string(), token: None, wants_return: false, args };
        self.transport.send(host, self.port, envelope.encode(), false, false).await?;
        Ok(())
    }

    /// **"call"** mode — reliable send, wait for the transport-level ack only.
    pub async fn call_ack(&self, name: &str, host: HostId, args: Vec<RpcValue>) -> Result<(), Error> {
        let decl = self.decl_for(name).await?;
        validate(name, &decl.args, &args, false)?;
        let envelope = Envelope::Call { name: name.to_string(), token: None, wants_return: false, args };
        let acked = self.transport.send(host, self.port, envelope.encode(), true, true).await?;
        acked.ok_or_else(|| Error::Drop { name: name.to_string() })?;
        Ok(())
    }

    /// **sync** mode — reliable send, wait for ack, then wait for the
    /// correlated reply (spec §4.10, §8 scenario S6).
    pub async fn call_sync(&self, name: &str, host: HostId, args: Vec<RpcValue>) -> Result<Vec<RpcValue>, Error> {
        let decl = self.decl_for(name).await?;
        validate(name, &decl.args, &args, false)?;

        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(token, tx);

        let envelope = Envelope::Call { name: name.to_string(), token: Some(token), wants_return: true, args };
        let acked = self.transport.send(host, self.port, envelope.encode(), true, true).await?;
        if acked.is_none() {
            self.pending.lock().await.remove(&token);
            return Err(Error::Drop { name: name.to_string() });
        }

        match tokio_timeout(self.drop_time, rx).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().await.remove(&token);
                Err(Error::Drop { name: name.to_string() })
            }
        }
    }

    /// `handleMessage(receiverObj, host, port, raw) -> wasHandled` (spec §6).
    pub async fn handle_message(&self, host: HostId, port: u16, raw: &[u8]) -> bool {
        if port != self.port {
            return false;
        }
        let Some(envelope) = Envelope::decode(raw) else {
            return false;
        };

        match envelope {
            Envelope::Reply { token, values } => {
                if let Some(tx) = self.pending.lock().await.remove(&token) {
                    let _ = tx.send(values);
                }
                true
            }
            Envelope::Call { name, token, wants_return, args } => {
                self.dispatch_call(host, name, token, wants_return, args).await;
                true
            }
        }
    }

    async fn dispatch_call(&self, host: HostId, name: String, token: Option<u64>, wants_return: bool, args: Vec<RpcValue>) {
        let Some(decl) = self.declarations.lock().await.get(&name).cloned() else {
            log::warn!("mrpc: call to undeclared function '{name}' from {host}");
            return;
        };
        if let Err(e) = validate(&name, &decl.args, &args, false) {
            log::warn!("mrpc: rejected call to '{name}' from {host}: {e}");
            return;
        }
        let Some(handler) = self.handlers.lock().await.get(&name).cloned() else {
            log::warn!("mrpc: no handler registered for '{name}', call from {host} dropped");
            return;
        };

        let results = handler.call(host.clone(), args).await;

        if wants_return {
            let Some(token) = token else {
                log::warn!("mrpc: '{name}' declares a return but the caller sent no correlation token");
                return;
            };
            if let Some(ret_spec) = &decl.returns {
                if let Err(e) = validate(&name, ret_spec, &results, true) {
                    log::warn!("mrpc: handler for '{name}' returned a mismatched value: {e}");
                    return;
                }
            }
            let reply = Envelope::Reply { token, values: results };
            if let Err(e) = self.transport.send(host.clone(), self.port, reply.encode(), true, false).await {
                log::warn!("mrpc: failed to send reply for '{name}' to {host}: {e}");
            }
        }
    }
}
