//! Errors raised by `mnet`.
//!
//! Per the transport's error taxonomy: malformed wire frames are dropped
//! silently (never surfaced as `Error`), and the transport itself never
//! fails during normal operation. `Error` covers programmer mistakes
//! (bad arguments, bad configuration) and device I/O failures.

use crate::host::HostId;

#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("broadcast destination '*' cannot be used with reliable=true")]
    ReliableBroadcast,

    #[error("no device registered with handle '{handle}'")]
    UnknownDevice { handle: String },

    #[error("device '{handle}' refused to send: {reason}")]
    DeviceSend { handle: String, reason: String },

    #[error("no route to host '{host}' and broadcast is not permitted for this send")]
    NoRoute { host: HostId },

    #[error("payload of {len} bytes exceeds the configured MTU of {mtu} bytes after fragmentation limits")]
    PayloadTooLarge { len: usize, mtu: usize },

    #[error("rpc argument validation failed: {message}")]
    Validation { message: String },
}

impl Error {
    /// Transient send failures are the only ones the retransmit manager
    /// will paper over by itself; everything else is a programmer error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceSend { .. })
    }
}
