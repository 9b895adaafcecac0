//! A reliable, fragmented, multi-hop packet transport over arbitrary
//! point-to-point or broadcast devices.
//!
//! The core entry point is [`Transport`]: register one or more [`Device`]s,
//! then call [`Transport::send`] and [`Transport::receive`] to exchange
//! payloads with other hosts on the mesh, with fragmentation, ordered
//! delivery, retransmission, and multi-hop forwarding handled underneath.

pub mod config;
pub mod dedup;
pub mod device;
pub mod error;
pub mod flags;
pub mod host;
pub mod lossy;
pub mod packet;
pub mod reassembly;
pub mod retransmit;
pub mod route;
pub mod seq;
pub mod transport;

pub use config::Config;
pub use device::{Arrival, BroadcastDevice, Device, DeviceRegistry, Medium, TunnelDevice};
pub use error::Error;
pub use flags::Flags;
pub use host::HostId;
pub use lossy::LossyShim;
pub use packet::Packet;
pub use route::RouteEntry;
pub use seq::{PacketId, Reliability, Seq};
pub use transport::{StreamKey, Transport};
