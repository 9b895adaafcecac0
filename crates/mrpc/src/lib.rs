//! Named-function RPC on top of `mnet`: declared signatures, a handler
//! registry, and three call modes (async, call, sync).

mod declare;
mod envelope;
mod error;
mod server;
mod value;

pub use declare::FunctionDecl;
pub use error::Error;
pub use server::{Handler, RpcServer};
pub use value::{ParamSpec, RpcType, RpcValue};
