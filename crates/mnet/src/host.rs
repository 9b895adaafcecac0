//! Host identifiers.

use std::fmt;

/// Reserved wildcard host denoting "everyone in range".
pub const BROADCAST: &str = "*";

/// A short opaque string identifying a participant in the mesh.
///
/// Cheap to clone (an `Arc<str>` under the hood would also be reasonable,
/// but hosts are small and short-lived enough that an owned `String`
/// keeps the tables in this crate straightforward to reason about).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(String);

impl HostId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn broadcast() -> Self {
        Self(BROADCAST.to_string())
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST
    }

    pub fn is_local_alias(&self) -> bool {
        self.0 == "self" || self.0 == "localhost"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
