//! Element, system and user identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a peer process, unique across a session.
///
/// Zero is never a valid system id; it prefixes only the root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(u32);

impl SystemId {
    /// Creates a system id. Returns `None` for zero.
    pub fn new(id: u32) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    /// Generates a random non-zero system id.
    pub fn random() -> Self {
        loop {
            let candidate: u32 = rand::random();
            if candidate != 0 {
                return Self(candidate);
            }
        }
    }

    /// Returns the raw value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Identifier of a user session; owned elements are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Identifier of an element in the replicated tree.
///
/// The creating peer assigns it as `(system_id << 32) | counter`, so ids
/// never collide across peers and are never reused. The root has id 0 on
/// every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// The root object's id.
    pub const ROOT: ElementId = ElementId(0);

    /// Creates an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns whether this is the root id.
    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw system id prefix of the creating peer.
    pub fn creator(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the per-peer counter part.
    pub fn counter(self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("root")
        } else {
            write!(f, "{:08x}.{}", self.creator(), self.counter())
        }
    }
}

impl From<u64> for ElementId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<ElementId> for u64 {
    fn from(id: ElementId) -> Self {
        id.0
    }
}

/// Hands out fresh element ids for one peer.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    system: SystemId,
    next: u32,
}

impl IdGenerator {
    /// Creates a generator for the given system.
    pub fn new(system: SystemId) -> Self {
        Self { system, next: 1 }
    }

    /// Returns the system this generator prefixes ids with.
    pub fn system(&self) -> SystemId {
        self.system
    }

    /// Returns the next unused id, or `None` once the counter is exhausted.
    pub fn next_id(&mut self) -> Option<ElementId> {
        let counter = self.next;
        self.next = self.next.checked_add(1)?;
        Some(ElementId((u64::from(self.system.0) << 32) | u64::from(counter)))
    }
}
