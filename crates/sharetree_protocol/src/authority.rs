//! Authority levels and peer ranking.

use crate::ids::SystemId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative precedence of the peer that authored an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuthorityLevel {
    /// Ordinary client.
    Low = 1,
    /// Privileged client.
    Medium = 2,
    /// Server / session authority.
    High = 3,
}

impl AuthorityLevel {
    /// Converts to the wire byte.
    pub fn to_code(self) -> u8 {
        self as u8
    }

    /// Converts from the wire byte.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// Total order over peers used to break ties between conflicting operations.
///
/// Authority is compared first, then system id, so two peers with the same
/// authority still have a deterministic winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerRank {
    /// Authority level of the peer.
    pub authority: AuthorityLevel,
    /// System id of the peer.
    pub system_id: SystemId,
}

impl PeerRank {
    /// Creates a rank.
    pub fn new(authority: AuthorityLevel, system_id: SystemId) -> Self {
        Self {
            authority,
            system_id,
        }
    }
}

impl fmt::Display for PeerRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.authority, self.system_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(AuthorityLevel::Low < AuthorityLevel::Medium);
        assert!(AuthorityLevel::Medium < AuthorityLevel::High);
    }

    #[test]
    fn codes_roundtrip() {
        for level in [AuthorityLevel::Low, AuthorityLevel::Medium, AuthorityLevel::High] {
            assert_eq!(AuthorityLevel::from_code(level.to_code()), Some(level));
        }
        assert_eq!(AuthorityLevel::from_code(0), None);
    }

    #[test]
    fn rank_compares_authority_before_system() {
        let low_big = PeerRank::new(AuthorityLevel::Low, SystemId::new(u32::MAX).unwrap());
        let high_small = PeerRank::new(AuthorityLevel::High, SystemId::new(1).unwrap());
        assert!(high_small > low_big);

        let a = PeerRank::new(AuthorityLevel::Low, SystemId::new(1).unwrap());
        let b = PeerRank::new(AuthorityLevel::Low, SystemId::new(2).unwrap());
        assert!(b > a);
    }
}
