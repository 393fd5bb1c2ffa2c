//! Sync context configuration.

use sharetree_protocol::{AuthorityLevel, SystemId, UserId};

/// Configuration for creating a [`SyncContext`](crate::SyncContext).
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Authority stamped on every local operation.
    pub authority: AuthorityLevel,

    /// System id; a random one is drawn when unset.
    pub system_id: Option<SystemId>,

    /// The user on this peer.
    pub local_user: UserId,

    /// Retry ticks a parked remote operation survives before it is dropped
    /// with a consistency error.
    pub pending_retry_budget: u32,

    /// Maximum number of parked remote operations.
    pub pending_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityLevel::Low,
            system_id: None,
            local_user: UserId(0),
            pending_retry_budget: 8,
            pending_capacity: 1024,
        }
    }
}

impl ContextConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the authority level.
    #[must_use]
    pub const fn with_authority(mut self, authority: AuthorityLevel) -> Self {
        self.authority = authority;
        self
    }

    /// Sets an explicit system id.
    #[must_use]
    pub const fn with_system_id(mut self, system_id: SystemId) -> Self {
        self.system_id = Some(system_id);
        self
    }

    /// Sets the local user.
    #[must_use]
    pub const fn with_local_user(mut self, user: UserId) -> Self {
        self.local_user = user;
        self
    }

    /// Sets the pending-reparent retry budget.
    #[must_use]
    pub const fn with_pending_retry_budget(mut self, ticks: u32) -> Self {
        self.pending_retry_budget = ticks;
        self
    }

    /// Sets the pending-reparent capacity.
    #[must_use]
    pub const fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.authority, AuthorityLevel::Low);
        assert!(config.system_id.is_none());
        assert_eq!(config.pending_retry_budget, 8);
    }

    #[test]
    fn builder() {
        let config = ContextConfig::new()
            .with_authority(AuthorityLevel::High)
            .with_system_id(SystemId::new(4).unwrap())
            .with_local_user(UserId(9))
            .with_pending_retry_budget(2)
            .with_pending_capacity(16);
        assert_eq!(config.authority, AuthorityLevel::High);
        assert_eq!(config.system_id, SystemId::new(4));
        assert_eq!(config.local_user, UserId(9));
        assert_eq!(config.pending_retry_budget, 2);
        assert_eq!(config.pending_capacity, 16);
    }
}
