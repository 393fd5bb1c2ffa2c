//! Configuration for the sync manager.

use sharetree_protocol::PROTOCOL_VERSION;

/// Configuration for a [`SyncManager`](crate::SyncManager).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Protocol version announced in the identity handshake.
    pub protocol_version: u16,
    /// Display name of the local user.
    pub user_name: String,
    /// Maximum operations per outgoing message.
    pub max_ops_per_message: usize,
    /// Whether a Low or Medium authority peer deletes other users' owned
    /// elements when a link drops.
    pub purge_on_disconnect: bool,
}

impl SyncConfig {
    /// Creates a configuration for `user_name`.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            user_name: user_name.into(),
            max_ops_per_message: 64,
            purge_on_disconnect: true,
        }
    }

    /// Sets the maximum operations per message.
    pub fn with_max_ops_per_message(mut self, max: usize) -> Self {
        self.max_ops_per_message = max.max(1);
        self
    }

    /// Sets whether other users' data is purged on disconnect.
    pub fn with_purge_on_disconnect(mut self, purge: bool) -> Self {
        self.purge_on_disconnect = purge;
        self
    }

    /// Overrides the announced protocol version.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("ada")
            .with_max_ops_per_message(8)
            .with_purge_on_disconnect(false);

        assert_eq!(config.user_name, "ada");
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.max_ops_per_message, 8);
        assert!(!config.purge_on_disconnect);
    }

    #[test]
    fn batch_size_is_at_least_one() {
        assert_eq!(SyncConfig::default().with_max_ops_per_message(0).max_ops_per_message, 1);
    }
}
