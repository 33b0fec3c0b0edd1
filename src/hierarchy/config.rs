use std::time::Duration;

use crate::model::SettingsDefaults;

/// Default bound on waiting for a concurrent mutation of the same tree.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for [`super::HierarchyEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum time a structural mutation waits for its subtree lock.
    pub lock_timeout: Duration,
    /// Defaults applied to absent business settings at creation.
    pub settings_defaults: SettingsDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            settings_defaults: SettingsDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Overrides the subtree lock timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Overrides the creation-time settings defaults.
    pub fn settings_defaults(mut self, defaults: SettingsDefaults) -> Self {
        self.settings_defaults = defaults;
        self
    }
}
