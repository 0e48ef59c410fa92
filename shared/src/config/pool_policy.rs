use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-archetype sizing and replication knobs, loaded once at session start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolPolicy {
    /// Slots created, and instances constructed, when the session starts
    pub initial_size: u16,
    /// Hard upper bound on slots; acquires fail with `PoolExhausted` past it
    pub max_size: u16,
    /// Slots added each time the free list runs dry
    pub growth_increment: u16,
    /// Clients show a predicted acquire immediately instead of reserving it
    pub allow_optimistic_active: bool,
    /// How far ahead of the expected timestamp a delta may arrive before the
    /// client gives up and requests a snapshot
    pub resync_drift_window: u16,
    /// Clients never predict acquires for this archetype
    pub authority_only: bool,
}

impl PoolPolicy {
    /// A pool that never grows.
    pub fn fixed(size: u16) -> Self {
        Self {
            initial_size: size,
            max_size: size,
            ..Self::default()
        }
    }

    pub fn validate(&self, archetype: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &'static str| ConfigError::InvalidPolicy {
            archetype: archetype.to_string(),
            reason,
        };
        if self.max_size == 0 {
            return Err(invalid("max_size must be at least 1"));
        }
        if self.initial_size > self.max_size {
            return Err(invalid("initial_size exceeds max_size"));
        }
        if self.growth_increment == 0 && self.initial_size < self.max_size {
            return Err(invalid("growth_increment must be at least 1 for a growable pool"));
        }
        if self.resync_drift_window == 0 || self.resync_drift_window >= 32_768 {
            return Err(invalid("resync_drift_window must be within 1..32768"));
        }
        Ok(())
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            initial_size: 8,
            max_size: 64,
            growth_increment: 8,
            allow_optimistic_active: false,
            resync_drift_window: 32,
            authority_only: false,
        }
    }
}
