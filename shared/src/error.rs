use thiserror::Error;

use crate::{
    slot::SlotError,
    types::{Generation, SlotId},
};

/// Errors surfaced by the pool manager facade and its pools
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is in use and the pool is at its maximum size. Recoverable:
    /// retry after a release.
    #[error("Pool for archetype {archetype} is exhausted ({max_size} slots in use)")]
    PoolExhausted { archetype: String, max_size: u16 },

    /// Growth was requested past the configured maximum
    #[error("Pool for archetype {archetype} cannot grow past {max_size} slots")]
    CapacityExceeded { archetype: String, max_size: u16 },

    #[error("Archetype {archetype} is not registered")]
    UnknownArchetype { archetype: String },

    #[error("Slot {slot} does not exist")]
    UnknownSlot { slot: SlotId },

    /// Registering an archetype twice with a different policy
    #[error("Archetype {archetype} is already registered with a different policy")]
    AlreadyRegistered { archetype: String },

    /// The caller held a reference from an earlier activation
    #[error("Slot {slot} is stale: expected generation {expected}, slot is at {actual}")]
    StaleGeneration {
        slot: SlotId,
        expected: Generation,
        actual: Generation,
    },

    #[error("Slot {slot} cannot move from {from} to {to}")]
    InvalidTransition {
        slot: SlotId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Slot {slot} is not owned by {requester}")]
    NotOwner { slot: SlotId, requester: String },

    #[error("Slot {slot} has no reset awaiting completion")]
    ResetNotPending { slot: SlotId },

    #[error("Operation '{operation}' requires network authority")]
    NotAuthority { operation: &'static str },

    #[error("Operation '{operation}' is not available on the {host} side")]
    WrongRole {
        operation: &'static str,
        host: &'static str,
    },

    #[error("Owner {owner} may not hold an active slot here")]
    InvalidOwner { owner: String },

    #[error("Slot {slot} already holds a live object")]
    HandleAlreadyLive { slot: SlotId },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PoolError {
    /// Exhaustion clears once slots are released; everything else is a
    /// caller bug or a race.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. }
                | PoolError::CapacityExceeded { .. }
                | PoolError::StaleGeneration { .. }
        )
    }
}

impl From<SlotError> for PoolError {
    fn from(error: SlotError) -> Self {
        match error {
            SlotError::UnknownSlot { slot } => PoolError::UnknownSlot { slot },
            SlotError::StaleGeneration {
                slot,
                expected,
                actual,
            } => PoolError::StaleGeneration {
                slot,
                expected,
                actual,
            },
            SlotError::InvalidTransition { slot, from, to } => {
                PoolError::InvalidTransition { slot, from, to }
            }
            SlotError::CapacityExceeded {
                archetype,
                max_size,
            } => PoolError::CapacityExceeded {
                archetype,
                max_size,
            },
            SlotError::ArchetypeMismatch { actual, .. } => {
                PoolError::UnknownArchetype { archetype: actual }
            }
            SlotError::HandleAlreadyLive { slot } => PoolError::HandleAlreadyLive { slot },
        }
    }
}

/// Errors raised while loading or validating pool settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid policy for archetype {archetype}: {reason}")]
    InvalidPolicy {
        archetype: String,
        reason: &'static str,
    },

    #[error("Archetype {archetype} appears more than once in the settings")]
    DuplicateArchetype { archetype: String },

    #[error("Archetype names must not be empty")]
    EmptyArchetypeName,

    #[error("Archetype name {archetype} is longer than {max} bytes")]
    ArchetypeNameTooLong { archetype: String, max: usize },

    #[error("Too many archetypes: at most {max} pools per session")]
    TooManyArchetypes { max: usize },

    #[error("Failed to parse pool settings: {reason}")]
    Parse { reason: String },

    #[error("Failed to read pool settings from {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Errors raised while decoding wire payloads
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed {message} payload")]
    Malformed { message: &'static str },

    #[error("Message of {bits} bits does not fit in a packet of {budget} bits")]
    Oversized { bits: u32, budget: u32 },
}
