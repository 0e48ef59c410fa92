use thiserror::Error;

use crate::types::{Generation, SlotId};

/// Errors that can occur during slot registry operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {slot} does not exist")]
    UnknownSlot { slot: SlotId },

    /// The caller's generation no longer matches the slot
    #[error("Slot {slot} generation mismatch: expected {expected}, actual {actual}")]
    StaleGeneration {
        slot: SlotId,
        expected: Generation,
        actual: Generation,
    },

    /// The requested state change is not an edge of the slot lifecycle
    #[error("Slot {slot} cannot transition from {from} to {to}")]
    InvalidTransition {
        slot: SlotId,
        from: &'static str,
        to: &'static str,
    },

    /// No slot is Pooled and the registry is at its maximum size
    #[error("Registry for archetype {archetype} reached its maximum of {max_size} slots")]
    CapacityExceeded { archetype: String, max_size: u16 },

    #[error("Registry for archetype {expected} cannot allocate for archetype {actual}")]
    ArchetypeMismatch { expected: String, actual: String },

    #[error("Slot {slot} already holds a live object")]
    HandleAlreadyLive { slot: SlotId },
}
