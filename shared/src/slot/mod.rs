mod error;
mod slot;
mod slot_registry;

pub use error::SlotError;
pub use slot::{OwnerAuthority, Slot, SlotState, SlotView};
pub use slot_registry::SlotRegistry;
