use std::fmt;

use naia_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};
use serde::{Deserialize, Serialize};

use crate::{
    gameplay::SpawnContext,
    types::{SlotId, SlotKey},
};

pub const MAX_ARCHETYPE_NAME_BYTES: usize = 64;

/// Identifies a class of poolable object, e.g. "ProjectileA".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archetype(String);

impl Archetype {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Archetype {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serde for Archetype {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let bytes = self.0.as_bytes();
        UnsignedVariableInteger::<5>::new(bytes.len() as u64).ser(writer);
        for byte in bytes {
            byte.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<5>::de(reader)?.get();
        let length = usize::try_from(length).map_err(|_| SerdeErr)?;
        if length > MAX_ARCHETYPE_NAME_BYTES {
            return Err(SerdeErr);
        }
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(u8::de(reader)?);
        }
        let name = String::from_utf8(bytes).map_err(|_| SerdeErr)?;
        Ok(Self(name))
    }

    fn bit_length(&self) -> u32 {
        let length = self.0.len();
        UnsignedVariableInteger::<5>::new(length as u64).bit_length() + (length as u32) * u8::BITS
    }
}

/// Result of an archetype's reset hook. `Pending` keeps the slot in
/// `Releasing` until completion is signaled explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetStatus {
    Complete,
    Pending,
}

/// Per-archetype capabilities the pool drives an object handle through.
pub trait ArchetypeBehavior<H> {
    /// Builds a new instance for a slot that never had one.
    fn on_construct(&mut self, archetype: &Archetype, slot: SlotId) -> H;

    /// The handle was handed out under `key`.
    fn on_activate(&mut self, handle: &mut H, key: SlotKey, context: &SpawnContext);

    /// Tears down the live instance. Return `Pending` if teardown finishes
    /// later; the pool then waits for `complete_reset`.
    fn on_deactivate(&mut self, handle: &mut H) -> ResetStatus;

    /// Runs before the slot re-enters the free list when automatic reset is
    /// enabled.
    fn restore_defaults(&mut self, _handle: &mut H) {}

    fn on_released(&mut self, _slot: SlotId) {}
}
