use std::fmt;

use naia_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger, UnsignedVariableInteger};

/// Counter bumped every time a slot is activated. Keys holding an older
/// generation are stale.
pub type Generation = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn name(&self) -> &'static str {
        match self {
            HostType::Server => "server",
            HostType::Client => "client",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ClientId

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client({})", self.0)
    }
}

impl Serde for ClientId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        let value = u64::try_from(value).map_err(|_| SerdeErr)?;
        Ok(Self(value))
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// PoolTag

/// Index of a pool inside its manager, assigned in registration order.
/// Server and client register archetypes in the same order, so tags agree
/// across the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolTag(u16);

impl PoolTag {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub(crate) fn as_index(&self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// SlotId

/// Stable identity of a slot. The pool tag makes ids unique across
/// archetypes; the index is stable within its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    pool: PoolTag,
    index: u16,
}

impl SlotId {
    pub fn new(pool: PoolTag, index: u16) -> Self {
        Self { pool, index }
    }

    pub fn pool(&self) -> PoolTag {
        self.pool
    }

    pub fn index(&self) -> u16 {
        self.index
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pool, self.index)
    }
}

impl Serde for SlotId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<3>::new(self.pool.0).ser(writer);
        UnsignedVariableInteger::<7>::new(self.index).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let pool = UnsignedVariableInteger::<3>::de(reader)?.get();
        let index = UnsignedVariableInteger::<7>::de(reader)?.get();
        Ok(Self {
            pool: PoolTag(u16::try_from(pool).map_err(|_| SerdeErr)?),
            index: u16::try_from(index).map_err(|_| SerdeErr)?,
        })
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<3>::new(self.pool.0).bit_length()
            + UnsignedVariableInteger::<7>::new(self.index).bit_length()
    }
}

// SlotKey

/// Handle given to gameplay code: a slot plus the generation it was
/// activated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    slot: SlotId,
    generation: Generation,
}

impl SlotKey {
    pub fn new(slot: SlotId, generation: Generation) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.slot, self.generation)
    }
}

impl Serde for SlotKey {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.slot.ser(writer);
        ser_generation(self.generation, writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let slot = SlotId::de(reader)?;
        let generation = de_generation(reader)?;
        Ok(Self { slot, generation })
    }

    fn bit_length(&self) -> u32 {
        self.slot.bit_length() + generation_bit_length(self.generation)
    }
}

// RequestId

/// Correlates a client's acquire request with the server's response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl RequestId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub(crate) fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serde for RequestId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        Ok(Self(u32::try_from(value).map_err(|_| SerdeErr)?))
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// Shared encoding helpers

pub(crate) fn ser_generation(generation: Generation, writer: &mut dyn BitWrite) {
    UnsignedVariableInteger::<7>::new(generation).ser(writer);
}

pub(crate) fn de_generation(reader: &mut BitReader) -> Result<Generation, SerdeErr> {
    let value = UnsignedVariableInteger::<7>::de(reader)?.get();
    Generation::try_from(value).map_err(|_| SerdeErr)
}

pub(crate) fn generation_bit_length(generation: Generation) -> u32 {
    UnsignedVariableInteger::<7>::new(generation).bit_length()
}

pub(crate) fn ser_variant(index: u8, writer: &mut dyn BitWrite) {
    UnsignedInteger::<3>::new(index).ser(writer);
}

pub(crate) fn de_variant(reader: &mut BitReader) -> Result<u8, SerdeErr> {
    let value = UnsignedInteger::<3>::de(reader)?.get();
    u8::try_from(value).map_err(|_| SerdeErr)
}

pub(crate) const VARIANT_BIT_LENGTH: u32 = 3;
