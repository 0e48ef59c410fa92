use naia_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

use crate::{
    archetype::Archetype,
    gameplay::Transform,
    slot::{OwnerAuthority, SlotState, SlotView},
    stamp::Stamp,
    types::{de_generation, generation_bit_length, ser_generation, Generation},
};

/// Slots per snapshot message, keeping each one well inside a packet.
pub const SNAPSHOT_SLOTS_PER_CHUNK: usize = 4;

/// Server truth for one slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotSnapshot {
    pub index: u16,
    pub state: SlotState,
    pub owner: OwnerAuthority,
    pub generation: Generation,
    pub transform: Option<Transform>,
}

impl SlotSnapshot {
    pub fn from_view(view: &SlotView) -> Self {
        Self {
            index: view.id.index(),
            state: view.state,
            owner: view.owner,
            generation: view.generation,
            transform: view.transform,
        }
    }
}

impl Serde for SlotSnapshot {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.index).ser(writer);
        self.state.ser(writer);
        self.owner.ser(writer);
        ser_generation(self.generation, writer);
        match &self.transform {
            Some(transform) => {
                true.ser(writer);
                transform.ser(writer);
            }
            None => false.ser(writer),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let index = UnsignedVariableInteger::<7>::de(reader)?.get();
        let index = u16::try_from(index).map_err(|_| SerdeErr)?;
        let state = SlotState::de(reader)?;
        let owner = OwnerAuthority::de(reader)?;
        let generation = de_generation(reader)?;
        let transform = if bool::de(reader)? {
            Some(Transform::de(reader)?)
        } else {
            None
        };
        Ok(Self {
            index,
            state,
            owner,
            generation,
            transform,
        })
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.index).bit_length()
            + self.state.bit_length()
            + self.owner.bit_length()
            + generation_bit_length(self.generation)
            + 1
            + self.transform.map(|t| t.bit_length()).unwrap_or(0)
    }
}

/// Part of a full-state snapshot of one archetype. `stamp` is the last
/// timestamp the server issued for the pool when the snapshot was taken.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotChunk {
    pub archetype: Archetype,
    pub stamp: Stamp,
    pub capacity: u16,
    pub slots: Vec<SlotSnapshot>,
    pub is_final: bool,
}

impl SnapshotChunk {
    /// Splits the pool's slots into chunks, the last one flagged final.
    pub fn split(
        archetype: &Archetype,
        stamp: Stamp,
        capacity: u16,
        slots: Vec<SlotSnapshot>,
    ) -> Vec<SnapshotChunk> {
        let mut chunks: Vec<SnapshotChunk> = slots
            .chunks(SNAPSHOT_SLOTS_PER_CHUNK)
            .map(|slots| SnapshotChunk {
                archetype: archetype.clone(),
                stamp,
                capacity,
                slots: slots.to_vec(),
                is_final: false,
            })
            .collect();
        if chunks.is_empty() {
            chunks.push(SnapshotChunk {
                archetype: archetype.clone(),
                stamp,
                capacity,
                slots: Vec::new(),
                is_final: false,
            });
        }
        if let Some(last) = chunks.last_mut() {
            last.is_final = true;
        }
        chunks
    }
}

impl Serde for SnapshotChunk {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.archetype.ser(writer);
        self.stamp.ser(writer);
        UnsignedVariableInteger::<7>::new(self.capacity).ser(writer);
        self.is_final.ser(writer);
        for slot in &self.slots {
            true.ser(writer);
            slot.ser(writer);
        }
        false.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let archetype = Archetype::de(reader)?;
        let stamp = Stamp::de(reader)?;
        let capacity = UnsignedVariableInteger::<7>::de(reader)?.get();
        let capacity = u16::try_from(capacity).map_err(|_| SerdeErr)?;
        let is_final = bool::de(reader)?;
        let mut slots = Vec::new();
        while bool::de(reader)? {
            if slots.len() >= SNAPSHOT_SLOTS_PER_CHUNK {
                return Err(SerdeErr);
            }
            slots.push(SlotSnapshot::de(reader)?);
        }
        Ok(Self {
            archetype,
            stamp,
            capacity,
            slots,
            is_final,
        })
    }

    fn bit_length(&self) -> u32 {
        self.archetype.bit_length()
            + self.stamp.bit_length()
            + UnsignedVariableInteger::<7>::new(self.capacity).bit_length()
            + 1
            + self
                .slots
                .iter()
                .map(|slot| 1 + slot.bit_length())
                .sum::<u32>()
            + 1
    }
}
