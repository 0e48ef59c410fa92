use naia_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    archetype::Archetype,
    gameplay::Transform,
    slot::{OwnerAuthority, SlotState},
    stamp::Stamp,
    types::{de_generation, generation_bit_length, ser_generation, Generation, SlotId},
};

/// One committed slot transition, as broadcast by the server.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicationDelta {
    pub slot: SlotId,
    pub archetype: Archetype,
    pub from_generation: Generation,
    pub to_state: SlotState,
    pub to_generation: Generation,
    pub authoritative_timestamp: Stamp,
    pub owner: OwnerAuthority,
    /// Spawn placement, carried by activations
    pub transform: Option<Transform>,
}

impl ReplicationDelta {
    /// Activations advance the generation by one, every other transition
    /// keeps it.
    pub fn is_well_formed(&self) -> bool {
        match self.to_state {
            SlotState::Active => self.to_generation == self.from_generation.wrapping_add(1),
            SlotState::Releasing | SlotState::Pooled => self.to_generation == self.from_generation,
            SlotState::Reserved => false,
        }
    }
}

impl Serde for ReplicationDelta {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.slot.ser(writer);
        self.archetype.ser(writer);
        ser_generation(self.from_generation, writer);
        self.to_state.ser(writer);
        ser_generation(self.to_generation, writer);
        self.authoritative_timestamp.ser(writer);
        self.owner.ser(writer);
        match &self.transform {
            Some(transform) => {
                true.ser(writer);
                transform.ser(writer);
            }
            None => false.ser(writer),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let slot = SlotId::de(reader)?;
        let archetype = Archetype::de(reader)?;
        let from_generation = de_generation(reader)?;
        let to_state = SlotState::de(reader)?;
        let to_generation = de_generation(reader)?;
        let authoritative_timestamp = Stamp::de(reader)?;
        let owner = OwnerAuthority::de(reader)?;
        let transform = if bool::de(reader)? {
            Some(Transform::de(reader)?)
        } else {
            None
        };
        Ok(Self {
            slot,
            archetype,
            from_generation,
            to_state,
            to_generation,
            authoritative_timestamp,
            owner,
            transform,
        })
    }

    fn bit_length(&self) -> u32 {
        self.slot.bit_length()
            + self.archetype.bit_length()
            + generation_bit_length(self.from_generation)
            + self.to_state.bit_length()
            + generation_bit_length(self.to_generation)
            + self.authoritative_timestamp.bit_length()
            + self.owner.bit_length()
            + 1
            + self.transform.map(|t| t.bit_length()).unwrap_or(0)
    }
}
