use std::fmt;

use naia_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger};

use crate::{
    gameplay::Transform,
    types::{ClientId, Generation, SlotId, SlotKey},
};

// SlotState

/// Slot lifecycle: `Pooled -> Reserved -> Active -> Releasing -> Pooled`.
/// Servers skip `Reserved`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    Pooled,
    Reserved,
    Active,
    Releasing,
}

impl SlotState {
    pub fn name(&self) -> &'static str {
        match self {
            SlotState::Pooled => "Pooled",
            SlotState::Reserved => "Reserved",
            SlotState::Active => "Active",
            SlotState::Releasing => "Releasing",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle. Rollback edges
    /// only exist while the slot is held by a predicting client.
    pub fn can_transition_to(&self, next: SlotState, owner: OwnerAuthority) -> bool {
        match (self, next) {
            (SlotState::Pooled, SlotState::Reserved)
            | (SlotState::Pooled, SlotState::Active)
            | (SlotState::Reserved, SlotState::Active)
            | (SlotState::Active, SlotState::Releasing)
            | (SlotState::Releasing, SlotState::Pooled) => true,
            (SlotState::Reserved, SlotState::Pooled)
            | (SlotState::Active, SlotState::Pooled)
            | (SlotState::Active, SlotState::Active) => owner.is_predicting(),
            _ => false,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, SlotState::Pooled)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serde for SlotState {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let index = match self {
            SlotState::Pooled => 0,
            SlotState::Reserved => 1,
            SlotState::Active => 2,
            SlotState::Releasing => 3,
        };
        UnsignedInteger::<2>::new(index).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match UnsignedInteger::<2>::de(reader)?.get() {
            0 => Ok(SlotState::Pooled),
            1 => Ok(SlotState::Reserved),
            2 => Ok(SlotState::Active),
            3 => Ok(SlotState::Releasing),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        2
    }
}

// OwnerAuthority

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OwnerAuthority {
    None,
    Server,
    Client(ClientId),
    /// Tentative ownership held by a client until the server answers
    PredictingClient(ClientId),
}

impl OwnerAuthority {
    pub fn is_predicting(&self) -> bool {
        matches!(self, OwnerAuthority::PredictingClient(_))
    }

    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            OwnerAuthority::Client(id) | OwnerAuthority::PredictingClient(id) => Some(*id),
            OwnerAuthority::None | OwnerAuthority::Server => None,
        }
    }

    /// The authoritative owner a confirmed prediction resolves to.
    pub fn confirmed(&self) -> Self {
        match self {
            OwnerAuthority::PredictingClient(id) => OwnerAuthority::Client(*id),
            other => *other,
        }
    }
}

impl fmt::Display for OwnerAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerAuthority::None => f.write_str("none"),
            OwnerAuthority::Server => f.write_str("server"),
            OwnerAuthority::Client(id) => write!(f, "{}", id),
            OwnerAuthority::PredictingClient(id) => write!(f, "predicting {}", id),
        }
    }
}

impl Serde for OwnerAuthority {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            OwnerAuthority::None => UnsignedInteger::<2>::new(0).ser(writer),
            OwnerAuthority::Server => UnsignedInteger::<2>::new(1).ser(writer),
            OwnerAuthority::Client(id) => {
                UnsignedInteger::<2>::new(2).ser(writer);
                id.ser(writer);
            }
            OwnerAuthority::PredictingClient(id) => {
                UnsignedInteger::<2>::new(3).ser(writer);
                id.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match UnsignedInteger::<2>::de(reader)?.get() {
            0 => Ok(OwnerAuthority::None),
            1 => Ok(OwnerAuthority::Server),
            2 => Ok(OwnerAuthority::Client(ClientId::de(reader)?)),
            3 => Ok(OwnerAuthority::PredictingClient(ClientId::de(reader)?)),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        2 + self.client_id().map(|id| id.bit_length()).unwrap_or(0)
    }
}

// Slot

/// One poolable slot. Only the owning `SlotRegistry` mutates it.
pub struct Slot<H> {
    pub(super) id: SlotId,
    pub(super) state: SlotState,
    pub(super) owner: OwnerAuthority,
    pub(super) generation: Generation,
    pub(super) transform: Option<Transform>,
    /// The live instance, present while Active or Releasing
    pub(super) handle: Option<H>,
    /// A parked instance kept for the next activation
    pub(super) dormant: Option<H>,
}

impl<H> Slot<H> {
    pub(super) fn new(id: SlotId) -> Self {
        Self {
            id,
            state: SlotState::Pooled,
            owner: OwnerAuthority::None,
            generation: 0,
            transform: None,
            handle: None,
            dormant: None,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn owner(&self) -> OwnerAuthority {
        self.owner
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.id, self.generation)
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn has_instance(&self) -> bool {
        self.handle.is_some() || self.dormant.is_some()
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            id: self.id,
            state: self.state,
            owner: self.owner,
            generation: self.generation,
            transform: self.transform,
            is_live: self.handle.is_some(),
        }
    }
}

/// Copyable summary of a slot, for reconciliation and snapshots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotView {
    pub id: SlotId,
    pub state: SlotState,
    pub owner: OwnerAuthority,
    pub generation: Generation,
    pub transform: Option<Transform>,
    pub is_live: bool,
}

impl SlotView {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.id, self.generation)
    }

    /// The generation as the server knows it. An optimistic activation bumps
    /// the local generation ahead of confirmation.
    pub fn authoritative_generation(&self) -> Generation {
        match (self.state, self.owner) {
            (SlotState::Active, OwnerAuthority::PredictingClient(_)) => {
                self.generation.wrapping_sub(1)
            }
            _ => self.generation,
        }
    }

    pub fn is_tentative(&self) -> bool {
        self.owner.is_predicting()
    }
}
