use naia_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    archetype::Archetype,
    error::PoolError,
    types::{RequestId, SlotKey},
};

// Transform

/// Spawn placement replicated with an activation, for objects that do not
/// replicate their own movement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub location: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub fn from_location(location: [f32; 3]) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl Serde for Transform {
    fn ser(&self, writer: &mut dyn BitWrite) {
        for value in self
            .location
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
        {
            value.to_bits().ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let mut values = [0.0f32; 10];
        for value in values.iter_mut() {
            *value = f32::from_bits(u32::de(reader)?);
        }
        Ok(Self {
            location: [values[0], values[1], values[2]],
            rotation: [values[3], values[4], values[5], values[6]],
            scale: [values[7], values[8], values[9]],
        })
    }

    fn bit_length(&self) -> u32 {
        10 * u32::BITS
    }
}

// SpawnContext

/// Gameplay context handed to an activation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpawnContext {
    pub transform: Option<Transform>,
}

impl SpawnContext {
    pub fn at(transform: Transform) -> Self {
        Self {
            transform: Some(transform),
        }
    }
}

impl Serde for SpawnContext {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match &self.transform {
            Some(transform) => {
                true.ser(writer);
                transform.ser(writer);
            }
            None => false.ser(writer),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let transform = if bool::de(reader)? {
            Some(Transform::de(reader)?)
        } else {
            None
        };
        Ok(Self { transform })
    }

    fn bit_length(&self) -> u32 {
        1 + self.transform.map(|t| t.bit_length()).unwrap_or(0)
    }
}

// Gameplay access

/// What a gameplay acquire produced. On the authority the slot is live at
/// once; elsewhere the request travels to the server and may carry a local
/// prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireTicket {
    Granted(SlotKey),
    Requested {
        request: RequestId,
        predicted: Option<SlotKey>,
    },
}

impl AcquireTicket {
    pub fn key(&self) -> Option<SlotKey> {
        match self {
            AcquireTicket::Granted(key) => Some(*key),
            AcquireTicket::Requested { predicted, .. } => *predicted,
        }
    }
}

/// Narrow surface the ability/task system uses to drive pools.
pub trait GameplayPoolAccess {
    fn is_authority(&self) -> bool;

    fn request_acquire(
        &mut self,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError>;

    fn request_release(&mut self, key: SlotKey) -> Result<(), PoolError>;
}

// SpawnTask

#[derive(Clone, Debug, PartialEq)]
pub enum SpawnOutcome {
    Spawned(SlotKey),
    DidNotSpawn(PoolError),
}

/// One-shot ability task that spawns a pooled object on the authority.
#[derive(Clone, Debug)]
pub struct SpawnTask {
    archetype: Archetype,
    context: SpawnContext,
}

impl SpawnTask {
    pub fn new(archetype: Archetype, context: SpawnContext) -> Self {
        Self { archetype, context }
    }

    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    pub fn run(self, access: &mut dyn GameplayPoolAccess) -> SpawnOutcome {
        if !access.is_authority() {
            return SpawnOutcome::DidNotSpawn(PoolError::NotAuthority {
                operation: "spawn task",
            });
        }
        match access.request_acquire(&self.archetype, self.context) {
            Ok(AcquireTicket::Granted(key)) => SpawnOutcome::Spawned(key),
            Ok(AcquireTicket::Requested { .. }) => SpawnOutcome::DidNotSpawn(PoolError::NotAuthority {
                operation: "spawn task",
            }),
            Err(error) => SpawnOutcome::DidNotSpawn(error),
        }
    }
}
