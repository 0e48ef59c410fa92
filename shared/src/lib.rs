//! # NetPool Shared
//! Slot pools for networked objects: the server owns every slot's lifecycle
//! and replicates it; clients predict their own acquires and reconcile.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use naia_serde::{
    BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedInteger, UnsignedVariableInteger,
    MTU_SIZE_BITS, MTU_SIZE_BYTES,
};

mod archetype;
mod config;
mod error;
mod events;
mod gameplay;
mod manager;
mod pool;
mod replication;
mod slot;
mod stamp;
mod transport;
mod types;

pub use archetype::{Archetype, ArchetypeBehavior, ResetStatus, MAX_ARCHETYPE_NAME_BYTES};
pub use config::{ArchetypeSettings, PoolPolicy, PoolSettings, MAX_ARCHETYPES};
pub use error::{ConfigError, PoolError, ProtocolError};
pub use events::{
    AcquireFailedEvent, AcquireGrantedEvent, ActivatedEvent, PoolEvent, PoolEvents,
    PredictionMiss, PredictionMissEvent, ReleasedEvent, ResyncRequestedEvent,
};
pub use gameplay::{
    AcquireTicket, GameplayPoolAccess, SpawnContext, SpawnOutcome, SpawnTask, Transform,
};
pub use manager::PoolManager;
pub use pool::{Pool, PoolCounts, PoolSet, ReleaseProgress};
pub use replication::{
    read_packet, reconcile, write_packets, AcquireResult, Admission, ClientMessage, ClientRole,
    Coordinator, DeltaReorderBuffer, DenyReason, DiscardReason, MissReason, Outgoing,
    ReplicationDelta, ResyncReason, ServerMessage, ServerRole, SlotSnapshot, SnapshotChunk,
    Verdict, SNAPSHOT_SLOTS_PER_CHUNK,
};
pub use slot::{OwnerAuthority, Slot, SlotError, SlotRegistry, SlotState, SlotView};
pub use stamp::Stamp;
pub use transport::{RecvError, SendError};
pub use types::{ClientId, Generation, HostType, PoolTag, RequestId, SlotId, SlotKey};
