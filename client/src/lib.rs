//! # NetPool Client
//! The predicting side of a pooling session: claims slots locally before the
//! server answers, then reconciles against the server's replicated slots.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod transport;
/// Gameplay-facing types, so an app can depend on this crate alone.
pub mod shared {
    pub use netpool_shared::{
        AcquireFailedEvent, AcquireGrantedEvent, AcquireTicket, ActivatedEvent, Archetype,
        ArchetypeBehavior, ClientId, DenyReason, MissReason, OwnerAuthority, PoolCounts,
        PoolError, PoolEvents, PoolPolicy, PoolSettings, PredictionMiss, PredictionMissEvent,
        ReleaseProgress, ReleasedEvent, RequestId, ResetStatus, ResyncRequestedEvent, SlotId,
        SlotKey, SlotState, SlotView, SpawnContext, Transform,
    };
}

mod client_config;
mod error;
mod pool_client;

pub use client_config::ClientConfig;
pub use error::NetPoolClientError;
pub use pool_client::PoolClient;
