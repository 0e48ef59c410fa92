//! # NetPool Server
//! The authoritative side of a pooling session: applies every slot
//! transition, validates client requests and replicates the result to all
//! connected clients.

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
        AcquireFailedEvent, AcquireGrantedEvent, ActivatedEvent, Archetype, ArchetypeBehavior,
        ClientId, OwnerAuthority, PoolCounts, PoolError, PoolEvents, PoolPolicy, PoolSettings,
        ReleaseProgress, ReleasedEvent, ResetStatus, SlotId, SlotKey, SlotState, SlotView,
        SpawnContext, Transform,
    };
}

mod error;
mod pool_server;
mod server_config;
mod user;

pub use error::NetPoolServerError;
pub use pool_server::PoolServer;
pub use server_config::ServerConfig;
pub use user::User;
