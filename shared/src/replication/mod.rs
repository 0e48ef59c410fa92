mod client_role;
mod coordinator;
mod delta;
mod messages;
mod reconcile;
mod reorder_buffer;
mod server_role;
mod snapshot;

pub use client_role::ClientRole;
pub use coordinator::Coordinator;
pub use delta::ReplicationDelta;
pub use messages::{
    read_packet, write_packets, AcquireResult, ClientMessage, DenyReason, ServerMessage,
};
pub use reconcile::{reconcile, DiscardReason, MissReason, ResyncReason, Verdict};
pub use reorder_buffer::{Admission, DeltaReorderBuffer};
pub use server_role::{Outgoing, ServerRole};
pub use snapshot::{SlotSnapshot, SnapshotChunk, SNAPSHOT_SLOTS_PER_CHUNK};
