use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    archetype::{Archetype, ResetStatus},
    error::PoolError,
    events::PoolEvents,
    gameplay::SpawnContext,
    pool::{Pool, PoolSet, ReleaseProgress},
    replication::{
        AcquireResult, ClientMessage, DenyReason, ReplicationDelta, ServerMessage, SlotSnapshot,
        SnapshotChunk,
    },
    slot::{OwnerAuthority, SlotState},
    stamp::Stamp,
    types::{ClientId, Generation, PoolTag, RequestId, SlotId, SlotKey},
};

/// A server message and who it is for.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    Broadcast(ServerMessage),
    Direct(ClientId, ServerMessage),
}

impl Outgoing {
    pub fn is_for(&self, client: &ClientId) -> bool {
        match self {
            Outgoing::Broadcast(_) => true,
            Outgoing::Direct(target, _) => target == client,
        }
    }

    pub fn message(&self) -> &ServerMessage {
        match self {
            Outgoing::Broadcast(message) | Outgoing::Direct(_, message) => message,
        }
    }
}

/// Authoritative side: every transition commits at once and is queued as a
/// stamped delta for every client.
pub struct ServerRole {
    clocks: HashMap<PoolTag, Stamp>,
    outgoing: Vec<Outgoing>,
}

impl Default for ServerRole {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRole {
    pub fn new() -> Self {
        Self {
            clocks: HashMap::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn last_stamp(&self, pool: PoolTag) -> Stamp {
        self.clocks.get(&pool).copied().unwrap_or_default()
    }

    fn next_stamp(&mut self, pool: PoolTag) -> Stamp {
        let clock = self.clocks.entry(pool).or_default();
        *clock = clock.next();
        *clock
    }

    fn broadcast_transition<H>(
        &mut self,
        pool: &Pool<H>,
        slot: SlotId,
        from_generation: Generation,
    ) -> Result<(), PoolError> {
        let view = pool.view(slot)?;
        let delta = ReplicationDelta {
            slot,
            archetype: pool.archetype().clone(),
            from_generation,
            to_state: view.state,
            to_generation: view.generation,
            authoritative_timestamp: self.next_stamp(pool.tag()),
            owner: view.owner,
            transform: match view.state {
                SlotState::Active => view.transform,
                _ => None,
            },
        };
        debug!(
            "Queued delta {} for slot {}: {} at generation {}",
            delta.authoritative_timestamp, slot, delta.to_state, delta.to_generation
        );
        self.outgoing
            .push(Outgoing::Broadcast(ServerMessage::Delta(delta)));
        Ok(())
    }

    // Gameplay

    pub fn acquire<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        archetype: &Archetype,
        owner: OwnerAuthority,
        context: SpawnContext,
    ) -> Result<SlotKey, PoolError> {
        if !matches!(owner, OwnerAuthority::Server | OwnerAuthority::Client(_)) {
            return Err(PoolError::InvalidOwner {
                owner: owner.to_string(),
            });
        }
        let pool = pools.try_get_mut(archetype)?;
        let key = pool.acquire(owner, &context)?;
        self.broadcast_transition(pool, key.slot(), key.generation().wrapping_sub(1))?;
        events.push_activation(key, owner);
        Ok(key)
    }

    pub fn release<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        key: SlotKey,
    ) -> Result<ReleaseProgress, PoolError> {
        let pool = pools.by_slot_mut(key.slot())?;
        let progress = match pool.start_releasing(key)? {
            ResetStatus::Complete => ReleaseProgress::Completed,
            ResetStatus::Pending => ReleaseProgress::AwaitingReset,
        };
        self.broadcast_transition(pool, key.slot(), key.generation())?;
        if progress == ReleaseProgress::Completed {
            self.finish_release(pool, events, key.slot())?;
        }
        Ok(progress)
    }

    pub fn complete_reset<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        slot: SlotId,
    ) -> Result<(), PoolError> {
        let pool = pools.by_slot_mut(slot)?;
        pool.mark_reset_complete(slot)?;
        self.finish_release(pool, events, slot)
    }

    fn finish_release<H>(
        &mut self,
        pool: &mut Pool<H>,
        events: &mut PoolEvents,
        slot: SlotId,
    ) -> Result<(), PoolError> {
        let generation = pool.view(slot)?.generation;
        pool.finish_release(slot)?;
        self.broadcast_transition(pool, slot, generation)?;
        events.push_release(slot);
        Ok(())
    }

    // Client requests

    pub fn receive<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        client: ClientId,
        message: ClientMessage,
    ) {
        match message {
            ClientMessage::AcquireRequest {
                request_id,
                archetype,
                predicted_slot,
                context,
            } => {
                let owner = OwnerAuthority::Client(client);
                let result = match self.acquire(pools, events, &archetype, owner, context) {
                    Ok(key) => {
                        if predicted_slot.is_some_and(|slot| slot != key.slot()) {
                            debug!(
                                "{} predicted {:?} for {} but was granted {}",
                                client, predicted_slot, archetype, key
                            );
                        }
                        AcquireResult::Granted(key)
                    }
                    Err(error) => {
                        warn!(
                            "Denied acquire {} of {} for {}: {}",
                            request_id, archetype, client, error
                        );
                        AcquireResult::Denied(DenyReason::from_error(&error))
                    }
                };
                self.respond(client, request_id, result);
            }
            ClientMessage::ReleaseRequest { key } => {
                match self.release_for(pools, events, client, key) {
                    Ok(_) => {}
                    Err(error @ PoolError::StaleGeneration { .. }) => {
                        debug!("Ignored stale release from {}: {}", client, error);
                    }
                    Err(error) => {
                        warn!("Rejected release from {}: {}", client, error);
                    }
                }
            }
            ClientMessage::ResyncRequest { archetype } => {
                if let Err(error) = self.send_snapshot(pools, client, &archetype) {
                    warn!("Rejected resync request from {}: {}", client, error);
                }
            }
        }
    }

    pub fn deny(&mut self, client: ClientId, request_id: RequestId, reason: DenyReason) {
        self.respond(client, request_id, AcquireResult::Denied(reason));
    }

    fn respond(&mut self, client: ClientId, request_id: RequestId, result: AcquireResult) {
        self.outgoing.push(Outgoing::Direct(
            client,
            ServerMessage::AcquireResponse { request_id, result },
        ));
    }

    fn release_for<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        client: ClientId,
        key: SlotKey,
    ) -> Result<ReleaseProgress, PoolError> {
        let view = pools.by_slot(key.slot())?.view(key.slot())?;
        if view.generation != key.generation() {
            return Err(PoolError::StaleGeneration {
                slot: key.slot(),
                expected: key.generation(),
                actual: view.generation,
            });
        }
        if view.owner != OwnerAuthority::Client(client) {
            return Err(PoolError::NotOwner {
                slot: key.slot(),
                requester: client.to_string(),
            });
        }
        self.release(pools, events, key)
    }

    // Snapshots

    pub fn snapshot<H>(
        &self,
        pools: &PoolSet<H>,
        archetype: &Archetype,
    ) -> Result<Vec<SnapshotChunk>, PoolError> {
        let pool = pools.try_get(archetype)?;
        let slots = pool
            .registry()
            .iter()
            .map(|slot| SlotSnapshot::from_view(&slot.view()))
            .collect();
        Ok(SnapshotChunk::split(
            archetype,
            self.last_stamp(pool.tag()),
            pool.capacity(),
            slots,
        ))
    }

    pub fn send_snapshot<H>(
        &mut self,
        pools: &PoolSet<H>,
        client: ClientId,
        archetype: &Archetype,
    ) -> Result<(), PoolError> {
        let chunks = self.snapshot(pools, archetype)?;
        info!(
            "Sending snapshot of {} to {} ({} chunks)",
            archetype,
            client,
            chunks.len()
        );
        for chunk in chunks {
            self.outgoing
                .push(Outgoing::Direct(client, ServerMessage::Snapshot(chunk)));
        }
        Ok(())
    }

    /// Releases every slot a departing client owns.
    pub fn release_owned_by<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        client: ClientId,
    ) -> usize {
        let owned: Vec<SlotKey> = pools
            .iter()
            .flat_map(|pool| pool.registry().iter())
            .filter(|slot| {
                slot.state() == SlotState::Active
                    && slot.owner() == OwnerAuthority::Client(client)
            })
            .map(|slot| slot.key())
            .collect();
        let mut released = 0;
        for key in owned {
            match self.release(pools, events, key) {
                Ok(_) => released += 1,
                Err(error) => warn!("Could not release {} for {}: {}", key, client, error),
            }
        }
        released
    }

    /// Forces every pool back to empty. Nothing is broadcast; the session is
    /// going away.
    pub fn end_session<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents) -> usize {
        let mut released = 0;
        for pool in pools.iter_mut() {
            for slot in pool.force_release_all() {
                events.push_release(slot);
                released += 1;
            }
        }
        self.clocks.clear();
        self.outgoing.clear();
        released
    }
}
