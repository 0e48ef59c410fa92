use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::{debug, info, trace, warn};

use crate::{
    archetype::Archetype,
    config::PoolPolicy,
    error::PoolError,
    events::{PoolEvents, PredictionMiss},
    gameplay::{AcquireTicket, SpawnContext},
    pool::{Pool, PoolSet, ReleaseProgress},
    replication::{
        reconcile, AcquireResult, Admission, ClientMessage, DeltaReorderBuffer, MissReason,
        ReplicationDelta, ServerMessage, SlotSnapshot, SnapshotChunk, Verdict,
    },
    slot::{OwnerAuthority, SlotState},
    types::{ClientId, RequestId, SlotId, SlotKey},
};

struct Prediction {
    archetype: Archetype,
    /// The local tentative slot, if one was claimed
    slot: Option<SlotKey>,
    /// Released locally before the server answered
    cancelled: bool,
}

/// Client side: predicts acquires, applies the server's deltas in order and
/// repairs drift with snapshots.
pub struct ClientRole {
    client_id: ClientId,
    resync_timeout_steps: u32,
    buffers: HashMap<Archetype, DeltaReorderBuffer>,
    /// Deltas held back per slot while its local reset is pending
    gated: HashMap<SlotId, VecDeque<ReplicationDelta>>,
    /// Snapshot entries for slots whose local reset was still pending
    held_snapshots: HashMap<SlotId, SlotSnapshot>,
    predictions: BTreeMap<RequestId, Prediction>,
    /// Grants to cancelled requests whose activation has not arrived yet
    cancelled_grants: HashSet<SlotKey>,
    last_request: RequestId,
    /// Archetypes awaiting a snapshot, with steps waited so far
    pending_resyncs: BTreeMap<Archetype, u32>,
    outgoing: Vec<ClientMessage>,
}

impl ClientRole {
    pub fn new(client_id: ClientId, resync_timeout_steps: u32) -> Self {
        Self {
            client_id,
            resync_timeout_steps,
            buffers: HashMap::new(),
            gated: HashMap::new(),
            held_snapshots: HashMap::new(),
            predictions: BTreeMap::new(),
            cancelled_grants: HashSet::new(),
            last_request: RequestId::default(),
            pending_resyncs: BTreeMap::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn pending_predictions(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_resyncing(&self, archetype: &Archetype) -> bool {
        self.pending_resyncs.contains_key(archetype)
    }

    pub(crate) fn track_pool(&mut self, archetype: &Archetype, policy: &PoolPolicy) {
        self.buffers.insert(
            archetype.clone(),
            DeltaReorderBuffer::new(policy.resync_drift_window),
        );
    }

    // Gameplay

    /// Predicts an acquire locally and sends the request.
    pub fn acquire<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError> {
        let predicting = OwnerAuthority::PredictingClient(self.client_id);
        let pool = pools.try_get_mut(archetype)?;
        let predicted = if pool.policy().authority_only {
            None
        } else if pool.policy().allow_optimistic_active {
            let key = pool.acquire(predicting, &context)?;
            events.push_activation(key, predicting);
            Some(key)
        } else {
            Some(pool.reserve(predicting)?)
        };

        self.last_request = self.last_request.next();
        let request = self.last_request;
        self.predictions.insert(
            request,
            Prediction {
                archetype: archetype.clone(),
                slot: predicted,
                cancelled: false,
            },
        );
        self.outgoing.push(ClientMessage::AcquireRequest {
            request_id: request,
            archetype: archetype.clone(),
            predicted_slot: predicted.map(|key| key.slot()),
            context,
        });
        trace!("Requested {} as {} (predicted {:?})", archetype, request, predicted);
        Ok(AcquireTicket::Requested { request, predicted })
    }

    /// Cancels a tentative slot locally, or asks the server to release a
    /// confirmed one.
    pub fn release<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        key: SlotKey,
    ) -> Result<ReleaseProgress, PoolError> {
        let slot = key.slot();
        let pool = pools.by_slot_mut(slot)?;
        let view = pool.view(slot)?;
        if view.generation != key.generation() {
            return Err(PoolError::StaleGeneration {
                slot,
                expected: key.generation(),
                actual: view.generation,
            });
        }
        if view.is_tentative() {
            rollback_tentative(pool, events, slot)?;
            if let Some(prediction) = self
                .predictions
                .values_mut()
                .find(|prediction| !prediction.cancelled && prediction.slot == Some(key))
            {
                prediction.cancelled = true;
            }
            return Ok(ReleaseProgress::Completed);
        }
        match (view.state, view.owner) {
            (SlotState::Active, OwnerAuthority::Client(id)) if id == self.client_id => {
                self.outgoing.push(ClientMessage::ReleaseRequest { key });
                Ok(ReleaseProgress::Requested)
            }
            (SlotState::Active, _) => Err(PoolError::NotOwner {
                slot,
                requester: self.client_id.to_string(),
            }),
            (state, _) => Err(PoolError::InvalidTransition {
                slot,
                from: state.name(),
                to: SlotState::Releasing.name(),
            }),
        }
    }

    /// Signals that the local reset hook of `slot` finished, letting held
    /// deltas through.
    pub fn complete_reset<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        slot: SlotId,
    ) -> Result<(), PoolError> {
        pools.by_slot_mut(slot)?.mark_reset_complete(slot)?;
        self.flush_gated(pools, events, slot);
        Ok(())
    }

    // Server messages

    pub fn receive<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        message: ServerMessage,
    ) {
        match message {
            ServerMessage::Delta(delta) => self.receive_delta(pools, events, delta),
            ServerMessage::AcquireResponse { request_id, result } => {
                self.receive_response(pools, events, request_id, result)
            }
            ServerMessage::Snapshot(chunk) => self.receive_snapshot(pools, events, chunk),
        }
    }

    fn receive_delta<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        delta: ReplicationDelta,
    ) {
        let archetype = delta.archetype.clone();
        let Some(buffer) = self.buffers.get_mut(&archetype) else {
            warn!("Received a delta for unknown archetype {}", archetype);
            return;
        };
        let stamp = delta.authoritative_timestamp;
        match buffer.push(delta) {
            Admission::Accepted | Admission::AwaitingSnapshot => {}
            Admission::Duplicate | Admission::Stale => {
                debug!("Discarded stale delta {} for {}", stamp, archetype);
            }
            Admission::DriftExceeded { expected, received } => {
                warn!(
                    "Delta {} for {} is too far ahead of {}",
                    received, archetype, expected
                );
                self.request_resync(events, &archetype);
                return;
            }
        }
        self.drain(pools, events, &archetype);
    }

    fn drain<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents, archetype: &Archetype) {
        let ready = match self.buffers.get_mut(archetype) {
            Some(buffer) => buffer.drain_ready(),
            None => return,
        };
        for delta in ready {
            self.route(pools, events, delta);
        }
    }

    fn route<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents, delta: ReplicationDelta) {
        let slot = delta.slot;
        let held = self.gated.get(&slot).is_some_and(|queue| !queue.is_empty())
            || self.held_snapshots.contains_key(&slot)
            || pools
                .by_slot(slot)
                .is_ok_and(|pool| pool.is_reset_pending(slot));
        if held {
            trace!("Holding delta {} until slot {} resets", delta.authoritative_timestamp, slot);
            self.gated.entry(slot).or_default().push_back(delta);
            return;
        }
        self.apply(pools, events, delta);
    }

    fn apply<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents, delta: ReplicationDelta) {
        let archetype = delta.archetype.clone();
        if self.is_resyncing(&archetype) {
            trace!("Dropped delta {} during resync", delta.authoritative_timestamp);
            return;
        }
        let Some(pool) = pools.get_mut(&archetype) else {
            return;
        };
        let slot = delta.slot;
        if slot.pool() != pool.tag() || pool.grow_to(slot.index().saturating_add(1)).is_err() {
            warn!("Delta names slot {} outside pool {}", slot, archetype);
            self.request_resync(events, &archetype);
            return;
        }
        let Ok(view) = pool.view(slot) else {
            self.request_resync(events, &archetype);
            return;
        };

        let result = match reconcile(&view, pool.archetype(), &delta, self.client_id) {
            Verdict::Apply if self.is_cancelled_grant(&delta) => {
                debug!("Slot {} was granted to a cancelled request", slot);
                self.cancelled_grants
                    .remove(&SlotKey::new(slot, delta.to_generation));
                pool.activate_unseen(slot, delta.from_generation, delta.owner, delta.transform)
                    .map(|_| ())
            }
            Verdict::Apply => commit(pool, events, &delta),
            Verdict::Confirm => {
                let owner = OwnerAuthority::Client(self.client_id);
                let confirmed = if view.state == SlotState::Reserved {
                    let context = SpawnContext {
                        transform: delta.transform,
                    };
                    pool.activate(slot, view.generation, owner, &context)
                } else {
                    pool.confirm(view.key(), owner)
                };
                confirmed.map(|key| {
                    debug!("Prediction of slot {} confirmed", slot);
                    events.push_activation(key, owner);
                })
            }
            Verdict::Conflict(reason) => {
                let request = forget_prediction(&mut self.predictions, slot);
                warn!(
                    "Prediction miss on slot {}: server gave it to {}",
                    slot, delta.owner
                );
                events.push_prediction_miss(PredictionMiss {
                    request,
                    slot,
                    reason,
                });
                rollback_tentative(pool, events, slot).and_then(|_| commit(pool, events, &delta))
            }
            Verdict::Discard(reason) => {
                debug!(
                    "Discarded delta {} for slot {}: {:?}",
                    delta.authoritative_timestamp, slot, reason
                );
                Ok(())
            }
            Verdict::Resync(reason) => {
                warn!("Slot {} drifted from the server: {:?}", slot, reason);
                self.request_resync(events, &archetype);
                return;
            }
        };
        if let Err(error) = result {
            warn!("Could not apply delta for slot {}: {}", slot, error);
            self.request_resync(events, &archetype);
        }
    }

    /// Whether `delta` activates a slot for a request this client already
    /// cancelled.
    fn is_cancelled_grant(&self, delta: &ReplicationDelta) -> bool {
        delta.to_state == SlotState::Active
            && delta.owner == OwnerAuthority::Client(self.client_id)
            && (self
                .cancelled_grants
                .contains(&SlotKey::new(delta.slot, delta.to_generation))
                || self.predictions.values().any(|prediction| {
                    prediction.cancelled
                        && prediction.slot.is_some_and(|key| key.slot() == delta.slot)
                }))
    }

    fn flush_gated<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents, slot: SlotId) {
        let reset_pending = pools
            .by_slot(slot)
            .is_ok_and(|pool| pool.is_reset_pending(slot));
        if !reset_pending {
            if let Some(snapshot) = self.held_snapshots.remove(&slot) {
                if let Ok(pool) = pools.by_slot_mut(slot) {
                    trace!("Adopting held snapshot of slot {}", slot);
                    self.adopt_slot(pool, events, &snapshot);
                }
            }
        }
        loop {
            if pools
                .by_slot(slot)
                .is_ok_and(|pool| pool.is_reset_pending(slot))
            {
                break;
            }
            let Some(delta) = self.gated.get_mut(&slot).and_then(|queue| queue.pop_front()) else {
                break;
            };
            self.apply(pools, events, delta);
        }
        if self.gated.get(&slot).is_some_and(|queue| queue.is_empty()) {
            self.gated.remove(&slot);
        }
    }

    fn receive_response<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        request_id: RequestId,
        result: AcquireResult,
    ) {
        let Some(prediction) = self.predictions.remove(&request_id) else {
            debug!("Response to unknown request {}", request_id);
            return;
        };
        match result {
            AcquireResult::Granted(key) => {
                if prediction.cancelled {
                    debug!("Request {} was cancelled, releasing {}", request_id, key);
                    let seen = pools
                        .by_slot(key.slot())
                        .and_then(|pool| pool.view(key.slot()))
                        .is_ok_and(|view| view.generation != key.generation().wrapping_sub(1));
                    if !seen {
                        self.cancelled_grants.insert(key);
                    }
                    self.outgoing.push(ClientMessage::ReleaseRequest { key });
                    return;
                }
                if let Some(predicted) = prediction.slot {
                    if predicted.slot() != key.slot() {
                        abandon(pools, events, request_id, predicted, MissReason::DifferentSlot);
                    }
                }
                events.push_granted(request_id, key);
            }
            AcquireResult::Denied(reason) => {
                debug!(
                    "Acquire {} of {} denied: {}",
                    request_id, prediction.archetype, reason
                );
                if prediction.cancelled {
                    return;
                }
                if let Some(predicted) = prediction.slot {
                    abandon(pools, events, request_id, predicted, MissReason::Denied);
                }
                events.push_denied(request_id, reason);
            }
        }
    }

    fn receive_snapshot<H>(
        &mut self,
        pools: &mut PoolSet<H>,
        events: &mut PoolEvents,
        chunk: SnapshotChunk,
    ) {
        let archetype = chunk.archetype.clone();
        let Some(pool) = pools.get_mut(&archetype) else {
            warn!("Received a snapshot for unknown archetype {}", archetype);
            return;
        };
        if let Err(error) = pool.grow_to(chunk.capacity) {
            warn!("Snapshot of {} does not fit locally: {}", archetype, error);
        }
        for snapshot in &chunk.slots {
            let slot = SlotId::new(pool.tag(), snapshot.index);
            let before = pool.view(slot).ok();
            let prediction_in_flight = before.is_some_and(|before| {
                before.is_tentative()
                    && snapshot.state == SlotState::Pooled
                    && snapshot.generation == before.authoritative_generation()
            });
            if prediction_in_flight {
                continue;
            }
            // older deltas for the slot are superseded either way
            self.gated.remove(&slot);
            if pool.is_reset_pending(slot) {
                trace!("Holding snapshot of slot {} until it resets", slot);
                self.held_snapshots.insert(slot, *snapshot);
                continue;
            }
            self.held_snapshots.remove(&slot);
            self.adopt_slot(pool, events, snapshot);
        }

        if chunk.is_final {
            if let Some(buffer) = self.buffers.get_mut(&archetype) {
                buffer.desynchronize();
                buffer.resynchronize(chunk.stamp);
            }
            self.pending_resyncs.remove(&archetype);
            info!("Resynchronized {} at {}", archetype, chunk.stamp);
            self.drain(pools, events, &archetype);
        }
    }

    /// Overwrites one slot with the server's view and reports what changed.
    fn adopt_slot<H>(&mut self, pool: &mut Pool<H>, events: &mut PoolEvents, snapshot: &SlotSnapshot) {
        let slot = SlotId::new(pool.tag(), snapshot.index);
        let before = pool.view(slot).ok();
        let after = match pool.adopt(snapshot) {
            Ok(after) => after,
            Err(error) => {
                warn!("Could not adopt snapshot of slot {}: {}", slot, error);
                return;
            }
        };
        let Some(before) = before else {
            return;
        };
        if before.is_tentative() && after.owner != OwnerAuthority::Client(self.client_id) {
            let request = forget_prediction(&mut self.predictions, slot);
            events.push_prediction_miss(PredictionMiss {
                request,
                slot,
                reason: MissReason::Resynced,
            });
        }
        if after.state == SlotState::Active && before.key() != after.key() {
            events.push_activation(after.key(), after.owner);
        }
        if before.state.is_in_use() && after.state == SlotState::Pooled {
            events.push_release(slot);
        }
    }

    fn request_resync(&mut self, events: &mut PoolEvents, archetype: &Archetype) {
        if self.pending_resyncs.contains_key(archetype) {
            return;
        }
        if let Some(buffer) = self.buffers.get_mut(archetype) {
            buffer.desynchronize();
        }
        self.pending_resyncs.insert(archetype.clone(), 0);
        self.outgoing.push(ClientMessage::ResyncRequest {
            archetype: archetype.clone(),
        });
        events.push_resync_request(archetype.clone());
        info!("Requested a snapshot of {}", archetype);
    }

    /// Counts a simulation step against outstanding resync requests,
    /// reissuing those that timed out.
    pub fn advance_step(&mut self) {
        for (archetype, waited) in self.pending_resyncs.iter_mut() {
            *waited += 1;
            if *waited >= self.resync_timeout_steps {
                *waited = 0;
                warn!("Snapshot of {} timed out, asking again", archetype);
                self.outgoing.push(ClientMessage::ResyncRequest {
                    archetype: archetype.clone(),
                });
            }
        }
    }

    pub fn end_session<H>(&mut self, pools: &mut PoolSet<H>, events: &mut PoolEvents) -> usize {
        let mut released = 0;
        for pool in pools.iter_mut() {
            for slot in pool.force_release_all() {
                events.push_release(slot);
                released += 1;
            }
        }
        self.predictions.clear();
        self.cancelled_grants.clear();
        self.gated.clear();
        self.held_snapshots.clear();
        self.pending_resyncs.clear();
        self.outgoing.clear();
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
        released
    }
}

/// Applies a delta whose edge starts at the local state.
fn commit<H>(pool: &mut Pool<H>, events: &mut PoolEvents, delta: &ReplicationDelta) -> Result<(), PoolError> {
    match delta.to_state {
        SlotState::Active => {
            let context = SpawnContext {
                transform: delta.transform,
            };
            let key = pool.activate(delta.slot, delta.from_generation, delta.owner, &context)?;
            events.push_activation(key, delta.owner);
        }
        SlotState::Releasing => {
            pool.start_releasing(SlotKey::new(delta.slot, delta.from_generation))?;
        }
        SlotState::Pooled => {
            let was_live = pool.view(delta.slot)?.is_live;
            pool.finish_release(delta.slot)?;
            if was_live {
                events.push_release(delta.slot);
            }
        }
        SlotState::Reserved => {
            return Err(PoolError::InvalidTransition {
                slot: delta.slot,
                from: SlotState::Pooled.name(),
                to: SlotState::Reserved.name(),
            });
        }
    }
    Ok(())
}

/// Drops a tentative slot. An optimistic activation was visible, so its
/// removal is reported as a release.
fn rollback_tentative<H>(pool: &mut Pool<H>, events: &mut PoolEvents, slot: SlotId) -> Result<(), PoolError> {
    let was_visible = pool.view(slot)?.state == SlotState::Active;
    pool.rollback(slot)?;
    if was_visible {
        events.push_release(slot);
    }
    Ok(())
}

/// Rolls back a prediction the server did not honor, if it is still held.
fn abandon<H>(
    pools: &mut PoolSet<H>,
    events: &mut PoolEvents,
    request: RequestId,
    predicted: SlotKey,
    reason: MissReason,
) {
    let slot = predicted.slot();
    let Ok(pool) = pools.by_slot_mut(slot) else {
        return;
    };
    let still_held = pool
        .view(slot)
        .is_ok_and(|view| view.is_tentative() && view.generation == predicted.generation());
    if still_held {
        if let Err(error) = rollback_tentative(pool, events, slot) {
            warn!("Could not roll back slot {}: {}", slot, error);
        }
    }
    warn!("Prediction miss for {} on slot {}: {:?}", request, slot, reason);
    events.push_prediction_miss(PredictionMiss {
        request: Some(request),
        slot,
        reason,
    });
}

fn forget_prediction(predictions: &mut BTreeMap<RequestId, Prediction>, slot: SlotId) -> Option<RequestId> {
    predictions
        .iter_mut()
        .find(|(_, prediction)| {
            !prediction.cancelled && prediction.slot.is_some_and(|key| key.slot() == slot)
        })
        .map(|(request, prediction)| {
            prediction.slot = None;
            *request
        })
}
