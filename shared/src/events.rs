use std::{mem, vec::IntoIter};

use crate::{
    archetype::Archetype,
    replication::{DenyReason, MissReason},
    slot::OwnerAuthority,
    types::{RequestId, SlotId, SlotKey},
};

/// A client prediction that did not survive contact with the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PredictionMiss {
    pub request: Option<RequestId>,
    pub slot: SlotId,
    pub reason: MissReason,
}

/// Lifecycle events collected during a step, drained by gameplay code.
pub struct PoolEvents {
    activations: Vec<(SlotKey, OwnerAuthority)>,
    releases: Vec<SlotId>,
    granted: Vec<(RequestId, SlotKey)>,
    denied: Vec<(RequestId, DenyReason)>,
    prediction_misses: Vec<PredictionMiss>,
    resync_requests: Vec<Archetype>,

    empty: bool,
}

impl Default for PoolEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolEvents {
    pub(crate) fn new() -> Self {
        Self {
            activations: Vec::new(),
            releases: Vec::new(),
            granted: Vec::new(),
            denied: Vec::new(),
            prediction_misses: Vec::new(),
            resync_requests: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: PoolEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: PoolEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_activation(&mut self, key: SlotKey, owner: OwnerAuthority) {
        self.activations.push((key, owner));
        self.empty = false;
    }

    pub(crate) fn push_release(&mut self, slot: SlotId) {
        self.releases.push(slot);
        self.empty = false;
    }

    pub(crate) fn push_granted(&mut self, request: RequestId, key: SlotKey) {
        self.granted.push((request, key));
        self.empty = false;
    }

    pub(crate) fn push_denied(&mut self, request: RequestId, reason: DenyReason) {
        self.denied.push((request, reason));
        self.empty = false;
    }

    pub(crate) fn push_prediction_miss(&mut self, miss: PredictionMiss) {
        self.prediction_misses.push(miss);
        self.empty = false;
    }

    pub(crate) fn push_resync_request(&mut self, archetype: Archetype) {
        self.resync_requests.push(archetype);
        self.empty = false;
    }
}

// Event Trait
pub trait PoolEvent {
    type Iter;

    fn iter(events: &mut PoolEvents) -> Self::Iter;

    fn has(events: &PoolEvents) -> bool;
}

// ActivatedEvent
/// A slot went live locally. A `PredictingClient` owner marks a tentative
/// activation.
pub struct ActivatedEvent;
impl PoolEvent for ActivatedEvent {
    type Iter = IntoIter<(SlotKey, OwnerAuthority)>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.activations);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.activations.is_empty()
    }
}

// ReleasedEvent
pub struct ReleasedEvent;
impl PoolEvent for ReleasedEvent {
    type Iter = IntoIter<SlotId>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.releases);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.releases.is_empty()
    }
}

// AcquireGrantedEvent
pub struct AcquireGrantedEvent;
impl PoolEvent for AcquireGrantedEvent {
    type Iter = IntoIter<(RequestId, SlotKey)>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.granted);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.granted.is_empty()
    }
}

// AcquireFailedEvent
pub struct AcquireFailedEvent;
impl PoolEvent for AcquireFailedEvent {
    type Iter = IntoIter<(RequestId, DenyReason)>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.denied);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.denied.is_empty()
    }
}

// PredictionMissEvent
pub struct PredictionMissEvent;
impl PoolEvent for PredictionMissEvent {
    type Iter = IntoIter<PredictionMiss>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.prediction_misses);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.prediction_misses.is_empty()
    }
}

// ResyncRequestedEvent
pub struct ResyncRequestedEvent;
impl PoolEvent for ResyncRequestedEvent {
    type Iter = IntoIter<Archetype>;

    fn iter(events: &mut PoolEvents) -> Self::Iter {
        let list = mem::take(&mut events.resync_requests);
        IntoIterator::into_iter(list)
    }

    fn has(events: &PoolEvents) -> bool {
        !events.resync_requests.is_empty()
    }
}
