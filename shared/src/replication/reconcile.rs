use crate::{
    archetype::Archetype,
    replication::ReplicationDelta,
    slot::{OwnerAuthority, SlotState, SlotView},
    types::{ClientId, Generation},
};

/// Why a tentative prediction lost to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissReason {
    /// The server gave the predicted slot to another owner
    ClaimedByOther,
    /// The server granted a different slot than the one predicted
    DifferentSlot,
    /// The server denied the acquire
    Denied,
    /// A snapshot overwrote the prediction
    Resynced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The delta describes an activation the slot has already moved past
    OlderGeneration,
    /// The slot is already in the delta's target state
    AlreadyApplied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncReason {
    ArchetypeMismatch,
    MalformedDelta,
    /// The delta builds on a generation this side never saw
    GenerationGap {
        local: Generation,
        remote: Generation,
    },
    /// The delta's edge does not start from the local state
    StateMismatch {
        local: SlotState,
        remote: SlotState,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The delta follows on from the local state
    Apply,
    /// The delta confirms this client's tentative prediction
    Confirm,
    /// The local prediction lost; roll it back, then apply the delta
    Conflict(MissReason),
    Discard(DiscardReason),
    /// The slot cannot be repaired incrementally
    Resync(ResyncReason),
}

/// Decides what an in-order delta means for a client's copy of a slot.
pub fn reconcile(
    local: &SlotView,
    local_archetype: &Archetype,
    delta: &ReplicationDelta,
    me: ClientId,
) -> Verdict {
    if delta.archetype != *local_archetype || delta.slot != local.id {
        return Verdict::Resync(ResyncReason::ArchetypeMismatch);
    }
    if !delta.is_well_formed() {
        return Verdict::Resync(ResyncReason::MalformedDelta);
    }

    let known = local.authoritative_generation();
    if delta.from_generation < known {
        return Verdict::Discard(DiscardReason::OlderGeneration);
    }
    if delta.from_generation > known {
        return Verdict::Resync(ResyncReason::GenerationGap {
            local: known,
            remote: delta.from_generation,
        });
    }

    if local.is_tentative() {
        return if delta.to_state == SlotState::Active
            && delta.owner == OwnerAuthority::Client(me)
        {
            Verdict::Confirm
        } else {
            Verdict::Conflict(MissReason::ClaimedByOther)
        };
    }

    if local.state.can_transition_to(delta.to_state, local.owner) {
        return Verdict::Apply;
    }
    if local.state == delta.to_state && local.generation == delta.to_generation {
        return Verdict::Discard(DiscardReason::AlreadyApplied);
    }
    Verdict::Resync(ResyncReason::StateMismatch {
        local: local.state,
        remote: delta.to_state,
    })
}
