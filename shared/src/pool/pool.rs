use std::collections::BTreeSet;

use log::{debug, trace};

use crate::{
    archetype::{Archetype, ArchetypeBehavior, ResetStatus},
    config::PoolPolicy,
    error::PoolError,
    gameplay::{SpawnContext, Transform},
    replication::SlotSnapshot,
    slot::{OwnerAuthority, SlotError, SlotRegistry, SlotState, SlotView},
    types::{Generation, PoolTag, SlotId, SlotKey},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseProgress {
    /// The slot is back in the free list
    Completed,
    /// The reset hook has not finished; the slot stays Releasing
    AwaitingReset,
    /// Sent to the server, which owns the release
    Requested,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub pooled: usize,
    pub reserved: usize,
    pub active: usize,
    pub releasing: usize,
}

impl PoolCounts {
    pub fn in_use(&self) -> usize {
        self.reserved + self.active + self.releasing
    }
}

/// All slots of one archetype, plus the behavior that drives their
/// instances.
pub struct Pool<H> {
    policy: PoolPolicy,
    registry: SlotRegistry<H>,
    behavior: Box<dyn ArchetypeBehavior<H>>,
    automatic_reset: bool,
    pending_resets: BTreeSet<SlotId>,
}

impl<H> Pool<H> {
    pub fn new(
        tag: PoolTag,
        archetype: Archetype,
        policy: PoolPolicy,
        behavior: Box<dyn ArchetypeBehavior<H>>,
        automatic_reset: bool,
    ) -> Self {
        let registry = SlotRegistry::new(tag, archetype, &policy);
        Self {
            policy,
            registry,
            behavior,
            automatic_reset,
            pending_resets: BTreeSet::new(),
        }
    }

    pub fn archetype(&self) -> &Archetype {
        self.registry.archetype()
    }

    pub fn tag(&self) -> PoolTag {
        self.registry.tag()
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &SlotRegistry<H> {
        &self.registry
    }

    pub fn capacity(&self) -> u16 {
        self.registry.capacity()
    }

    pub fn view(&self, slot: SlotId) -> Result<SlotView, PoolError> {
        Ok(self.registry.view(slot)?)
    }

    pub fn handle(&self, slot: SlotId) -> Option<&H> {
        self.registry.handle(slot)
    }

    pub fn handle_mut(&mut self, slot: SlotId) -> Option<&mut H> {
        self.registry.handle_mut(slot)
    }

    pub fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts::default();
        for slot in self.registry.iter() {
            match slot.state() {
                SlotState::Pooled => counts.pooled += 1,
                SlotState::Reserved => counts.reserved += 1,
                SlotState::Active => counts.active += 1,
                SlotState::Releasing => counts.releasing += 1,
            }
        }
        counts
    }

    /// Whether `key` still names a live activation of its slot.
    pub fn is_active(&self, key: SlotKey) -> bool {
        self.registry
            .view(key.slot())
            .map(|view| {
                view.state == SlotState::Active && view.generation == key.generation()
            })
            .unwrap_or(false)
    }

    pub fn is_reset_pending(&self, slot: SlotId) -> bool {
        self.pending_resets.contains(&slot)
    }

    /// Constructs a dormant instance for every slot that lacks one.
    pub fn preallocate(&mut self) -> usize {
        let mut constructed = 0;
        let slots: Vec<SlotId> = self
            .registry
            .iter()
            .filter(|slot| !slot.has_instance())
            .map(|slot| slot.id())
            .collect();
        for slot in slots {
            let handle = self.behavior.on_construct(self.registry.archetype(), slot);
            if self.registry.park(slot, handle).is_ok() {
                constructed += 1;
            }
        }
        constructed
    }

    pub fn grow_to(&mut self, capacity: u16) -> Result<(), PoolError> {
        Ok(self.registry.grow_to(capacity)?)
    }

    fn allocate(&mut self) -> Result<SlotId, PoolError> {
        let archetype = self.registry.archetype().clone();
        self.registry.allocate(&archetype).map_err(|error| match error {
            SlotError::CapacityExceeded {
                archetype,
                max_size,
            } => PoolError::PoolExhausted {
                archetype,
                max_size,
            },
            other => other.into(),
        })
    }

    /// Takes the lowest free slot straight to Active.
    pub fn acquire(
        &mut self,
        owner: OwnerAuthority,
        context: &SpawnContext,
    ) -> Result<SlotKey, PoolError> {
        let slot = self.allocate()?;
        let generation = self.registry.view(slot)?.generation;
        self.activate(slot, generation, owner, context)
    }

    /// Claims the lowest free slot for a prediction awaiting confirmation.
    pub fn reserve(&mut self, owner: OwnerAuthority) -> Result<SlotKey, PoolError> {
        let slot = self.allocate()?;
        let generation = self.registry.view(slot)?.generation;
        let view = self
            .registry
            .transition(slot, generation, SlotState::Reserved, owner)?;
        Ok(view.key())
    }

    /// Moves a Pooled or Reserved slot to Active and hands it its instance.
    pub fn activate(
        &mut self,
        slot: SlotId,
        expected_generation: Generation,
        owner: OwnerAuthority,
        context: &SpawnContext,
    ) -> Result<SlotKey, PoolError> {
        let view = self
            .registry
            .transition(slot, expected_generation, SlotState::Active, owner)?;
        self.bring_online(view.key(), context)?;
        Ok(view.key())
    }

    /// Moves a slot to Active without bringing an instance online, for an
    /// activation local gameplay already cancelled.
    pub fn activate_unseen(
        &mut self,
        slot: SlotId,
        expected_generation: Generation,
        owner: OwnerAuthority,
        transform: Option<Transform>,
    ) -> Result<SlotKey, PoolError> {
        let view = self
            .registry
            .transition(slot, expected_generation, SlotState::Active, owner)?;
        self.registry.set_transform(slot, transform)?;
        Ok(view.key())
    }

    fn bring_online(&mut self, key: SlotKey, context: &SpawnContext) -> Result<(), PoolError> {
        let slot = key.slot();
        let handle = match self.registry.take_dormant(slot) {
            Some(handle) => handle,
            None => self.behavior.on_construct(self.registry.archetype(), slot),
        };
        self.registry.attach_handle(slot, handle)?;
        self.registry.set_transform(slot, context.transform)?;
        if let Some(handle) = self.registry.handle_mut(slot) {
            self.behavior.on_activate(handle, key, context);
        }
        Ok(())
    }

    /// Settles a tentative activation on its authoritative owner.
    pub fn confirm(&mut self, key: SlotKey, owner: OwnerAuthority) -> Result<SlotKey, PoolError> {
        let view = self
            .registry
            .transition(key.slot(), key.generation(), SlotState::Active, owner)?;
        Ok(view.key())
    }

    /// Active -> Releasing, running the reset hook.
    pub fn start_releasing(&mut self, key: SlotKey) -> Result<ResetStatus, PoolError> {
        let slot = key.slot();
        let owner = self.registry.view(slot)?.owner;
        self.registry
            .transition(slot, key.generation(), SlotState::Releasing, owner)?;
        let status = match self.registry.handle_mut(slot) {
            Some(handle) => self.behavior.on_deactivate(handle),
            None => ResetStatus::Complete,
        };
        if status == ResetStatus::Pending {
            debug!("Slot {} is waiting on its reset hook", slot);
            self.pending_resets.insert(slot);
        }
        Ok(status)
    }

    /// Releasing -> Pooled. Refused while the reset hook is still pending.
    pub fn finish_release(&mut self, slot: SlotId) -> Result<(), PoolError> {
        let view = self.registry.view(slot)?;
        if self.pending_resets.contains(&slot) {
            return Err(PoolError::InvalidTransition {
                slot,
                from: SlotState::Releasing.name(),
                to: SlotState::Pooled.name(),
            });
        }
        if view.state != SlotState::Releasing {
            return Err(PoolError::InvalidTransition {
                slot,
                from: view.state.name(),
                to: SlotState::Pooled.name(),
            });
        }
        let was_live = view.is_live;
        if self.automatic_reset {
            if let Some(handle) = self.registry.handle_mut(slot) {
                self.behavior.restore_defaults(handle);
            }
        }
        self.registry
            .transition(slot, view.generation, SlotState::Pooled, OwnerAuthority::None)?;
        if was_live {
            self.behavior.on_released(slot);
        }
        Ok(())
    }

    /// Release on the authority: reset, then return to the free list as soon
    /// as the reset completes.
    pub fn release(&mut self, key: SlotKey) -> Result<ReleaseProgress, PoolError> {
        match self.start_releasing(key)? {
            ResetStatus::Complete => {
                self.finish_release(key.slot())?;
                Ok(ReleaseProgress::Completed)
            }
            ResetStatus::Pending => Ok(ReleaseProgress::AwaitingReset),
        }
    }

    /// Records that a pending reset hook finished.
    pub fn mark_reset_complete(&mut self, slot: SlotId) -> Result<(), PoolError> {
        self.registry.view(slot)?;
        if !self.pending_resets.remove(&slot) {
            return Err(PoolError::ResetNotPending { slot });
        }
        Ok(())
    }

    /// Drops a tentative Reserved or optimistic Active slot back to Pooled,
    /// discarding whatever it showed.
    pub fn rollback(&mut self, slot: SlotId) -> Result<(), PoolError> {
        let view = self.registry.view(slot)?;
        if !view.is_tentative() {
            return Err(PoolError::InvalidTransition {
                slot,
                from: view.state.name(),
                to: SlotState::Pooled.name(),
            });
        }
        if let Some(handle) = self.registry.handle_mut(slot) {
            // forced teardown, completion is not awaited
            let _ = self.behavior.on_deactivate(handle);
        }
        self.registry
            .transition(slot, view.generation, SlotState::Pooled, OwnerAuthority::None)?;
        trace!("Rolled back tentative slot {}", slot);
        Ok(())
    }

    /// Overwrites a slot with the server's view of it, tearing down or
    /// bringing up the local instance as needed.
    pub fn adopt(&mut self, snapshot: &SlotSnapshot) -> Result<SlotView, PoolError> {
        let slot = SlotId::new(self.tag(), snapshot.index);
        self.registry.grow_to(snapshot.index.saturating_add(1))?;
        let before = self.registry.view(slot)?;

        let keeps_instance = before.is_live
            && snapshot.state != SlotState::Pooled
            && before.authoritative_generation() == snapshot.generation
            && before.owner.confirmed() == snapshot.owner;
        if before.is_live && !keeps_instance {
            if let Some(handle) = self.registry.handle_mut(slot) {
                // a Releasing instance was already torn down
                if before.state == SlotState::Releasing {
                    if self.automatic_reset {
                        self.behavior.restore_defaults(handle);
                    }
                } else {
                    let _ = self.behavior.on_deactivate(handle);
                }
            }
            self.registry.park_live(slot)?;
            if snapshot.state == SlotState::Pooled {
                self.behavior.on_released(slot);
            }
        }
        let was_pending = self.pending_resets.remove(&slot);

        let after = self.registry.adopt(
            slot,
            snapshot.state,
            snapshot.owner,
            snapshot.generation,
            snapshot.transform,
        )?;
        if after.state == SlotState::Active && !after.is_live {
            let context = SpawnContext {
                transform: snapshot.transform,
            };
            self.bring_online(after.key(), &context)?;
        }
        if after.state == SlotState::Releasing && keeps_instance {
            if before.state == SlotState::Active {
                if let Some(handle) = self.registry.handle_mut(slot) {
                    if self.behavior.on_deactivate(handle) == ResetStatus::Pending {
                        self.pending_resets.insert(slot);
                    }
                }
            } else if was_pending {
                self.pending_resets.insert(slot);
            }
        }
        Ok(self.registry.view(slot)?)
    }

    /// Releases every slot in use, forcing reset completion. Returns the
    /// slots that went back to the free list.
    pub fn force_release_all(&mut self) -> Vec<SlotId> {
        let mut released = Vec::new();
        let slots: Vec<SlotView> = self
            .registry
            .iter()
            .map(|slot| slot.view())
            .filter(|view| view.state.is_in_use())
            .collect();
        for view in slots {
            let result = if view.is_tentative() {
                self.rollback(view.id)
            } else {
                if view.state == SlotState::Active {
                    if let Err(error) = self.start_releasing(view.key()) {
                        debug!("Could not start releasing {}: {}", view.id, error);
                        continue;
                    }
                }
                self.pending_resets.remove(&view.id);
                self.finish_release(view.id)
            };
            match result {
                Ok(()) => released.push(view.id),
                Err(error) => debug!("Could not force release {}: {}", view.id, error),
            }
        }
        released
    }
}
