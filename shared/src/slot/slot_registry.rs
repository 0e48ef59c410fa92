use std::collections::BTreeSet;

use log::trace;

use crate::{
    archetype::Archetype,
    config::PoolPolicy,
    gameplay::Transform,
    slot::{OwnerAuthority, Slot, SlotError, SlotState, SlotView},
    types::{Generation, PoolTag, SlotId},
};

/// Growable table of slots for one archetype. `transition` is the only way
/// slot state changes; the free list follows it.
pub struct SlotRegistry<H> {
    tag: PoolTag,
    archetype: Archetype,
    max_size: u16,
    growth_increment: u16,
    slots: Vec<Slot<H>>,
    free: BTreeSet<u16>,
}

impl<H> SlotRegistry<H> {
    pub fn new(tag: PoolTag, archetype: Archetype, policy: &PoolPolicy) -> Self {
        let mut registry = Self {
            tag,
            archetype,
            max_size: policy.max_size,
            growth_increment: policy.growth_increment,
            slots: Vec::new(),
            free: BTreeSet::new(),
        };
        registry.grow(policy.initial_size);
        registry
    }

    pub fn tag(&self) -> PoolTag {
        self.tag
    }

    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn max_size(&self) -> u16 {
        self.max_size
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Picks the lowest-id Pooled slot, growing by the policy increment when
    /// none is free. Does not change the slot's state.
    pub fn allocate(&mut self, archetype: &Archetype) -> Result<SlotId, SlotError> {
        if *archetype != self.archetype {
            return Err(SlotError::ArchetypeMismatch {
                expected: self.archetype.to_string(),
                actual: archetype.to_string(),
            });
        }
        if self.free.is_empty() && self.grow(self.growth_increment) == 0 {
            return Err(SlotError::CapacityExceeded {
                archetype: self.archetype.to_string(),
                max_size: self.max_size,
            });
        }
        match self.free.iter().next() {
            Some(index) => Ok(SlotId::new(self.tag, *index)),
            None => Err(SlotError::CapacityExceeded {
                archetype: self.archetype.to_string(),
                max_size: self.max_size,
            }),
        }
    }

    /// Grows until `capacity` slots exist, used when a remote peer refers to
    /// a slot this side has not created yet.
    pub fn grow_to(&mut self, capacity: u16) -> Result<(), SlotError> {
        if capacity > self.max_size {
            return Err(SlotError::CapacityExceeded {
                archetype: self.archetype.to_string(),
                max_size: self.max_size,
            });
        }
        let current = self.capacity();
        if capacity > current {
            self.grow(capacity - current);
        }
        Ok(())
    }

    fn grow(&mut self, additional: u16) -> u16 {
        let current = self.capacity();
        let target = current.saturating_add(additional).min(self.max_size);
        for index in current..target {
            self.slots.push(Slot::new(SlotId::new(self.tag, index)));
            self.free.insert(index);
        }
        if target > current {
            trace!(
                "Pool {} grew from {} to {} slots",
                self.archetype,
                current,
                target
            );
        }
        target - current
    }

    fn index_of(&self, slot: SlotId) -> Result<usize, SlotError> {
        let index = usize::from(slot.index());
        if slot.pool() != self.tag || index >= self.slots.len() {
            return Err(SlotError::UnknownSlot { slot });
        }
        Ok(index)
    }

    pub fn get(&self, slot: SlotId) -> Result<&Slot<H>, SlotError> {
        let index = self.index_of(slot)?;
        Ok(&self.slots[index])
    }

    pub fn view(&self, slot: SlotId) -> Result<SlotView, SlotError> {
        self.get(slot).map(|slot| slot.view())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot<H>> {
        self.slots.iter()
    }

    pub fn slots_in(&self, state: SlotState) -> Vec<SlotId> {
        self.slots
            .iter()
            .filter(|slot| slot.state == state)
            .map(|slot| slot.id)
            .collect()
    }

    /// Moves a slot along one lifecycle edge.
    ///
    /// Entering Active bumps the generation. Rolling a tentative activation
    /// back to Pooled restores the generation it had before. Entering Pooled
    /// parks the live instance and clears ownership.
    pub fn transition(
        &mut self,
        slot_id: SlotId,
        expected_generation: Generation,
        next: SlotState,
        owner: OwnerAuthority,
    ) -> Result<SlotView, SlotError> {
        let index = self.index_of(slot_id)?;
        let slot = &mut self.slots[index];

        if slot.generation != expected_generation {
            return Err(SlotError::StaleGeneration {
                slot: slot_id,
                expected: expected_generation,
                actual: slot.generation,
            });
        }

        let from = slot.state;
        let owner_fits = match next {
            SlotState::Pooled => true,
            SlotState::Reserved => owner.is_predicting(),
            SlotState::Active | SlotState::Releasing => owner != OwnerAuthority::None,
        };
        if !from.can_transition_to(next, slot.owner) || !owner_fits {
            return Err(SlotError::InvalidTransition {
                slot: slot_id,
                from: from.name(),
                to: next.name(),
            });
        }

        match (from, next) {
            (SlotState::Pooled, SlotState::Active) | (SlotState::Reserved, SlotState::Active) => {
                slot.generation = slot.generation.wrapping_add(1);
            }
            (SlotState::Active, SlotState::Pooled) => {
                slot.generation = slot.generation.wrapping_sub(1);
            }
            _ => {}
        }

        slot.state = next;
        if next == SlotState::Pooled {
            slot.owner = OwnerAuthority::None;
            slot.transform = None;
            if let Some(handle) = slot.handle.take() {
                slot.dormant = Some(handle);
            }
            self.free.insert(slot_id.index());
        } else {
            slot.owner = owner;
            if from == SlotState::Pooled {
                self.free.remove(&slot_id.index());
            }
        }

        trace!(
            "Slot {} ({}) {} -> {} at generation {}",
            slot_id,
            self.archetype,
            from,
            next,
            self.slots[index].generation
        );

        Ok(self.slots[index].view())
    }

    /// Overwrites a slot with the server's snapshot of it. Only a resync may
    /// bypass `transition`.
    pub fn adopt(
        &mut self,
        slot_id: SlotId,
        state: SlotState,
        owner: OwnerAuthority,
        generation: Generation,
        transform: Option<Transform>,
    ) -> Result<SlotView, SlotError> {
        let index = self.index_of(slot_id)?;
        let slot = &mut self.slots[index];
        slot.state = state;
        slot.generation = generation;
        if state == SlotState::Pooled {
            slot.owner = OwnerAuthority::None;
            slot.transform = None;
            if let Some(handle) = slot.handle.take() {
                slot.dormant = Some(handle);
            }
            self.free.insert(slot_id.index());
        } else {
            slot.owner = owner;
            slot.transform = transform;
            self.free.remove(&slot_id.index());
        }
        Ok(self.slots[index].view())
    }

    pub fn set_transform(&mut self, slot: SlotId, transform: Option<Transform>) -> Result<(), SlotError> {
        let index = self.index_of(slot)?;
        self.slots[index].transform = transform;
        Ok(())
    }

    /// Installs the live instance of an Active slot.
    pub fn attach_handle(&mut self, slot: SlotId, handle: H) -> Result<(), SlotError> {
        let index = self.index_of(slot)?;
        let entry = &mut self.slots[index];
        if entry.handle.is_some() {
            return Err(SlotError::HandleAlreadyLive { slot });
        }
        if entry.state != SlotState::Active {
            return Err(SlotError::InvalidTransition {
                slot,
                from: entry.state.name(),
                to: SlotState::Active.name(),
            });
        }
        entry.handle = Some(handle);
        Ok(())
    }

    /// Moves the live instance back to the dormant spot.
    pub fn park_live(&mut self, slot: SlotId) -> Result<(), SlotError> {
        let index = self.index_of(slot)?;
        let entry = &mut self.slots[index];
        if let Some(handle) = entry.handle.take() {
            entry.dormant = Some(handle);
        }
        Ok(())
    }

    pub fn take_dormant(&mut self, slot: SlotId) -> Option<H> {
        let index = self.index_of(slot).ok()?;
        self.slots[index].dormant.take()
    }

    /// Parks an instance built ahead of use.
    pub fn park(&mut self, slot: SlotId, handle: H) -> Result<(), SlotError> {
        let index = self.index_of(slot)?;
        let entry = &mut self.slots[index];
        if entry.has_instance() {
            return Err(SlotError::HandleAlreadyLive { slot });
        }
        entry.dormant = Some(handle);
        Ok(())
    }

    pub fn handle(&self, slot: SlotId) -> Option<&H> {
        let index = self.index_of(slot).ok()?;
        self.slots[index].handle.as_ref()
    }

    pub fn handle_mut(&mut self, slot: SlotId) -> Option<&mut H> {
        let index = self.index_of(slot).ok()?;
        self.slots[index].handle.as_mut()
    }
}
