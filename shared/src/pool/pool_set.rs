use std::collections::HashMap;

use crate::{
    archetype::Archetype,
    error::PoolError,
    pool::Pool,
    types::{PoolTag, SlotId},
};

/// Pools indexed both by archetype and by the tag embedded in slot ids.
pub struct PoolSet<H> {
    pools: Vec<Pool<H>>,
    tags: HashMap<Archetype, PoolTag>,
}

impl<H> PoolSet<H> {
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            tags: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn next_tag(&self) -> PoolTag {
        PoolTag::new(self.pools.len() as u16)
    }

    pub fn contains(&self, archetype: &Archetype) -> bool {
        self.tags.contains_key(archetype)
    }

    pub(crate) fn insert(&mut self, pool: Pool<H>) -> PoolTag {
        let tag = pool.tag();
        self.tags.insert(pool.archetype().clone(), tag);
        self.pools.push(pool);
        tag
    }

    pub fn get(&self, archetype: &Archetype) -> Option<&Pool<H>> {
        let tag = self.tags.get(archetype)?;
        self.pools.get(tag.as_index())
    }

    pub fn get_mut(&mut self, archetype: &Archetype) -> Option<&mut Pool<H>> {
        let tag = self.tags.get(archetype)?;
        self.pools.get_mut(tag.as_index())
    }

    pub fn try_get(&self, archetype: &Archetype) -> Result<&Pool<H>, PoolError> {
        self.get(archetype).ok_or_else(|| PoolError::UnknownArchetype {
            archetype: archetype.to_string(),
        })
    }

    pub fn try_get_mut(&mut self, archetype: &Archetype) -> Result<&mut Pool<H>, PoolError> {
        self.get_mut(archetype)
            .ok_or_else(|| PoolError::UnknownArchetype {
                archetype: archetype.to_string(),
            })
    }

    pub fn by_slot(&self, slot: SlotId) -> Result<&Pool<H>, PoolError> {
        self.pools
            .get(slot.pool().as_index())
            .ok_or(PoolError::UnknownSlot { slot })
    }

    pub fn by_slot_mut(&mut self, slot: SlotId) -> Result<&mut Pool<H>, PoolError> {
        self.pools
            .get_mut(slot.pool().as_index())
            .ok_or(PoolError::UnknownSlot { slot })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool<H>> {
        self.pools.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pool<H>> {
        self.pools.iter_mut()
    }

    pub fn archetypes(&self) -> Vec<Archetype> {
        self.pools.iter().map(|pool| pool.archetype().clone()).collect()
    }
}

impl<H> Default for PoolSet<H> {
    fn default() -> Self {
        Self::new()
    }
}
