//! Slab allocator for backing stores.
//!
//! Hands out even, nonzero 64-bit refs so that a store ref can share a cell
//! word with the tagged-inline encoding (low bit clear distinguishes a ref
//! from an inline value). Refs stay stable for the lifetime of the store, so
//! a parent cell only rewrites its word when the cell changes representation.

use crate::error::{LinkError, Result};

use super::int_store::IntStore;

/// Handle to a store held by an [`Arena`]. Always even and nonzero.
pub type StoreRef = u64;

#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Option<IntStore>>,
    free: Vec<usize>,
    capacity: Option<usize>,
    live: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// An arena refusing to hold more than `capacity` live stores. Used by
    /// tests to exercise allocation failure; production databases run
    /// unbounded.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn live_stores(&self) -> usize {
        self.live
    }

    /// Takes ownership of `store` and returns its ref. Fails without side
    /// effects when the capacity limit is reached.
    pub fn alloc(&mut self, store: IntStore) -> Result<StoreRef> {
        if let Some(cap) = self.capacity {
            if self.live >= cap {
                return Err(LinkError::AllocationFailure("arena capacity exhausted"));
            }
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(store);
                slot
            }
            None => {
                self.slots.push(Some(store));
                self.slots.len() - 1
            }
        };
        self.live += 1;
        Ok(encode_slot(slot))
    }

    /// Releases the store behind `r`, returning it so that a demoting cell
    /// can steal the surviving value.
    pub fn free(&mut self, r: StoreRef) -> Result<IntStore> {
        let slot = self.live_slot_of(r)?;
        let store = self.slots[slot]
            .take()
            .ok_or(LinkError::InvariantViolation("double free of store ref"))?;
        self.free.push(slot);
        self.live -= 1;
        Ok(store)
    }

    pub fn get(&self, r: StoreRef) -> Result<&IntStore> {
        let slot = self.live_slot_of(r)?;
        self.slots[slot]
            .as_ref()
            .ok_or(LinkError::InvariantViolation("dangling store ref"))
    }

    pub fn get_mut(&mut self, r: StoreRef) -> Result<&mut IntStore> {
        let slot = self.live_slot_of(r)?;
        self.slots[slot]
            .as_mut()
            .ok_or(LinkError::InvariantViolation("dangling store ref"))
    }

    pub fn contains(&self, r: StoreRef) -> bool {
        match self.live_slot_of(r) {
            Ok(slot) => self.slots[slot].is_some(),
            Err(_) => false,
        }
    }

    /// Re-installs a store under a specific ref. Only the snapshot reader
    /// uses this; the ref must decode to a slot and must not be live.
    pub fn adopt(&mut self, r: StoreRef, store: IntStore) -> Result<()> {
        let slot = self.slot_of(r)?;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        if self.slots[slot].is_some() {
            return Err(LinkError::InvariantViolation("store ref adopted twice"));
        }
        self.slots[slot] = Some(store);
        self.live += 1;
        Ok(())
    }

    /// Rebuilds the free list after a sequence of [`Arena::adopt`] calls.
    pub fn rebuild_free_list(&mut self) {
        self.free = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect();
    }

    /// All live refs, in slot order.
    pub fn refs(&self) -> impl Iterator<Item = StoreRef> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| encode_slot(i)))
    }

    fn slot_of(&self, r: StoreRef) -> Result<usize> {
        if r == 0 || r & 1 != 0 {
            return Err(LinkError::InvariantViolation("malformed store ref"));
        }
        Ok((r >> 1) as usize - 1)
    }

    fn live_slot_of(&self, r: StoreRef) -> Result<usize> {
        let slot = self.slot_of(r)?;
        if slot >= self.slots.len() {
            return Err(LinkError::InvariantViolation("store ref out of bounds"));
        }
        Ok(slot)
    }
}

fn encode_slot(slot: usize) -> StoreRef {
    ((slot as u64) + 1) << 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_even_and_nonzero() -> Result<()> {
        let mut arena = Arena::new();
        for _ in 0..5 {
            let r = arena.alloc(IntStore::new())?;
            assert_ne!(r, 0);
            assert_eq!(r & 1, 0);
        }
        Ok(())
    }

    #[test]
    fn free_returns_store_and_recycles_slot() -> Result<()> {
        let mut arena = Arena::new();
        let r = arena.alloc(IntStore::create(2, 9))?;
        let store = arena.free(r)?;
        assert_eq!(store.size(), 2);
        assert_eq!(arena.live_stores(), 0);
        let r2 = arena.alloc(IntStore::new())?;
        assert_eq!(r, r2);
        Ok(())
    }

    #[test]
    fn capacity_limit_surfaces_allocation_failure() {
        let mut arena = Arena::with_capacity_limit(1);
        arena.alloc(IntStore::new()).unwrap();
        assert!(matches!(
            arena.alloc(IntStore::new()),
            Err(LinkError::AllocationFailure(_))
        ));
    }

    #[test]
    fn stale_refs_are_rejected() {
        let mut arena = Arena::new();
        let r = arena.alloc(IntStore::new()).unwrap();
        arena.free(r).unwrap();
        assert!(arena.get(r).is_err());
        assert!(!arena.contains(r));
        assert!(arena.get(3).is_err());
        assert!(arena.get(0).is_err());
    }
}
