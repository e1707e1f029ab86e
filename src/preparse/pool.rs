//! Fixed-capacity pools of parsed parameter sets, indexed by id.
//!
//! Each id keeps the instances it has had, oldest first. Pictures hold references to the
//! instance that was current when they were parsed, so a parameter set redefined mid-stream
//! stays alive until every picture using the old definition has been decoded. The newest
//! instance of an id is kept even when nothing references it, so lookups by id still resolve.

use std::collections::VecDeque;

/// Refers to one pooled instance. A handle to a freed instance resolves to nothing, even if
/// its entry has since been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Entry<T> {
    value: Option<T>,
    generation: u32,
    refs: u32,
}

#[derive(Debug)]
pub struct PoolExhausted;

#[derive(Debug)]
pub struct ParamSetPool<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    slots: Vec<VecDeque<Handle>>,
}
impl<T: PartialEq> ParamSetPool<T> {
    pub fn new(capacity: usize, id_slots: usize) -> Self {
        ParamSetPool {
            entries: (0..capacity)
                .map(|_| Entry {
                    value: None,
                    generation: 0,
                    refs: 0,
                })
                .collect(),
            free: (0..capacity as u32).rev().collect(),
            slots: (0..id_slots).map(|_| VecDeque::new()).collect(),
        }
    }

    fn entry(&self, handle: Handle) -> Option<&Entry<T>> {
        self.entries
            .get(handle.index as usize)
            .filter(|e| e.generation == handle.generation && e.value.is_some())
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry<T>> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation && e.value.is_some())
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// True if an insert for any id would succeed without reclaiming.
    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Makes `value` the newest instance of `id`.
    ///
    /// A value equal to the current newest instance is not stored again; its handle is
    /// returned. When the pool is full, an unreferenced newest instance of the same id is
    /// overwritten in place.
    pub fn insert(&mut self, id: usize, value: T) -> Result<Handle, PoolExhausted> {
        let Some(slot) = self.slots.get(id) else {
            return Err(PoolExhausted);
        };
        let head = slot.back().copied();
        if let Some(head) = head {
            if self.get(head) == Some(&value) {
                return Ok(head);
            }
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let reusable = head.filter(|&h| self.refs(h) == Some(0));
                let Some(head) = reusable else {
                    return Err(PoolExhausted);
                };
                self.slots[id].pop_back();
                self.release_entry(head);
                self.free.pop().ok_or(PoolExhausted)?
            }
        };
        let entry = &mut self.entries[index as usize];
        entry.value = Some(value);
        entry.refs = 0;
        let handle = Handle {
            index,
            generation: entry.generation,
        };
        self.slots[id].push_back(handle);
        self.prune(id);
        Ok(handle)
    }

    /// The newest instance of `id`.
    pub fn latest(&self, id: usize) -> Option<(Handle, &T)> {
        let handle = *self.slots.get(id)?.back()?;
        self.get(handle).map(|v| (handle, v))
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entry(handle).and_then(|e| e.value.as_ref())
    }

    pub fn refs(&self, handle: Handle) -> Option<u32> {
        self.entry(handle).map(|e| e.refs)
    }

    /// Is `handle` the newest instance of `id`?
    pub fn is_latest(&self, id: usize, handle: Handle) -> bool {
        self.slots
            .get(id)
            .and_then(|s| s.back())
            .is_some_and(|&h| h == handle)
    }

    pub fn add_ref(&mut self, handle: Handle) -> bool {
        match self.entry_mut(handle) {
            Some(e) => {
                e.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drops one reference from the oldest referenced instance of `id`, freeing it if that was
    /// the last reference and a newer instance exists. Returns false if no instance of `id`
    /// was referenced.
    pub fn release_oldest(&mut self, id: usize) -> bool {
        let Some(slot) = self.slots.get(id) else {
            return false;
        };
        let oldest = slot
            .iter()
            .copied()
            .find(|&h| self.refs(h).is_some_and(|r| r > 0));
        let Some(handle) = oldest else {
            return false;
        };
        if let Some(e) = self.entry_mut(handle) {
            e.refs -= 1;
        }
        self.prune(id);
        true
    }

    /// Frees every unreferenced instance of `id` except the newest.
    fn prune(&mut self, id: usize) {
        let Some(slot) = self.slots.get(id) else {
            return;
        };
        let newest = slot.back().copied();
        let stale: Vec<Handle> = slot
            .iter()
            .copied()
            .filter(|&h| Some(h) != newest && self.refs(h).unwrap_or(0) == 0)
            .collect();
        if stale.is_empty() {
            return;
        }
        self.slots[id].retain(|h| !stale.contains(h));
        for h in stale {
            self.release_entry(h);
        }
    }

    fn release_entry(&mut self, handle: Handle) {
        if let Some(e) = self.entries.get_mut(handle.index as usize) {
            if e.generation == handle.generation {
                e.value = None;
                e.refs = 0;
                e.generation = e.generation.wrapping_add(1);
                self.free.push(handle.index);
            }
        }
    }

    /// Number of instances currently held for `id`.
    pub fn instances(&self, id: usize) -> usize {
        self.slots.get(id).map_or(0, |s| s.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn latest_and_dedup() {
        let mut pool = ParamSetPool::new(4, 8);
        let a = pool.insert(5, "a").unwrap();
        assert_eq!(pool.latest(5), Some((a, &"a")));
        assert_eq!(pool.insert(5, "a").unwrap(), a);
        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.latest(4), None);
        assert!(pool.insert(8, "x").is_err());
    }

    #[test]
    fn unreferenced_older_instance_is_pruned() {
        let mut pool = ParamSetPool::new(4, 8);
        let a = pool.insert(5, "a").unwrap();
        let b = pool.insert(5, "b").unwrap();
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.instances(5), 1);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn shared_instance_released_twice() {
        let mut pool = ParamSetPool::new(4, 8);
        let h = pool.insert(5, "pps").unwrap();
        // two pictures refer to the same definition
        pool.add_ref(h);
        pool.add_ref(h);
        assert!(pool.release_oldest(5));
        assert_eq!(pool.refs(h), Some(1));
        assert!(pool.release_oldest(5));
        assert_eq!(pool.refs(h), Some(0));
        assert!(!pool.release_oldest(5));
        // still the current definition of id 5
        assert_eq!(pool.latest(5), Some((h, &"pps")));
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn redefined_between_pictures() {
        let mut pool = ParamSetPool::new(4, 8);
        let old = pool.insert(5, "old").unwrap();
        pool.add_ref(old);
        let new = pool.insert(5, "new").unwrap();
        pool.add_ref(new);
        assert_eq!(pool.instances(5), 2);
        assert_eq!(pool.free_count(), 2);

        assert!(pool.release_oldest(5));
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.free_count(), 3);

        assert!(pool.release_oldest(5));
        assert_eq!(pool.refs(new), Some(0));
        assert!(pool.is_latest(5, new));
        assert_eq!(pool.latest(5), Some((new, &"new")));
    }

    #[test]
    fn exhaustion_is_recoverable() {
        let mut pool = ParamSetPool::new(2, 8);
        let a = pool.insert(0, "a").unwrap();
        let b = pool.insert(1, "b").unwrap();
        pool.add_ref(a);
        assert!(!pool.has_free());
        assert!(pool.insert(2, "c").is_err());
        assert!(pool.insert(0, "a2").is_err());
        // the unreferenced head of id 1 is overwritten in place
        let b2 = pool.insert(1, "b2").unwrap();
        assert_eq!(pool.get(b), None);
        assert_eq!(pool.latest(1), Some((b2, &"b2")));
        assert!(pool.release_oldest(0));
        assert_eq!(pool.latest(0), Some((a, &"a")));
    }

    #[test]
    fn stale_handle_after_reuse() {
        let mut pool = ParamSetPool::new(1, 2);
        let a = pool.insert(0, 1u32).unwrap();
        let b = pool.insert(0, 2u32).unwrap();
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert_eq!(pool.get(a), None);
        assert!(!pool.add_ref(a));
    }
}
