//! Generational arena
//!
//! Every slot carries a generation counter that is bumped whenever its value
//! is taken out. A [`SlotKey`] remembers the generation it was issued for, so
//! a key that outlives its value resolves to `None` rather than to whatever
//! moved into the slot afterwards.
//!
//! Vacant slots form an intrusive free list threaded through the slot array;
//! the most recently freed slot is reused first.

use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

const NO_SLOT: u32 = u32::MAX;

/// Generation-checked index into a [`SlotMap<T>`]
pub struct SlotKey<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlotKey<T> {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Position of the slot in the arena
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation the key was issued for
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    fn parts(&self) -> (u32, u32) {
        (self.index, self.generation)
    }
}

// The phantom parameter must not add bounds on `T`, hence no derives
impl<T> Clone for SlotKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotKey<T> {}

impl<T> PartialEq for SlotKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.parts() == other.parts()
    }
}

impl<T> Eq for SlotKey<T> {}

impl<T> PartialOrd for SlotKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for SlotKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts().cmp(&other.parts())
    }
}

impl<T> Hash for SlotKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts().hash(state);
    }
}

impl<T> fmt::Debug for SlotKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: u32 },
}

impl<T> Entry<T> {
    fn generation(&self) -> u32 {
        match self {
            Self::Occupied { generation, .. } | Self::Vacant { generation, .. } => *generation,
        }
    }

    fn value_for(&self, key: SlotKey<T>) -> Option<&T> {
        match self {
            Self::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    fn value_for_mut(&mut self, key: SlotKey<T>) -> Option<&mut T> {
        match self {
            Self::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }
}

/// Arena addressed by [`SlotKey`]
///
/// Iteration visits slots in index order, which is insertion order until a
/// freed slot gets reused.
pub struct SlotMap<T> {
    entries: Vec<Entry<T>>,
    free_head: u32,
    len: usize,
}

impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: NO_SLOT,
            len: 0,
        }
    }

    /// Store `value` and return its key
    pub fn insert(&mut self, value: T) -> SlotKey<T> {
        self.len += 1;

        if self.free_head == NO_SLOT {
            let index = self.entries.len() as u32;
            self.entries.push(Entry::Occupied { generation: 0, value });
            return SlotKey::new(index, 0);
        }

        let index = self.free_head;
        let entry = &mut self.entries[index as usize];
        let (generation, next_free) = match *entry {
            Entry::Vacant { generation, next_free } => (generation, next_free),
            Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
        };
        *entry = Entry::Occupied { generation, value };
        self.free_head = next_free;
        SlotKey::new(index, generation)
    }

    /// Take the value out. Stale keys return `None`.
    pub fn remove(&mut self, key: SlotKey<T>) -> Option<T> {
        let entry = self.entries.get_mut(key.index as usize)?;
        entry.value_for(key)?;

        let vacant = Entry::Vacant {
            generation: key.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        self.free_head = key.index;
        self.len -= 1;
        match core::mem::replace(entry, vacant) {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    pub fn get(&self, key: SlotKey<T>) -> Option<&T> {
        self.entries.get(key.index as usize)?.value_for(key)
    }

    pub fn get_mut(&mut self, key: SlotKey<T>) -> Option<&mut T> {
        self.entries.get_mut(key.index as usize)?.value_for_mut(key)
    }

    /// Borrow two distinct values mutably.
    ///
    /// `None` when either key is stale or both address the same slot.
    pub fn get_pair_mut(&mut self, a: SlotKey<T>, b: SlotKey<T>) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.index as usize, b.index as usize);
        if ia == ib || ia.max(ib) >= self.entries.len() {
            return None;
        }

        let (low, high) = self.entries.split_at_mut(ia.max(ib));
        let (entry_a, entry_b) = if ia < ib {
            (&mut low[ia], &mut high[0])
        } else {
            (&mut high[0], &mut low[ib])
        };
        Some((entry_a.value_for_mut(a)?, entry_b.value_for_mut(b)?))
    }

    pub fn contains_key(&self, key: SlotKey<T>) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every value. Outstanding keys become stale.
    pub fn clear(&mut self) {
        for index in 0..self.entries.len() {
            if matches!(self.entries[index], Entry::Occupied { .. }) {
                self.remove(SlotKey::new(index as u32, self.entries[index].generation()));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey<T>, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((SlotKey::new(index as u32, *generation), value))
                }
                Entry::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey<T>, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((SlotKey::new(index as u32, *generation), value))
                }
                Entry::Vacant { .. } => None,
            })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.iter().map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.iter_mut().map(|(_, value)| value)
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> core::ops::Index<SlotKey<T>> for SlotMap<T> {
    type Output = T;

    fn index(&self, key: SlotKey<T>) -> &T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("stale slot key {:?}", key),
        }
    }
}

impl<T> core::ops::IndexMut<SlotKey<T>> for SlotMap<T> {
    fn index_mut(&mut self, key: SlotKey<T>) -> &mut T {
        match self.get_mut(key) {
            Some(value) => value,
            None => panic!("stale slot key {:?}", key),
        }
    }
}
