//! Patch-local lookup table for elements a patch does not own.
//!
//! An [`LPPair`] packs three fields into one `u32`:
//!
//! ```text
//!  31        20 19         8 7       0
//! +------------+------------+---------+
//! |  local id  | owner local| stash   |
//! +------------+------------+---------+
//! ```
//!
//! `stash` indexes the patch's [`PatchStash`](crate::topology::patch_stash::PatchStash)
//! instead of storing the owner's 32-bit patch id.
//!
//! [`LPHashTable`] is an open-addressed map keyed by the local id, with linear
//! probing and tombstones. Lookups stop at the first empty slot; at least one
//! empty slot is always kept.

use crate::topology::handle::INVALID12;
use static_assertions::assert_eq_size;
use thiserror::Error;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LPPair(u32);

assert_eq_size!(LPPair, u32);

impl LPPair {
    const EMPTY: LPPair = LPPair(u32::MAX);
    const TOMBSTONE: LPPair = LPPair(u32::MAX - 1);

    /// `local` in this patch is a copy of `owner_local` in the patch stored at
    /// `stash` in this patch's stash.
    #[inline]
    pub fn new(local: u16, owner_local: u16, stash: u8) -> Self {
        debug_assert!(local < INVALID12 && owner_local < INVALID12);
        LPPair((local as u32) << 20 | (owner_local as u32) << 8 | stash as u32)
    }

    #[inline]
    pub fn local(self) -> u16 {
        (self.0 >> 20) as u16
    }

    #[inline]
    pub fn owner_local(self) -> u16 {
        ((self.0 >> 8) & 0xFFF) as u16
    }

    #[inline]
    pub fn stash(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    #[inline]
    fn is_sentinel(self) -> bool {
        self.local() == INVALID12
    }
}

impl std::fmt::Debug for LPPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::EMPTY {
            return f.write_str("LPPair(empty)");
        }
        if *self == Self::TOMBSTONE {
            return f.write_str("LPPair(tombstone)");
        }
        write!(
            f,
            "LPPair({} -> stash[{}]:{})",
            self.local(),
            self.stash(),
            self.owner_local()
        )
    }
}

/// Returned when an insert finds no room.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("LP hash table full ({capacity} slots)")]
pub struct LPTableFull {
    pub capacity: usize,
}

enum Probe {
    Hit(usize),
    Vacant(usize),
    Exhausted,
}

#[derive(Clone, Debug)]
pub struct LPHashTable {
    slots: Vec<LPPair>,
    len: usize,
    tombstones: usize,
}

impl LPHashTable {
    /// A table able to hold `expected` pairs at roughly `load_factor` occupancy.
    pub fn with_capacity(expected: usize, load_factor: f32) -> Self {
        let load_factor = load_factor.clamp(0.1, 0.9);
        let wanted = ((expected.max(1) as f32) / load_factor).ceil() as usize;
        let capacity = wanted.next_power_of_two().max(16);
        Self {
            slots: vec![LPPair::EMPTY; capacity],
            len: 0,
            tombstones: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// How many more distinct keys fit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - 1 - self.len
    }

    #[inline]
    fn home(&self, key: u16) -> usize {
        ((key as u32).wrapping_mul(0x9E37_79B9) >> 16) as usize & (self.slots.len() - 1)
    }

    fn probe(&self, key: u16) -> Probe {
        let mask = self.slots.len() - 1;
        let mut slot = self.home(key);
        let mut first_tombstone = None;
        for _ in 0..self.slots.len() {
            let pair = self.slots[slot];
            if pair == LPPair::EMPTY {
                return Probe::Vacant(first_tombstone.unwrap_or(slot));
            }
            if pair == LPPair::TOMBSTONE {
                first_tombstone.get_or_insert(slot);
            } else if pair.local() == key {
                return Probe::Hit(slot);
            }
            slot = (slot + 1) & mask;
        }
        match first_tombstone {
            Some(slot) => Probe::Vacant(slot),
            None => Probe::Exhausted,
        }
    }

    /// Insert `pair`, replacing any pair with the same local id.
    pub fn insert(&mut self, pair: LPPair) -> Result<(), LPTableFull> {
        debug_assert!(!pair.is_sentinel());
        match self.probe(pair.local()) {
            Probe::Hit(slot) => {
                self.slots[slot] = pair;
                Ok(())
            }
            Probe::Vacant(slot) => {
                if self.slots[slot] == LPPair::TOMBSTONE {
                    self.tombstones -= 1;
                } else if self.len + self.tombstones + 1 >= self.capacity() {
                    if self.tombstones == 0 {
                        return Err(LPTableFull {
                            capacity: self.capacity(),
                        });
                    }
                    self.rehash();
                    return self.insert(pair);
                }
                self.slots[slot] = pair;
                self.len += 1;
                Ok(())
            }
            Probe::Exhausted => Err(LPTableFull {
                capacity: self.capacity(),
            }),
        }
    }

    pub fn find(&self, local: u16) -> Option<LPPair> {
        match self.probe(local) {
            Probe::Hit(slot) => Some(self.slots[slot]),
            _ => None,
        }
    }

    pub fn remove(&mut self, local: u16) -> Option<LPPair> {
        match self.probe(local) {
            Probe::Hit(slot) => {
                let pair = self.slots[slot];
                self.slots[slot] = LPPair::TOMBSTONE;
                self.len -= 1;
                self.tombstones += 1;
                Some(pair)
            }
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slots.fill(LPPair::EMPTY);
        self.len = 0;
        self.tombstones = 0;
    }

    /// Live pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = LPPair> + '_ {
        self.slots.iter().copied().filter(|p| !p.is_sentinel())
    }

    /// Make room for `additional` more pairs, moving to a larger table when
    /// the current one cannot take them.
    pub fn reserve(&mut self, additional: usize) {
        if self.remaining() >= additional {
            return;
        }
        let slots = (self.len + additional + 1)
            .next_power_of_two()
            .max(2 * self.capacity());
        self.resize(slots);
    }

    fn rehash(&mut self) {
        self.resize(self.capacity());
    }

    fn resize(&mut self, slots: usize) {
        let live: Vec<LPPair> = self.iter().collect();
        self.slots = vec![LPPair::EMPTY; slots];
        self.len = 0;
        self.tombstones = 0;
        for pair in live {
            if let Probe::Vacant(slot) = self.probe(pair.local()) {
                self.slots[slot] = pair;
                self.len += 1;
            }
        }
    }
}

impl PartialEq for LPHashTable {
    /// Two tables are equal when they hold the same pairs, wherever they sit.
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        self.iter().all(|p| other.find(p.local()) == Some(p))
    }
}

impl Eq for LPHashTable {}
