//! Small per-patch table of neighbor patch ids.
//!
//! Cross-patch references store an 8-bit stash index rather than the full
//! patch id. Entries are unique and never removed, so an index stays valid
//! for the life of the patch.

use crate::topology::handle::INVALID32;

/// Number of neighbor patches a patch may reference.
pub const STASH_SIZE: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchStash {
    ids: [u32; STASH_SIZE],
}

impl Default for PatchStash {
    fn default() -> Self {
        Self {
            ids: [INVALID32; STASH_SIZE],
        }
    }
}

impl PatchStash {
    #[inline]
    pub fn get(&self, index: u8) -> Option<u32> {
        self.ids
            .get(index as usize)
            .copied()
            .filter(|&id| id != INVALID32)
    }

    pub fn find_patch_index(&self, patch: u32) -> Option<u8> {
        self.ids
            .iter()
            .take_while(|&&id| id != INVALID32)
            .position(|&id| id == patch)
            .map(|i| i as u8)
    }

    /// Index of `patch`, inserting it if absent. `None` when the stash is full.
    pub fn insert_patch(&mut self, patch: u32) -> Option<u8> {
        debug_assert_ne!(patch, INVALID32);
        for (i, id) in self.ids.iter_mut().enumerate() {
            if *id == patch {
                return Some(i as u8);
            }
            if *id == INVALID32 {
                *id = patch;
                return Some(i as u8);
            }
        }
        None
    }

    /// Whether `patch` is present or could be inserted.
    pub fn has_room_for(&self, patch: u32) -> bool {
        self.find_patch_index(patch).is_some() || self.len() < STASH_SIZE
    }

    pub fn len(&self) -> usize {
        self.ids.iter().take_while(|&&id| id != INVALID32).count()
    }

    pub fn is_empty(&self) -> bool {
        self.ids[0] == INVALID32
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.ids
            .iter()
            .take_while(|&&id| id != INVALID32)
            .enumerate()
            .map(|(i, &id)| (i as u8, id))
    }
}
