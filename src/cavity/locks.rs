//! Patch locks held by one cavity pass.
//!
//! The home patch is locked when the pass opens. Neighbor patches are locked
//! on first use, never blocking: a lock that cannot be taken immediately, or a
//! patch already committed in this round, aborts the pass with
//! [`CavityError::Contention`]. Since no pass ever waits while holding a lock,
//! passes cannot deadlock.

use crate::cavity::CavityError;
use crate::context::Context;
use crate::topology::bitmask::Bitmask;
use crate::topology::patch_info::PatchInfo;
use hashbrown::HashMap;
use parking_lot::RwLockWriteGuard;

pub struct LockSet<'a> {
    ctx: &'a Context,
    home: u32,
    guards: HashMap<u32, RwLockWriteGuard<'a, PatchInfo>>,
    to_lock: Bitmask,
}

impl<'a> LockSet<'a> {
    /// Lock `home` for the duration of a pass.
    pub fn acquire_home(ctx: &'a Context, home: u32) -> Result<Self, CavityError> {
        let mut set = Self {
            ctx,
            home,
            guards: HashMap::new(),
            to_lock: Bitmask::new(ctx.num_patches() as usize),
        };
        set.acquire(home)?;
        Ok(set)
    }

    fn acquire(&mut self, patch: u32) -> Result<(), CavityError> {
        if self.guards.contains_key(&patch) {
            return Ok(());
        }
        let slot = self.ctx.patch(patch);
        if slot.is_touched() {
            return Err(CavityError::Contention { patch });
        }
        let guard = slot
            .try_write()
            .ok_or(CavityError::Contention { patch })?;
        // committed between the check and the lock
        if slot.is_touched() {
            return Err(CavityError::Contention { patch });
        }
        self.to_lock.set(patch as usize);
        self.guards.insert(patch, guard);
        Ok(())
    }

    /// Mutable access to `patch`, locking it if needed.
    pub fn get(&mut self, patch: u32) -> Result<&mut PatchInfo, CavityError> {
        self.acquire(patch)?;
        self.guards
            .get_mut(&patch)
            .map(|g| &mut **g)
            .ok_or(CavityError::Contention { patch })
    }

    pub fn home(&self) -> u32 {
        self.home
    }

    /// The committed record of the home patch.
    pub fn home_info(&mut self) -> &mut PatchInfo {
        let home = self.home;
        match self.guards.get_mut(&home) {
            Some(g) => g,
            None => unreachable!("home patch {home} is locked for the whole pass"),
        }
    }

    /// Patches currently held.
    pub fn to_lock(&self) -> &Bitmask {
        &self.to_lock
    }

    pub fn locked(&self) -> impl Iterator<Item = u32> + '_ {
        self.to_lock.iter_ones().map(|p| p as u32)
    }

    pub fn is_locked(&self, patch: u32) -> bool {
        self.guards.contains_key(&patch)
    }

    /// Flag every held patch as committed in this round.
    pub fn mark_touched(&self) {
        for patch in self.locked() {
            self.ctx.patch(patch).mark_touched();
        }
    }
}
