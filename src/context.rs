//! Shared mesh state visible to every block.
//!
//! The [`Context`] owns the patch records, each behind its own lock, the
//! global element counts and the per-kind prefix sums of owned elements. A
//! patch record is only written while its lock is held; the `touched` flag
//! marks patches committed during the current edit round.

use crate::scheduler::PatchScheduler;
use crate::topology::handle::ElementKind;
use crate::topology::patch_info::PatchInfo;
use hashbrown::HashSet;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug)]
pub struct PatchSlot {
    info: RwLock<PatchInfo>,
    touched: AtomicBool,
}

impl PatchSlot {
    pub fn new(info: PatchInfo) -> Self {
        Self {
            info: RwLock::new(info),
            touched: AtomicBool::new(false),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PatchInfo> {
        self.info.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PatchInfo> {
        self.info.write()
    }

    /// Non-blocking exclusive access.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, PatchInfo>> {
        self.info.try_write()
    }

    #[inline]
    pub fn is_touched(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_touched(&self) {
        self.touched.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn clear_touched(&self) {
        self.touched.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Context {
    num: [AtomicU32; 3],
    max_num: [AtomicU32; 3],
    capacity_factor: f32,
    prefix: RwLock<[Vec<u32>; 3]>,
    patches: Vec<PatchSlot>,
    scheduler: PatchScheduler,
    /// Owned slots freed and refilled in the same pass during this round.
    recycled: Mutex<HashSet<(ElementKind, u32, u16)>>,
}

impl Context {
    pub(crate) fn new(patches: Vec<PatchInfo>, capacity_factor: f32) -> Self {
        let ctx = Self {
            num: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            max_num: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            capacity_factor,
            prefix: RwLock::new(Default::default()),
            patches: patches.into_iter().map(PatchSlot::new).collect(),
            scheduler: PatchScheduler::new(),
            recycled: Mutex::new(HashSet::new()),
        };
        ctx.refresh_prefix();
        for kind in ElementKind::ALL {
            let total = ctx.prefix(kind).last().copied().unwrap_or(0);
            ctx.num[kind.index()].store(total, Ordering::Release);
        }
        ctx
    }

    #[inline]
    pub fn num_patches(&self) -> u32 {
        self.patches.len() as u32
    }

    /// Global number of live elements of `kind`.
    #[inline]
    pub fn num(&self, kind: ElementKind) -> u32 {
        self.num[kind.index()].load(Ordering::Acquire)
    }

    pub fn num_vertices(&self) -> u32 {
        self.num(ElementKind::Vertex)
    }

    pub fn num_edges(&self) -> u32 {
        self.num(ElementKind::Edge)
    }

    pub fn num_faces(&self) -> u32 {
        self.num(ElementKind::Face)
    }

    /// Largest slot count of `kind` over all patches, as of the last refresh.
    pub fn max_num(&self, kind: ElementKind) -> u32 {
        self.max_num[kind.index()].load(Ordering::Acquire)
    }

    pub fn capacity_factor(&self) -> f32 {
        self.capacity_factor
    }

    /// Exclusive prefix sum of owned element counts per patch; one entry more
    /// than there are patches. Refreshed after each edit.
    pub fn prefix(&self, kind: ElementKind) -> Vec<u32> {
        self.prefix.read()[kind.index()].clone()
    }

    pub fn patch(&self, patch: u32) -> &PatchSlot {
        &self.patches[patch as usize]
    }

    pub fn patches(&self) -> &[PatchSlot] {
        &self.patches
    }

    pub fn scheduler(&self) -> &PatchScheduler {
        &self.scheduler
    }

    /// Apply signed per-kind deltas to the global counts.
    pub(crate) fn adjust_counts(&self, delta: [i64; 3]) {
        for kind in ElementKind::ALL {
            let d = delta[kind.index()];
            if d >= 0 {
                self.num[kind.index()].fetch_add(d as u32, Ordering::AcqRel);
            } else {
                self.num[kind.index()].fetch_sub((-d) as u32, Ordering::AcqRel);
            }
        }
    }

    pub(crate) fn record_recycled<I>(&self, slots: I)
    where
        I: IntoIterator<Item = (ElementKind, u32, u16)>,
    {
        self.recycled.lock().extend(slots);
    }

    /// Slots recycled since the last call.
    pub(crate) fn take_recycled(&self) -> HashSet<(ElementKind, u32, u16)> {
        std::mem::take(&mut *self.recycled.lock())
    }

    pub(crate) fn clear_touched(&self) {
        for slot in &self.patches {
            slot.clear_touched();
        }
    }

    /// Recompute maxima and prefix sums from the patch records. The global
    /// counts are maintained incrementally and left alone.
    pub(crate) fn refresh_prefix(&self) {
        let mut prefix = self.prefix.write();
        for kind in ElementKind::ALL {
            let mut sums = Vec::with_capacity(self.patches.len() + 1);
            let mut acc = 0u32;
            let mut max = 0u32;
            sums.push(0);
            for slot in &self.patches {
                let info = slot.read();
                acc += info.num_owned(kind) as u32;
                max = max.max(info.num(kind) as u32);
                sums.push(acc);
            }
            self.max_num[kind.index()].store(max, Ordering::Release);
            prefix[kind.index()] = sums;
        }
    }
}
