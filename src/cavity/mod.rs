//! Dynamic cavity engine.
//!
//! A [`Cavity`] opens an edit pass on one patch. User code seeds cavities with
//! [`Cavity::add`], then [`Cavity::process`] runs five phases over a working
//! copy of the patch:
//!
//! 1. grow each seed into its cavity, resolving overlaps in favor of the
//!    lower cavity id,
//! 2. drop the tags of cavities that lost,
//! 3. remove the tagged elements,
//! 4. build each cavity's boundary loop, discarding cavities whose boundary
//!    is not one simple closed loop,
//! 5. migrate missing neighborhoods from neighbor patches and take ownership
//!    of everything the refill may touch.
//!
//! User code then fills every surviving cavity through
//! [`Cavity::for_each_cavity`] and the `add_*` methods, and the pass ends with
//! [`Cavity::commit`], which publishes the working copy and fixes up the
//! neighbor patches involved. Dropping a `Cavity` without committing leaves
//! the mesh untouched.

mod boundary;
mod cleanup;
mod error;
mod locks;
mod migrate;
mod op;
mod propagate;
mod refill;
mod scratch;

pub use cleanup::CommitSummary;
pub use error::CavityError;
pub use locks::LockSet;
pub use op::{CavityOp, EdgeCavity, EdgeVertexCavity, FaceCavity, OpKind, VertexCavity};

use crate::block::Block;
use crate::config::DynamicConfig;
use crate::context::Context;
use crate::query::PatchView;
use crate::topology::bitmask::Bitmask;
use crate::topology::handle::{Edge, ElementKind, Face, Handle, INVALID16, Kind, Vertex};
use crate::topology::ownership::resolve_owner;
use migrate::{PassLookup, Pull, Transfer};
use scratch::Scratch;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Collecting,
    Processed,
    Failed,
}

pub struct Cavity<'a, O: CavityOp> {
    ctx: &'a Context,
    max_owner_hops: u32,
    locks: LockSet<'a>,
    s: Scratch,
    num_cavities: AtomicU32,
    /// Seed slot of each cavity id.
    seeds: Box<[AtomicU16]>,
    active_cavity: Bitmask,
    /// Vertices whose full one-ring is present and current in this patch.
    complete_v: Bitmask,
    loop_offsets: Vec<u32>,
    loop_edges: Vec<u16>,
    transfers: Vec<Transfer>,
    pulls: Vec<Pull>,
    added: [AtomicU32; 3],
    state: State,
    _op: PhantomData<O>,
}

impl<'a, O: CavityOp> Cavity<'a, O> {
    /// Lock `patch` and load its working copy.
    pub fn new(ctx: &'a Context, config: &DynamicConfig, patch: u32) -> Result<Self, CavityError> {
        let mut locks = LockSet::acquire_home(ctx, patch)?;
        let s = Scratch::load(locks.home_info());
        let max_seeds = s.capacity[O::Seed::KIND.index()] as usize;
        let num_vertices = s.capacity[ElementKind::Vertex.index()] as usize;
        Ok(Self {
            ctx,
            max_owner_hops: config.max_owner_hops,
            locks,
            s,
            num_cavities: AtomicU32::new(0),
            seeds: (0..max_seeds).map(|_| AtomicU16::new(INVALID16)).collect(),
            active_cavity: Bitmask::new(max_seeds),
            complete_v: Bitmask::new(num_vertices),
            loop_offsets: vec![0],
            loop_edges: Vec::new(),
            transfers: Vec::new(),
            pulls: Vec::new(),
            added: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            state: State::Collecting,
            _op: PhantomData,
        })
    }

    #[inline]
    pub fn patch_id(&self) -> u32 {
        self.s.patch_id
    }

    pub fn context(&self) -> &Context {
        self.ctx
    }

    /// Seed a new cavity at `seed` and return its id.
    ///
    /// May be called concurrently. Returns `None` once every id is used.
    pub fn add(&self, seed: Handle<O::Seed>) -> Option<u16> {
        debug_assert_eq!(seed.patch(), self.s.patch_id);
        debug_assert_eq!(self.state, State::Collecting);
        let id = self.num_cavities.fetch_add(1, Ordering::AcqRel) as usize;
        if id >= self.active_cavity.len() {
            return None;
        }
        let id = id as u16;
        self.seeds[id as usize].store(seed.local(), Ordering::Release);
        self.active_cavity.set(id as usize);
        self.s.set_tag(O::Seed::KIND, seed.local(), id);
        Some(id)
    }

    /// Number of cavity ids handed out.
    pub fn num_cavities(&self) -> u16 {
        let n = self.num_cavities.load(Ordering::Acquire) as usize;
        n.min(self.active_cavity.len()) as u16
    }

    pub fn is_live(&self, cavity: u16) -> bool {
        cavity < self.num_cavities() && self.active_cavity.get(cavity as usize)
    }

    /// Ids of the cavities still standing.
    pub fn live_cavities(&self) -> impl Iterator<Item = u16> + '_ {
        let n = self.num_cavities() as usize;
        self.active_cavity
            .iter_ones()
            .take_while(move |&c| c < n)
            .map(|c| c as u16)
    }

    /// The element `cavity` was seeded with.
    pub fn seed(&self, cavity: u16) -> Handle<O::Seed> {
        Handle::new(
            self.s.patch_id,
            self.seeds[cavity as usize].load(Ordering::Acquire),
        )
    }

    /// The live cavity `h` belongs to, if any.
    pub fn cavity_of<K: Kind>(&self, h: Handle<K>) -> Option<u16> {
        if h.local() >= self.s.num(K::KIND) {
            return None;
        }
        let c = self.s.tag(K::KIND, h.local());
        (c != INVALID16 && self.is_live(c)).then_some(c)
    }

    /// Whether `h` was removed by this pass.
    pub fn is_deleted<K: Kind>(&self, h: Handle<K>) -> bool {
        h.local() < self.s.num(K::KIND) && self.s.deleted[K::KIND.index()].get(h.local() as usize)
    }

    /// Whether the full one-ring of `v` is present in this patch.
    pub fn is_complete(&self, v: Handle<Vertex>) -> bool {
        (v.local() as usize) < self.complete_v.len() && self.complete_v.get(v.local() as usize)
    }

    /// Run phases 1 through 5. On error the pass must not be committed.
    pub fn process(&mut self, block: &Block) -> Result<(), CavityError> {
        if self.state != State::Collecting {
            return Ok(());
        }
        if self.num_cavities() == 0 {
            self.state = State::Processed;
            return Ok(());
        }
        self.mark_complete_vertices(block);
        block.sync();
        self.check_seeds(block);
        block.sync();
        self.propagate(block);
        block.sync();
        self.clear_inactive_tags(block);
        block.sync();
        self.remove_tagged(block);
        block.sync();
        self.construct_loops(block);
        block.sync();
        if self.live_cavities().next().is_none() {
            self.state = State::Processed;
            return Ok(());
        }
        match self.migrate(block) {
            Ok(()) => {
                self.reserve_refill();
                self.state = State::Processed;
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    /// This patch's slot holding the element `h` names, if this patch has
    /// one. `h` may be any handle that resolves to the element, including
    /// the owner's.
    pub fn find_copy<K: Kind>(&mut self, h: Handle<K>) -> Result<Option<Handle<K>>, CavityError> {
        let kind = K::KIND;
        let patch = self.s.patch_id;
        let hops = self.max_owner_hops;
        let mut lookup = PassLookup {
            scratch: &self.s,
            locks: &mut self.locks,
        };
        let target = resolve_owner(&mut lookup, kind, h.patch(), h.local(), hops)?;
        if target.0 == patch {
            return Ok(Some(Handle::new(patch, target.1)));
        }
        for local in 0..lookup.scratch.num(kind) {
            if !lookup.scratch.is_present(kind, local)
                || lookup.scratch.owned[kind.index()].get(local as usize)
            {
                continue;
            }
            if resolve_owner(&mut lookup, kind, patch, local, hops)? == target {
                return Ok(Some(Handle::new(patch, local)));
            }
        }
        Ok(None)
    }

    pub fn find_copy_vertex(
        &mut self,
        local: u16,
        patch: u32,
    ) -> Result<Option<Handle<Vertex>>, CavityError> {
        self.find_copy(Handle::new(patch, local))
    }

    pub fn find_copy_edge(
        &mut self,
        local: u16,
        patch: u32,
    ) -> Result<Option<Handle<Edge>>, CavityError> {
        self.find_copy(Handle::new(patch, local))
    }

    pub fn find_copy_face(
        &mut self,
        local: u16,
        patch: u32,
    ) -> Result<Option<Handle<Face>>, CavityError> {
        self.find_copy(Handle::new(patch, local))
    }
}

impl<O: CavityOp> PatchView for Cavity<'_, O> {
    fn patch_id(&self) -> u32 {
        self.s.patch_id
    }
    fn slot_count(&self, kind: ElementKind) -> u16 {
        self.s.num(kind)
    }
    fn is_active(&self, kind: ElementKind, local: u16) -> bool {
        self.s.is_active(kind, local)
    }
    fn is_owned(&self, kind: ElementKind, local: u16) -> bool {
        self.s.is_owned(kind, local)
    }
    fn edge_vertices(&self, edge: u16) -> [u16; 2] {
        self.s.edge_vertices(edge)
    }
    fn face_edges(&self, face: u16) -> [(u16, bool); 3] {
        self.s.face_edges(face)
    }
}
