//! Owner resolution across patches.
//!
//! A non-owned slot points at the slot it was copied from. That slot may
//! itself be a copy, so finding the owner means following LP entries until a
//! patch that owns the element is reached. [`resolve_owner`] walks such a chain
//! through any [`OwnerLookup`], bounding the number of hops.

use crate::cavity::CavityError;
use crate::topology::handle::ElementKind;
use crate::topology::patch_info::PatchInfo;

/// One step of owner resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hop {
    /// The queried patch owns the slot.
    Owned,
    /// The slot is a copy of `(patch, local)`.
    Forward(u32, u16),
    /// The slot is free, or a copy with no usable entry.
    Missing,
}

/// Anything able to answer a [`Hop`] for `(patch, kind, local)`.
pub trait OwnerLookup {
    fn hop(&mut self, patch: u32, kind: ElementKind, local: u16) -> Result<Hop, CavityError>;
}

/// The owning `(patch, local)` of the element at `(patch, local)`.
pub fn resolve_owner<L: OwnerLookup + ?Sized>(
    lookup: &mut L,
    kind: ElementKind,
    patch: u32,
    local: u16,
    max_hops: u32,
) -> Result<(u32, u16), CavityError> {
    let (mut p, mut l) = (patch, local);
    for _ in 0..=max_hops {
        match lookup.hop(p, kind, l)? {
            Hop::Owned => return Ok((p, l)),
            Hop::Forward(next_patch, next_local) => {
                p = next_patch;
                l = next_local;
            }
            Hop::Missing => {
                return Err(CavityError::MissingCopy {
                    kind,
                    patch: p,
                    local: l,
                });
            }
        }
    }
    Err(CavityError::ChainTooLong {
        kind,
        patch,
        local,
    })
}

/// Read-only view over every patch record, indexed by patch id.
pub struct PatchTable<'a> {
    patches: Vec<&'a PatchInfo>,
}

impl<'a> PatchTable<'a> {
    pub fn new(patches: Vec<&'a PatchInfo>) -> Self {
        Self { patches }
    }

    #[inline]
    pub fn get(&self, patch: u32) -> Option<&'a PatchInfo> {
        self.patches.get(patch as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a PatchInfo> + '_ {
        self.patches.iter().copied()
    }
}

impl OwnerLookup for &PatchTable<'_> {
    fn hop(&mut self, patch: u32, kind: ElementKind, local: u16) -> Result<Hop, CavityError> {
        Ok(self.get(patch).map_or(Hop::Missing, |info| info.hop(kind, local)))
    }
}
