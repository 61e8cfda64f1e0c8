//! Per-element data stored alongside the patches.
//!
//! An [`Attribute`] keeps one value per slot of one element kind, split per
//! patch the same way the topology is. Copies carry their own value; after
//! elements move between patches, [`Cavity::update_attributes`] pulls the
//! owners' values into the new slots.
//!
//! [`Cavity::update_attributes`]: crate::cavity::Cavity::update_attributes

use crate::topology::handle::{Handle, Kind};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::marker::PhantomData;

pub struct Attribute<K: Kind, T> {
    name: String,
    default: T,
    patches: Vec<RwLock<Vec<T>>>,
    _kind: PhantomData<K>,
}

impl<K: Kind, T: Clone + Send + Sync> Attribute<K, T> {
    /// One `default`-filled buffer per patch, sized by `capacities`.
    pub(crate) fn new<I>(name: &str, capacities: I, default: T) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self {
            name: name.to_owned(),
            default: default.clone(),
            patches: capacities
                .into_iter()
                .map(|cap| RwLock::new(vec![default.clone(); cap]))
                .collect(),
            _kind: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Value of `h`; slots past a patch's buffer read as the default.
    pub fn get(&self, h: Handle<K>) -> T {
        self.patches[h.patch() as usize]
            .read()
            .get(h.local() as usize)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn set(&self, h: Handle<K>, value: T) {
        let mut data = self.patch_mut(h.patch());
        let local = h.local() as usize;
        if local >= data.len() {
            data.resize(local + 1, self.default.clone());
        }
        data[local] = value;
    }

    /// Values of `patch`, indexed by local id. The buffer may be shorter than
    /// the patch's capacity once the patch has grown.
    pub fn patch(&self, patch: u32) -> RwLockReadGuard<'_, Vec<T>> {
        self.patches[patch as usize].read()
    }

    pub fn patch_mut(&self, patch: u32) -> RwLockWriteGuard<'_, Vec<T>> {
        self.patches[patch as usize].write()
    }
}

impl<K: Kind, T: std::fmt::Debug> std::fmt::Debug for Attribute<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("kind", &K::KIND)
            .field("patches", &self.patches.len())
            .finish()
    }
}
