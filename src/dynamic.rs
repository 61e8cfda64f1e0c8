//! The mesh users hold, and the driver that runs edits over every patch.
//!
//! An edit runs in rounds. Each round takes the queued patches and runs the
//! kernel on all of them in parallel, one [`Cavity`] per patch. A patch that
//! fails with a retryable error is queued again. After each round copies are
//! reconciled and touched flags are cleared. A round in which nothing
//! committed is followed by a serial round, in which patches run one after
//! another.

use crate::algs::build::{Connectivity, build_patches};
use crate::algs::export::export;
use crate::algs::reconcile::{ReconcileReport, reconcile};
use crate::attribute::Attribute;
use crate::block::Block;
use crate::cavity::{Cavity, CavityError, CavityOp, CommitSummary};
use crate::config::DynamicConfig;
use crate::context::Context;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;
use crate::topology::handle::{ElementKind, Kind, Vertex};
use crate::topology::patch_info::PatchInfo;
use crate::topology::validation::validate_mesh;
use hashbrown::HashMap;
use parking_lot::RwLockReadGuard;
use rayon::prelude::*;

/// Outcome of one call to [`DynamicMesh::edit`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EditReport {
    pub rounds: u32,
    /// Rounds run one patch at a time.
    pub serial_rounds: u32,
    /// Passes that committed.
    pub commits: u32,
    /// Passes re-queued after a retryable error.
    pub retries: u32,
    /// Cavities refilled over all commits.
    pub cavities: u32,
    /// Net change of the global counts.
    pub delta: [i64; 3],
}

impl EditReport {
    fn record(&mut self, summary: &CommitSummary) {
        self.commits += 1;
        self.cavities += summary.cavities;
        for (d, s) in self.delta.iter_mut().zip(summary.delta()) {
            *d += s;
        }
    }
}

pub struct DynamicMesh {
    context: Context,
    config: DynamicConfig,
    block: Block,
    positions: Attribute<Vertex, [f64; 3]>,
}

impl DynamicMesh {
    /// Build a mesh, grouping faces into patches of `config.patch_size`.
    pub fn from_triangles(
        positions: &[[f64; 3]],
        faces: &[[u32; 3]],
        config: DynamicConfig,
    ) -> Result<Self, MeshError> {
        Self::build(positions, faces, None, config)
    }

    /// Build a mesh with face `f` in patch `face_patch[f]`.
    pub fn from_partitioned(
        positions: &[[f64; 3]],
        faces: &[[u32; 3]],
        face_patch: &[u32],
        config: DynamicConfig,
    ) -> Result<Self, MeshError> {
        Self::build(positions, faces, Some(face_patch), config)
    }

    fn build(
        positions: &[[f64; 3]],
        faces: &[[u32; 3]],
        face_patch: Option<&[u32]>,
        config: DynamicConfig,
    ) -> Result<Self, MeshError> {
        config.validate()?;
        let conn = Connectivity::new(positions.len(), faces)?;
        let built = build_patches(&conn, face_patch, &config)?;
        let attr = Attribute::new(
            "position",
            built
                .patches
                .iter()
                .map(|p| p.capacity(ElementKind::Vertex) as usize),
            [0.0; 3],
        );
        for (p, ids) in built.vertex_ids.iter().enumerate() {
            let mut values = attr.patch_mut(p as u32);
            for (slot, &g) in ids.iter().enumerate() {
                values[slot] = positions[g as usize];
            }
        }
        let context = Context::new(built.patches, config.capacity_factor);
        log::info!(
            "dynamic mesh: {} vertices, {} edges, {} faces in {} patches",
            context.num_vertices(),
            context.num_edges(),
            context.num_faces(),
            context.num_patches()
        );
        Ok(Self {
            context,
            block: Block::new(config.block_threads),
            config,
            positions: attr,
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn num_patches(&self) -> u32 {
        self.context.num_patches()
    }

    pub fn num_vertices(&self) -> u32 {
        self.context.num_vertices()
    }

    pub fn num_edges(&self) -> u32 {
        self.context.num_edges()
    }

    pub fn num_faces(&self) -> u32 {
        self.context.num_faces()
    }

    pub fn positions(&self) -> &Attribute<Vertex, [f64; 3]> {
        &self.positions
    }

    /// A new attribute over every slot of kind `K`.
    pub fn add_attribute<K: Kind, T: Clone + Send + Sync>(
        &self,
        name: &str,
        default: T,
    ) -> Attribute<K, T> {
        let capacities = self
            .context
            .patches()
            .iter()
            .map(|slot| slot.read().capacity(K::KIND) as usize)
            .collect::<Vec<_>>();
        Attribute::new(name, capacities, default)
    }

    /// Read access to one patch record.
    pub fn patch(&self, patch: u32) -> RwLockReadGuard<'_, PatchInfo> {
        self.context.patch(patch).read()
    }

    /// Repair copies left behind by earlier commits.
    pub fn reconcile(&self) -> Result<ReconcileReport, MeshError> {
        let recycled = self.context.take_recycled();
        reconcile(&self.context, &recycled, self.config.max_owner_hops)
    }

    /// Check every mesh invariant.
    pub fn validate(&self) -> Result<(), MeshError> {
        validate_mesh(&self.context, self.config.max_owner_hops)
    }

    /// Positions and triangles of the current mesh.
    pub fn export(&self) -> Result<(Vec<[f64; 3]>, Vec<[u32; 3]>), MeshError> {
        export(&self.context, &self.positions, self.config.max_owner_hops)
    }

    /// Run `kernel` once on every patch.
    pub fn edit<O, F>(&self, kernel: F) -> Result<EditReport, MeshError>
    where
        O: CavityOp,
        F: Fn(&Block, &mut Cavity<'_, O>) -> Result<(), CavityError> + Send + Sync,
    {
        self.edit_patches(0..self.context.num_patches(), kernel)
    }

    /// Run `kernel` once on each of `patches`.
    ///
    /// The kernel seeds cavities, processes them and refills them; the driver
    /// commits. Returning an error from the kernel drops the pass. Retryable
    /// errors re-queue the patch; any other error stops the edit once the
    /// current round has been reconciled.
    pub fn edit_patches<O, F, I>(&self, patches: I, kernel: F) -> Result<EditReport, MeshError>
    where
        O: CavityOp,
        F: Fn(&Block, &mut Cavity<'_, O>) -> Result<(), CavityError> + Send + Sync,
        I: IntoIterator<Item = u32>,
    {
        let ctx = &self.context;
        let block = &self.block;
        let config = &self.config;
        ctx.scheduler().fill(patches);

        let run = |patch: u32| -> (u32, Result<CommitSummary, CavityError>) {
            let outcome = Cavity::<O>::new(ctx, config, patch).and_then(|mut cavity| {
                kernel(block, &mut cavity)?;
                cavity.commit(block)
            });
            (patch, outcome)
        };

        let mut report = EditReport::default();
        let mut attempts: HashMap<u32, u32> = HashMap::new();
        let mut serial = false;
        let mut failure = None;
        while failure.is_none() && !ctx.scheduler().is_empty() {
            let pending = ctx.scheduler().drain();
            report.rounds += 1;
            let outcomes: Vec<_> = if serial {
                report.serial_rounds += 1;
                pending.iter().map(|&p| run(p)).collect()
            } else {
                pending.par_iter().map(|&p| run(p)).collect()
            };

            let mut committed = 0;
            for (patch, outcome) in outcomes {
                match outcome {
                    Ok(summary) => {
                        committed += 1;
                        report.record(&summary);
                    }
                    Err(e) if e.is_retryable() => {
                        report.retries += 1;
                        if !matches!(e, CavityError::Contention { .. }) {
                            let n = attempts.entry(patch).or_insert(0);
                            *n += 1;
                            if *n >= config.max_attempts {
                                log::warn!("patch {patch} gave up after {n} attempts: {e}");
                                failure.get_or_insert(MeshError::EditFailed {
                                    patch,
                                    attempts: *n,
                                    source: e,
                                });
                                continue;
                            }
                        }
                        log::trace!("patch {patch} re-queued: {e}");
                        ctx.scheduler().push(patch);
                    }
                    Err(e) => {
                        log::warn!("patch {patch} failed: {e}");
                        failure.get_or_insert(MeshError::Cavity { patch, source: e });
                    }
                }
            }

            let fixed = self.reconcile()?;
            ctx.clear_touched();
            serial = committed == 0 && !ctx.scheduler().is_empty();
            log::debug!(
                "round {}: {} committed, {} queued, reconcile {:?}",
                report.rounds,
                committed,
                ctx.scheduler().len(),
                fixed
            );
        }
        // leftovers of an aborted edit
        ctx.scheduler().drain();
        ctx.refresh_prefix();
        crate::debug_invariants!(self.validate(), "edit");
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

impl DebugInvariants for DynamicMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate(), "DynamicMesh");
    }

    fn validate_invariants(&self) -> Result<(), MeshError> {
        self.validate()
    }
}
