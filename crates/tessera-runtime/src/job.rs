//! Pipeline jobs and their three phases.
//!
//! `pre_check` and `commit` run on the coordinating thread and may touch the
//! grid and the backlog freely. `run` executes on a worker and must stay
//! inside the chunks returned by `affected_chunks`. Player edits and unloads
//! are jobs too, so nothing writes voxels under a running body.

use std::sync::Arc;

use hashbrown::HashSet;
use tessera_blocks::{AIR, BlockId, BlockRegistry, FaceOpacity};
use tessera_chunk::LightChannel;
use tessera_geom::{ChunkCoord, ChunkSize, Face, VoxelPos};
use tessera_lighting::{AffectedChunks, LightEngine};
use tessera_world::VoxelGrid;

use crate::backlog::Backlog;
use crate::collaborators::{Artifact, JobContext};

pub const STAGE_GENERATE: u32 = 0;
pub const STAGE_VOXELS: u32 = 1;
pub const STAGE_REBUILD: u32 = 2;
pub const STAGE_NEW_CHUNK_LIGHT: u32 = 3;
pub const STAGE_LIGHT: u32 = 4;
pub const STAGE_LIGHT_MAPPING: u32 = 5;

/// Brightest emission (15) writes 14 voxels away. Relighting reads the
/// frontier one step past that and touches the chunk across it.
const LIGHT_REACH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightChange {
    /// A voxel was written; `emission` is the new type's RGB emission.
    /// `refill` is set when the new type opens a face the old one closed.
    Placed { emission: [u8; 3], refill: bool },
    /// A voxel was cleared; `emission` is the old type's RGB emission.
    Removed { emission: [u8; 3] },
}

impl LightChange {
    /// Light work for replacing `old` (turned `old_rotation`) with `new`.
    pub fn between(
        registry: &BlockRegistry,
        old: BlockId,
        old_rotation: u8,
        new: BlockId,
        new_rotation: u8,
    ) -> LightChange {
        if new == AIR {
            return LightChange::Removed {
                emission: registry.emission(old),
            };
        }
        let refill = Face::ALL.into_iter().any(|face| {
            registry.is_face_opaque(old, face, old_rotation)
                && !registry.is_face_opaque(new, face, new_rotation)
        });
        LightChange::Placed {
            emission: registry.emission(new),
            refill,
        }
    }

    /// A freshly written voxel with nothing to refill.
    pub fn placed(emission: [u8; 3]) -> LightChange {
        LightChange::Placed {
            emission,
            refill: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Job {
    Generate {
        chunk: ChunkCoord,
    },
    CreateVoxels {
        chunk: ChunkCoord,
        voxels: Vec<(VoxelPos, BlockId)>,
    },
    /// `entries` is filled from the backlog by the pre-check.
    FlushBacklog {
        chunk: ChunkCoord,
        entries: Vec<(VoxelPos, BlockId)>,
    },
    Rebuild {
        chunk: ChunkCoord,
    },
    FillNewChunkLight {
        chunk: ChunkCoord,
    },
    /// `topmost` is drained from the grid by the pre-check.
    Sunlight {
        topmost: Vec<ChunkCoord>,
    },
    BlockLight {
        pos: VoxelPos,
        change: LightChange,
    },
    LightMapping {
        chunk: ChunkCoord,
    },
    /// Replaces the voxel at `pos`, running the block hooks. `serial` keeps
    /// repeated edits of one voxel distinct in the queue.
    Edit {
        pos: VoxelPos,
        id: BlockId,
        placement_face: Option<Face>,
        look_dir: Option<Face>,
        serial: u64,
    },
    /// Drops a loaded chunk; a later `Generate` may build it again.
    Unload {
        chunk: ChunkCoord,
    },
}

pub(crate) enum JobOutput {
    Generated(Vec<(VoxelPos, BlockId)>),
    Created {
        created: bool,
        emitters: Vec<(VoxelPos, [u8; 3])>,
    },
    Flushed(Vec<(VoxelPos, [u8; 3])>),
    Built(Artifact),
    Lit(AffectedChunks),
    Edited {
        applied: bool,
        created: bool,
        change: LightChange,
    },
    Unloaded(bool),
    Skipped,
}

impl JobOutput {
    /// Chunks a light body stepped into.
    pub(crate) fn touched(&self) -> Option<&AffectedChunks> {
        match self {
            JobOutput::Lit(affected) => Some(affected),
            _ => None,
        }
    }

    pub(crate) fn is_refused_edit(&self) -> bool {
        matches!(self, JobOutput::Edited { applied: false, .. })
    }
}

/// State owned by the coordinating thread.
pub(crate) struct Coordinator {
    pub ctx: Arc<JobContext>,
    pub backlog: Backlog,
    pub generated: HashSet<ChunkCoord>,
}

impl Job {
    pub fn flush_backlog(chunk: ChunkCoord) -> Job {
        Job::FlushBacklog {
            chunk,
            entries: Vec::new(),
        }
    }

    pub fn sunlight() -> Job {
        Job::Sunlight {
            topmost: Vec::new(),
        }
    }

    pub fn stage(&self) -> u32 {
        match self {
            Job::Generate { .. } => STAGE_GENERATE,
            Job::CreateVoxels { .. }
            | Job::FlushBacklog { .. }
            | Job::Edit { .. }
            | Job::Unload { .. } => STAGE_VOXELS,
            Job::Rebuild { .. } => STAGE_REBUILD,
            Job::FillNewChunkLight { .. } => STAGE_NEW_CHUNK_LIGHT,
            Job::Sunlight { .. } | Job::BlockLight { .. } => STAGE_LIGHT,
            Job::LightMapping { .. } => STAGE_LIGHT_MAPPING,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::Generate { .. } => "generate",
            Job::CreateVoxels { .. } => "create_voxels",
            Job::FlushBacklog { .. } => "flush_backlog",
            Job::Rebuild { .. } => "rebuild",
            Job::FillNewChunkLight { .. } => "fill_new_chunk_light",
            Job::Sunlight { .. } => "sunlight",
            Job::BlockLight { .. } => "block_light",
            Job::LightMapping { .. } => "light_mapping",
            Job::Edit { .. } => "edit",
            Job::Unload { .. } => "unload",
        }
    }

    /// Chunk used for viewer-distance ordering; `None` for global jobs and
    /// for edits, which keep submission order.
    pub fn primary_chunk(&self, size: ChunkSize) -> Option<ChunkCoord> {
        match self {
            Job::Generate { chunk }
            | Job::CreateVoxels { chunk, .. }
            | Job::FlushBacklog { chunk, .. }
            | Job::Rebuild { chunk }
            | Job::FillNewChunkLight { chunk }
            | Job::LightMapping { chunk }
            | Job::Unload { chunk } => Some(*chunk),
            Job::BlockLight { pos, .. } => Some(size.chunk_of(*pos)),
            Job::Sunlight { .. } | Job::Edit { .. } => None,
        }
    }

    /// Chunks the job may read or write while its body runs.
    pub fn affected_chunks(&self, grid: &VoxelGrid) -> HashSet<ChunkCoord> {
        let mut out = HashSet::new();
        match self {
            Job::Generate { chunk } | Job::FlushBacklog { chunk, .. } => {
                out.insert(*chunk);
            }
            Job::CreateVoxels { chunk, .. }
            | Job::Rebuild { chunk }
            | Job::LightMapping { chunk }
            | Job::Unload { chunk } => {
                out.insert(*chunk);
                out.extend(grid.loaded_neighbors(*chunk));
            }
            // Placement hooks read the voxels around `pos`.
            Job::Edit { pos, .. } => {
                let chunk = grid.size().chunk_of(*pos);
                out.insert(chunk);
                out.extend(grid.loaded_neighbors(chunk));
            }
            Job::FillNewChunkLight { chunk } => {
                let r = light_radius(grid.size()) + 1;
                out.insert(*chunk);
                out.extend(grid.chunk_coords().into_iter().filter(|c| {
                    (c.cx - chunk.cx).abs() <= r
                        && (c.cy - chunk.cy).abs() <= r
                        && (c.cz - chunk.cz).abs() <= r
                }));
            }
            Job::Sunlight { .. } => out.extend(grid.chunk_coords()),
            Job::BlockLight { pos, .. } => {
                let center = grid.size().chunk_of(*pos);
                let r = light_radius(grid.size());
                out.insert(center);
                // Sun shafts opened or closed here can run all the way down.
                out.extend(grid.chunk_coords().into_iter().filter(|c| {
                    (c.cx - center.cx).abs() <= r
                        && (c.cz - center.cz).abs() <= r
                        && c.cy - center.cy <= r
                }));
            }
        }
        out
    }

    pub(crate) fn pre_check(&mut self, co: &mut Coordinator) -> bool {
        let grid = &co.ctx.grid;
        match self {
            Job::Generate { chunk } => {
                if co.ctx.generator.is_none()
                    || co.generated.contains(chunk)
                    || grid.chunk_exists(*chunk)
                {
                    return false;
                }
                co.generated.insert(*chunk);
                true
            }
            Job::CreateVoxels { .. } => true,
            Job::FlushBacklog { chunk, entries } => {
                if !grid.chunk_exists(*chunk) || !co.backlog.has(*chunk) {
                    return false;
                }
                *entries = co.backlog.take(*chunk);
                true
            }
            Job::Rebuild { chunk } => co.ctx.mesher.is_some() && grid.chunk_exists(*chunk),
            Job::LightMapping { chunk } => co.ctx.mapper.is_some() && grid.chunk_exists(*chunk),
            Job::FillNewChunkLight { chunk } => grid.chunk_exists(*chunk),
            Job::Sunlight { topmost } => {
                *topmost = grid.drain_topmost_chunks();
                !topmost.is_empty()
            }
            Job::BlockLight { pos, .. } => grid.chunk_exists(grid.size().chunk_of(*pos)),
            Job::Edit { .. } => true,
            Job::Unload { chunk } => grid.chunk_exists(*chunk),
        }
    }

    pub(crate) fn run(&self, ctx: &JobContext) -> JobOutput {
        let grid = ctx.grid.as_ref();
        match self {
            Job::Generate { chunk } => match &ctx.generator {
                Some(g) => JobOutput::Generated(g.generate(*chunk, grid.size())),
                None => JobOutput::Skipped,
            },
            Job::CreateVoxels { chunk, voxels } => {
                let created = grid.apply_generated(*chunk, voxels);
                JobOutput::Created {
                    created,
                    emitters: emitters(ctx, voxels),
                }
            }
            Job::FlushBacklog { chunk, entries } => {
                grid.apply_generated(*chunk, entries);
                let written = entries
                    .iter()
                    .map(|&(pos, id)| (pos, ctx.registry.emission(id)))
                    .collect();
                JobOutput::Flushed(written)
            }
            Job::Rebuild { chunk } => match &ctx.mesher {
                Some(m) => JobOutput::Built(m.build(grid, *chunk)),
                None => JobOutput::Skipped,
            },
            Job::LightMapping { chunk } => match &ctx.mapper {
                Some(m) => JobOutput::Built(m.map(grid, *chunk)),
                None => JobOutput::Skipped,
            },
            Job::FillNewChunkLight { chunk } => {
                let mut affected = AffectedChunks::new();
                LightEngine::new(grid, ctx.registry.as_ref())
                    .propagate_surrounding_lights_on_new_chunk(*chunk, &mut affected);
                JobOutput::Lit(affected)
            }
            Job::Sunlight { topmost } => {
                let mut affected = AffectedChunks::new();
                LightEngine::new(grid, ctx.registry.as_ref()).update_sunlight(topmost, &mut affected);
                JobOutput::Lit(affected)
            }
            Job::BlockLight { pos, change } => {
                let mut affected = AffectedChunks::new();
                let mut engine = LightEngine::new(grid, ctx.registry.as_ref());
                match *change {
                    LightChange::Placed { emission, refill } => {
                        for channel in LightChannel::ALL {
                            engine.remove_light(*pos, channel, &mut affected);
                        }
                        for (channel, e) in LightChannel::RGB.into_iter().zip(emission) {
                            if e > 0 {
                                engine.add_light(*pos, channel, e, &mut affected);
                            }
                        }
                        if refill {
                            engine.update_on_removed_solid_voxel(*pos, &mut affected);
                        }
                    }
                    LightChange::Removed { emission } => {
                        for (channel, e) in LightChannel::RGB.into_iter().zip(emission) {
                            if e > 0 {
                                engine.remove_light(*pos, channel, &mut affected);
                            }
                        }
                        engine.update_on_removed_solid_voxel(*pos, &mut affected);
                    }
                }
                JobOutput::Lit(affected)
            }
            Job::Edit {
                pos,
                id,
                placement_face,
                look_dir,
                ..
            } => {
                let created = !grid.chunk_exists(grid.size().chunk_of(*pos));
                let old = grid.get_voxel(*pos);
                let old_rotation = grid.get_aux(*pos).rotation();
                let applied = grid.set_voxel(*pos, *id, *placement_face, *look_dir, false);
                let change = LightChange::between(
                    &ctx.registry,
                    old,
                    old_rotation,
                    *id,
                    grid.get_aux(*pos).rotation(),
                );
                JobOutput::Edited {
                    applied,
                    created,
                    change,
                }
            }
            Job::Unload { chunk } => JobOutput::Unloaded(grid.remove_chunk(*chunk)),
        }
    }

    /// Applies the body's result and returns follow-up jobs.
    pub(crate) fn commit(self, output: JobOutput, co: &mut Coordinator) -> Vec<Job> {
        let grid = Arc::clone(&co.ctx.grid);
        let mut next = Vec::new();
        match (self, output) {
            (Job::Generate { chunk }, JobOutput::Generated(voxels)) => {
                let size = grid.size();
                let mut inside = Vec::new();
                let mut flush = Vec::new();
                for (pos, id) in voxels {
                    let owner = size.chunk_of(pos);
                    if owner == chunk {
                        if id != AIR {
                            inside.push((pos, id));
                        }
                        continue;
                    }
                    co.backlog.push(owner, pos, id);
                    if grid.chunk_exists(owner) && !flush.contains(&owner) {
                        flush.push(owner);
                    }
                }
                next.extend(flush.into_iter().map(Job::flush_backlog));
                if inside.is_empty() {
                    log::trace!(target: "scheduler", "generator left {:?} empty", chunk);
                } else {
                    next.push(Job::CreateVoxels {
                        chunk,
                        voxels: inside,
                    });
                }
            }
            (Job::CreateVoxels { chunk, .. }, JobOutput::Created { created, emitters }) => {
                if !grid.chunk_exists(chunk) {
                    return next;
                }
                next.push(Job::Rebuild { chunk });
                next.extend(
                    grid.loaded_neighbors(chunk)
                        .into_iter()
                        .map(|n| Job::Rebuild { chunk: n }),
                );
                if created {
                    next.push(Job::FillNewChunkLight { chunk });
                }
                if grid.has_pending_topmost() {
                    next.push(Job::sunlight());
                }
                if co.backlog.has(chunk) {
                    next.push(Job::flush_backlog(chunk));
                }
                next.extend(emitters.into_iter().map(|(pos, emission)| Job::BlockLight {
                    pos,
                    change: LightChange::placed(emission),
                }));
            }
            (Job::FlushBacklog { chunk, .. }, JobOutput::Flushed(written)) => {
                if !grid.chunk_exists(chunk) {
                    return next;
                }
                next.push(Job::Rebuild { chunk });
                next.extend(written.into_iter().map(|(pos, emission)| Job::BlockLight {
                    pos,
                    change: LightChange::placed(emission),
                }));
            }
            (Job::Rebuild { chunk }, JobOutput::Built(artifact)) => {
                if let (true, Some(m)) = (grid.chunk_exists(chunk), &co.ctx.mesher) {
                    m.install(chunk, artifact);
                    next.push(Job::LightMapping { chunk });
                }
            }
            (Job::LightMapping { chunk }, JobOutput::Built(artifact)) => {
                if let (true, Some(m)) = (grid.chunk_exists(chunk), &co.ctx.mapper) {
                    m.install(chunk, artifact);
                }
            }
            (
                Job::FillNewChunkLight { .. } | Job::Sunlight { .. } | Job::BlockLight { .. },
                JobOutput::Lit(affected),
            ) => {
                let mut chunks: Vec<ChunkCoord> = affected
                    .into_iter()
                    .filter(|c| grid.chunk_exists(*c))
                    .collect();
                chunks.sort();
                next.extend(chunks.into_iter().map(|chunk| Job::LightMapping { chunk }));
            }
            (
                Job::Edit { pos, id, .. },
                JobOutput::Edited {
                    applied,
                    created,
                    change,
                },
            ) => {
                let size = grid.size();
                let (chunk, local) = size.split(pos);
                // The hooks materialize the chunk even when they refuse.
                if created && grid.chunk_exists(chunk) {
                    next.push(Job::FillNewChunkLight { chunk });
                }
                if grid.has_pending_topmost() {
                    next.push(Job::sunlight());
                }
                if !applied {
                    log::debug!(target: "scheduler", "edit {:?} -> {} refused", pos, id);
                    return next;
                }
                log::debug!(target: "scheduler", "edit {:?} -> {}: {:?}", pos, id, change);
                next.push(Job::Rebuild { chunk });
                for face in Face::ALL {
                    let neighbor = chunk.neighbor(face);
                    if size.on_boundary(local, face) && grid.chunk_exists(neighbor) {
                        next.push(Job::Rebuild { chunk: neighbor });
                    }
                }
                next.push(Job::BlockLight { pos, change });
            }
            (Job::Unload { chunk }, JobOutput::Unloaded(removed)) => {
                co.generated.remove(&chunk);
                if !removed {
                    return next;
                }
                log::debug!(target: "scheduler", "unloaded {:?}", chunk);
                next.extend(
                    grid.loaded_neighbors(chunk)
                        .into_iter()
                        .map(|n| Job::Rebuild { chunk: n }),
                );
                if grid.has_pending_topmost() {
                    next.push(Job::sunlight());
                }
            }
            (job, JobOutput::Skipped) => {
                log::debug!(target: "scheduler", "{} produced nothing", job.name());
            }
            (job, _) => {
                log::warn!(target: "scheduler", "{} finished with a mismatched output", job.name());
            }
        }
        next
    }
}

/// Chunk radius reachable by the brightest light.
fn light_radius(size: ChunkSize) -> i32 {
    LIGHT_REACH.div_ceil(size.edge()) as i32
}

fn emitters(ctx: &JobContext, voxels: &[(VoxelPos, BlockId)]) -> Vec<(VoxelPos, [u8; 3])> {
    voxels
        .iter()
        .filter_map(|&(pos, id)| {
            let e = ctx.registry.emission(id);
            (e != [0; 3]).then_some((pos, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_blocks::BlockRegistry;

    fn grid(edge: usize) -> VoxelGrid {
        VoxelGrid::new(ChunkSize::new(edge), Arc::new(BlockRegistry::builtin()))
    }

    #[test]
    fn stages_follow_the_pipeline() {
        let c = ChunkCoord::new(0, 0, 0);
        assert_eq!(Job::Generate { chunk: c }.stage(), 0);
        assert_eq!(Job::flush_backlog(c).stage(), 1);
        assert_eq!(Job::Rebuild { chunk: c }.stage(), 2);
        assert_eq!(Job::FillNewChunkLight { chunk: c }.stage(), 3);
        assert_eq!(Job::sunlight().stage(), 4);
        assert_eq!(Job::LightMapping { chunk: c }.stage(), 5);
        assert_eq!(Job::sunlight().primary_chunk(ChunkSize::default()), None);
    }

    #[test]
    fn light_radius_scales_with_chunk_edge() {
        assert_eq!(light_radius(ChunkSize::new(16)), 1);
        assert_eq!(light_radius(ChunkSize::new(8)), 2);
        assert_eq!(light_radius(ChunkSize::new(4)), 4);
        assert_eq!(light_radius(ChunkSize::new(32)), 1);
    }

    #[test]
    fn block_light_reserves_columns_below() {
        let g = grid(16);
        for cy in -5..=2 {
            g.get_or_create_chunk(ChunkCoord::new(0, cy, 0));
        }
        g.get_or_create_chunk(ChunkCoord::new(3, 0, 0));
        let job = Job::BlockLight {
            pos: VoxelPos::new(1, 1, 1),
            change: LightChange::placed([0; 3]),
        };
        let affected = job.affected_chunks(&g);
        assert!(affected.contains(&ChunkCoord::new(0, -5, 0)));
        assert!(affected.contains(&ChunkCoord::new(0, 1, 0)));
        assert!(!affected.contains(&ChunkCoord::new(0, 2, 0)));
        assert!(!affected.contains(&ChunkCoord::new(3, 0, 0)));
    }

    #[test]
    fn opening_a_face_asks_for_a_refill() {
        let reg = BlockRegistry::builtin();
        let id = |name: &str| reg.id_by_name(name).unwrap();
        let change = |old: &str, new: &str| LightChange::between(&reg, id(old), 0, id(new), 0);

        assert_eq!(
            change("stone", "glass"),
            LightChange::Placed {
                emission: [0; 3],
                refill: true
            }
        );
        // Only the slab's bottom stays closed.
        assert_eq!(
            change("stone", "slab"),
            LightChange::Placed {
                emission: [0; 3],
                refill: true
            }
        );
        assert_eq!(
            change("stone", "torch"),
            LightChange::Placed {
                emission: [14, 11, 6],
                refill: true
            }
        );
        assert_eq!(change("glass", "stone"), LightChange::placed([0; 3]));
        assert_eq!(change("air", "leaves"), LightChange::placed([0; 3]));
        assert_eq!(
            change("torch", "air"),
            LightChange::Removed {
                emission: [14, 11, 6]
            }
        );
    }

    #[test]
    fn edits_reserve_the_chunk_and_its_neighbours() {
        let g = grid(8);
        g.get_or_create_chunk(ChunkCoord::new(0, 0, 0));
        g.get_or_create_chunk(ChunkCoord::new(0, -1, 0));
        g.get_or_create_chunk(ChunkCoord::new(2, 0, 0));
        let edit = Job::Edit {
            pos: VoxelPos::new(3, 3, 3),
            id: 1,
            placement_face: None,
            look_dir: None,
            serial: 0,
        };
        assert_eq!(edit.stage(), STAGE_VOXELS);
        assert_eq!(edit.primary_chunk(g.size()), None);
        let affected = edit.affected_chunks(&g);
        assert_eq!(affected.len(), 2);
        assert!(affected.contains(&ChunkCoord::new(0, -1, 0)));
        assert_ne!(
            edit,
            Job::Edit {
                pos: VoxelPos::new(3, 3, 3),
                id: 1,
                placement_face: None,
                look_dir: None,
                serial: 1,
            }
        );
    }

    #[test]
    fn create_voxels_reserves_loaded_neighbours() {
        let g = grid(16);
        g.get_or_create_chunk(ChunkCoord::new(1, 0, 0));
        let job = Job::CreateVoxels {
            chunk: ChunkCoord::new(0, 0, 0),
            voxels: Vec::new(),
        };
        let affected = job.affected_chunks(&g);
        assert_eq!(affected.len(), 2);
        assert!(affected.contains(&ChunkCoord::new(1, 0, 0)));
    }
}
