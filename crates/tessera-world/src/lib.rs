//! Spatial grid store: lazily created chunks addressed by coordinate.
#![forbid(unsafe_code)]

mod topmost;

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_blocks::{
    AIR, AuxData, BlockId, BlockRegistry, PlaceContext, Placement, RemoveContext, VoxelQuery,
};
use tessera_chunk::{Chunk, LightChannel};
use tessera_geom::{ChunkCoord, ChunkSize, Face, LocalPos, VoxelPos};

use crate::topmost::TopmostColumns;

pub type ChunkHandle = Arc<RwLock<Chunk>>;

/// A loaded chunk together with its coordinate.
#[derive(Clone)]
pub struct ChunkRef {
    coord: ChunkCoord,
    handle: ChunkHandle,
}

impl ChunkRef {
    #[inline]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    #[inline]
    pub fn handle(&self) -> &ChunkHandle {
        &self.handle
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Chunk> {
        self.handle.read()
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Chunk> {
        self.handle.write()
    }

    pub fn same_chunk(&self, other: &ChunkRef) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkRef").field("coord", &self.coord).finish()
    }
}

/// Chunked voxel store shared between the coordinating thread and job bodies.
///
/// Lock order is chunk map, then topmost columns. Per-chunk locks are taken
/// one at a time and never while the chunk map lock is held for writing.
pub struct VoxelGrid {
    size: ChunkSize,
    registry: Arc<BlockRegistry>,
    chunks: RwLock<HashMap<ChunkCoord, ChunkHandle>>,
    topmost: Mutex<TopmostColumns>,
}

impl VoxelGrid {
    pub fn new(size: ChunkSize, registry: Arc<BlockRegistry>) -> Self {
        Self {
            size,
            registry,
            chunks: RwLock::new(HashMap::new()),
            topmost: Mutex::new(TopmostColumns::default()),
        }
    }

    #[inline]
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    #[inline]
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    // ---- chunks ----

    pub fn try_get_chunk(&self, coord: ChunkCoord) -> Option<ChunkRef> {
        self.chunks.read().get(&coord).map(|h| ChunkRef {
            coord,
            handle: Arc::clone(h),
        })
    }

    pub fn chunk_exists(&self, coord: ChunkCoord) -> bool {
        self.chunks.read().contains_key(&coord)
    }

    pub fn get_or_create_chunk(&self, coord: ChunkCoord) -> ChunkRef {
        self.ensure_chunk(coord).0
    }

    /// Like [`get_or_create_chunk`](Self::get_or_create_chunk), also reporting
    /// whether this call created the chunk.
    pub fn ensure_chunk(&self, coord: ChunkCoord) -> (ChunkRef, bool) {
        if let Some(existing) = self.try_get_chunk(coord) {
            return (existing, false);
        }
        let mut map = self.chunks.write();
        // Another thread may have won the race between the two locks.
        if let Some(h) = map.get(&coord) {
            return (
                ChunkRef {
                    coord,
                    handle: Arc::clone(h),
                },
                false,
            );
        }
        let handle = Arc::new(RwLock::new(Chunk::new(coord, self.size)));
        map.insert(coord, Arc::clone(&handle));
        self.topmost.lock().note_created(coord);
        log::trace!(target: "world", "created chunk {:?}", coord);
        (ChunkRef { coord, handle }, true)
    }

    pub fn remove_chunk(&self, coord: ChunkCoord) -> bool {
        let mut map = self.chunks.write();
        if map.remove(&coord).is_none() {
            return false;
        }
        let (cx, cz) = coord.column();
        let remaining_top = map
            .keys()
            .filter(|c| c.cx == cx && c.cz == cz)
            .map(|c| c.cy)
            .max();
        self.topmost.lock().note_removed(coord, remaining_top);
        log::trace!(target: "world", "removed chunk {:?}", coord);
        true
    }

    /// Resets a loaded chunk to air and darkness. Returns false when absent.
    pub fn clear_chunk(&self, coord: ChunkCoord) -> bool {
        match self.try_get_chunk(coord) {
            Some(c) => {
                c.write().clear();
                true
            }
            None => false,
        }
    }

    pub fn chunk_coords(&self) -> Vec<ChunkCoord> {
        let mut out: Vec<ChunkCoord> = self.chunks.read().keys().copied().collect();
        out.sort();
        out
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Loaded face neighbours of `coord`.
    pub fn loaded_neighbors(&self, coord: ChunkCoord) -> Vec<ChunkCoord> {
        let map = self.chunks.read();
        Face::ALL
            .iter()
            .map(|&f| coord.neighbor(f))
            .filter(|c| map.contains_key(c))
            .collect()
    }

    // ---- topmost columns ----

    /// Column tops created or changed since the last drain.
    pub fn topmost_chunks_per_column(&self) -> Vec<ChunkCoord> {
        self.topmost.lock().pending()
    }

    pub fn has_pending_topmost(&self) -> bool {
        self.topmost.lock().has_pending()
    }

    pub fn drain_topmost_chunks(&self) -> Vec<ChunkCoord> {
        self.topmost.lock().drain()
    }

    /// Current highest loaded chunk of every column.
    pub fn column_tops(&self) -> Vec<ChunkCoord> {
        self.topmost.lock().tops()
    }

    // ---- voxels ----

    pub fn get_voxel(&self, pos: VoxelPos) -> BlockId {
        let (coord, local) = self.size.split(pos);
        self.try_get_chunk(coord)
            .map(|c| c.read().voxel(local))
            .unwrap_or(AIR)
    }

    /// Writes `id` at `pos` after consulting the outgoing type's removal hook
    /// and the incoming type's placement hook. Returns false, leaving the
    /// voxel untouched, when either hook refuses.
    ///
    /// The owning chunk is created even when a hook refuses.
    pub fn set_voxel(
        &self,
        pos: VoxelPos,
        id: BlockId,
        placement_face: Option<Face>,
        look_dir: Option<Face>,
        keep_aux: bool,
    ) -> bool {
        let (coord, local) = self.size.split(pos);
        let chunk = self.get_or_create_chunk(coord);
        let old = chunk.read().voxel(local);

        let remove_ctx = RemoveContext {
            world: self,
            chunk: coord,
            global: pos,
            local,
        };
        if !self.registry.on_remove(old, &remove_ctx) {
            log::debug!(target: "world", "removal of {} at {:?} refused", old, pos);
            return false;
        }
        let place_ctx = PlaceContext {
            world: self,
            chunk: coord,
            global: pos,
            local,
            placement_face,
            look_dir,
        };
        let aux = match self.registry.on_place(id, &place_ctx) {
            Placement::Accept(aux) => aux,
            Placement::Reject => {
                log::debug!(target: "world", "placement of {} at {:?} refused", id, pos);
                return false;
            }
        };

        let mut c = chunk.write();
        c.set_voxel(local, id);
        if !keep_aux {
            c.set_aux(local, aux);
        }
        true
    }

    /// Writes generated voxels into `coord` without running hooks. Entries
    /// outside the chunk are skipped. Returns whether the chunk was created.
    pub fn apply_generated(&self, coord: ChunkCoord, voxels: &[(VoxelPos, BlockId)]) -> bool {
        let (chunk, created) = self.ensure_chunk(coord);
        let mut c = chunk.write();
        for &(pos, id) in voxels {
            let (owner, local) = self.size.split(pos);
            if owner != coord {
                log::debug!(target: "world", "skipping {:?}: not inside {:?}", pos, coord);
                continue;
            }
            c.set_voxel(local, id);
            c.set_aux(local, AuxData::EMPTY);
        }
        created
    }

    pub fn get_aux(&self, pos: VoxelPos) -> AuxData {
        let (coord, local) = self.size.split(pos);
        self.try_get_chunk(coord)
            .map(|c| c.read().aux(local))
            .unwrap_or(AuxData::EMPTY)
    }

    /// Ignored when the chunk is absent.
    pub fn set_aux(&self, pos: VoxelPos, aux: AuxData) {
        let (coord, local) = self.size.split(pos);
        if let Some(c) = self.try_get_chunk(coord) {
            c.write().set_aux(local, aux);
        }
    }

    // ---- light ----

    pub fn get_light(&self, pos: VoxelPos, channel: LightChannel) -> u8 {
        let (coord, local) = self.size.split(pos);
        self.try_get_chunk(coord)
            .map(|c| c.read().light(local, channel))
            .unwrap_or(0)
    }

    /// Ignored when the chunk is absent.
    pub fn set_light(&self, pos: VoxelPos, channel: LightChannel, value: u8) {
        let (coord, local) = self.size.split(pos);
        if let Some(c) = self.try_get_chunk(coord) {
            c.write().set_light(local, channel, value);
        }
    }

    // ---- neighbour crossing ----

    /// Steps from `local` in `chunk` toward `face`. Stays in `chunk` without a
    /// map lookup unless the step leaves `[0, size)`; then resolves the
    /// neighbouring chunk, or `None` when it is not loaded.
    #[inline]
    pub fn step(&self, chunk: &ChunkRef, local: LocalPos, face: Face) -> Option<(ChunkRef, LocalPos)> {
        let (next, crossed) = self.size.step_local(local, face);
        if !crossed {
            return Some((chunk.clone(), next));
        }
        self.try_get_chunk(chunk.coord.neighbor(face))
            .map(|n| (n, next))
    }
}

impl VoxelQuery for VoxelGrid {
    fn voxel(&self, pos: VoxelPos) -> BlockId {
        self.get_voxel(pos)
    }

    fn aux(&self, pos: VoxelPos) -> AuxData {
        self.get_aux(pos)
    }
}

impl fmt::Debug for VoxelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelGrid")
            .field("size", &self.size.edge())
            .field("chunks", &self.chunk_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VoxelGrid {
        VoxelGrid::new(ChunkSize::new(16), Arc::new(BlockRegistry::builtin()))
    }

    #[test]
    fn reads_never_create_chunks() {
        let g = grid();
        assert_eq!(g.get_voxel(VoxelPos::new(5, 5, 5)), AIR);
        assert_eq!(g.get_light(VoxelPos::new(5, 5, 5), LightChannel::Sun), 0);
        g.set_light(VoxelPos::new(5, 5, 5), LightChannel::Red, 7);
        assert_eq!(g.chunk_count(), 0);
    }

    #[test]
    fn set_voxel_creates_lazily() {
        let g = grid();
        let stone = g.registry().id_by_name("stone").unwrap();
        let p = VoxelPos::new(-1, 3, 20);
        assert!(g.set_voxel(p, stone, None, None, false));
        assert!(g.chunk_exists(ChunkCoord::new(-1, 0, 1)));
        assert_eq!(g.get_voxel(p), stone);
    }

    #[test]
    fn hooks_can_refuse() {
        let g = grid();
        let reg = Arc::clone(g.registry());
        let bedrock = reg.id_by_name("bedrock").unwrap();
        let torch = reg.id_by_name("torch").unwrap();
        let p = VoxelPos::new(0, 0, 0);
        assert!(g.set_voxel(p, bedrock, None, None, false));
        assert!(!g.set_voxel(p, AIR, None, None, false));
        assert_eq!(g.get_voxel(p), bedrock);

        // Torch needs a voxel below; the chunk still gets created.
        let floating = VoxelPos::new(40, 40, 40);
        assert!(!g.set_voxel(floating, torch, None, None, false));
        assert!(g.chunk_exists(ChunkCoord::new(2, 2, 2)));
        assert_eq!(g.get_voxel(floating), AIR);
        assert!(g.set_voxel(p.step(Face::PosY), torch, None, None, false));
    }

    #[test]
    fn oriented_placement_stores_aux_unless_kept() {
        let g = grid();
        let furnace = g.registry().id_by_name("furnace").unwrap();
        let p = VoxelPos::new(1, 1, 1);
        assert!(g.set_voxel(p, furnace, Some(Face::PosX), None, false));
        assert_eq!(g.get_aux(p).facing(), Some(Face::PosX));
        let stone = g.registry().id_by_name("stone").unwrap();
        assert!(g.set_voxel(p, stone, None, None, true));
        assert_eq!(g.get_aux(p).facing(), Some(Face::PosX));
        assert!(g.set_voxel(p, stone, None, None, false));
        assert_eq!(g.get_aux(p), AuxData::EMPTY);
    }

    #[test]
    fn step_crosses_only_at_edges() {
        let g = grid();
        let a = g.get_or_create_chunk(ChunkCoord::new(0, 0, 0));
        let (same, l) = g.step(&a, LocalPos::new(3, 3, 3), Face::PosX).unwrap();
        assert!(same.same_chunk(&a));
        assert_eq!(l, LocalPos::new(4, 3, 3));
        assert!(g.step(&a, LocalPos::new(15, 0, 0), Face::PosX).is_none());
        g.get_or_create_chunk(ChunkCoord::new(1, 0, 0));
        let (n, l) = g.step(&a, LocalPos::new(15, 2, 0), Face::PosX).unwrap();
        assert_eq!(n.coord(), ChunkCoord::new(1, 0, 0));
        assert_eq!(l, LocalPos::new(0, 2, 0));
    }

    #[test]
    fn topmost_tracks_creation_and_drain() {
        let g = grid();
        g.get_or_create_chunk(ChunkCoord::new(0, 0, 0));
        g.get_or_create_chunk(ChunkCoord::new(0, 1, 0));
        g.get_or_create_chunk(ChunkCoord::new(2, -1, 0));
        assert_eq!(
            g.topmost_chunks_per_column(),
            vec![ChunkCoord::new(0, 1, 0), ChunkCoord::new(2, -1, 0)]
        );
        assert_eq!(g.drain_topmost_chunks().len(), 2);
        assert!(!g.has_pending_topmost());
        assert!(g.remove_chunk(ChunkCoord::new(0, 1, 0)));
        assert_eq!(g.column_tops()[0], ChunkCoord::new(0, 0, 0));
    }

    #[test]
    fn apply_generated_skips_foreign_voxels() {
        let g = grid();
        let coord = ChunkCoord::new(0, 0, 0);
        let created = g.apply_generated(coord, &[(VoxelPos::new(1, 1, 1), 1), (VoxelPos::new(16, 1, 1), 1)]);
        assert!(created);
        assert_eq!(g.get_voxel(VoxelPos::new(1, 1, 1)), 1);
        assert!(!g.chunk_exists(ChunkCoord::new(1, 0, 0)));
        assert!(!g.apply_generated(coord, &[]));
    }
}
