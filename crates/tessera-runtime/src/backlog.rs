use hashbrown::HashMap;
use tessera_blocks::BlockId;
use tessera_geom::{ChunkCoord, VoxelPos};

/// Generated voxels waiting for their owning chunk to load.
/// Only touched from the coordinating thread.
#[derive(Debug, Default)]
pub struct Backlog {
    pending: HashMap<ChunkCoord, Vec<(VoxelPos, BlockId)>>,
}

impl Backlog {
    pub fn push(&mut self, chunk: ChunkCoord, pos: VoxelPos, id: BlockId) {
        self.pending.entry(chunk).or_default().push((pos, id));
    }

    pub fn has(&self, chunk: ChunkCoord) -> bool {
        self.pending.get(&chunk).is_some_and(|v| !v.is_empty())
    }

    pub fn take(&mut self, chunk: ChunkCoord) -> Vec<(VoxelPos, BlockId)> {
        self.pending.remove(&chunk).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
