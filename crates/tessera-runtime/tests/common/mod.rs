#![allow(dead_code)]

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tessera_blocks::{AIR, BlockId, BlockRegistry};
use tessera_geom::{ChunkCoord, ChunkSize, VoxelPos};
use tessera_runtime::{
    Artifact, JobContext, LightMapper, MeshBuilder, Scheduler, SchedulerConfig, TerrainGenerator,
};
use tessera_world::VoxelGrid;

pub const EDGE: usize = 8;
pub const GROUND: i32 = 4;

/// Stone below `GROUND`. Chunk (0,0,0) also drops a leaf block into its +X
/// neighbour at `LEAF`.
pub struct FlatGenerator {
    pub stone: BlockId,
    pub leaves: BlockId,
}

pub const LEAF: VoxelPos = VoxelPos::new(EDGE as i32, GROUND + 1, 0);

impl FlatGenerator {
    pub fn new(reg: &BlockRegistry) -> Self {
        Self {
            stone: reg.id_by_name("stone").unwrap(),
            leaves: reg.id_by_name("leaves").unwrap(),
        }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn generate(&self, chunk: ChunkCoord, size: ChunkSize) -> Vec<(VoxelPos, BlockId)> {
        let origin = size.origin(chunk);
        let edge = size.edge() as i32;
        let mut out = Vec::new();
        for y in 0..edge {
            for z in 0..edge {
                for x in 0..edge {
                    let p = origin.offset(x, y, z);
                    if p.y < GROUND {
                        out.push((p, self.stone));
                    }
                }
            }
        }
        if chunk == ChunkCoord::new(0, 0, 0) {
            out.push((LEAF, self.leaves));
        }
        out
    }
}

#[derive(Default)]
pub struct CountingMesher {
    pub installs: Mutex<HashMap<ChunkCoord, usize>>,
    pub solid: Mutex<HashMap<ChunkCoord, usize>>,
}

impl MeshBuilder for CountingMesher {
    fn build(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact {
        let solid = grid
            .try_get_chunk(chunk)
            .map(|c| c.read().voxels().iter().filter(|&&v| v != AIR).count())
            .unwrap_or(0);
        Box::new(solid)
    }

    fn install(&self, chunk: ChunkCoord, artifact: Artifact) {
        if let Ok(solid) = artifact.downcast::<usize>() {
            self.solid.lock().insert(chunk, *solid);
        }
        *self.installs.lock().entry(chunk).or_default() += 1;
    }
}

#[derive(Default)]
pub struct CountingMapper {
    pub installs: Mutex<HashMap<ChunkCoord, usize>>,
}

impl LightMapper for CountingMapper {
    fn map(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact {
        let lit = grid
            .try_get_chunk(chunk)
            .map(|c| c.read().light_data().iter().filter(|l| l.0 != 0).count())
            .unwrap_or(0);
        Box::new(lit)
    }

    fn install(&self, chunk: ChunkCoord, _artifact: Artifact) {
        *self.installs.lock().entry(chunk).or_default() += 1;
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub mesher: Arc<CountingMesher>,
    pub mapper: Arc<CountingMapper>,
}

pub fn harness(max_concurrency: usize) -> Harness {
    let registry = Arc::new(BlockRegistry::builtin());
    let grid = Arc::new(VoxelGrid::new(ChunkSize::new(EDGE), Arc::clone(&registry)));
    let mesher = Arc::new(CountingMesher::default());
    let mapper = Arc::new(CountingMapper::default());
    let ctx = JobContext::new(grid)
        .with_generator(Arc::new(FlatGenerator::new(&registry)))
        .with_mesher(mesher.clone())
        .with_mapper(mapper.clone());
    let config = SchedulerConfig {
        max_concurrency,
        worker_threads: 4,
    };
    Harness {
        scheduler: Scheduler::new(ctx, &config).unwrap(),
        mesher,
        mapper,
    }
}
