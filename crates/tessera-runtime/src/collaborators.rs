//! Hooks for the parts of the pipeline that live outside the core.

use std::any::Any;
use std::sync::Arc;

use tessera_blocks::{BlockId, BlockRegistry};
use tessera_geom::{ChunkCoord, ChunkSize, VoxelPos};
use tessera_world::VoxelGrid;

/// Opaque product of a mesh or light-map build, handed back on install.
pub type Artifact = Box<dyn Any + Send>;

pub trait TerrainGenerator: Send + Sync {
    /// Voxels for `chunk`. Entries may fall outside the chunk (e.g. a tree
    /// crown spilling over a border); those are deferred until their owner
    /// is loaded.
    fn generate(&self, chunk: ChunkCoord, size: ChunkSize) -> Vec<(VoxelPos, BlockId)>;
}

pub trait MeshBuilder: Send + Sync {
    /// Runs on a worker; may read `chunk` and its face neighbours.
    fn build(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact;
    /// Runs on the coordinating thread.
    fn install(&self, chunk: ChunkCoord, artifact: Artifact);
}

pub trait LightMapper: Send + Sync {
    fn map(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact;
    fn install(&self, chunk: ChunkCoord, artifact: Artifact);
}

/// Everything a job body may touch. Shared with workers behind an `Arc`.
#[derive(Clone)]
pub struct JobContext {
    pub grid: Arc<VoxelGrid>,
    pub registry: Arc<BlockRegistry>,
    pub generator: Option<Arc<dyn TerrainGenerator>>,
    pub mesher: Option<Arc<dyn MeshBuilder>>,
    pub mapper: Option<Arc<dyn LightMapper>>,
}

impl JobContext {
    pub fn new(grid: Arc<VoxelGrid>) -> Self {
        let registry = Arc::clone(grid.registry());
        Self {
            grid,
            registry,
            generator: None,
            mesher: None,
            mapper: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TerrainGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_mesher(mut self, mesher: Arc<dyn MeshBuilder>) -> Self {
        self.mesher = Some(mesher);
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn LightMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }
}
