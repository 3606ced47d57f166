//! Headless demo: layered terrain, face-counting "meshes", light maps that
//! only count lit voxels, and a couple of edits once the world settles.

use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tessera_blocks::{AIR, BlockId, BlockRegistry};
use tessera_chunk::LightChannel;
use tessera_geom::{ChunkCoord, ChunkSize, Face, VoxelPos};
use tessera_runtime::{
    Artifact, Job, JobContext, LightMapper, MeshBuilder, Scheduler, TerrainGenerator, place_block,
    remove_block,
};
use tessera_world::VoxelGrid;
use thiserror::Error;

use crate::config::TesseraConfig;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("block set has no `{0}`")]
    MissingBlock(String),
}

const BEDROCK_Y: i32 = -16;
const DIRT_DEPTH: i32 = 2;

pub struct LayeredGenerator {
    seed: u64,
    bedrock: BlockId,
    stone: BlockId,
    dirt: BlockId,
    grass: BlockId,
    leaves: Option<BlockId>,
    torch: Option<BlockId>,
}

impl LayeredGenerator {
    pub fn new(reg: &BlockRegistry, seed: u64) -> Result<Self, DemoError> {
        let find = |name: &str| {
            reg.id_by_name(name)
                .ok_or_else(|| DemoError::MissingBlock(name.to_string()))
        };
        Ok(Self {
            seed,
            bedrock: find("bedrock")?,
            stone: find("stone")?,
            dirt: find("dirt")?,
            grass: find("grass")?,
            leaves: reg.id_by_name("leaves"),
            torch: reg.id_by_name("torch"),
        })
    }

    fn column_hash(&self, cx: i32, cz: i32) -> u64 {
        let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        for v in [cx as u64, cz as u64] {
            h ^= v.wrapping_mul(0xBF58_476D_1CE4_E5B9);
            h = h.rotate_left(27).wrapping_mul(0x94D0_49BB_1331_11EB);
        }
        h
    }

    fn layer(&self, y: i32) -> BlockId {
        match y {
            y if y == BEDROCK_Y => self.bedrock,
            y if y < BEDROCK_Y || y > 0 => AIR,
            0 => self.grass,
            y if y > -DIRT_DEPTH - 1 => self.dirt,
            _ => self.stone,
        }
    }
}

impl TerrainGenerator for LayeredGenerator {
    fn generate(&self, chunk: ChunkCoord, size: ChunkSize) -> Vec<(VoxelPos, BlockId)> {
        let origin = size.origin(chunk);
        let edge = size.edge() as i32;
        let mut out = Vec::new();
        for y in 0..edge {
            let id = self.layer(origin.y + y);
            if id == AIR {
                continue;
            }
            for z in 0..edge {
                for x in 0..edge {
                    out.push((origin.offset(x, y, z), id));
                }
            }
        }
        if size.chunk_of(VoxelPos::new(origin.x, 1, origin.z)) != chunk {
            return out;
        }
        let h = self.column_hash(chunk.cx, chunk.cz);
        if let (Some(torch), 0) = (self.torch, h % 3) {
            let at = VoxelPos::new(origin.x + edge / 2, 1, origin.z + edge / 2);
            out.push((at, torch));
        }
        // A hedge on the east edge grows into the next chunk over.
        if let (Some(leaves), 1) = (self.leaves, h % 3) {
            let z = origin.z + ((h >> 8) % edge as u64) as i32;
            out.push((VoxelPos::new(origin.x + edge - 1, 1, z), leaves));
            out.push((VoxelPos::new(origin.x + edge, 1, z), leaves));
            out.push((VoxelPos::new(origin.x + edge, 2, z), leaves));
        }
        out
    }
}

/// Counts voxel faces that border air. Stands in for a real mesher.
#[derive(Default)]
pub struct FaceCounter {
    installed: Mutex<HashMap<ChunkCoord, usize>>,
}

impl FaceCounter {
    pub fn total_faces(&self) -> usize {
        self.installed.lock().values().sum()
    }
}

impl MeshBuilder for FaceCounter {
    fn build(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact {
        let size = grid.size();
        let Some(handle) = grid.try_get_chunk(chunk) else {
            return Box::new(0usize);
        };
        let voxels = handle.read().voxels().to_vec();
        let mut faces = 0usize;
        for (i, &id) in voxels.iter().enumerate() {
            if id == AIR {
                continue;
            }
            let local = size.local_from_index(i);
            for face in Face::ALL {
                let (nl, crossed) = size.step_local(local, face);
                let neighbor = if crossed {
                    grid.get_voxel(size.to_global(chunk, local).step(face))
                } else {
                    voxels[size.index(nl)]
                };
                if neighbor == AIR {
                    faces += 1;
                }
            }
        }
        Box::new(faces)
    }

    fn install(&self, chunk: ChunkCoord, artifact: Artifact) {
        match artifact.downcast::<usize>() {
            Ok(faces) => {
                self.installed.lock().insert(chunk, *faces);
            }
            Err(_) => log::warn!("unexpected mesh artifact for {:?}", chunk),
        }
    }
}

/// Records the number of lit voxels per chunk.
#[derive(Default)]
pub struct LitCounter {
    installed: Mutex<HashMap<ChunkCoord, usize>>,
}

impl LitCounter {
    pub fn total_lit(&self) -> usize {
        self.installed.lock().values().sum()
    }
}

impl LightMapper for LitCounter {
    fn map(&self, grid: &VoxelGrid, chunk: ChunkCoord) -> Artifact {
        let lit = grid
            .try_get_chunk(chunk)
            .map(|c| c.read().light_data().iter().filter(|l| l.0 != 0).count())
            .unwrap_or(0);
        Box::new(lit)
    }

    fn install(&self, chunk: ChunkCoord, artifact: Artifact) {
        if let Ok(lit) = artifact.downcast::<usize>() {
            self.installed.lock().insert(chunk, *lit);
        }
    }
}

pub fn run(cfg: &TesseraConfig, registry: Arc<BlockRegistry>, max_ticks: usize) -> Result<(), Box<dyn Error>> {
    let size = cfg.chunk_size();
    let grid = Arc::new(VoxelGrid::new(size, Arc::clone(&registry)));
    let generator = LayeredGenerator::new(&registry, cfg.world.seed.unwrap_or(0))?;
    let mesher = Arc::new(FaceCounter::default());
    let mapper = Arc::new(LitCounter::default());
    let ctx = JobContext::new(Arc::clone(&grid))
        .with_generator(Arc::new(generator))
        .with_mesher(mesher.clone())
        .with_mapper(mapper.clone());

    let mut scheduler = Scheduler::new(ctx, &cfg.scheduler)?;
    scheduler.set_viewer(cfg.viewer());
    scheduler.on_batch_finished(Box::new(|| log::debug!("world settled")));

    let center = size.chunk_of(VoxelPos::new(
        cfg.viewer[0].floor() as i32,
        0,
        cfg.viewer[2].floor() as i32,
    ));
    let r = cfg.world.view_radius;
    scheduler.start_batch();
    for cy in (1 - cfg.world.depth.max(1))..=0 {
        for cz in -r..=r {
            for cx in -r..=r {
                scheduler.submit(Job::Generate {
                    chunk: ChunkCoord::new(center.cx + cx, cy, center.cz + cz),
                });
            }
        }
    }
    log::info!("queued {} chunks for generation", scheduler.queue_len());
    scheduler.finish_batch();

    let t0 = Instant::now();
    let ticks = scheduler.run_until_idle(max_ticks);
    let stats = scheduler.stats();
    log::info!(
        "generated {} chunks in {} ticks ({:.1} ms): {} jobs run, {} dropped, {} deduplicated",
        grid.chunk_count(),
        ticks,
        t0.elapsed().as_secs_f64() * 1000.0,
        stats.completed,
        stats.dropped,
        stats.deduplicated,
    );
    log::info!(
        "{} exposed faces, {} lit voxels",
        mesher.total_faces(),
        mapper.total_lit()
    );
    if !scheduler.is_idle() {
        log::warn!(
            "stopped after {} ticks with {} queued and {} running",
            max_ticks,
            scheduler.queue_len(),
            scheduler.active_len()
        );
        return Ok(());
    }

    edit_demo(&mut scheduler, &registry, max_ticks);
    Ok(())
}

/// Drops a red lamp next to the viewer, then digs it out again.
fn edit_demo(scheduler: &mut Scheduler, registry: &BlockRegistry, max_ticks: usize) {
    let Some(lamp) = registry.id_by_name("lamp_red") else {
        return;
    };
    let grid = Arc::clone(scheduler.grid());
    let viewer = scheduler.viewer();
    let at = VoxelPos::new(viewer.x.floor() as i32, 1, viewer.z.floor() as i32);
    let east = at.offset(3, 0, 0);

    let refused = scheduler.stats().refused_edits;
    place_block(scheduler, at, lamp, None, None);
    scheduler.run_until_idle(max_ticks);
    if scheduler.stats().refused_edits > refused {
        log::info!("lamp placement at {:?} refused", at);
        return;
    }
    log::info!(
        "lamp at {:?}: red {} there, {} three voxels east",
        at,
        grid.get_light(at, LightChannel::Red),
        grid.get_light(east, LightChannel::Red)
    );

    remove_block(scheduler, at);
    scheduler.run_until_idle(max_ticks);
    log::info!(
        "lamp removed: red {} at {:?}, sun {}",
        grid.get_light(east, LightChannel::Red),
        east,
        grid.get_light(at, LightChannel::Sun)
    );
}
