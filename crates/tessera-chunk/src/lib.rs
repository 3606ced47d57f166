//! Chunk storage: voxel ids, packed light, and sparse aux data.
#![forbid(unsafe_code)]

mod light;

pub use light::{LightChannel, LightError, MAX_LIGHT, PackedLight};

use hashbrown::HashMap;
use tessera_blocks::{AIR, AuxData, BlockId};
use tessera_geom::{ChunkCoord, ChunkSize, LocalPos};

/// Fixed-size cube of voxels. Dimensions never change after creation.
#[derive(Clone, Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    size: ChunkSize,
    voxels: Vec<BlockId>,
    light: Vec<PackedLight>,
    aux: HashMap<LocalPos, AuxData>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, size: ChunkSize) -> Self {
        Self {
            coord,
            size,
            voxels: vec![AIR; size.volume()],
            light: vec![PackedLight::DARK; size.volume()],
            aux: HashMap::new(),
        }
    }

    /// Builds a chunk from y-major voxel data; short input is padded with air.
    pub fn from_voxels(coord: ChunkCoord, size: ChunkSize, voxels: Vec<BlockId>) -> Self {
        let mut v = voxels;
        if v.len() != size.volume() {
            v.resize(size.volume(), AIR);
        }
        Self {
            coord,
            size,
            voxels: v,
            light: vec![PackedLight::DARK; size.volume()],
            aux: HashMap::new(),
        }
    }

    #[inline]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    #[inline]
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    #[inline]
    fn idx(&self, local: LocalPos) -> usize {
        let edge = self.size.edge();
        debug_assert!(
            (local.x as usize) < edge && (local.y as usize) < edge && (local.z as usize) < edge,
            "local {local:?} outside chunk edge {edge}"
        );
        self.size.index(local)
    }

    #[inline]
    pub fn voxel(&self, local: LocalPos) -> BlockId {
        self.voxels[self.idx(local)]
    }

    #[inline]
    pub fn set_voxel(&mut self, local: LocalPos, id: BlockId) {
        let i = self.idx(local);
        self.voxels[i] = id;
    }

    #[inline]
    pub fn light(&self, local: LocalPos, ch: LightChannel) -> u8 {
        self.light[self.idx(local)].get(ch)
    }

    #[inline]
    pub fn packed_light(&self, local: LocalPos) -> PackedLight {
        self.light[self.idx(local)]
    }

    #[inline]
    pub fn set_light(&mut self, local: LocalPos, ch: LightChannel, value: u8) {
        let i = self.idx(local);
        self.light[i] = self.light[i].with(ch, value);
    }

    #[inline]
    pub fn aux(&self, local: LocalPos) -> AuxData {
        self.aux.get(&local).copied().unwrap_or(AuxData::EMPTY)
    }

    /// Empty aux data is not stored.
    pub fn set_aux(&mut self, local: LocalPos, aux: AuxData) {
        if aux == AuxData::EMPTY {
            self.aux.remove(&local);
        } else {
            self.aux.insert(local, aux);
        }
    }

    pub fn aux_entries(&self) -> usize {
        self.aux.len()
    }

    pub fn has_non_air(&self) -> bool {
        self.voxels.iter().any(|&v| v != AIR)
    }

    pub fn is_all_air(&self) -> bool {
        !self.has_non_air()
    }

    pub fn voxels(&self) -> &[BlockId] {
        &self.voxels
    }

    pub fn light_data(&self) -> &[PackedLight] {
        &self.light
    }

    /// Resets voxels, light and aux data to empty.
    pub fn clear(&mut self) {
        self.voxels.fill(AIR);
        self.light.fill(PackedLight::DARK);
        self.aux.clear();
    }

    pub fn clear_light(&mut self) {
        self.light.fill(PackedLight::DARK);
    }
}
