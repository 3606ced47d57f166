use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tessera_geom::{Face, VoxelPos};

use crate::behavior::{BlockBehavior, PlaceContext, Placement, RemoveContext, VoxelQuery};
use crate::config::{BlockDef, BlocksConfig};
use crate::error::BlockConfigError;
use crate::{AIR, AuxData, BlockId};

const ALL_FACES_MASK: u8 = 0b11_1111;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    #[default]
    Empty,
    Solid,
    Transparent,
}

/// Opacity predicate consumed by light propagation.
pub trait FaceOpacity: Sync {
    /// Whether `face` of a voxel of type `voxel`, rotated by `rotation`
    /// quarter turns, stops light crossing it.
    fn is_face_opaque(&self, voxel: BlockId, face: Face, rotation: u8) -> bool;
}

#[derive(Clone, Debug)]
pub struct BlockType {
    pub id: BlockId,
    pub name: String,
    pub render: RenderKind,
    /// Opaque faces in the unrotated frame, one bit per `Face::index`.
    pub opaque_mask: u8,
    pub behavior: BlockBehavior,
    pub emission: [u8; 3],
}

impl BlockType {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.render == RenderKind::Empty
    }

    pub fn is_face_opaque(&self, face: Face, rotation: u8) -> bool {
        if self.render != RenderKind::Solid {
            return false;
        }
        // World face -> model face: undo the block's yaw.
        let model = face.rotate_y((4 - rotation % 4) % 4);
        self.opaque_mask & model.bit() != 0
    }

    #[inline]
    pub fn emits_light(&self) -> bool {
        self.emission.iter().any(|&e| e > 0)
    }
}

#[derive(Clone, Debug)]
pub struct BlockRegistry {
    blocks: Vec<Option<BlockType>>,
    by_name: HashMap<String, BlockId>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    /// Registry containing only empty space (`air`, id 0).
    pub fn new() -> Self {
        let mut reg = Self {
            blocks: Vec::new(),
            by_name: HashMap::new(),
        };
        reg.insert(air_type());
        reg
    }

    /// Small default block set used by the driver and tests.
    pub fn builtin() -> Self {
        Self::from_config(builtin_config())
            .unwrap_or_else(|e| panic!("builtin block set is invalid: {e}"))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BlockConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BlockConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, BlockConfigError> {
        let cfg: BlocksConfig = toml::from_str(text)?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: BlocksConfig) -> Result<Self, BlockConfigError> {
        let mut reg = Self {
            blocks: Vec::new(),
            by_name: HashMap::new(),
        };
        let mut next_id: u16 = 0;
        for def in cfg.blocks {
            let id = def.id.unwrap_or(next_id);
            next_id = id.saturating_add(1);
            let ty = compile_block(id, def)?;
            if reg.by_name.contains_key(&ty.name) {
                return Err(BlockConfigError::DuplicateName(ty.name));
            }
            if let Some(existing) = reg.get(id) {
                return Err(BlockConfigError::DuplicateId {
                    id,
                    first: existing.name.clone(),
                    second: ty.name,
                });
            }
            if id == AIR && !ty.is_empty() {
                return Err(BlockConfigError::ReservedId(ty.name));
            }
            reg.insert(ty);
        }
        if reg.get(AIR).is_none() {
            reg.insert(air_type());
        }
        log::debug!(target: "blocks", "registry compiled with {} block types", reg.len());
        Ok(reg)
    }

    fn insert(&mut self, ty: BlockType) {
        let slot = ty.id as usize;
        if self.blocks.len() <= slot {
            self.blocks.resize(slot + 1, None);
        }
        self.by_name.insert(ty.name.clone(), ty.id);
        self.blocks[slot] = Some(ty);
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        self.blocks.get(id as usize).and_then(Option::as_ref)
    }

    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.blocks.iter().flatten()
    }

    #[inline]
    pub fn emission(&self, id: BlockId) -> [u8; 3] {
        self.get(id).map(|t| t.emission).unwrap_or([0; 3])
    }

    /// Placement hook; unknown ids place with empty aux data.
    pub fn on_place(&self, id: BlockId, ctx: &PlaceContext<'_>) -> Placement {
        match self.get(id) {
            Some(ty) => ty.behavior.on_place(ctx),
            None => Placement::Accept(AuxData::EMPTY),
        }
    }

    pub fn on_remove(&self, id: BlockId, ctx: &RemoveContext<'_>) -> bool {
        self.get(id).map(|ty| ty.behavior.on_remove(ctx)).unwrap_or(true)
    }

    /// Face the voxel at `pos` is turned toward; unoriented voxels face north.
    pub fn forward_face(&self, world: &dyn VoxelQuery, pos: VoxelPos) -> Face {
        world.aux(pos).facing().unwrap_or(Face::NegZ)
    }
}

impl FaceOpacity for BlockRegistry {
    #[inline]
    fn is_face_opaque(&self, voxel: BlockId, face: Face, rotation: u8) -> bool {
        if voxel == AIR {
            return false;
        }
        // Unknown ids are treated as fully opaque.
        self.get(voxel)
            .map(|ty| ty.is_face_opaque(face, rotation))
            .unwrap_or(true)
    }
}

fn air_type() -> BlockType {
    BlockType {
        id: AIR,
        name: "air".into(),
        render: RenderKind::Empty,
        opaque_mask: 0,
        behavior: BlockBehavior::Plain,
        emission: [0; 3],
    }
}

fn compile_block(id: BlockId, def: BlockDef) -> Result<BlockType, BlockConfigError> {
    let render = def.render.unwrap_or(if id == AIR {
        RenderKind::Empty
    } else {
        RenderKind::Solid
    });
    let opaque_mask = match (&def.opaque_faces, render) {
        (_, RenderKind::Empty | RenderKind::Transparent) => 0,
        (Some(faces), RenderKind::Solid) => faces.iter().fold(0u8, |m, f| m | f.bit()),
        (None, RenderKind::Solid) => ALL_FACES_MASK,
    };
    let emission = def.emission.unwrap_or([0; 3]);
    if let Some(&value) = emission.iter().find(|&&e| e > 15) {
        return Err(BlockConfigError::EmissionOutOfRange {
            name: def.name,
            value,
        });
    }
    Ok(BlockType {
        id,
        name: def.name,
        render,
        opaque_mask,
        behavior: def.behavior.unwrap_or_default(),
        emission,
    })
}

fn block(
    name: &str,
    render: RenderKind,
    opaque_faces: Option<Vec<Face>>,
    behavior: BlockBehavior,
    emission: [u8; 3],
) -> BlockDef {
    BlockDef {
        name: name.into(),
        id: None,
        render: Some(render),
        opaque_faces,
        behavior: Some(behavior),
        emission: Some(emission),
    }
}

fn builtin_config() -> BlocksConfig {
    use BlockBehavior::*;
    use RenderKind::*;
    BlocksConfig {
        blocks: vec![
            block("air", Empty, None, Plain, [0; 3]),
            block("stone", Solid, None, Plain, [0; 3]),
            block("dirt", Solid, None, Plain, [0; 3]),
            block("grass", Solid, None, Plain, [0; 3]),
            block("bedrock", Solid, None, Indestructible, [0; 3]),
            block("glass", Transparent, None, Plain, [0; 3]),
            block("leaves", Transparent, None, Plain, [0; 3]),
            block("slab", Solid, Some(vec![Face::NegY]), Plain, [0; 3]),
            block(
                "furnace",
                Solid,
                Some(vec![Face::PosY, Face::NegY, Face::PosX, Face::NegX, Face::PosZ]),
                Oriented,
                [0; 3],
            ),
            block("torch", Transparent, None, Supported, [14, 11, 6]),
            block("lamp_red", Solid, None, Plain, [15, 0, 0]),
            block("lamp_green", Solid, None, Plain, [0, 15, 0]),
            block("lamp_blue", Solid, None, Plain, [0, 0, 15]),
        ],
    }
}
