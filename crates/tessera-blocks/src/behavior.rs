//! Placement/removal hooks, dispatched once per call over a closed set of behaviours.

use serde::Deserialize;
use tessera_geom::{ChunkCoord, Face, LocalPos, VoxelPos};

use crate::{AIR, AuxData, BlockId};

/// Read-only view of the grid handed to hooks.
pub trait VoxelQuery {
    fn voxel(&self, pos: VoxelPos) -> BlockId;
    fn aux(&self, pos: VoxelPos) -> AuxData;
}

pub struct PlaceContext<'a> {
    pub world: &'a dyn VoxelQuery,
    pub chunk: ChunkCoord,
    pub global: VoxelPos,
    pub local: LocalPos,
    /// Face of the clicked voxel the new block was placed against.
    pub placement_face: Option<Face>,
    /// Direction the placer was looking.
    pub look_dir: Option<Face>,
}

pub struct RemoveContext<'a> {
    pub world: &'a dyn VoxelQuery,
    pub chunk: ChunkCoord,
    pub global: VoxelPos,
    pub local: LocalPos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Accept(AuxData),
    Reject,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockBehavior {
    #[default]
    Plain,
    /// Turns toward the placer; opaque faces rotate with it.
    Oriented,
    /// Needs a non-empty voxel directly below.
    Supported,
    /// Refuses removal.
    Indestructible,
}

impl BlockBehavior {
    pub fn on_place(self, ctx: &PlaceContext<'_>) -> Placement {
        match self {
            BlockBehavior::Plain | BlockBehavior::Indestructible => {
                Placement::Accept(AuxData::EMPTY)
            }
            BlockBehavior::Oriented => {
                let facing = ctx
                    .placement_face
                    .filter(|f| f.is_horizontal())
                    .or_else(|| ctx.look_dir.map(Face::opposite).filter(|f| f.is_horizontal()));
                let aux = AuxData::EMPTY
                    .with_facing(facing)
                    .with_rotation(facing.map(Face::yaw_turns).unwrap_or(0));
                Placement::Accept(aux)
            }
            BlockBehavior::Supported => {
                if ctx.world.voxel(ctx.global.step(Face::NegY)) == AIR {
                    Placement::Reject
                } else {
                    Placement::Accept(AuxData::EMPTY)
                }
            }
        }
    }

    pub fn on_remove(self, _ctx: &RemoveContext<'_>) -> bool {
        !matches!(self, BlockBehavior::Indestructible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapQuery(HashMap<VoxelPos, BlockId>);

    impl VoxelQuery for MapQuery {
        fn voxel(&self, pos: VoxelPos) -> BlockId {
            self.0.get(&pos).copied().unwrap_or(AIR)
        }
        fn aux(&self, _pos: VoxelPos) -> AuxData {
            AuxData::EMPTY
        }
    }

    fn place_ctx<'a>(
        world: &'a MapQuery,
        global: VoxelPos,
        placement_face: Option<Face>,
        look_dir: Option<Face>,
    ) -> PlaceContext<'a> {
        PlaceContext {
            world,
            chunk: ChunkCoord::default(),
            global,
            local: LocalPos::default(),
            placement_face,
            look_dir,
        }
    }

    #[test]
    fn supported_needs_ground() {
        let mut q = MapQuery::default();
        let at = VoxelPos::new(0, 5, 0);
        let ctx = place_ctx(&q, at, None, None);
        assert_eq!(BlockBehavior::Supported.on_place(&ctx), Placement::Reject);
        q.0.insert(VoxelPos::new(0, 4, 0), 1);
        let ctx = place_ctx(&q, at, None, None);
        assert!(matches!(
            BlockBehavior::Supported.on_place(&ctx),
            Placement::Accept(_)
        ));
    }

    #[test]
    fn oriented_faces_the_placer() {
        let q = MapQuery::default();
        let ctx = place_ctx(&q, VoxelPos::default(), Some(Face::PosY), Some(Face::PosX));
        let Placement::Accept(aux) = BlockBehavior::Oriented.on_place(&ctx) else {
            panic!("oriented placement rejected");
        };
        assert_eq!(aux.facing(), Some(Face::NegX));
        assert_eq!(aux.rotation(), Face::NegX.yaw_turns());
    }

    #[test]
    fn indestructible_refuses_removal() {
        let q = MapQuery::default();
        let ctx = RemoveContext {
            world: &q,
            chunk: ChunkCoord::default(),
            global: VoxelPos::default(),
            local: LocalPos::default(),
        };
        assert!(!BlockBehavior::Indestructible.on_remove(&ctx));
        assert!(BlockBehavior::Plain.on_remove(&ctx));
    }
}
