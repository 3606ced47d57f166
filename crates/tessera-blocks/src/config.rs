use serde::Deserialize;
use tessera_geom::Face;

use crate::behavior::BlockBehavior;
use crate::registry::RenderKind;

// Top-level blocks config file
#[derive(Deserialize, Debug, Clone, Default)]
pub struct BlocksConfig {
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BlockDef {
    pub name: String,
    // Explicit id; otherwise the next free slot after the previous block.
    #[serde(default)]
    pub id: Option<u16>,
    #[serde(default)]
    pub render: Option<RenderKind>,
    // Faces (in the unrotated, north-facing frame) that block light. Defaults
    // to all six for solid blocks and none otherwise.
    #[serde(default)]
    pub opaque_faces: Option<Vec<Face>>,
    #[serde(default)]
    pub behavior: Option<BlockBehavior>,
    // Red/green/blue emission, each 0..=15.
    #[serde(default)]
    pub emission: Option<[u8; 3]>,
}
