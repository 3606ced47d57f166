//! Block types, behaviour hooks, and the registry threaded through the engine.
#![forbid(unsafe_code)]

pub mod aux_data;
pub mod behavior;
pub mod config;
pub mod error;
pub mod registry;

pub use aux_data::{AuxData, AuxField, AuxKey};
pub use behavior::{BlockBehavior, PlaceContext, Placement, RemoveContext, VoxelQuery};
pub use error::BlockConfigError;
pub use registry::{BlockRegistry, BlockType, FaceOpacity, RenderKind};

/// Numeric voxel type code. `0` is always empty space.
pub type BlockId = u16;

pub const AIR: BlockId = 0;
