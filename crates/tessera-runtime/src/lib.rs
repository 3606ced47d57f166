//! Staged job pipeline over the voxel grid: priority queue with dedup,
//! chunk reservations, a rayon worker pool and coordinator-side commits.
#![forbid(unsafe_code)]

mod backlog;
mod collaborators;
mod edits;
mod error;
mod job;
mod queue;
mod scheduler;

pub use backlog::Backlog;
pub use collaborators::{Artifact, JobContext, LightMapper, MeshBuilder, TerrainGenerator};
pub use edits::{place_block, remove_block};
pub use error::RuntimeError;
pub use job::{
    Job, LightChange, STAGE_GENERATE, STAGE_LIGHT, STAGE_LIGHT_MAPPING, STAGE_NEW_CHUNK_LIGHT,
    STAGE_REBUILD, STAGE_VOXELS,
};
pub use queue::{Enqueued, Priority, PriorityQueue};
pub use scheduler::{
    ActiveJob, BatchListener, Scheduler, SchedulerConfig, SchedulerStats, TickReport,
};
