//! Interactive block edits. Each edit is queued as a voxel-stage job, so the
//! write waits for any running job that has the chunk or its neighbours
//! reserved. Remeshing and relighting follow from the edit's commit.

use tessera_blocks::{AIR, BlockId};
use tessera_geom::{Face, VoxelPos};

use crate::job::Job;
use crate::queue::Enqueued;
use crate::scheduler::Scheduler;

/// Queues placing `id` at `pos`. Refusals by a block hook show up in
/// [`SchedulerStats::refused_edits`](crate::SchedulerStats) once the edit
/// has run.
pub fn place_block(
    scheduler: &mut Scheduler,
    pos: VoxelPos,
    id: BlockId,
    placement_face: Option<Face>,
    look_dir: Option<Face>,
) -> Enqueued {
    let serial = scheduler.next_edit_serial();
    scheduler.submit(Job::Edit {
        pos,
        id,
        placement_face,
        look_dir,
        serial,
    })
}

pub fn remove_block(scheduler: &mut Scheduler, pos: VoxelPos) -> Enqueued {
    place_block(scheduler, pos, AIR, None, None)
}
