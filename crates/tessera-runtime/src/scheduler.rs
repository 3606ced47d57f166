//! Staged scheduler: orders jobs by pipeline stage and viewer distance, keeps
//! running jobs on disjoint chunk sets, and applies results on the calling
//! thread.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use hashbrown::{HashMap, HashSet};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tessera_geom::{ChunkCoord, Vec3};
use tessera_world::VoxelGrid;

use crate::backlog::Backlog;
use crate::collaborators::JobContext;
use crate::error::RuntimeError;
use crate::job::{Coordinator, Job, JobOutput};
use crate::queue::{Enqueued, Priority, PriorityQueue};

const IDLE_WAIT: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on jobs between pre-check and commit.
    pub max_concurrency: usize,
    /// Worker pool size; 0 lets rayon pick.
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            worker_threads: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: usize,
    pub completed: usize,
    pub dropped: usize,
    /// Queue and active set drained after some work this batch.
    pub batch_finished: bool,
}

impl TickReport {
    pub fn did_work(&self) -> bool {
        self.started + self.completed + self.dropped > 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub started: u64,
    pub completed: u64,
    pub dropped: u64,
    pub batches: u64,
    /// Edits a block hook refused.
    pub refused_edits: u64,
    /// Light bodies that stepped into a chunk outside their reservation.
    pub reservation_escapes: u64,
}

/// A job whose body is running or whose result has not been committed yet.
#[derive(Clone, Debug)]
pub struct ActiveJob {
    pub id: u64,
    pub name: &'static str,
    pub stage: u32,
    pub affected: HashSet<ChunkCoord>,
}

struct Completion {
    id: u64,
    job: Job,
    output: JobOutput,
}

pub type BatchListener = Box<dyn FnMut() + Send>;

pub struct Scheduler {
    co: Coordinator,
    queue: PriorityQueue<Job>,
    active: HashMap<u64, ActiveJob>,
    reserved: HashSet<ChunkCoord>,
    pool: ThreadPool,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    stash: Vec<Completion>,
    max_concurrency: usize,
    next_id: u64,
    next_edit: u64,
    batch_depth: u32,
    viewer: Vec3,
    worked: bool,
    listeners: Vec<BatchListener>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(ctx: JobContext, config: &SchedulerConfig) -> Result<Self, RuntimeError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("tessera-job-{i}"));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder.build()?;
        let (done_tx, done_rx) = unbounded();
        log::info!(
            target: "scheduler",
            "scheduler up: {} workers, max {} active",
            pool.current_num_threads(),
            config.max_concurrency.max(1)
        );
        Ok(Self {
            co: Coordinator {
                ctx: Arc::new(ctx),
                backlog: Backlog::default(),
                generated: HashSet::new(),
            },
            queue: PriorityQueue::new(),
            active: HashMap::new(),
            reserved: HashSet::new(),
            pool,
            done_tx,
            done_rx,
            stash: Vec::new(),
            max_concurrency: config.max_concurrency.max(1),
            next_id: 0,
            next_edit: 0,
            batch_depth: 0,
            viewer: Vec3::ZERO,
            worked: false,
            listeners: Vec::new(),
            stats: SchedulerStats::default(),
        })
    }

    pub fn grid(&self) -> &Arc<VoxelGrid> {
        &self.co.ctx.grid
    }

    pub fn context(&self) -> &JobContext {
        &self.co.ctx
    }

    pub fn set_viewer(&mut self, pos: Vec3) {
        self.viewer = pos;
    }

    pub fn viewer(&self) -> Vec3 {
        self.viewer
    }

    pub fn on_batch_finished(&mut self, listener: BatchListener) {
        self.listeners.push(listener);
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.co.backlog.len()
    }

    pub fn contains(&self, job: &Job) -> bool {
        self.queue.contains(job)
    }

    pub fn queued(&self) -> impl Iterator<Item = (&Priority, &Job)> {
        self.queue.iter()
    }

    /// Active jobs sorted by start order.
    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        let mut jobs: Vec<ActiveJob> = self.active.values().cloned().collect();
        jobs.sort_by_key(|a| a.id);
        jobs
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty() && self.stash.is_empty()
    }

    pub fn is_suspended(&self) -> bool {
        self.batch_depth > 0
    }

    /// Suspends `tick` until the matching `finish_batch`. Nests.
    pub fn start_batch(&mut self) {
        self.batch_depth += 1;
    }

    pub fn finish_batch(&mut self) {
        if self.batch_depth == 0 {
            log::warn!(target: "scheduler", "finish_batch without start_batch");
            return;
        }
        self.batch_depth -= 1;
    }

    pub(crate) fn next_edit_serial(&mut self) -> u64 {
        self.next_edit += 1;
        self.next_edit
    }

    pub fn priority_of(&self, job: &Job) -> Priority {
        let size = self.co.ctx.grid.size();
        let distance = job
            .primary_chunk(size)
            .map(|c| c.center().scale(size.edge() as f32).distance(self.viewer))
            .unwrap_or(0.0);
        Priority::new(job.stage(), distance)
    }

    pub fn submit(&mut self, job: Job) -> Enqueued {
        let name = job.name();
        let priority = self.priority_of(&job);
        let outcome = self.queue.enqueue_or_replace(job, priority);
        self.stats.submitted += 1;
        if outcome == Enqueued::Kept {
            self.stats.deduplicated += 1;
        }
        log::trace!(
            target: "scheduler",
            "submit {} at stage {} dist {:.1}: {:?}",
            name, priority.stage, priority.distance, outcome
        );
        outcome
    }

    /// Commits finished jobs, then starts as many queued jobs as the stage
    /// gate and the chunk reservations allow.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.batch_depth > 0 {
            return report;
        }
        report.completed = self.drain_completions();
        (report.started, report.dropped) = self.schedule();
        if report.did_work() {
            self.worked = true;
        }
        if self.worked && self.is_idle() {
            self.worked = false;
            self.stats.batches += 1;
            report.batch_finished = true;
            log::debug!(target: "scheduler", "batch finished ({:?})", self.stats);
            for listener in &mut self.listeners {
                listener();
            }
        }
        report
    }

    /// Ticks until nothing is queued or running, blocking briefly on the
    /// completion channel when a tick makes no progress. Returns the number
    /// of ticks taken, or `max_ticks` when work remains.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        if self.batch_depth > 0 {
            log::warn!(target: "scheduler", "run_until_idle inside a batch");
            return 0;
        }
        for t in 0..max_ticks {
            let report = self.tick();
            if self.is_idle() {
                return t + 1;
            }
            if !report.did_work() {
                match self.done_rx.recv_timeout(IDLE_WAIT) {
                    Ok(c) => self.stash.push(c),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        max_ticks
    }

    fn drain_completions(&mut self) -> usize {
        self.stash.extend(self.done_rx.try_iter());
        let done = std::mem::take(&mut self.stash);
        let count = done.len();
        for c in done {
            self.complete(c);
        }
        count
    }

    fn complete(&mut self, c: Completion) {
        let Completion { id, job, output } = c;
        let name = job.name();
        let active = self.active.remove(&id);
        if let (Some(active), Some(touched)) = (&active, output.touched()) {
            let mut escaped: Vec<&ChunkCoord> = touched.difference(&active.affected).collect();
            if !escaped.is_empty() {
                escaped.sort();
                self.stats.reservation_escapes += 1;
                log::error!(
                    target: "scheduler",
                    "{} #{} touched unreserved chunks {:?}",
                    name, id, escaped
                );
            }
        }
        if output.is_refused_edit() {
            self.stats.refused_edits += 1;
        }
        let follow_ups = job.commit(output, &mut self.co);
        if let Some(active) = active {
            for coord in &active.affected {
                self.reserved.remove(coord);
            }
        }
        self.stats.completed += 1;
        log::trace!(
            target: "scheduler",
            "committed {} #{} -> {} follow-ups",
            name, id, follow_ups.len()
        );
        for job in follow_ups {
            self.submit(job);
        }
    }

    fn schedule(&mut self) -> (usize, usize) {
        let mut started = 0;
        let mut dropped = 0;
        let grid = Arc::clone(&self.co.ctx.grid);
        while self.active.len() < self.max_concurrency {
            let Some(head) = self.queue.peek_min_priority() else {
                break;
            };
            let min_active = self.active.values().map(|a| a.stage).min();
            if min_active.is_some_and(|m| head.stage > m) {
                break;
            }
            let reserved = &self.reserved;
            let mut picked_affected = None;
            let picked = self.queue.dequeue_if(|job| {
                if min_active.is_some_and(|m| job.stage() > m) {
                    return false;
                }
                let affected = job.affected_chunks(&grid);
                if !affected.is_disjoint(reserved) {
                    return false;
                }
                picked_affected = Some(affected);
                true
            });
            let (Some(mut job), Some(affected)) = (picked, picked_affected) else {
                break;
            };
            if !job.pre_check(&mut self.co) {
                dropped += 1;
                self.stats.dropped += 1;
                log::debug!(target: "scheduler", "dropped {} at pre-check", job.name());
                continue;
            }
            self.start(job, affected);
            started += 1;
        }
        (started, dropped)
    }

    fn start(&mut self, job: Job, affected: HashSet<ChunkCoord>) {
        let id = self.next_id;
        self.next_id += 1;
        self.reserved.extend(affected.iter().copied());
        self.active.insert(
            id,
            ActiveJob {
                id,
                name: job.name(),
                stage: job.stage(),
                affected,
            },
        );
        self.stats.started += 1;

        let ctx = Arc::clone(&self.co.ctx);
        let tx = self.done_tx.clone();
        self.pool.spawn(move || {
            let output = job.run(&ctx);
            let _ = tx.send(Completion { id, job, output });
        });
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.len())
            .field("active", &self.active.len())
            .field("reserved", &self.reserved.len())
            .field("batch_depth", &self.batch_depth)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_blocks::BlockRegistry;
    use tessera_geom::ChunkSize;

    fn scheduler() -> Scheduler {
        let grid = Arc::new(VoxelGrid::new(
            ChunkSize::new(16),
            Arc::new(BlockRegistry::builtin()),
        ));
        let config = SchedulerConfig {
            max_concurrency: 4,
            worker_threads: 2,
        };
        Scheduler::new(JobContext::new(grid), &config).unwrap()
    }

    #[test]
    fn duplicate_submissions_collapse() {
        let mut s = scheduler();
        let job = Job::Rebuild {
            chunk: ChunkCoord::new(3, 0, 3),
        };
        assert_eq!(s.submit(job.clone()), Enqueued::Inserted);
        assert_eq!(s.submit(job), Enqueued::Kept);
        assert_eq!(s.queue_len(), 1);
        assert_eq!(s.stats().deduplicated, 1);
    }

    #[test]
    fn nearer_chunks_go_first_within_a_stage() {
        let mut s = scheduler();
        s.set_viewer(Vec3::new(100.0, 8.0, 8.0));
        s.submit(Job::Rebuild {
            chunk: ChunkCoord::new(0, 0, 0),
        });
        s.submit(Job::Rebuild {
            chunk: ChunkCoord::new(6, 0, 0),
        });
        s.submit(Job::Generate {
            chunk: ChunkCoord::new(-9, 0, 0),
        });
        let order: Vec<String> = s.queued().map(|(_, j)| format!("{j:?}")).collect();
        assert!(order[0].starts_with("Generate"));
        assert!(order[1].contains("cx: 6"));
    }

    #[test]
    fn batches_suspend_ticks() {
        let mut s = scheduler();
        s.start_batch();
        s.start_batch();
        s.submit(Job::sunlight());
        assert_eq!(s.tick(), TickReport::default());
        s.finish_batch();
        assert!(s.is_suspended());
        assert_eq!(s.tick(), TickReport::default());
        s.finish_batch();
        let report = s.tick();
        // Nothing is pending in the topmost set, so the job drops.
        assert_eq!(report.dropped, 1);
        assert!(report.batch_finished);
    }

    #[test]
    fn listeners_fire_once_per_batch() {
        let mut s = scheduler();
        let hits = Arc::new(parking_lot::Mutex::new(0));
        let seen = Arc::clone(&hits);
        s.on_batch_finished(Box::new(move || *seen.lock() += 1));
        s.submit(Job::sunlight());
        s.run_until_idle(10);
        assert_eq!(*hits.lock(), 1);
        assert!(!s.tick().batch_finished);
        assert_eq!(*hits.lock(), 1);
    }
}
