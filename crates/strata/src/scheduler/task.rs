//! # Task Manager
//!
//! One-shot, delayed and repeating tasks drained single-threaded during the
//! `Tasks` stage of every tick.
//!
//! ```text
//!  run_due(tick)
//!  ─────────────
//!  1. collect tasks with due_tick <= tick
//!  2. sort by (priority, submission order)
//!  3. for each: take it out of the queue, run it with the queue unlocked
//!  4. repeating and not cancelled while running -> requeue at tick + period
//! ```
//!
//! Running a task with the queue unlocked lets it schedule or cancel other
//! tasks (itself included). Tasks it schedules are never picked up by the
//! drain that is already in progress.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use strata_core::{CoreResult, StageClock, TickStage};

use super::worker::{Job, WorkerPool};
use crate::error::EngineResult;

/// Owner name used for engine-internal tasks.
pub const CORE_OWNER: &str = "strata";

/// Handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Drain order within one tick. `Critical` runs first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskPriority {
    /// Runs before everything else.
    Critical,
    /// Runs early.
    High,
    /// The default.
    #[default]
    Normal,
    /// Runs late.
    Low,
    /// Runs last.
    Lowest,
}

enum TaskBody {
    /// Runs on the tick thread.
    Sync(Box<dyn FnMut() + Send>),
    /// Handed to the worker pool when due.
    Async(Option<Job>),
}

struct QueuedTask {
    owner: String,
    priority: TaskPriority,
    due_tick: u64,
    period: Option<u64>,
    seq: u64,
    body: TaskBody,
}

/// Read-only view of a queued task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTask {
    /// Task handle.
    pub id: TaskId,
    /// Owner name given at scheduling time.
    pub owner: String,
    /// Drain priority.
    pub priority: TaskPriority,
    /// First tick it may run on.
    pub due_tick: u64,
    /// Repeat period in ticks, if repeating.
    pub period: Option<u64>,
    /// Whether it runs on the worker pool.
    pub is_async: bool,
}

/// The task currently executing in `run_due`.
struct Running {
    id: TaskId,
    owner: String,
    repeating: bool,
    cancelled: bool,
}

#[derive(Default)]
struct TaskQueue {
    tasks: HashMap<TaskId, QueuedTask>,
    running: Option<Running>,
    next_id: u64,
    next_seq: u64,
}

impl TaskQueue {
    fn push(
        &mut self,
        owner: &str,
        priority: TaskPriority,
        due_tick: u64,
        period: Option<u64>,
        body: TaskBody,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert(
            id,
            QueuedTask {
                owner: owner.to_owned(),
                priority,
                due_tick,
                period,
                seq,
                body,
            },
        );
        id
    }
}

/// Task queue plus the async worker pool.
pub struct TaskManager {
    queue: Mutex<TaskQueue>,
    clock: StageClock,
    /// Tick of the latest drain.
    current_tick: AtomicU64,
    pool: WorkerPool,
}

impl TaskManager {
    /// Creates a manager whose async tasks run on `worker_threads` threads.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`](crate::EngineError::Io) if the pool cannot spawn.
    pub fn new(clock: StageClock, worker_threads: usize) -> EngineResult<Self> {
        Ok(Self {
            queue: Mutex::new(TaskQueue::default()),
            clock,
            current_tick: AtomicU64::new(0),
            pool: WorkerPool::new("strata-worker", worker_threads)?,
        })
    }

    fn due_in(&self, delay: u64) -> u64 {
        self.current_tick.load(Ordering::Acquire).saturating_add(delay)
    }

    /// Runs `task` once on the tick thread, `delay` ticks from now.
    pub fn schedule_sync_delayed(
        &self,
        owner: &str,
        task: impl FnOnce() + Send + 'static,
        delay: u64,
        priority: TaskPriority,
    ) -> TaskId {
        let mut task = Some(task);
        let body = TaskBody::Sync(Box::new(move || {
            if let Some(task) = task.take() {
                task();
            }
        }));
        let due = self.due_in(delay);
        self.queue.lock().push(owner, priority, due, None, body)
    }

    /// Runs `task` on the tick thread after `delay` ticks, then every
    /// `period` ticks until cancelled. A period of 0 is treated as 1.
    pub fn schedule_sync_repeating(
        &self,
        owner: &str,
        task: impl FnMut() + Send + 'static,
        delay: u64,
        period: u64,
        priority: TaskPriority,
    ) -> TaskId {
        let due = self.due_in(delay);
        self.queue.lock().push(
            owner,
            priority,
            due,
            Some(period.max(1)),
            TaskBody::Sync(Box::new(task)),
        )
    }

    /// Runs `task` on the worker pool as soon as a worker is free.
    ///
    /// Returns `None` once the pool is shut down. Async tasks must not touch
    /// live world state.
    pub fn schedule_async(&self, owner: &str, task: impl FnOnce() + Send + 'static) -> Option<TaskId> {
        let id = {
            let mut queue = self.queue.lock();
            let id = TaskId(queue.next_id);
            queue.next_id += 1;
            id
        };
        if self.pool.submit(Box::new(task)) {
            tracing::trace!("{} from {} submitted to worker pool", id, owner);
            Some(id)
        } else {
            tracing::warn!("async task from {} rejected: worker pool shut down", owner);
            None
        }
    }

    /// Hands `task` to the worker pool during the drain `delay` ticks from now.
    pub fn schedule_async_delayed(
        &self,
        owner: &str,
        task: impl FnOnce() + Send + 'static,
        delay: u64,
    ) -> TaskId {
        let due = self.due_in(delay);
        self.queue.lock().push(
            owner,
            TaskPriority::Normal,
            due,
            None,
            TaskBody::Async(Some(Box::new(task))),
        )
    }

    /// Async task owned by the engine itself.
    pub fn run_core_async_task(&self, task: impl FnOnce() + Send + 'static) -> Option<TaskId> {
        self.schedule_async(CORE_OWNER, task)
    }

    /// Cancels a queued task, or stops a running repeating task from being
    /// requeued. Returns false if nothing was cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.lock();
        if queue.tasks.remove(&id).is_some() {
            return true;
        }
        match queue.running.as_mut() {
            Some(running) if running.id == id && running.repeating && !running.cancelled => {
                running.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Cancels every task scheduled by `owner`. Returns how many.
    pub fn cancel_owner(&self, owner: &str) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.tasks.len();
        queue.tasks.retain(|_, task| task.owner != owner);
        let mut cancelled = before - queue.tasks.len();
        if let Some(running) = queue.running.as_mut() {
            if running.owner == owner && running.repeating && !running.cancelled {
                running.cancelled = true;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!("cancelled {} tasks owned by {}", cancelled, owner);
        }
        cancelled
    }

    /// Cancels every queued task.
    pub fn cancel_all(&self) {
        let mut queue = self.queue.lock();
        queue.tasks.clear();
        if let Some(running) = queue.running.as_mut() {
            running.cancelled = true;
        }
    }

    /// Returns true if the task will still run (again).
    #[must_use]
    pub fn is_queued(&self, id: TaskId) -> bool {
        let queue = self.queue.lock();
        queue.tasks.contains_key(&id)
            || queue
                .running
                .as_ref()
                .is_some_and(|r| r.id == id && r.repeating && !r.cancelled)
    }

    /// Every queued task, in drain order.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        let queue = self.queue.lock();
        let mut tasks: Vec<_> = queue.tasks.iter().collect();
        tasks.sort_by_key(|(_, t)| (t.due_tick, t.priority, t.seq));
        tasks
            .into_iter()
            .map(|(&id, task)| PendingTask {
                id,
                owner: task.owner.clone(),
                priority: task.priority,
                due_tick: task.due_tick,
                period: task.period,
                is_async: matches!(task.body, TaskBody::Async(_)),
            })
            .collect()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Ticks drained so far.
    #[must_use]
    pub fn up_time(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Async tasks executing right now.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.pool.active_workers()
    }

    /// Runs every task due at `tick`. Returns how many ran.
    ///
    /// # Errors
    ///
    /// A stage violation unless the clock is at `Tasks`.
    pub fn run_due(&self, tick: u64) -> CoreResult<usize> {
        self.clock.require_stage(TickStage::Tasks, "TaskManager::run_due")?;
        self.current_tick.store(tick, Ordering::Release);

        let due = {
            let queue = self.queue.lock();
            let mut due: Vec<_> = queue
                .tasks
                .iter()
                .filter(|(_, t)| t.due_tick <= tick)
                .map(|(&id, t)| (t.priority, t.seq, id))
                .collect();
            due.sort_unstable();
            due
        };

        let mut ran = 0;
        for (_, _, id) in due {
            let mut task = {
                let mut queue = self.queue.lock();
                // Cancelled by a task earlier in this drain
                let Some(task) = queue.tasks.remove(&id) else {
                    continue;
                };
                queue.running = Some(Running {
                    id,
                    owner: task.owner.clone(),
                    repeating: task.period.is_some(),
                    cancelled: false,
                });
                task
            };

            let ok = match &mut task.body {
                TaskBody::Sync(body) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| body()));
                    if result.is_err() {
                        tracing::error!("{} from {} panicked", id, task.owner);
                    }
                    result.is_ok()
                }
                TaskBody::Async(job) => {
                    if let Some(job) = job.take() {
                        if !self.pool.submit(job) {
                            tracing::warn!("{} dropped: worker pool shut down", id);
                        }
                    }
                    true
                }
            };
            ran += 1;

            let mut queue = self.queue.lock();
            let cancelled = queue.running.take().is_some_and(|r| r.cancelled);
            if let Some(period) = task.period {
                if ok && !cancelled {
                    task.due_tick = tick + period;
                    queue.tasks.insert(id, task);
                }
            }
        }
        Ok(ran)
    }

    /// Cancels everything and shuts the worker pool down, letting
    /// already-submitted async tasks finish.
    pub fn shutdown(&self) {
        self.cancel_all();
        self.pool.shutdown();
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("pending", &self.pending_count())
            .field("up_time", &self.up_time())
            .finish_non_exhaustive()
    }
}
