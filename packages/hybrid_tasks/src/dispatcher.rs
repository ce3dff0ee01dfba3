//! Execution, completion and successor resolution of task sets.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::{PoolState, ReadyQueue, Registry, Router, SubtaskContext, TaskSetHandle};

/// State shared between the scheduler handle and every worker thread.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    pub(crate) registry: Registry,
    pub(crate) pools: Box<[PoolState]>,
    pub(crate) router: Router,

    /// Set when a worker thread unwinds out of a sub-task callback.
    poisoned: AtomicBool,
}

impl Dispatcher {
    pub(crate) fn new(registry: Registry, pools: Box<[PoolState]>, router: Router) -> Self {
        Self {
            registry,
            pools,
            router,
            poisoned: AtomicBool::new(false),
        }
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "pool indexes come from the router or from iterating the pools"
    )]
    pub(crate) fn pool(&self, pool_index: usize) -> &PoolState {
        &self.pools[pool_index]
    }

    fn queue_for(&self, handle: TaskSetHandle) -> &ReadyQueue {
        let core_type = self.registry.record(handle).core_type();
        &self.pool(self.router.pool_index(core_type)).queue
    }

    /// Makes a task set whose dependencies are all satisfied visible to its worker pool.
    pub(crate) fn enqueue(&self, handle: TaskSetHandle) {
        let record = self.registry.record(handle);
        let subtask_count = record.subtask_count();
        let pool = self.pool(self.router.pool_index(record.core_type()));

        // The ring entry keeps the record alive until a reader clears it.
        record.add_ref();

        let position = pool.queue.push(handle, subtask_count);
        let woken = pool
            .semaphore
            .release((subtask_count as usize).min(pool.worker_count));

        trace!(
            %handle,
            core_type = %pool.core_type,
            position,
            subtask_count,
            woken,
            "task set ready"
        );
    }

    /// Claims and runs one sub-task of `handle`. Returns `false` if every sub-task was already
    /// claimed by someone else.
    pub(crate) fn execute(&self, handle: TaskSetHandle, context_id: u32) -> bool {
        let record = self.registry.record(handle);

        let Some(index) = record.claim_subtask() else {
            return false;
        };

        self.queue_for(handle).claimed_one();

        // The body is only cleared once every claimed sub-task has finished.
        if let Some(body) = record.body() {
            (body.callback)(SubtaskContext::new(
                context_id,
                index,
                record.subtask_count(),
            ));
        }

        self.finish_one(handle);
        true
    }

    /// Drops one completion share of `handle`, completing the task set if it was the last.
    pub(crate) fn finish_one(&self, handle: TaskSetHandle) {
        if self.registry.record(handle).finish_one() {
            self.complete(handle);
        }
    }

    /// Runs every time the completion counter of a task set reaches zero.
    ///
    /// That can happen more than once: a successor registered after completion briefly raises
    /// the counter again. Every time, successors are signaled, but the reference held by the
    /// scheduler is dropped only the first time.
    fn complete(&self, handle: TaskSetHandle) {
        let record = self.registry.record(handle);

        if let Some(body) = record.body() {
            trace!(%handle, name = body.name(), "task set completed");
        }

        let first_completion = record.mark_completed();

        record.drain_successors(|successor| {
            if self.registry.record(successor).resolve_dependency() {
                self.enqueue(successor);
            }
        });

        if first_completion {
            self.release_reference(handle);
        }
    }

    /// Drops one reference to `handle`. The slot is reusable once the task set has completed
    /// and no references remain.
    pub(crate) fn release_reference(&self, handle: TaskSetHandle) {
        if self.registry.record(handle).release() == 0 {
            trace!(%handle, "task set slot released");
        }
    }

    /// Records that a worker thread died. Its task set will never complete.
    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub(crate) fn stop_workers(&self) {
        for pool in &self.pools {
            pool.alive.store(false, Ordering::Release);
            pool.semaphore.release(pool.worker_count);
        }
    }
}
