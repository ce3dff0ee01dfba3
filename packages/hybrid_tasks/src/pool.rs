//! Worker pools and their threads.

use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::topology::record_current_core_type;
use crate::{
    CoreType, Dispatcher, Error, IterationResult, PoolSpec, ProcessorTopology, ReadyQueue, Result,
    Semaphore, WorkerCore, set_current_context_id,
};

/// The shared state of one worker pool.
pub(crate) struct PoolState {
    pub(crate) core_type: CoreType,
    pub(crate) worker_count: usize,
    pub(crate) queue: ReadyQueue,
    pub(crate) semaphore: Semaphore,
    pub(crate) alive: AtomicBool,
}

impl PoolState {
    pub(crate) fn new(spec: PoolSpec, queue_capacity: usize) -> Self {
        Self {
            core_type: spec.core_type,
            worker_count: spec.worker_count,
            queue: ReadyQueue::new(queue_capacity),
            semaphore: Semaphore::new(spec.worker_count),
            alive: AtomicBool::new(true),
        }
    }
}

impl fmt::Debug for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolState")
            .field("core_type", &self.core_type)
            .field("worker_count", &self.worker_count)
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .field("sleepers", &self.semaphore.sleepers())
            .finish_non_exhaustive()
    }
}

/// Starts the worker threads of one pool.
///
/// Workers get consecutive context IDs starting at `first_context_id`. Join handles are pushed
/// to `handles` as threads start, so on failure the caller still holds every started thread and
/// can stop and join them.
pub(crate) fn spawn_workers(
    dispatcher: &Arc<Dispatcher>,
    topology: &Arc<dyn ProcessorTopology>,
    pool_index: usize,
    first_context_id: u32,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<()> {
    let pool = dispatcher.pool(pool_index);
    let core_type = pool.core_type;

    for (worker_index, context_id) in (0..pool.worker_count).zip(first_context_id..) {
        let thread_name = format!("hybrid-tasks-{}-{worker_index}", core_type.thread_label());

        let dispatcher = Arc::clone(dispatcher);
        let topology = Arc::clone(topology);

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let bound = topology.pin_current_thread(core_type, CoreType::Any);
                record_current_core_type(bound);
                set_current_context_id(context_id);

                debug!(%core_type, %bound, worker_index, context_id, "worker thread started");

                let _poison_on_unwind = PoisonOnUnwind {
                    dispatcher: &dispatcher,
                };
                worker_loop(&dispatcher, pool_index, context_id);
                debug!(%core_type, worker_index, context_id, "worker thread exiting");
            })
            .map_err(|source| Error::ThreadSpawn {
                thread_name,
                source,
            })?;

        handles.push(handle);
    }

    Ok(())
}

fn worker_loop(dispatcher: &Dispatcher, pool_index: usize, context_id: u32) {
    let pool = dispatcher.pool(pool_index);
    let mut core = WorkerCore::new(dispatcher, pool_index, context_id, 0);

    // Acquire ordering synchronizes with the Release in Dispatcher::stop_workers().
    while pool.alive.load(Ordering::Acquire) {
        match core.run_one_iteration() {
            IterationResult::Executed => {
                trace!(context_id, "executed sub-task");
            }
            IterationResult::Advanced => {}
            IterationResult::WaitingForWork => {
                // Permits released after our last look at the queue are stored, so a wakeup
                // between the check and the wait is not lost.
                pool.semaphore.acquire();
            }
        }
    }
}

/// Marks the dispatcher poisoned if the worker thread unwinds, so nobody waits for the task set
/// the worker was executing.
struct PoisonOnUnwind<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for PoisonOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("worker thread is unwinding out of a sub-task callback");
            self.dispatcher.poison();
        }
    }
}

/// Joins worker threads, re-raising the first worker panic.
pub(crate) fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(payload) = handle.join() {
            // Sub-task callbacks are not allowed to panic. If one did, the task set it belonged
            // to never completed and we propagate the panic rather than hiding it.
            panic::resume_unwind(payload);
        }
    }
}
