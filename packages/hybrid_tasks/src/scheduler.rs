//! The public face of the task scheduler.

use std::mem;
use std::num::NonZero;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::utils::Backoff;
use new_zealand::nz;
use tracing::{debug, trace, warn};

use crate::registry::TaskBody;
use crate::{
    CoreType, Dispatcher, Error, IterationResult, PoolLayout, PoolState, ProcessorTopology,
    Registry, Result, RoutingMode, SubtaskContext, SystemTopology, TaskSetBuilder, TaskSetHandle,
    WorkerCore, current_context_id, current_core_type, join_workers, spawn_workers,
};

/// Default number of task sets that can be alive at the same time.
pub const DEFAULT_TASK_SET_CAPACITY: NonZero<usize> = nz!(256);

/// Default number of successors that can depend on a single task set.
pub const DEFAULT_SUCCESSOR_CAPACITY: NonZero<usize> = nz!(5);

/// Largest registry that still leaves [`TaskSetHandle::INVALID`] out of the handle range.
const MAX_TASK_SET_CAPACITY: usize = 1 << 31;

/// Executes task sets on worker pools bound to processor classes.
///
/// A task set is a callback invoked a fixed number of times (its sub-tasks) with distinct
/// indexes. Task sets may depend on other task sets and only start executing once every
/// dependency has completed. Worker threads are started when the scheduler is built and stopped
/// when it is shut down or dropped.
///
/// Task sets are created from a single thread, the owner of the scheduler, which is enforced by
/// [`task_set()`][Self::task_set] taking `&mut self`. Waiting for a task set makes the waiting
/// thread help execute ready sub-tasks instead of sleeping.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use hybrid_tasks::Scheduler;
/// use hybrid_tasks::fake::FakeTopology;
///
/// let mut scheduler = Scheduler::builder(Arc::new(FakeTopology::homogeneous(4)))
///     .build()
///     .unwrap();
///
/// let sum = Arc::new(AtomicU32::new(0));
///
/// let handle = scheduler
///     .task_set(10, {
///         let sum = Arc::clone(&sum);
///         move |context| {
///             sum.fetch_add(context.index(), Ordering::Relaxed);
///         }
///     })
///     .create()
///     .unwrap();
///
/// scheduler.wait_for_set(handle);
/// scheduler.release_handle(handle);
///
/// assert_eq!(sum.load(Ordering::Relaxed), 45);
/// ```
#[derive(Debug)]
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    workers: Vec<JoinHandle<()>>,
    context_count: usize,

    /// Where the search for a free registry slot starts next time.
    next_free_slot: usize,

    shut_down: bool,
}

impl Scheduler {
    /// Creates a scheduler for the processors of the current machine with default settings.
    ///
    /// Use [`Scheduler::builder()`] for custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor topology cannot be determined or a worker thread
    /// cannot be started.
    pub fn new() -> Result<Self> {
        Self::builder(Arc::new(SystemTopology::new()?)).build()
    }

    /// Creates a builder for a scheduler using the given processor topology.
    #[must_use]
    pub fn builder(topology: Arc<dyn ProcessorTopology>) -> SchedulerBuilder {
        SchedulerBuilder::new(topology)
    }

    /// Starts describing a task set with `subtask_count` sub-tasks.
    ///
    /// The task set is created by [`TaskSetBuilder::create()`]. The callback is invoked once for
    /// each index in `0..subtask_count`, in no particular order and possibly concurrently.
    pub fn task_set<F>(&mut self, subtask_count: u32, callback: F) -> TaskSetBuilder<'_>
    where
        F: Fn(SubtaskContext) + Send + Sync + 'static,
    {
        TaskSetBuilder::new(self, subtask_count, Box::new(callback))
    }

    pub(crate) fn create_task_set(
        &mut self,
        body: TaskBody,
        subtask_count: u32,
        dependencies: &[TaskSetHandle],
        core_type: CoreType,
    ) -> Result<TaskSetHandle> {
        if subtask_count == 0 {
            return Err(Error::NoSubtasks);
        }

        let registry = &self.dispatcher.registry;

        if let Some(&handle) = dependencies
            .iter()
            .find(|handle| handle.is_valid() && !registry.contains(**handle))
        {
            return Err(Error::UnknownDependency {
                handle,
                capacity: registry.capacity(),
            });
        }

        let Some(handle) = registry.allocate(&mut self.next_free_slot) else {
            warn!(
                capacity = registry.capacity(),
                name = body.name(),
                "no free task set slot; increase the task set capacity"
            );
            return Err(Error::RegistryFull {
                capacity: registry.capacity(),
            });
        };

        let core_type = self.dispatcher.router.effective_core_type(core_type);
        let dependencies = dependencies
            .iter()
            .copied()
            .filter(|dependency| dependency.is_valid())
            .collect::<Vec<_>>();

        trace!(
            %handle,
            name = body.name(),
            subtask_count,
            dependency_count = dependencies.len(),
            %core_type,
            "creating task set"
        );

        let record = registry.record(handle);
        record.activate(body, subtask_count, dependencies.len(), core_type);

        if dependencies.is_empty() {
            self.dispatcher.enqueue(handle);
            return Ok(handle);
        }

        for (wired, &dependency) in dependencies.iter().enumerate() {
            let dependency_record = registry.record(dependency);

            // Keeps the dependency from completing while the edge is being added. If it has
            // already completed, giving the share back resolves the edge immediately.
            dependency_record.hold_completion();

            if !dependency_record.try_add_successor(handle) {
                self.dispatcher.finish_one(dependency);

                warn!(
                    %dependency,
                    capacity = registry.successor_capacity(),
                    "too many successors; increase the successor capacity"
                );

                for &earlier in dependencies.iter().take(wired) {
                    registry.record(earlier).remove_successor(handle);
                }

                record.abandon();

                return Err(Error::SuccessorsFull {
                    dependency,
                    capacity: registry.successor_capacity(),
                });
            }

            self.dispatcher.finish_one(dependency);
        }

        Ok(handle)
    }

    /// Gives up the caller's reference to a task set.
    ///
    /// Must be called exactly once for every handle returned by [`TaskSetBuilder::create()`],
    /// once the caller no longer needs the handle (no more waits and no more task sets
    /// depending on it). The registry slot is reused only after the task set has completed and
    /// its handle has been released. Invalid handles are ignored.
    pub fn release_handle(&self, handle: TaskSetHandle) {
        if handle.is_valid() && self.dispatcher.registry.contains(handle) {
            self.dispatcher.release_reference(handle);
        }
    }

    /// Calls [`release_handle()`][Self::release_handle] for every handle.
    pub fn release_handles(&self, handles: &[TaskSetHandle]) {
        for &handle in handles {
            self.release_handle(handle);
        }
    }

    /// Whether the task set has completed.
    ///
    /// Invalid handles are reported as complete.
    #[must_use]
    pub fn is_set_complete(&self, handle: TaskSetHandle) -> bool {
        !handle.is_valid()
            || !self.dispatcher.registry.contains(handle)
            || self.dispatcher.registry.record(handle).is_completed()
    }

    /// Blocks until the task set has completed, executing ready sub-tasks in the meantime.
    ///
    /// The current thread never sleeps on a pool semaphore while waiting. When there is nothing
    /// to help with it spins with backoff, yielding its time slice after a short spin.
    ///
    /// A thread bound to a processor class by a worker pool only helps pools of that class;
    /// other threads help every pool. Invalid handles return immediately.
    ///
    /// A task set whose sub-task callback panicked never completes, so waiting for it does not
    /// return.
    pub fn wait_for_set(&self, handle: TaskSetHandle) {
        wait_for(&self.dispatcher, handle);
    }

    /// Number of distinct context IDs passed to sub-task callbacks.
    ///
    /// This is the number of worker threads plus one for waiting threads, so callbacks can
    /// index per-thread scratch storage of this size with
    /// [`SubtaskContext::context_id()`].
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.context_count
    }

    /// Waits for every live task set to complete, then stops and joins the worker threads.
    ///
    /// Dropping the scheduler does the same. Calling this more than once has no further effect.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of a worker thread, which only happens if a sub-task callback
    /// panicked. Task sets that can no longer complete because of that panic are not waited for.
    pub fn shutdown(&mut self) {
        if mem::replace(&mut self.shut_down, true) {
            return;
        }

        for handle in self.dispatcher.registry.handles() {
            help_until(&self.dispatcher, handle, || self.dispatcher.is_poisoned());
        }

        self.dispatcher.stop_workers();
        join_workers(mem::take(&mut self.workers));

        debug!("scheduler shut down");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if thread::panicking() {
            // A sub-task callback may have panicked on this thread, in which case its task set
            // never completes. Tell the workers to stop and let them exit on their own.
            self.shut_down = true;
            self.dispatcher.stop_workers();
            return;
        }

        self.shutdown();
    }
}

fn wait_for(dispatcher: &Dispatcher, handle: TaskSetHandle) {
    help_until(dispatcher, handle, || false);
}

/// Executes ready sub-tasks until the task set completes or `give_up` returns true.
fn help_until(dispatcher: &Dispatcher, handle: TaskSetHandle, give_up: impl Fn() -> bool) {
    if !handle.is_valid() || !dispatcher.registry.contains(handle) {
        return;
    }

    let record = dispatcher.registry.record(handle);

    if record.is_completed() {
        return;
    }

    let context_id = current_context_id();
    let bound = current_core_type();

    // Each helper starts at the write cursor, where the most recently readied work is.
    let mut helpers = dispatcher
        .pools
        .iter()
        .enumerate()
        .filter(|(_, pool)| bound.is_none_or(|core_type| core_type == pool.core_type))
        .map(|(pool_index, pool)| {
            WorkerCore::new(
                dispatcher,
                pool_index,
                context_id,
                pool.queue.write_position(),
            )
        })
        .collect::<Vec<_>>();

    let backoff = Backoff::new();

    while !record.is_completed() && !give_up() {
        let mut executed = false;

        for helper in &mut helpers {
            executed |= helper.run_one_iteration() == IterationResult::Executed;
        }

        if executed {
            backoff.reset();
        } else {
            backoff.snooze();
        }
    }
}

/// Builder for configuring a [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerBuilder {
    topology: Arc<dyn ProcessorTopology>,
    routing_mode: RoutingMode,
    task_set_capacity: NonZero<usize>,
    successor_capacity: NonZero<usize>,
}

impl SchedulerBuilder {
    fn new(topology: Arc<dyn ProcessorTopology>) -> Self {
        Self {
            topology,
            routing_mode: RoutingMode::default(),
            task_set_capacity: DEFAULT_TASK_SET_CAPACITY,
            successor_capacity: DEFAULT_SUCCESSOR_CAPACITY,
        }
    }

    /// Sets how task sets are distributed between pools on a hybrid system.
    ///
    /// Default is [`RoutingMode::ReserveAny`] with [`DEFAULT_ANY_THREADS`][crate::DEFAULT_ANY_THREADS].
    #[must_use]
    pub fn routing_mode(mut self, mode: RoutingMode) -> Self {
        self.routing_mode = mode;
        self
    }

    /// Sets how many task sets can be alive at the same time. Rounded up to a power of two.
    ///
    /// A task set stays alive until it has completed and its handle has been released.
    /// Default is [`DEFAULT_TASK_SET_CAPACITY`].
    #[must_use]
    pub fn task_set_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.task_set_capacity = capacity;
        self
    }

    /// Sets how many task sets can depend on a single task set.
    ///
    /// Default is [`DEFAULT_SUCCESSOR_CAPACITY`].
    #[must_use]
    pub fn successor_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.successor_capacity = capacity;
        self
    }

    /// Sizes the worker pools and starts their threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the task set capacity is too large and
    /// [`Error::ThreadSpawn`] if a worker thread cannot be started.
    pub fn build(self) -> Result<Scheduler> {
        let capacity = self
            .task_set_capacity
            .get()
            .checked_next_power_of_two()
            .filter(|capacity| *capacity <= MAX_TASK_SET_CAPACITY)
            .ok_or_else(|| Error::InvalidConfiguration {
                problem: format!(
                    "task set capacity {} exceeds the maximum of {MAX_TASK_SET_CAPACITY}",
                    self.task_set_capacity
                ),
            })?;

        let layout = PoolLayout::plan(&*self.topology, self.routing_mode);
        let total_workers = layout.total_workers();

        // Context IDs are u32 and 0 belongs to waiting threads.
        if u32::try_from(total_workers).is_err() {
            return Err(Error::InvalidConfiguration {
                problem: format!("{total_workers} worker threads exceed the context ID range"),
            });
        }

        debug!(
            pools = ?layout.pools,
            routing_mode = ?self.routing_mode,
            capacity,
            successor_capacity = self.successor_capacity.get(),
            "starting scheduler"
        );

        let pools = layout
            .pools
            .iter()
            .map(|spec| PoolState::new(*spec, capacity))
            .collect();

        let dispatcher = Arc::new(Dispatcher::new(
            Registry::new(capacity, self.successor_capacity.get()),
            pools,
            layout.router,
        ));

        let mut workers = Vec::with_capacity(total_workers);
        let mut first_context_id: u32 = 1;

        for (pool_index, spec) in layout.pools.iter().enumerate() {
            if let Err(error) = spawn_workers(
                &dispatcher,
                &self.topology,
                pool_index,
                first_context_id,
                &mut workers,
            ) {
                dispatcher.stop_workers();
                join_workers(workers);
                return Err(error);
            }

            first_context_id = first_context_id
                .saturating_add(u32::try_from(spec.worker_count).unwrap_or(u32::MAX));
        }

        Ok(Scheduler {
            dispatcher,
            workers,
            context_count: total_workers.saturating_add(1),
            next_free_slot: 0,
            shut_down: false,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::fake::FakeTopology;

    assert_impl_all!(Scheduler: Send, Sync);
    assert_impl_all!(SchedulerBuilder: Send, Sync);

    fn single_thread_scheduler() -> Scheduler {
        // One processor leaves no workers; the waiting thread does everything.
        Scheduler::builder(Arc::new(FakeTopology::homogeneous(1)))
            .task_set_capacity(nz!(4))
            .successor_capacity(nz!(2))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_debug_output_includes_topology() {
        let builder = Scheduler::builder(Arc::new(FakeTopology::new(2, 1)))
            .routing_mode(RoutingMode::Split);

        let output = format!("{builder:?}");
        assert!(output.contains("FakeTopology"), "{output}");
        assert!(output.contains("Split"), "{output}");
    }

    #[test]
    fn zero_workers_still_completes_when_waiting() {
        let mut scheduler = single_thread_scheduler();
        assert_eq!(scheduler.context_count(), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let handle = scheduler
            .task_set(1, {
                let calls = Arc::clone(&calls);
                move |context| {
                    assert_eq!(context.context_id(), 0);
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .create()
            .unwrap();

        assert!(!scheduler.is_set_complete(handle));
        scheduler.wait_for_set(handle);
        assert!(scheduler.is_set_complete(handle));
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        scheduler.release_handle(handle);
    }

    #[test]
    fn capacity_is_rounded_up_to_power_of_two() {
        let mut scheduler = Scheduler::builder(Arc::new(FakeTopology::homogeneous(1)))
            .task_set_capacity(nz!(3))
            .build()
            .unwrap();

        let handles = (0..4)
            .map(|_| scheduler.task_set(1, |_| {}).create().unwrap())
            .collect::<Vec<_>>();

        assert!(matches!(
            scheduler.task_set(1, |_| {}).create(),
            Err(Error::RegistryFull { capacity: 4 })
        ));

        for handle in &handles {
            scheduler.wait_for_set(*handle);
        }
        scheduler.release_handles(&handles);
    }

    #[test]
    fn completed_and_released_slots_are_reused() {
        let mut scheduler = single_thread_scheduler();

        for _ in 0..20 {
            let handle = scheduler.task_set(2, |_| {}).create().unwrap();
            scheduler.wait_for_set(handle);
            scheduler.release_handle(handle);
        }
    }

    #[test]
    fn unreleased_handles_keep_slots_busy() {
        let mut scheduler = single_thread_scheduler();

        let handles = (0..4)
            .map(|_| scheduler.task_set(1, |_| {}).create().unwrap())
            .collect::<Vec<_>>();
        for handle in &handles {
            scheduler.wait_for_set(*handle);
        }

        assert!(matches!(
            scheduler.task_set(1, |_| {}).create(),
            Err(Error::RegistryFull { .. })
        ));

        let (first, rest) = handles.split_first().unwrap();
        scheduler.release_handle(*first);
        let reused = scheduler.task_set(1, |_| {}).create().unwrap();
        assert_eq!(reused, *first);

        scheduler.wait_for_set(reused);
        scheduler.release_handle(reused);
        scheduler.release_handles(rest);
    }

    #[test]
    fn invalid_handles_are_ignored() {
        let scheduler = single_thread_scheduler();

        assert!(scheduler.is_set_complete(TaskSetHandle::INVALID));
        scheduler.wait_for_set(TaskSetHandle::INVALID);
        scheduler.release_handle(TaskSetHandle::INVALID);
    }

    #[test]
    fn zero_subtasks_is_rejected() {
        let mut scheduler = single_thread_scheduler();

        assert!(matches!(
            scheduler.task_set(0, |_| {}).create(),
            Err(Error::NoSubtasks)
        ));
    }

    #[test]
    fn out_of_range_dependency_is_rejected() {
        let mut scheduler = single_thread_scheduler();
        let bogus = TaskSetHandle::from_index(100);

        let result = scheduler.task_set(1, |_| {}).depends_on(&[bogus]).create();

        assert!(matches!(
            result,
            Err(Error::UnknownDependency { handle, capacity: 4 }) if handle == bogus
        ));
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let result = Scheduler::builder(Arc::new(FakeTopology::homogeneous(1)))
            .task_set_capacity(NonZero::new(usize::MAX).unwrap())
            .build();

        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut scheduler = single_thread_scheduler();

        scheduler.shutdown();
        scheduler.shutdown();
    }

    #[test]
    fn shutdown_runs_pending_task_sets() {
        let mut scheduler = single_thread_scheduler();
        let calls = Arc::new(AtomicU32::new(0));

        let handle = scheduler
            .task_set(3, {
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .create()
            .unwrap();
        scheduler.release_handle(handle);

        drop(scheduler);

        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }
}
