//! Scanning a ready queue and executing the sub-tasks found there.

use std::cell::Cell;

use crate::{Dispatcher, TaskSetHandle};

thread_local! {
    static CONTEXT_ID: Cell<u32> = const { Cell::new(0) };
}

/// The context ID sub-tasks executed on the current thread receive. `0` unless the thread is a
/// worker.
pub(crate) fn current_context_id() -> u32 {
    CONTEXT_ID.with(Cell::get)
}

pub(crate) fn set_current_context_id(context_id: u32) {
    CONTEXT_ID.with(|id| id.set(context_id));
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum IterationResult {
    /// A sub-task was executed.
    Executed,

    /// The read position moved on without executing anything.
    Advanced,

    /// The pool has no unclaimed sub-tasks.
    WaitingForWork,
}

/// One reader of a pool's ready queue.
#[derive(Debug)]
pub(crate) struct WorkerCore<'a> {
    dispatcher: &'a Dispatcher,
    pool_index: usize,
    context_id: u32,
    position: usize,
}

impl<'a> WorkerCore<'a> {
    pub(crate) fn new(
        dispatcher: &'a Dispatcher,
        pool_index: usize,
        context_id: u32,
        position: usize,
    ) -> Self {
        Self {
            dispatcher,
            pool_index,
            context_id,
            position,
        }
    }

    pub(crate) fn run_one_iteration(&mut self) -> IterationResult {
        let queue = &self.dispatcher.pool(self.pool_index).queue;

        let Some(handle) = queue.load(self.position) else {
            if queue.has_pending() {
                // An insert is in flight or the work sits elsewhere in the ring.
                self.position = queue.next(self.position);
                return IterationResult::Advanced;
            }

            return IterationResult::WaitingForWork;
        };

        let record = self.dispatcher.registry.record(handle);

        // Hold the record while inspecting it. If the entry is still in the slot afterwards,
        // the ring's own reference was alive when ours was taken, so the record cannot be
        // recycled under us.
        record.add_ref();

        let result = if queue.load(self.position) != Some(handle) {
            self.position = queue.next(self.position);
            IterationResult::Advanced
        } else if record.has_unclaimed_subtasks()
            && self.dispatcher.execute(handle, self.context_id)
        {
            // Stay on this entry while it has more sub-tasks to hand out. Whoever runs the
            // last one retires the entry, so drained entries do not linger until the next scan.
            if !record.has_unclaimed_subtasks() {
                self.retire(handle);
            }

            IterationResult::Executed
        } else {
            self.retire(handle);
            IterationResult::Advanced
        };

        self.dispatcher.release_reference(handle);
        result
    }

    /// Clears a drained entry and moves on to the next slot.
    fn retire(&mut self, handle: TaskSetHandle) {
        let queue = &self.dispatcher.pool(self.pool_index).queue;

        if queue.try_clear(self.position, handle) {
            // The ring's reference goes away with the entry.
            self.dispatcher.release_reference(handle);
        }

        self.position = queue.next(self.position);
    }
}
