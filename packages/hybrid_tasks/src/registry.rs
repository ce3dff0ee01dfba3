//! Fixed-size table of task set control blocks.
//!
//! Records are never moved or reallocated; handles are plain indexes into the table and
//! successor lists store handles rather than references. A record is returned to the free pool
//! when its callback has been cleared and nobody holds a reference to it.

use std::borrow::Cow;
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::{CoreType, TaskSetFn, TaskSetHandle};

/// References held on a fresh record: one for the creator, one for the scheduler until the
/// task set completes.
const INITIAL_REF_COUNT: u32 = 2;

/// The parts of a task set that are released when it completes.
pub(crate) struct TaskBody {
    pub(crate) callback: Box<TaskSetFn>,
    pub(crate) name: Option<Cow<'static, str>>,
}

impl TaskBody {
    pub(crate) fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBody")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

pub(crate) struct TaskSetRecord {
    /// `None` while the record is free or once the task set has completed.
    body: ArcSwapOption<TaskBody>,

    subtask_count: AtomicU32,

    /// Decremented to claim a sub-task. The value after decrementing is the claimed index;
    /// a negative value means every sub-task was already claimed.
    remaining: AtomicI64,

    /// Sub-tasks not yet finished plus successor registrations still in flight.
    completion: AtomicI64,

    /// Dependencies that have not completed yet.
    start: AtomicUsize,

    ref_count: AtomicU32,
    core_type: AtomicU8,
    completed: AtomicBool,

    successors: Mutex<Box<[Option<TaskSetHandle>]>>,
}

impl TaskSetRecord {
    fn new(successor_capacity: usize) -> Self {
        Self {
            body: ArcSwapOption::empty(),
            subtask_count: AtomicU32::new(0),
            remaining: AtomicI64::new(0),
            completion: AtomicI64::new(0),
            start: AtomicUsize::new(0),
            ref_count: AtomicU32::new(0),
            core_type: AtomicU8::new(CoreType::Any.to_bits()),
            completed: AtomicBool::new(true),
            successors: Mutex::new(vec![None; successor_capacity].into_boxed_slice()),
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        self.body.load().is_none() && self.ref_count.load(Ordering::Acquire) == 0
    }

    /// Prepares a free record for a new task set.
    ///
    /// The record becomes visible to other threads only through the ready queue or a
    /// successor list, both of which synchronize with these stores.
    pub(crate) fn activate(
        &self,
        body: TaskBody,
        subtask_count: u32,
        dependency_count: usize,
        core_type: CoreType,
    ) {
        self.subtask_count.store(subtask_count, Ordering::Relaxed);
        self.remaining
            .store(i64::from(subtask_count), Ordering::Relaxed);
        self.completion
            .store(i64::from(subtask_count), Ordering::Relaxed);
        self.start.store(dependency_count, Ordering::Relaxed);
        self.core_type.store(core_type.to_bits(), Ordering::Relaxed);
        self.completed.store(false, Ordering::Relaxed);
        // Readers scanning a stale ring entry may briefly hold a reference of their own.
        self.ref_count
            .fetch_add(INITIAL_REF_COUNT, Ordering::AcqRel);
        self.body.store(Some(Arc::new(body)));
    }

    /// Returns a record whose creation failed to the free pool. Only valid while the record is
    /// in no ready queue and no successor list.
    pub(crate) fn abandon(&self) {
        self.body.store(None);
        self.completed.store(true, Ordering::Relaxed);
        self.ref_count
            .fetch_sub(INITIAL_REF_COUNT, Ordering::AcqRel);
    }

    pub(crate) fn body(&self) -> Option<Arc<TaskBody>> {
        self.body.load_full()
    }

    pub(crate) fn subtask_count(&self) -> u32 {
        self.subtask_count.load(Ordering::Relaxed)
    }

    pub(crate) fn core_type(&self) -> CoreType {
        CoreType::from_bits(self.core_type.load(Ordering::Relaxed))
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether a worker that finds this record in a ready queue could claim a sub-task.
    pub(crate) fn has_unclaimed_subtasks(&self) -> bool {
        self.completion.load(Ordering::Acquire) > 0 && self.remaining.load(Ordering::Acquire) > 0
    }

    /// Claims one sub-task, returning its index, or `None` if all were already claimed.
    pub(crate) fn claim_subtask(&self) -> Option<u32> {
        let index = self
            .remaining
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1);

        u32::try_from(index).ok()
    }

    /// Keeps the task set from completing while a successor is being wired to it.
    pub(crate) fn hold_completion(&self) {
        self.completion.fetch_add(1, Ordering::AcqRel);
    }

    /// Finishes one sub-task or one successor registration. Returns `true` if this brought the
    /// task set to completion.
    pub(crate) fn finish_one(&self) -> bool {
        self.completion.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Flags the task set as completed and drops its callback. Returns `true` the first time
    /// this happens for the current occupant of the record.
    pub(crate) fn mark_completed(&self) -> bool {
        let was_completed = self.completed.swap(true, Ordering::AcqRel);
        self.body.store(None);
        !was_completed
    }

    /// Records that one dependency completed. Returns `true` if that was the last one.
    pub(crate) fn resolve_dependency(&self) -> bool {
        self.start.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Adds a successor in the first empty slot. Returns `false` if the list is full.
    pub(crate) fn try_add_successor(&self, successor: TaskSetHandle) -> bool {
        let mut successors = self.successors.lock();

        if let Some(slot) = successors.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(successor);
            true
        } else {
            false
        }
    }

    /// Removes one occurrence of a successor. Returns `false` if it was not present, meaning
    /// the successor has already been signaled.
    pub(crate) fn remove_successor(&self, successor: TaskSetHandle) -> bool {
        let mut successors = self.successors.lock();

        if let Some(slot) = successors
            .iter_mut()
            .find(|slot| **slot == Some(successor))
        {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Empties the successor list, calling `signal` for each successor while the list is still
    /// locked so that no successor can be signaled twice.
    pub(crate) fn drain_successors(&self, mut signal: impl FnMut(TaskSetHandle)) {
        let mut successors = self.successors.lock();

        for successor in successors.iter_mut().filter_map(Option::take) {
            signal(successor);
        }
    }

    pub(crate) fn add_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one reference. Returns the number of references left.
    pub(crate) fn release(&self) -> u32 {
        self.ref_count
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1)
    }
}

impl fmt::Debug for TaskSetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSetRecord")
            .field("body", &self.body.load())
            .field("subtask_count", &self.subtask_count)
            .field("remaining", &self.remaining)
            .field("completion", &self.completion)
            .field("start", &self.start)
            .field("ref_count", &self.ref_count)
            .field("core_type", &self.core_type())
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

/// The table of task set records.
#[derive(Debug)]
pub(crate) struct Registry {
    records: Box<[TaskSetRecord]>,
    successor_capacity: usize,
}

impl Registry {
    /// `capacity` must be a power of two so that cursors can wrap with a mask.
    pub(crate) fn new(capacity: usize, successor_capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        let records = iter::repeat_with(|| TaskSetRecord::new(successor_capacity))
            .take(capacity)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            records,
            successor_capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn successor_capacity(&self) -> usize {
        self.successor_capacity
    }

    pub(crate) fn contains(&self, handle: TaskSetHandle) -> bool {
        handle.index() < self.records.len()
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "handles reaching this point were issued by this registry or validated by contains()"
    )]
    pub(crate) fn record(&self, handle: TaskSetHandle) -> &TaskSetRecord {
        &self.records[handle.index()]
    }

    /// Finds a free record, scanning forward from `cursor` and wrapping around once.
    ///
    /// On success, `cursor` is left just past the returned slot so the next scan starts there.
    pub(crate) fn allocate(&self, cursor: &mut usize) -> Option<TaskSetHandle> {
        let mask = self.records.len().wrapping_sub(1);

        let index = (0..self.records.len())
            .map(|offset| cursor.wrapping_add(offset) & mask)
            .find(|&index| self.record(TaskSetHandle::from_index(index)).is_free())?;

        *cursor = index.wrapping_add(1) & mask;
        Some(TaskSetHandle::from_index(index))
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = TaskSetHandle> {
        (0..self.records.len()).map(TaskSetHandle::from_index)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Registry: Send, Sync);

    fn body() -> TaskBody {
        TaskBody {
            callback: Box::new(|_| {}),
            name: None,
        }
    }

    #[test]
    fn allocate_rotates_and_skips_live_records() {
        let registry = Registry::new(4, 2);
        let mut cursor = 0;

        let first = registry.allocate(&mut cursor).unwrap();
        registry.record(first).activate(body(), 1, 0, CoreType::Any);

        let second = registry.allocate(&mut cursor).unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn allocate_reports_exhaustion() {
        let registry = Registry::new(2, 1);
        let mut cursor = 0;

        for _ in 0..2 {
            let handle = registry.allocate(&mut cursor).unwrap();
            registry.record(handle).activate(body(), 1, 0, CoreType::Any);
        }

        assert!(registry.allocate(&mut cursor).is_none());
    }

    #[test]
    fn record_is_reusable_only_after_completion_and_all_releases() {
        let registry = Registry::new(2, 1);
        let handle = TaskSetHandle::from_index(0);
        let record = registry.record(handle);

        record.activate(body(), 1, 0, CoreType::Any);
        assert!(!record.is_free());

        assert_eq!(record.release(), 1);
        assert!(!record.is_free());

        assert_eq!(record.claim_subtask(), Some(0));
        assert!(record.finish_one());
        assert!(record.mark_completed());
        assert!(!record.is_free());

        assert_eq!(record.release(), 0);
        assert!(record.is_free());
    }

    #[test]
    fn transient_reference_on_free_record_holds_slot_until_released() {
        let registry = Registry::new(1, 1);
        let mut cursor = 0;
        let record = registry.record(TaskSetHandle::from_index(0));

        // A ready queue reader inspecting a stale entry.
        record.add_ref();
        assert!(registry.allocate(&mut cursor).is_none());

        assert_eq!(record.release(), 0);
        assert_eq!(
            registry.allocate(&mut cursor),
            Some(TaskSetHandle::from_index(0))
        );
    }

    #[test]
    fn claims_hand_out_each_index_once() {
        let registry = Registry::new(1, 1);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.activate(body(), 3, 0, CoreType::Any);

        assert!(record.has_unclaimed_subtasks());
        assert_eq!(record.claim_subtask(), Some(2));
        assert_eq!(record.claim_subtask(), Some(1));
        assert_eq!(record.claim_subtask(), Some(0));
        assert!(!record.has_unclaimed_subtasks());
        assert_eq!(record.claim_subtask(), None);
        assert_eq!(record.claim_subtask(), None);
    }

    #[test]
    fn completion_hold_delays_completion() {
        let registry = Registry::new(1, 1);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.activate(body(), 1, 0, CoreType::Any);

        record.hold_completion();
        assert_eq!(record.claim_subtask(), Some(0));
        assert!(!record.finish_one());
        assert!(record.finish_one());
    }

    #[test]
    fn mark_completed_reports_first_time_only() {
        let registry = Registry::new(1, 1);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.activate(body(), 1, 0, CoreType::Any);

        assert!(record.mark_completed());
        assert!(record.body().is_none());
        assert!(!record.mark_completed());
        assert!(record.is_completed());
    }

    #[test]
    fn successor_list_has_fixed_capacity() {
        let registry = Registry::new(4, 2);
        let record = registry.record(TaskSetHandle::from_index(0));

        assert!(record.try_add_successor(TaskSetHandle::from_index(1)));
        assert!(record.try_add_successor(TaskSetHandle::from_index(2)));
        assert!(!record.try_add_successor(TaskSetHandle::from_index(3)));

        assert!(record.remove_successor(TaskSetHandle::from_index(1)));
        assert!(!record.remove_successor(TaskSetHandle::from_index(1)));
        assert!(record.try_add_successor(TaskSetHandle::from_index(3)));
    }

    #[test]
    fn drain_signals_each_successor_once() {
        let registry = Registry::new(4, 3);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.try_add_successor(TaskSetHandle::from_index(1));
        record.try_add_successor(TaskSetHandle::from_index(2));

        let signaled = AtomicU32::new(0);
        record.drain_successors(|_| {
            signaled.fetch_add(1, Ordering::Relaxed);
        });
        record.drain_successors(|_| {
            signaled.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(signaled.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn last_dependency_makes_record_ready() {
        let registry = Registry::new(1, 1);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.activate(body(), 1, 2, CoreType::Efficiency);

        assert!(!record.resolve_dependency());
        assert!(record.resolve_dependency());
        assert_eq!(record.core_type(), CoreType::Efficiency);
    }

    #[test]
    fn abandoned_record_is_free() {
        let registry = Registry::new(1, 1);
        let record = registry.record(TaskSetHandle::from_index(0));
        record.activate(body(), 1, 1, CoreType::Any);

        record.abandon();

        assert!(record.is_free());
        assert!(record.is_completed());
    }
}
