use std::iter;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

use crate::TaskSetHandle;

const EMPTY: u32 = TaskSetHandle::INVALID.to_raw();

/// Ring of task sets that are ready to execute in one worker pool.
///
/// Every worker of the pool reads the same ring, each with its own read position. An entry stays
/// in the ring until a reader finds it drained and clears it. The ring is as large as the task
/// set registry, so an insert always finds an empty slot: every entry names a distinct live
/// task set and the one being inserted is not yet in the ring.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    slots: Box<[AtomicU32]>,
    write_cursor: CachePadded<AtomicUsize>,

    /// Sub-tasks in this ring that nobody has claimed yet.
    pending: CachePadded<AtomicI64>,
}

impl ReadyQueue {
    /// `capacity` must be a power of two.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        Self {
            slots: iter::repeat_with(|| AtomicU32::new(EMPTY))
                .take(capacity)
                .collect(),
            write_cursor: CachePadded::new(AtomicUsize::new(0)),
            pending: CachePadded::new(AtomicI64::new(0)),
        }
    }

    fn mask(&self) -> usize {
        self.slots.len().wrapping_sub(1)
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "positions are always masked to the ring size"
    )]
    fn slot(&self, position: usize) -> &AtomicU32 {
        &self.slots[position & self.mask()]
    }

    /// Inserts a ready task set. Returns the position it was inserted at.
    ///
    /// The pending counter is raised before the entry becomes visible, so a reader never sees
    /// "no pending work" while an insert is in flight.
    pub(crate) fn push(&self, handle: TaskSetHandle, subtask_count: u32) -> usize {
        self.pending
            .fetch_add(i64::from(subtask_count), Ordering::AcqRel);

        loop {
            let position = self.write_cursor.fetch_add(1, Ordering::Relaxed) & self.mask();

            if self
                .slot(position)
                .compare_exchange(EMPTY, handle.to_raw(), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return position;
            }
        }
    }

    /// The task set at `position`, if any.
    pub(crate) fn load(&self, position: usize) -> Option<TaskSetHandle> {
        let raw = self.slot(position).load(Ordering::Acquire);

        (raw != EMPTY).then_some(TaskSetHandle::from_raw(raw))
    }

    /// Empties the slot at `position` if it still holds `handle`. Returns `true` if this call
    /// emptied it; concurrent readers racing to clear the same slot see `false`.
    pub(crate) fn try_clear(&self, position: usize, handle: TaskSetHandle) -> bool {
        self.slot(position)
            .compare_exchange(handle.to_raw(), EMPTY, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn next(&self, position: usize) -> usize {
        position.wrapping_add(1) & self.mask()
    }

    /// Where the next insert will start looking for an empty slot.
    pub(crate) fn write_position(&self) -> usize {
        self.write_cursor.load(Ordering::Relaxed) & self.mask()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Records that one sub-task from this ring was claimed.
    pub(crate) fn claimed_one(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn push_fills_consecutive_slots() {
        let queue = ReadyQueue::new(4);

        assert_eq!(queue.push(TaskSetHandle::from_index(2), 3), 0);
        assert_eq!(queue.push(TaskSetHandle::from_index(0), 1), 1);

        assert_eq!(queue.load(0), Some(TaskSetHandle::from_index(2)));
        assert_eq!(queue.load(1), Some(TaskSetHandle::from_index(0)));
        assert_eq!(queue.load(2), None);
        assert_eq!(queue.write_position(), 2);
    }

    #[test]
    fn push_skips_occupied_slots_after_wrapping() {
        let queue = ReadyQueue::new(2);

        queue.push(TaskSetHandle::from_index(0), 1);
        queue.push(TaskSetHandle::from_index(1), 1);
        assert!(queue.try_clear(1, TaskSetHandle::from_index(1)));

        // Cursor wraps to slot 0, which is still occupied.
        assert_eq!(queue.push(TaskSetHandle::from_index(1), 1), 1);
    }

    #[test]
    fn only_one_clear_succeeds() {
        let queue = ReadyQueue::new(2);
        let handle = TaskSetHandle::from_index(1);
        queue.push(handle, 1);

        assert!(queue.try_clear(0, handle));
        assert!(!queue.try_clear(0, handle));
        assert_eq!(queue.load(0), None);
    }

    #[test]
    fn clear_does_not_remove_a_different_entry() {
        let queue = ReadyQueue::new(2);
        queue.push(TaskSetHandle::from_index(1), 1);

        assert!(!queue.try_clear(0, TaskSetHandle::from_index(0)));
        assert_eq!(queue.load(0), Some(TaskSetHandle::from_index(1)));
    }

    #[test]
    fn pending_tracks_unclaimed_subtasks() {
        let queue = ReadyQueue::new(2);
        assert!(!queue.has_pending());

        queue.push(TaskSetHandle::from_index(0), 2);
        assert!(queue.has_pending());

        queue.claimed_one();
        assert!(queue.has_pending());
        queue.claimed_one();
        assert!(!queue.has_pending());
    }

    #[test]
    fn next_wraps() {
        let queue = ReadyQueue::new(4);

        assert_eq!(queue.next(2), 3);
        assert_eq!(queue.next(3), 0);
    }

    #[cfg_attr(miri, ignore)] // Too slow under Miri.
    #[test]
    fn concurrent_pushes_land_in_distinct_slots() {
        let queue = Arc::new(ReadyQueue::new(64));

        let threads = (0..4_usize)
            .map(|thread_index| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for offset in 0..16 {
                        queue.push(TaskSetHandle::from_index(thread_index * 16 + offset), 1);
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        let mut seen = (0..64).filter_map(|position| queue.load(position)).collect::<Vec<_>>();
        seen.sort_by_key(|handle| handle.index());
        seen.dedup();
        assert_eq!(seen.len(), 64);
    }
}
