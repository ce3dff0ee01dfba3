/// Identifies one sub-task invocation of a task set callback.
///
/// A task set with `count` sub-tasks invokes its callback exactly `count` times, once for each
/// `index` in `0..count`. Invocations happen in no particular order and may run concurrently on
/// different threads, so the callback must be safe to call for any index at any time.
///
/// The `context_id` identifies the executing thread: `0` is a thread waiting for a task set
/// (typically the thread that creates task sets) and `1..context_count` are worker threads. It
/// can be used to index per-thread scratch storage sized by
/// [`Scheduler::context_count()`][crate::Scheduler::context_count].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubtaskContext {
    context_id: u32,
    index: u32,
    count: u32,
}

impl SubtaskContext {
    pub(crate) const fn new(context_id: u32, index: u32, count: u32) -> Self {
        Self {
            context_id,
            index,
            count,
        }
    }

    /// The thread executing this sub-task. `0` for waiting threads, `1..` for workers.
    #[must_use]
    pub const fn context_id(&self) -> u32 {
        self.context_id
    }

    /// Which sub-task this is, in `0..count()`.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// The total number of sub-tasks in the task set.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

/// The callback of a task set.
///
/// Callbacks must not block waiting for other threads and must tolerate being invoked
/// concurrently for different sub-task indexes. A panicking callback is not caught: the task set
/// never completes and anything waiting for it waits forever.
pub type TaskSetFn = dyn Fn(SubtaskContext) + Send + Sync + 'static;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SubtaskContext: Send, Sync, Copy);

    #[test]
    fn accessors_return_constructor_values() {
        let context = SubtaskContext::new(3, 1, 4);

        assert_eq!(context.context_id(), 3);
        assert_eq!(context.index(), 1);
        assert_eq!(context.count(), 4);
    }
}
