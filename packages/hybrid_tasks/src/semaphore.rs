use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct State {
    permits: usize,
    sleepers: usize,
}

/// Counting semaphore that idle worker threads sleep on.
///
/// The number of stored permits never exceeds `max_permits` (the number of workers in the
/// pool), so bursts of releases cannot build up a backlog of spurious wakeups.
#[derive(Debug)]
pub(crate) struct Semaphore {
    state: Mutex<State>,
    condvar: Condvar,
    max_permits: usize,
}

impl Semaphore {
    pub(crate) fn new(max_permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                permits: 0,
                sleepers: 0,
            }),
            condvar: Condvar::new(),
            max_permits,
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub(crate) fn acquire(&self) {
        let mut state = self.state.lock();

        state.sleepers = state.sleepers.saturating_add(1);

        while state.permits == 0 {
            self.condvar.wait(&mut state);
        }

        state.permits = state.permits.saturating_sub(1);
        state.sleepers = state.sleepers.saturating_sub(1);
    }

    /// Adds up to `count` permits, capped at the pool size. Returns how many were added.
    pub(crate) fn release(&self, count: usize) -> usize {
        let added = {
            let mut state = self.state.lock();

            let added = count.min(self.max_permits.saturating_sub(state.permits));
            state.permits = state.permits.saturating_add(added);
            added
        };

        match added {
            0 => {}
            1 => {
                self.condvar.notify_one();
            }
            _ => {
                self.condvar.notify_all();
            }
        }

        added
    }

    /// Number of threads currently blocked in [`acquire()`][Self::acquire].
    pub(crate) fn sleepers(&self) -> usize {
        self.state.lock().sleepers
    }
}
