#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the `hybrid_tasks` workspace.

use std::env;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

mod delivery_recorder;

pub use delivery_recorder::*;

/// How long a test may run before the watchdog gives up on it.
///
/// Miri is dramatically slower at thread synchronization, so it gets more time.
const fn watchdog_timeout() -> Duration {
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Scheduler bugs tend to show up as hangs (a task set that never completes, a worker that never
/// wakes up). The watchdog turns those into test failures instead of stuck test runs.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test runs directly on the current thread, so that mutation testing can detect hanging
/// mutants by its own timeout.
///
/// # Panics
///
/// Panics if the test does not finish within the timeout. Panics of the test itself are
/// re-raised on the calling thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // If the receiver is gone, the watchdog already fired and nobody cares about the result.
        drop(tx.send(test_fn()));
    });

    let timeout = watchdog_timeout();

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread finished after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}, assuming it hangs");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}
