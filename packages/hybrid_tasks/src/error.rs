use std::io;

use thiserror::Error;

use crate::TaskSetHandle;

/// Errors that can occur when configuring the scheduler or creating task sets.
///
/// All errors are reported synchronously by the call that caused them. The scheduler never
/// retries on behalf of the caller: capacity errors mean the configured capacity is too small
/// for the workload and should be raised via [`SchedulerBuilder`][crate::SchedulerBuilder].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A task set was requested with zero sub-tasks. Every task set must have at least one.
    #[error("a task set must have at least one sub-task")]
    NoSubtasks,

    /// A dependency handle does not refer to any slot of the task set registry.
    #[error("dependency {handle} does not refer to a task set slot (capacity is {capacity})")]
    UnknownDependency {
        /// The offending dependency handle.
        handle: TaskSetHandle,

        /// The number of slots in the registry.
        capacity: usize,
    },

    /// Every slot of the task set registry is held by a live task set.
    ///
    /// A worker scanning its ready queue briefly holds on to the slot of a task set that has
    /// just finished. If that is the last free slot, this error can be reported for an instant;
    /// retrying shortly afterwards succeeds.
    #[error("all {capacity} task set slots are in use; increase the task set capacity")]
    RegistryFull {
        /// The number of slots in the registry.
        capacity: usize,
    },

    /// A dependency already has the maximum number of successors registered.
    #[error(
        "task set {dependency} already has {capacity} successors; increase the successor capacity"
    )]
    SuccessorsFull {
        /// The dependency whose successor list is full.
        dependency: TaskSetHandle,

        /// The number of successor slots per task set.
        capacity: usize,
    },

    /// The scheduler configuration cannot be satisfied.
    #[error("invalid scheduler configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread '{thread_name}'")]
    ThreadSpawn {
        /// The name the worker thread would have had.
        thread_name: String,

        /// The error reported by the operating system.
        #[source]
        source: io::Error,
    },
}

/// A specialized `Result` type for scheduler operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn capacity_errors_name_the_knob_to_turn() {
        let registry = Error::RegistryFull { capacity: 256 };
        assert!(registry.to_string().contains("increase the task set capacity"));

        let successors = Error::SuccessorsFull {
            dependency: TaskSetHandle::from_index(7),
            capacity: 5,
        };
        let message = successors.to_string();
        assert!(message.contains("task set 7"));
        assert!(message.contains("increase the successor capacity"));
    }

    #[test]
    fn thread_spawn_exposes_source() {
        let error = Error::ThreadSpawn {
            thread_name: "hybrid-tasks-p-1".to_string(),
            source: io::Error::other("out of threads"),
        };

        assert!(error.source().is_some());
        assert!(error.to_string().contains("hybrid-tasks-p-1"));
    }
}
