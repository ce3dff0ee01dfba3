#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Task scheduler for dependency graphs of parallel task sets, aware of performance and
//! efficiency processors.
//!
//! A task set is a callback invoked a fixed number of times, once per sub-task index. Task sets
//! may depend on other task sets: a task set starts only after all of its dependencies have
//! completed. Sub-tasks are executed by worker threads bound to processor classes and by any
//! thread that waits for a task set.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use hybrid_tasks::fake::FakeTopology;
//! use hybrid_tasks::{CoreType, Scheduler};
//!
//! // A simulated machine with 4 performance and 4 efficiency processors.
//! // Use `Scheduler::new()` to run on the real processors of the current machine.
//! let mut scheduler = Scheduler::builder(Arc::new(FakeTopology::new(4, 4)))
//!     .build()
//!     .unwrap();
//!
//! let loaded = Arc::new(AtomicU32::new(0));
//!
//! let load = scheduler
//!     .task_set(3, {
//!         let loaded = Arc::clone(&loaded);
//!         move |_| {
//!             loaded.fetch_add(1, Ordering::Relaxed);
//!         }
//!     })
//!     .name("load")
//!     .core_type(CoreType::Efficiency)
//!     .create()
//!     .unwrap();
//!
//! let process = scheduler
//!     .task_set(1, {
//!         let loaded = Arc::clone(&loaded);
//!         move |_| {
//!             // Every sub-task of `load` has finished before this runs.
//!             assert_eq!(loaded.load(Ordering::Relaxed), 3);
//!         }
//!     })
//!     .name("process")
//!     .depends_on(&[load])
//!     .create()
//!     .unwrap();
//!
//! scheduler.wait_for_set(process);
//! scheduler.release_handles(&[load, process]);
//! ```
//!
//! # Worker pools
//!
//! On a machine with only one class of processor, a single pool with one worker per processor
//! (minus one for the thread that creates and waits for task sets) executes everything and the
//! processor class requested for a task set is ignored.
//!
//! On a hybrid machine, the [`RoutingMode`] chosen at build time decides which pools exist.
//! By default a small pool free to run anywhere executes task sets of [`CoreType::Any`] while
//! dedicated performance and efficiency pools execute task sets that asked for a class.
//! Worker threads can find out which class they were bound to via [`current_core_type()`].
//!
//! # Handles and capacity
//!
//! Task sets live in a fixed-size registry. A slot is reused once its task set has completed
//! and the handle has been released via [`Scheduler::release_handle()`]. Running out of slots
//! or successor slots is reported as an error and logged; raise the limits via
//! [`SchedulerBuilder`].
//!
//! # Panics
//!
//! Sub-task callbacks must not panic. A panic terminates the worker thread and the task set
//! never completes. [`Scheduler::shutdown()`] stops waiting for task sets once a worker has died
//! and re-raises the panic. A scheduler dropped while its thread is panicking stops its workers
//! without waiting for anything.

mod core_type;
mod dispatcher;
mod error;
#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod fake;
mod handle;
mod layout;
mod pool;
mod ready_queue;
mod registry;
mod scheduler;
mod semaphore;
mod subtask;
mod task_set_builder;
mod topology;
mod worker;

pub use core_type::*;
pub(crate) use dispatcher::*;
pub use error::*;
pub use handle::*;
pub(crate) use layout::*;
pub(crate) use pool::*;
pub(crate) use ready_queue::*;
pub(crate) use registry::*;
pub use scheduler::*;
pub(crate) use semaphore::*;
pub use subtask::*;
pub use task_set_builder::*;
pub use topology::*;
pub(crate) use worker::*;
