//! Processor topology as seen by the scheduler.
//!
//! The scheduler does not detect hardware itself. It consumes a read-only [`ProcessorTopology`]
//! that answers how many processors of each class exist and binds worker threads to a class.

use std::cell::Cell;
use std::fmt::{self, Debug};

use many_cpus::{Processor, ProcessorSet, ProcessorSetBuilder};

use crate::{CoreType, Error, Result};

pub use many_cpus::ProcessorId;

/// Read-only view of the processors available to the scheduler, grouped by [`CoreType`].
///
/// The topology is consulted when the scheduler is built (to size the worker pools) and by each
/// worker thread when it starts (to bind itself to its processor class).
///
/// [`SystemTopology`] is the implementation backed by the real hardware.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessorTopology: Debug + Send + Sync + 'static {
    /// Total number of logical processors available.
    fn processor_count(&self) -> usize;

    /// The processors of the given class. [`CoreType::Any`] yields every processor.
    fn processor_ids(&self, core_type: CoreType) -> Vec<ProcessorId>;

    /// Number of processors of the given class.
    fn core_type_count(&self, core_type: CoreType) -> usize {
        self.processor_ids(core_type).len()
    }

    /// Whether both performance and efficiency processors are present.
    fn is_hybrid(&self) -> bool {
        self.core_type_count(CoreType::Performance) > 0
            && self.core_type_count(CoreType::Efficiency) > 0
    }

    /// Restricts the current thread to the processors of class `core_type`.
    ///
    /// If there are no such processors, the thread is restricted to the `fallback` class
    /// instead. Returns the class the thread was actually bound to.
    fn pin_current_thread(&self, core_type: CoreType, fallback: CoreType) -> CoreType;
}

thread_local! {
    static BOUND_CORE_TYPE: Cell<Option<CoreType>> = const { Cell::new(None) };
}

/// The processor class the current thread was bound to by a scheduler worker pool.
///
/// Returns `None` on threads that are not scheduler workers, such as the thread that creates
/// and waits for task sets.
#[must_use]
pub fn current_core_type() -> Option<CoreType> {
    BOUND_CORE_TYPE.with(Cell::get)
}

pub(crate) fn record_current_core_type(core_type: CoreType) {
    BOUND_CORE_TYPE.with(|bound| bound.set(Some(core_type)));
}

/// The processor topology of the machine the process is running on.
///
/// Processor classes come from the operating system via `many_cpus`. On machines where the
/// operating system does not distinguish processor classes, every processor is a performance
/// processor and the topology is not hybrid.
pub struct SystemTopology {
    all: ProcessorSet,
    performance: Option<ProcessorSet>,
    efficiency: Option<ProcessorSet>,
}

impl SystemTopology {
    /// Inspects the processors available to the current process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the operating system reports no usable
    /// processors.
    pub fn new() -> Result<Self> {
        let all = ProcessorSetBuilder::new()
            .take_all()
            .ok_or_else(|| Error::InvalidConfiguration {
                problem: "the operating system reported no usable processors".to_string(),
            })?;

        let performance = ProcessorSetBuilder::new()
            .performance_processors_only()
            .take_all();
        let efficiency = ProcessorSetBuilder::new()
            .efficiency_processors_only()
            .take_all();

        Ok(Self {
            all,
            performance,
            efficiency,
        })
    }

    fn set_for(&self, core_type: CoreType) -> Option<&ProcessorSet> {
        match core_type {
            CoreType::Performance => self.performance.as_ref(),
            CoreType::Efficiency => self.efficiency.as_ref(),
            CoreType::Any => Some(&self.all),
        }
    }
}

impl ProcessorTopology for SystemTopology {
    fn processor_count(&self) -> usize {
        self.all.len()
    }

    fn processor_ids(&self, core_type: CoreType) -> Vec<ProcessorId> {
        self.set_for(core_type)
            .map(|set| set.processors().iter().map(Processor::id).collect())
            .unwrap_or_default()
    }

    fn core_type_count(&self, core_type: CoreType) -> usize {
        self.set_for(core_type).map_or(0, ProcessorSet::len)
    }

    fn pin_current_thread(&self, core_type: CoreType, fallback: CoreType) -> CoreType {
        if let Some(set) = self.set_for(core_type) {
            set.pin_current_thread_to();
            return core_type;
        }

        if let Some(set) = self.set_for(fallback) {
            set.pin_current_thread_to();
            return fallback;
        }

        self.all.pin_current_thread_to();
        CoreType::Any
    }
}

impl Debug for SystemTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTopology")
            .field("processor_count", &self.all.len())
            .field(
                "performance_count",
                &self.core_type_count(CoreType::Performance),
            )
            .field("efficiency_count", &self.core_type_count(CoreType::Efficiency))
            .finish()
    }
}
