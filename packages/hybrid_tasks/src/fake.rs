//! Simulated processor topology for testing.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! [`FakeTopology`] lets tests exercise hybrid routing on any machine. Worker threads are not
//! actually pinned; the topology only records which processor class each thread asked for,
//! which the thread can later observe via [`current_core_type()`][crate::current_core_type].
//!
//! ```
//! use hybrid_tasks::fake::FakeTopology;
//! use hybrid_tasks::{CoreType, ProcessorTopology};
//!
//! let topology = FakeTopology::new(6, 8);
//!
//! assert!(topology.is_hybrid());
//! assert_eq!(topology.core_type_count(CoreType::Efficiency), 8);
//! assert_eq!(topology.processor_count(), 14);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{CoreType, ProcessorId, ProcessorTopology};

/// A processor topology with a chosen number of performance and efficiency processors.
///
/// Performance processors get the lowest processor IDs, followed by efficiency processors.
#[derive(Debug)]
pub struct FakeTopology {
    performance: u32,
    efficiency: u32,

    pinned_performance: AtomicUsize,
    pinned_efficiency: AtomicUsize,
    pinned_any: AtomicUsize,
}

impl FakeTopology {
    /// Creates a topology with the given number of processors in each class.
    ///
    /// A topology with zero efficiency processors (or zero performance processors) is not
    /// hybrid.
    #[must_use]
    pub fn new(performance: u32, efficiency: u32) -> Self {
        Self {
            performance,
            efficiency,
            pinned_performance: AtomicUsize::new(0),
            pinned_efficiency: AtomicUsize::new(0),
            pinned_any: AtomicUsize::new(0),
        }
    }

    /// Creates a topology where all processors are of one class.
    #[must_use]
    pub fn homogeneous(processors: u32) -> Self {
        Self::new(processors, 0)
    }

    /// How many threads have been bound to the given processor class so far.
    #[must_use]
    pub fn pinned_thread_count(&self, core_type: CoreType) -> usize {
        let counter = match core_type {
            CoreType::Performance => &self.pinned_performance,
            CoreType::Efficiency => &self.pinned_efficiency,
            CoreType::Any => &self.pinned_any,
        };

        counter.load(Ordering::Relaxed)
    }
}

impl ProcessorTopology for FakeTopology {
    fn processor_count(&self) -> usize {
        self.performance.saturating_add(self.efficiency) as usize
    }

    fn processor_ids(&self, core_type: CoreType) -> Vec<ProcessorId> {
        let end = self.performance.saturating_add(self.efficiency);

        match core_type {
            CoreType::Performance => (0..self.performance).collect(),
            CoreType::Efficiency => (self.performance..end).collect(),
            CoreType::Any => (0..end).collect(),
        }
    }

    fn core_type_count(&self, core_type: CoreType) -> usize {
        match core_type {
            CoreType::Performance => self.performance as usize,
            CoreType::Efficiency => self.efficiency as usize,
            CoreType::Any => self.processor_count(),
        }
    }

    fn pin_current_thread(&self, core_type: CoreType, fallback: CoreType) -> CoreType {
        let bound = if self.core_type_count(core_type) > 0 {
            core_type
        } else if self.core_type_count(fallback) > 0 {
            fallback
        } else {
            CoreType::Any
        };

        let counter = match bound {
            CoreType::Performance => &self.pinned_performance,
            CoreType::Efficiency => &self.pinned_efficiency,
            CoreType::Any => &self.pinned_any,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        bound
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn ids_are_partitioned_by_class() {
        let topology = FakeTopology::new(2, 3);

        assert_eq!(topology.processor_ids(CoreType::Performance), vec![0, 1]);
        assert_eq!(topology.processor_ids(CoreType::Efficiency), vec![2, 3, 4]);
        assert_eq!(topology.processor_ids(CoreType::Any), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn homogeneous_is_not_hybrid() {
        let topology = FakeTopology::homogeneous(4);

        assert!(!topology.is_hybrid());
        assert_eq!(topology.core_type_count(CoreType::Efficiency), 0);
    }

    #[test]
    fn pinning_falls_back_when_class_is_empty() {
        let topology = FakeTopology::homogeneous(4);

        let bound = topology.pin_current_thread(CoreType::Efficiency, CoreType::Any);

        assert_eq!(bound, CoreType::Any);
        assert_eq!(topology.pinned_thread_count(CoreType::Any), 1);
        assert_eq!(topology.pinned_thread_count(CoreType::Efficiency), 0);
    }
}
