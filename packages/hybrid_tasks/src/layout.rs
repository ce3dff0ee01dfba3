//! Decides how many worker pools exist, how large they are and which pool receives which task
//! sets.

use crate::{CoreType, ProcessorTopology, RoutingMode};

/// Worker threads kept free for the thread that creates and waits for task sets.
const MAIN_THREAD_RESERVATION: usize = 1;

/// One worker pool to be created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PoolSpec {
    /// The processor class the pool's threads are bound to.
    pub(crate) core_type: CoreType,

    pub(crate) worker_count: usize,
}

/// Maps the affinity of a task set to the pool that executes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Router {
    hybrid: bool,
    performance: usize,
    efficiency: usize,
    any: usize,
}

impl Router {
    /// The affinity recorded for a task set. Preferences are meaningless without a hybrid
    /// topology, so they collapse to [`CoreType::Any`].
    pub(crate) fn effective_core_type(&self, requested: CoreType) -> CoreType {
        if self.hybrid {
            requested
        } else {
            CoreType::Any
        }
    }

    pub(crate) fn pool_index(&self, core_type: CoreType) -> usize {
        match core_type {
            CoreType::Performance => self.performance,
            CoreType::Efficiency => self.efficiency,
            CoreType::Any => self.any,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PoolLayout {
    pub(crate) pools: Vec<PoolSpec>,
    pub(crate) router: Router,
}

impl PoolLayout {
    pub(crate) fn plan(topology: &dyn ProcessorTopology, mode: RoutingMode) -> Self {
        if !topology.is_hybrid() {
            return Self {
                pools: vec![PoolSpec {
                    core_type: CoreType::Any,
                    worker_count: topology
                        .processor_count()
                        .saturating_sub(MAIN_THREAD_RESERVATION),
                }],
                router: Router {
                    hybrid: false,
                    performance: 0,
                    efficiency: 0,
                    any: 0,
                },
            };
        }

        let performance = topology.core_type_count(CoreType::Performance);
        let efficiency = topology.core_type_count(CoreType::Efficiency);

        match mode {
            RoutingMode::CoreOnly => Self {
                pools: vec![PoolSpec {
                    core_type: CoreType::Performance,
                    worker_count: performance.saturating_sub(MAIN_THREAD_RESERVATION),
                }],
                router: Router {
                    hybrid: true,
                    performance: 0,
                    efficiency: 0,
                    any: 0,
                },
            },
            RoutingMode::Split => Self {
                pools: vec![
                    PoolSpec {
                        core_type: CoreType::Performance,
                        worker_count: performance.saturating_sub(MAIN_THREAD_RESERVATION),
                    },
                    PoolSpec {
                        core_type: CoreType::Efficiency,
                        worker_count: efficiency,
                    },
                ],
                router: Router {
                    hybrid: true,
                    performance: 0,
                    efficiency: 1,
                    any: 0,
                },
            },
            RoutingMode::ReserveAny { any_threads } => {
                let any_threads = any_threads.get();

                // The shared pool's threads are taken evenly from both classes, with the
                // performance class giving up the odd one.
                let from_efficiency = any_threads.div_euclid(2);
                let from_performance = any_threads.saturating_sub(from_efficiency);

                Self {
                    pools: vec![
                        PoolSpec {
                            core_type: CoreType::Any,
                            worker_count: any_threads,
                        },
                        PoolSpec {
                            core_type: CoreType::Performance,
                            worker_count: performance
                                .saturating_sub(MAIN_THREAD_RESERVATION)
                                .saturating_sub(from_performance),
                        },
                        PoolSpec {
                            core_type: CoreType::Efficiency,
                            worker_count: efficiency.saturating_sub(from_efficiency),
                        },
                    ],
                    router: Router {
                        hybrid: true,
                        performance: 1,
                        efficiency: 2,
                        any: 0,
                    },
                }
            }
        }
    }

    pub(crate) fn total_workers(&self) -> usize {
        self.pools.iter().map(|pool| pool.worker_count).sum()
    }
}
