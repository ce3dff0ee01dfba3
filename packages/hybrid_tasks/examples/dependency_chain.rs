//! Runs a small pipeline of task sets on the processors of the current machine.
//!
//! A decode stage prefers efficiency processors, a transform stage prefers performance
//! processors and a final reduction has no preference.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hybrid_tasks::{CoreType, Scheduler, current_core_type};

const BLOCKS: u32 = 64;

fn main() {
    let mut scheduler = Scheduler::new().expect("the scheduler can start on this machine");

    println!(
        "scheduler running with {} execution contexts",
        scheduler.context_count()
    );

    let checksum = Arc::new(AtomicU64::new(0));

    let decode = scheduler
        .task_set(BLOCKS, |context| {
            if context.index() == 0 {
                println!("decode runs on {:?} processors", current_core_type());
            }
        })
        .name("decode")
        .core_type(CoreType::Efficiency)
        .create()
        .expect("registry has room for the pipeline");

    let transform = scheduler
        .task_set(BLOCKS, {
            let checksum = Arc::clone(&checksum);
            move |context| {
                checksum.fetch_add(u64::from(context.index()), Ordering::Relaxed);
            }
        })
        .name("transform")
        .core_type(CoreType::Performance)
        .depends_on(&[decode])
        .create()
        .expect("registry has room for the pipeline");

    let reduce = scheduler
        .task_set(1, {
            let checksum = Arc::clone(&checksum);
            move |_| {
                println!("checksum: {}", checksum.load(Ordering::Relaxed));
            }
        })
        .name("reduce")
        .depends_on(&[transform])
        .create()
        .expect("registry has room for the pipeline");

    scheduler.wait_for_set(reduce);
    scheduler.release_handles(&[decode, transform, reduce]);
}
