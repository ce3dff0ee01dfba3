use std::iter;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counts how many times each sub-task index was delivered to a callback.
///
/// Share it with a task set callback via `Arc` and call [`record()`][Self::record] from the
/// callback, then check the counts once the task set has completed.
///
/// ```rust
/// use testing::DeliveryRecorder;
///
/// let recorder = DeliveryRecorder::new(3);
/// recorder.record(0);
/// recorder.record(2);
/// recorder.record(1);
///
/// recorder.assert_each_delivered_once();
/// ```
#[derive(Debug)]
pub struct DeliveryRecorder {
    deliveries: Box<[AtomicU32]>,
}

impl DeliveryRecorder {
    /// Creates a recorder for indexes `0..count`.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            deliveries: iter::repeat_with(|| AtomicU32::new(0))
                .take(count as usize)
                .collect(),
        }
    }

    /// Records one delivery of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the range the recorder was created for.
    pub fn record(&self, index: u32) {
        self.deliveries
            .get(index as usize)
            .unwrap_or_else(|| panic!("index {index} is outside the recorded range"))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of deliveries of all indexes.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.deliveries
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Asserts that every index was delivered exactly once.
    ///
    /// # Panics
    ///
    /// Panics naming the first index that was delivered zero times or more than once.
    pub fn assert_each_delivered_once(&self) {
        for (index, count) in self.deliveries.iter().enumerate() {
            let count = count.load(Ordering::Relaxed);
            assert_eq!(count, 1, "index {index} was delivered {count} times");
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn duplicate_delivery_is_detected() {
        let recorder = DeliveryRecorder::new(2);
        recorder.record(0);
        recorder.record(0);
        recorder.record(1);

        recorder.assert_each_delivered_once();
    }

    #[test]
    #[should_panic]
    fn missing_delivery_is_detected() {
        let recorder = DeliveryRecorder::new(2);
        recorder.record(1);

        recorder.assert_each_delivered_once();
    }

    #[test]
    fn total_counts_every_delivery() {
        let recorder = DeliveryRecorder::new(2);
        recorder.record(1);
        recorder.record(1);

        assert_eq!(recorder.total(), 2);
    }
}
