//! In-memory sensor registry tracker.
//!
//! A bucketed set of sensor names already written to (or confirmed in) the
//! registry partition. It only saves round trips: a miss never means "the
//! sensor does not exist", it means "go and ask the store".
//!
//! Names are bucketed by a hash of their zip code prefix. The bucket count is
//! fixed at construction to about `sqrt(expected_sensors)` so each bucket is
//! expected to hold about the same number of names. Each bucket has its own
//! lock, so two ingests only contend when their sensors share a bucket.

use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use parking_lot::Mutex;

// ---

pub struct RegistryTracker {
    buckets: Vec<Mutex<HashSet<String>>>,
}

impl RegistryTracker {
    // ---
    /// Size the tracker for roughly `expected_sensors` distinct names.
    pub fn new(expected_sensors: u32) -> Self {
        // ---
        let bucket_count = ((expected_sensors as f64).sqrt().ceil() as usize).max(1);
        let buckets = (0..bucket_count).map(|_| Mutex::new(HashSet::new())).collect();
        Self { buckets }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Record `sensor_name`. Returns `true` when it was already known.
    pub fn insert_if_absent(&self, sensor_name: &str) -> bool {
        // ---
        let mut bucket = self.bucket_for(sensor_name).lock();
        if bucket.contains(sensor_name) {
            return true;
        }
        bucket.insert(sensor_name.to_string());
        false
    }

    /// Drop `sensor_name` so the next ingest re-runs the authoritative check.
    pub fn forget(&self, sensor_name: &str) -> bool {
        self.bucket_for(sensor_name).lock().remove(sensor_name)
    }

    #[cfg(test)]
    pub fn contains(&self, sensor_name: &str) -> bool {
        self.bucket_for(sensor_name).lock().contains(sensor_name)
    }

    /// Total tracked names across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    fn bucket_for(&self, sensor_name: &str) -> &Mutex<HashSet<String>> {
        &self.buckets[self.bucket_index(sensor_name)]
    }

    fn bucket_index(&self, sensor_name: &str) -> usize {
        // ---
        let mut hasher = DefaultHasher::new();
        zip_prefix(sensor_name).hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as usize
    }
}

/// Sensor names are `{zip}_{city}`; names without an underscore bucket whole.
fn zip_prefix(sensor_name: &str) -> &str {
    sensor_name.split_once('_').map_or(sensor_name, |(zip, _)| zip)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_bucket_count_is_sqrt_of_expected() {
        // ---
        assert_eq!(RegistryTracker::new(1024).bucket_count(), 32);
        assert_eq!(RegistryTracker::new(1000).bucket_count(), 32);
        assert_eq!(RegistryTracker::new(0).bucket_count(), 1);
    }

    #[test]
    fn test_second_insert_is_a_hit() {
        // ---
        let tracker = RegistryTracker::new(16);
        assert!(!tracker.insert_if_absent("22181_vienna"));
        assert!(tracker.insert_if_absent("22181_vienna"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_same_zip_shares_a_bucket() {
        // ---
        let tracker = RegistryTracker::new(4096);
        assert_eq!(
            tracker.bucket_index("22181_vienna"),
            tracker.bucket_index("22181_oakton")
        );
    }

    #[test]
    fn test_forget_makes_next_insert_a_miss() {
        // ---
        let tracker = RegistryTracker::new(16);
        tracker.insert_if_absent("20001_washington");
        assert!(tracker.forget("20001_washington"));
        assert!(!tracker.contains("20001_washington"));
        assert!(!tracker.insert_if_absent("20001_washington"));
    }

    #[test]
    fn test_concurrent_inserts_report_exactly_one_miss() {
        // ---
        let tracker = Arc::new(RegistryTracker::new(64));
        let misses = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let misses = Arc::clone(&misses);
                std::thread::spawn(move || {
                    if !tracker.insert_if_absent("10001_new_york") {
                        misses.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(misses.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.len(), 1);
    }
}
