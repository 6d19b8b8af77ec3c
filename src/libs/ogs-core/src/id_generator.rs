//! Bounded sequential ID generator
//!
//! Hands out integer IDs from a closed range `[min, max]`. IDs come out in
//! strictly increasing order until the cursor reaches `max`; after that the
//! cursor wraps and freed values are reused. The generator never hands out a
//! value that is still live.

use std::collections::HashSet;
use std::sync::Mutex;

use thiserror::Error;

/// ID generator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Every value in the range is live
    #[error("ID space [{min}, {max}] exhausted")]
    Exhausted { min: i64, max: i64 },
    /// `min > max` at construction
    #[error("invalid ID range [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },
}

struct GeneratorState {
    /// Next candidate value
    cursor: i64,
    /// Values currently handed out
    in_use: HashSet<i64>,
}

/// Bounded allocator for correlation IDs (AMF UE NGAP ID, pool IDs)
pub struct SequentialIdGenerator {
    min: i64,
    max: i64,
    state: Mutex<GeneratorState>,
}

impl SequentialIdGenerator {
    /// Create a generator over `[min, max]`
    pub fn new(min: i64, max: i64) -> Result<Self, IdError> {
        if min > max {
            return Err(IdError::InvalidRange { min, max });
        }
        Ok(Self {
            min,
            max,
            state: Mutex::new(GeneratorState {
                cursor: min,
                in_use: HashSet::new(),
            }),
        })
    }

    /// Size of the range, saturating for the full `i64` span
    fn capacity(&self) -> u64 {
        self.max.abs_diff(self.min).saturating_add(1)
    }

    /// Allocate the next free value
    pub fn allocate(&self) -> Result<i64, IdError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.in_use.len() as u64 >= self.capacity() {
            log::error!("ID space [{}, {}] exhausted", self.min, self.max);
            return Err(IdError::Exhausted {
                min: self.min,
                max: self.max,
            });
        }

        // A free value exists, so this terminates within one lap.
        loop {
            let candidate = state.cursor;
            state.cursor = if candidate >= self.max {
                self.min
            } else {
                candidate + 1
            };
            if state.in_use.insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Release a value. Values outside the range or not held are ignored.
    pub fn free(&self, id: i64) {
        if id < self.min || id > self.max {
            log::warn!("free of out-of-range ID {} ignored", id);
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.in_use.remove(&id) {
            log::debug!("free of unallocated ID {} ignored", id);
        }
    }

    /// Check whether a value is currently held
    pub fn is_allocated(&self, id: i64) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.contains(&id)
    }

    /// Number of live values
    pub fn allocated_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.len()
    }

    /// Lower bound of the range
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Upper bound of the range
    pub fn max(&self) -> i64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            SequentialIdGenerator::new(5, 1),
            Err(IdError::InvalidRange { min: 5, max: 1 })
        ));
    }

    #[test]
    fn test_increasing_until_exhaustion() {
        let generator = SequentialIdGenerator::new(1, 16).unwrap();
        let mut last = 0;
        for _ in 0..16 {
            let id = generator.allocate().unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(last, 16);
        assert_eq!(
            generator.allocate(),
            Err(IdError::Exhausted { min: 1, max: 16 })
        );
    }

    #[test]
    fn test_free_then_reuse() {
        let generator = SequentialIdGenerator::new(1, 4).unwrap();
        for _ in 0..4 {
            generator.allocate().unwrap();
        }
        generator.free(3);
        assert!(!generator.is_allocated(3));
        assert_eq!(generator.allocate().unwrap(), 3);
        assert!(generator.allocate().is_err());
    }

    #[test]
    fn test_free_is_idempotent() {
        let generator = SequentialIdGenerator::new(10, 20).unwrap();
        let id = generator.allocate().unwrap();
        generator.free(id);
        generator.free(id);
        generator.free(999);
        generator.free(15);
        assert_eq!(generator.allocated_count(), 0);

        // Nothing got corrupted: the next values are still unique
        let a = generator.allocate().unwrap();
        let b = generator.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(generator.allocated_count(), 2);
    }

    #[test]
    fn test_wrap_skips_live_values() {
        let generator = SequentialIdGenerator::new(1, 3).unwrap();
        let a = generator.allocate().unwrap();
        let _b = generator.allocate().unwrap();
        let c = generator.allocate().unwrap();
        generator.free(c);
        generator.free(a);
        // Cursor wrapped to 1; 1 is free, 2 is live
        assert_eq!(generator.allocate().unwrap(), 1);
        assert_eq!(generator.allocate().unwrap(), 3);
    }

    #[test]
    fn test_large_range() {
        let generator = SequentialIdGenerator::new(1, 1_099_511_627_775).unwrap();
        assert_eq!(generator.allocate().unwrap(), 1);
        assert_eq!(generator.allocate().unwrap(), 2);
        assert_eq!(generator.max(), 1_099_511_627_775);
    }

    #[test]
    fn test_full_i64_range() {
        let generator = SequentialIdGenerator::new(i64::MIN, i64::MAX).unwrap();
        assert_eq!(generator.capacity(), u64::MAX);
        assert_eq!(generator.allocate().unwrap(), i64::MIN);
        assert_eq!(generator.allocate().unwrap(), i64::MIN + 1);

        let single = SequentialIdGenerator::new(i64::MAX, i64::MAX).unwrap();
        assert_eq!(single.capacity(), 1);
        assert_eq!(single.allocate().unwrap(), i64::MAX);
        assert!(single.allocate().is_err());
    }

    mod property {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_live_values_unique(ops in prop::collection::vec(any::<bool>(), 1..200)) {
                let generator = SequentialIdGenerator::new(1, 32).unwrap();
                let mut live: Vec<i64> = Vec::new();
                for alloc in ops {
                    if alloc || live.is_empty() {
                        match generator.allocate() {
                            Ok(id) => {
                                prop_assert!(!live.contains(&id));
                                prop_assert!((1..=32).contains(&id));
                                live.push(id);
                            }
                            Err(_) => prop_assert_eq!(live.len(), 32),
                        }
                    } else {
                        let id = live.remove(0);
                        generator.free(id);
                    }
                }
                prop_assert_eq!(generator.allocated_count(), live.len());
            }
        }
    }
}
