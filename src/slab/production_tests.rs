//! Workload scenarios for the bucket engine
//!
//! These tests drive a `BucketEngine` through realistic sequences and check
//! the counters the stats recorder exposes afterwards.

#[cfg(test)]
mod integration {
    use crate::config::EngineConfig;
    use crate::error::{Error, Result};
    use crate::slab::{BucketEngine, SlotPtr, FREED_SENTINEL};

    fn four_by_ten() -> EngineConfig {
        EngineConfig::with_capacities([10, 10, 10, 10])
    }

    #[test]
    fn test_fill_free_and_grow_scenario() -> Result<()> {
        let mut engine = BucketEngine::new(four_by_ten())?;

        // Ten 1-byte allocations fill class 0
        let mut ptrs = Vec::new();
        for i in 0..10u8 {
            let ptr = engine.allocate(1)?;
            engine.bytes_mut(ptr)?[0] = i;
            ptrs.push(ptr);
        }
        let class0 = engine.stats().unwrap().class(0).unwrap().clone();
        assert_eq!(class0.allocated, 10);
        assert_eq!(class0.high_water_mark, 10);

        // Free five of them
        for ptr in ptrs.drain(..5) {
            engine.free(ptr)?;
        }
        let class0 = engine.stats().unwrap().class(0).unwrap().clone();
        assert_eq!(class0.in_use(), 5);
        assert_eq!(class0.high_water_mark, 10);

        // Grow a survivor to 40 bytes: moves into the 64-byte class
        let survivor = ptrs[0];
        let moved = engine.reallocate(survivor, 40, 1)?;
        assert_ne!(moved, survivor);
        assert_eq!(engine.class_of(moved), Some(2));
        assert_eq!(engine.bytes(moved)?[0], 5);
        assert_eq!(engine.usage(0), Some((4, 10)));

        let stats = engine.stats().unwrap();
        assert_eq!(stats.class(0).unwrap().in_use(), 4);
        assert_eq!(stats.class(0).unwrap().high_water_mark, 10);
        assert_eq!(stats.class(2).unwrap().reallocate_grows_needed, 1);
        Ok(())
    }

    #[test]
    fn test_forty_bytes_lands_in_sixty_four_byte_class() -> Result<()> {
        // 40 bytes needs more than 32, so the natural class is 64 bytes
        let engine = BucketEngine::new(four_by_ten())?;
        assert_eq!(engine.table().classify(40)?, 2);
        assert_eq!(engine.table().classify(32)?, 1);
        Ok(())
    }

    #[test]
    fn test_capacity_plus_one_overflows_once() -> Result<()> {
        let mut strict = BucketEngine::new(four_by_ten())?;
        let mut lenient = BucketEngine::new(four_by_ten().allow_overflow(true))?;

        for _ in 0..10 {
            strict.allocate(16)?;
            lenient.allocate(16)?;
        }

        assert!(matches!(strict.allocate(16), Err(Error::OutOfMemory { .. })));

        let ptr = lenient.allocate(16)?;
        assert_eq!(lenient.class_of(ptr), Some(1));
        let stats = lenient.stats().unwrap();
        assert_eq!(stats.class(0).unwrap().overflows, 1);
        assert_eq!(stats.class(1).unwrap().allocated, 1);
        Ok(())
    }

    #[test]
    fn test_allocate_free_restores_balance() -> Result<()> {
        let mut engine = BucketEngine::new(four_by_ten())?;
        let before = engine.stats().unwrap().class(1).unwrap().in_use();

        let ptr = engine.allocate(24)?;
        engine.free(ptr)?;

        let after = engine.stats().unwrap().class(1).unwrap();
        assert_eq!(after.in_use(), before);
        assert_eq!(after.high_water_mark, 1);
        Ok(())
    }

    #[test]
    fn test_zero_on_free_scrubs_slots() -> Result<()> {
        let mut engine = BucketEngine::new(four_by_ten().zero_on_free(true))?;
        let ptr = engine.allocate(16)?;
        engine.bytes_mut(ptr)?.fill(0x42);

        // growing copies before the old slot is scrubbed
        let grown = engine.reallocate(ptr, 128, 16)?;
        assert!(engine.bytes(grown)?[..16].iter().all(|&b| b == 0x42));

        let reused = engine.allocate(16)?;
        assert_eq!(reused, ptr);
        assert!(engine.bytes(reused)?.iter().all(|&b| b == FREED_SENTINEL));
        Ok(())
    }

    #[test]
    fn test_churn_keeps_every_bucket_consistent() -> Result<()> {
        let mut engine = BucketEngine::new(
            EngineConfig::with_capacities([32, 16, 8, 4]).allow_overflow(true),
        )?;
        let mut live: Vec<SlotPtr> = Vec::new();

        for round in 0..200usize {
            let size = 1 + (round * 37) % 120;
            match round % 3 {
                0 | 1 => match engine.allocate(size as isize) {
                    Ok(ptr) => live.push(ptr),
                    Err(Error::OutOfMemory { .. }) => {
                        let ptr = live.remove(0);
                        engine.free(ptr)?;
                    }
                    Err(e) => return Err(e),
                },
                _ => {
                    if let Some(ptr) = live.pop() {
                        match engine.reallocate(ptr, size as isize, 0) {
                            Ok(new_ptr) => live.push(new_ptr),
                            Err(Error::OutOfMemory { .. }) => live.push(ptr),
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
        }

        let stats = engine.stats().unwrap();
        for index in 0..4 {
            let bucket = engine.bucket(index).unwrap();
            assert!(bucket.check_partition());
            let class = stats.class(index).unwrap();
            assert_eq!(class.in_use() as usize, bucket.used());
            assert!(class.high_water_mark as usize <= bucket.capacity());
        }
        assert_eq!(
            live.len(),
            (0..4).map(|i| engine.bucket(i).unwrap().used()).sum::<usize>()
        );
        Ok(())
    }
}
